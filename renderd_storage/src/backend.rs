//! The polymorphic storage backend interface: a capability trait
//! with one implementation per URI scheme, selected by [`crate::open`].

use crate::codec::Metatile;
use anyhow::Result;
use renderd_core::{StatRecord, TileCoord};

/// A single tile's bytes as returned by [`StorageBackend::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRead {
	pub bytes: Vec<u8>,
	/// Whether `bytes` is already compressed (the metatile's `METZ` magic).
	pub compressed: bool,
}

/// Operations every storage backend implements. All operations are blocking:
/// backends are invoked from render-worker or request-handler threads, never
/// from an async runtime directly.
pub trait StorageBackend: Send + Sync {
	/// Reads the single tile at `coord` out of its containing metatile.
	/// Returns `Ok(None)` if the tile is absent.
	fn read(&self, style: &str, options: &str, coord: TileCoord) -> Result<Option<TileRead>>;

	/// Reports size/timestamps/expiry for the tile at `coord`, without reading its bytes.
	fn stat(&self, style: &str, options: &str, coord: TileCoord) -> Result<StatRecord>;

	/// Writes a fully rendered metatile. `metatile.origin` must already be
	/// aligned to the metatile grid. Implementations write atomically:
	/// either the whole metatile becomes visible, or none of it does.
	fn write_metatile(&self, style: &str, options: &str, metatile: &Metatile) -> Result<()>;

	/// Deletes the metatile containing `coord`. A no-op `Ok(())` for backends
	/// that do not support deletion (read-only backends).
	fn delete_metatile(&self, style: &str, coord: TileCoord) -> Result<()>;

	/// Marks the metatile containing `coord` as stale without deleting it;
	/// subsequent `stat` calls report `expired = true`.
	fn expire_metatile(&self, style: &str, coord: TileCoord) -> Result<()>;

	/// An opaque identifier for this tile, suitable for log lines.
	fn id_of(&self, style: &str, options: &str, coord: TileCoord) -> String {
		format!("{style}/{}/{}/{}{}", coord.z, coord.x, coord.y, if options.is_empty() { String::new() } else { format!("?{options}") })
	}

	/// Releases any resources (connections, file handles) held by this backend.
	/// Invoked once when the owning worker pool tears down.
	fn close(&self) -> Result<()> {
		Ok(())
	}
}
