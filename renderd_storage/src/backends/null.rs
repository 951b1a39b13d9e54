//! The null backend (`null://` URIs): all reads report missing,
//! writes report success but persist nothing. Used for load-testing the
//! render pipeline without disk or network I/O in the loop.

use crate::backend::{StorageBackend, TileRead};
use crate::codec::Metatile;
use anyhow::Result;
use renderd_core::{StatRecord, TileCoord};

#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl StorageBackend for NullBackend {
	fn read(&self, _style: &str, _options: &str, _coord: TileCoord) -> Result<Option<TileRead>> {
		Ok(None)
	}

	fn stat(&self, _style: &str, _options: &str, _coord: TileCoord) -> Result<StatRecord> {
		Ok(StatRecord::missing())
	}

	fn write_metatile(&self, _style: &str, _options: &str, _metatile: &Metatile) -> Result<()> {
		Ok(())
	}

	fn delete_metatile(&self, _style: &str, _coord: TileCoord) -> Result<()> {
		Ok(())
	}

	fn expire_metatile(&self, _style: &str, _coord: TileCoord) -> Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_always_miss_and_writes_always_succeed() {
		let backend = NullBackend;
		let coord = TileCoord::new(3, 1, 1).unwrap();
		assert!(backend.read("s", "", coord).unwrap().is_none());
		assert_eq!(backend.stat("s", "", coord).unwrap().size, -1);
		assert!(backend.write_metatile("s", "", &Metatile::new(8, coord)).is_ok());
	}
}
