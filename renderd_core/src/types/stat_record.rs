//! The result of a storage backend's `stat` operation.

use std::time::SystemTime;

/// Metadata a storage backend reports for a single tile slot, independent of
/// the metatile it is physically stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRecord {
	/// Encoded tile size in bytes, or `-1` if the tile is absent.
	pub size: i64,
	pub mtime: SystemTime,
	pub atime: SystemTime,
	pub ctime: SystemTime,
	/// The tile exists but should be considered stale and re-rendered.
	pub expired: bool,
}

/// The four states the serving frontend derives from a `StatRecord` plus
/// configured staleness thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
	Current,
	Old,
	VeryOld,
	Missing,
}

impl StatRecord {
	#[must_use]
	pub fn missing() -> Self {
		let epoch = SystemTime::UNIX_EPOCH;
		StatRecord {
			size: -1,
			mtime: epoch,
			atime: epoch,
			ctime: epoch,
			expired: false,
		}
	}

	#[must_use]
	pub fn is_missing(&self) -> bool {
		self.size < 0
	}

	/// Classifies this record into the four states the serving frontend acts on.
	///
	/// `now` and `very_old_threshold` are injected rather than read from the
	/// system clock so tests can drive this deterministically.
	#[must_use]
	pub fn classify(&self, now: SystemTime, very_old_threshold: std::time::Duration) -> TileState {
		if self.is_missing() {
			return TileState::Missing;
		}
		if self.expired {
			let age = now.duration_since(self.mtime).unwrap_or_default();
			return if age < very_old_threshold {
				TileState::Old
			} else {
				TileState::VeryOld
			};
		}
		TileState::Current
	}
}
