//! Local-filesystem storage, directory-hashed per `store_file_utils.c`.
//!
//! `expire_metatile` is implemented as an out-of-band sidecar file
//! (`<metatile path>.expired`, a zero-byte marker) rather than by mutating the
//! metatile's `mtime`. `mtime` also drives the "age since last render"
//! computation the serving frontend uses for `Cache-Control`; touching it
//! on expire would make a freshly-expired-but-not-yet-rerendered
//! tile look newly rendered. This is an Open Question resolution — see
//! `DESIGN.md`.

use crate::backend::{StorageBackend, TileRead};
use crate::codec::{Metatile, hash_path};
use anyhow::{Context, Result};
use renderd_core::{StatRecord, TileCoord};
use renderd_derive::context;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct FileBackend {
	root: PathBuf,
	n: u8,
}

impl FileBackend {
	#[must_use]
	pub fn new(root: impl Into<PathBuf>, n: u8) -> Self {
		FileBackend { root: root.into(), n }
	}

	fn metatile_path(&self, style: &str, options: &str, coord: TileCoord) -> PathBuf {
		hash_path(&self.root, style, options, coord.aligned(self.n))
	}

	fn expired_marker(path: &Path) -> PathBuf {
		let mut s = path.as_os_str().to_owned();
		s.push(".expired");
		PathBuf::from(s)
	}
}

impl StorageBackend for FileBackend {
	fn read(&self, style: &str, options: &str, coord: TileCoord) -> Result<Option<TileRead>> {
		let path = self.metatile_path(style, options, coord);
		let bytes = match fs::read(&path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e).with_context(|| format!("reading metatile {}", path.display())),
		};
		let metatile = Metatile::decode(&bytes, self.n)?;
		Ok(metatile.get(coord.x, coord.y).map(|tile| TileRead {
			bytes: tile.to_vec(),
			compressed: metatile.compressed,
		}))
	}

	#[context("statting tile {} for style {style}", coord.z)]
	fn stat(&self, style: &str, options: &str, coord: TileCoord) -> Result<StatRecord> {
		let path = self.metatile_path(style, options, coord);
		let meta = match fs::metadata(&path) {
			Ok(meta) => meta,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StatRecord::missing()),
			Err(e) => return Err(e).with_context(|| format!("statting metatile {}", path.display())),
		};

		let expired = Self::expired_marker(&path).exists();
		Ok(StatRecord {
			size: i64::try_from(meta.len()).unwrap_or(i64::MAX),
			mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
			atime: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
			ctime: meta.created().unwrap_or(SystemTime::UNIX_EPOCH),
			expired,
		})
	}

	#[context("writing metatile for style {style} at z={}", metatile.origin.z)]
	fn write_metatile(&self, style: &str, options: &str, metatile: &Metatile) -> Result<()> {
		let path = self.metatile_path(style, options, metatile.origin);
		if let Some(parent) = path.parent() {
			mkdirp(parent)?;
		}
		let bytes = metatile.encode()?;

		let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
		fs::write(&tmp_path, &bytes).with_context(|| format!("writing temp metatile {}", tmp_path.display()))?;
		fs::rename(&tmp_path, &path).with_context(|| format!("renaming temp metatile into {}", path.display()))?;

		// A fresh render supersedes any stale-marker from a prior expiry.
		let _ = fs::remove_file(Self::expired_marker(&path));
		Ok(())
	}

	fn delete_metatile(&self, style: &str, coord: TileCoord) -> Result<()> {
		let path = self.metatile_path(style, "", coord);
		match fs::remove_file(&path) {
			Ok(()) => {}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(e).with_context(|| format!("deleting metatile {}", path.display())),
		}
		let _ = fs::remove_file(Self::expired_marker(&path));
		Ok(())
	}

	fn expire_metatile(&self, style: &str, coord: TileCoord) -> Result<()> {
		let path = self.metatile_path(style, "", coord);
		fs::write(Self::expired_marker(&path), []).with_context(|| format!("marking {} expired", path.display()))
	}
}

/// Creates `path` and all missing ancestors, tolerating concurrent creation
/// by a sibling worker (`already exists` is not an error).
fn mkdirp(path: &Path) -> Result<()> {
	match fs::create_dir_all(path) {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
		Err(e) => Err(e).with_context(|| format!("creating directory {}", path.display())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn coord(z: u8, x: u32, y: u32) -> TileCoord {
		TileCoord::new(z, x, y).unwrap()
	}

	#[test]
	fn write_then_read_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let backend = FileBackend::new(dir.path(), 8);
		let origin = coord(10, 96, 200);
		let mut mt = Metatile::new(8, origin);
		mt.set(96, 200, vec![1, 2, 3]);
		backend.write_metatile("default", "", &mt).unwrap();

		let read = backend.read("default", "", coord(10, 96, 200)).unwrap().unwrap();
		assert_eq!(read.bytes, vec![1, 2, 3]);
	}

	#[test]
	fn missing_tile_reads_as_none() {
		let dir = tempfile::tempdir().unwrap();
		let backend = FileBackend::new(dir.path(), 8);
		assert!(backend.read("default", "", coord(3, 0, 0)).unwrap().is_none());
	}

	#[test]
	fn stat_reports_missing_as_negative_size() {
		let dir = tempfile::tempdir().unwrap();
		let backend = FileBackend::new(dir.path(), 8);
		let stat = backend.stat("default", "", coord(3, 0, 0)).unwrap();
		assert_eq!(stat.size, -1);
		assert!(!stat.expired);
	}

	#[test]
	fn expire_sets_flag_without_touching_mtime() {
		let dir = tempfile::tempdir().unwrap();
		let backend = FileBackend::new(dir.path(), 8);
		let origin = coord(10, 0, 0);
		let mt = Metatile::new(8, origin);
		backend.write_metatile("default", "", &mt).unwrap();

		let before = backend.stat("default", "", origin).unwrap();
		assert!(!before.expired);

		backend.expire_metatile("default", origin).unwrap();
		let after = backend.stat("default", "", origin).unwrap();
		assert!(after.expired);
		assert_eq!(after.mtime, before.mtime);
	}

	#[test]
	fn delete_removes_metatile_and_marker() {
		let dir = tempfile::tempdir().unwrap();
		let backend = FileBackend::new(dir.path(), 8);
		let origin = coord(10, 0, 0);
		let mt = Metatile::new(8, origin);
		backend.write_metatile("default", "", &mt).unwrap();
		backend.expire_metatile("default", origin).unwrap();

		backend.delete_metatile("default", origin).unwrap();
		assert_eq!(backend.stat("default", "", origin).unwrap().size, -1);
	}
}
