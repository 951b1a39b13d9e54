//! Binary layout and encode/decode of a metatile: an `n x n` block of tiles
//! stored together with a small index table, grounded in `metatile.h`'s
//! `meta_layout`/`entry` structs.
//!
//! ```text
//! magic[4]            "META" or "METZ"
//! count: i32          n * n
//! x, y, z: i32        aligned origin of the block
//! index[count]        { offset: i32, size: i32 }, absolute within the file
//! payloads            tile bytes, concatenated in encounter order
//! ```

use anyhow::{Result, bail, ensure};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use renderd_core::TileCoord;
use renderd_derive::context;
use std::io::{Cursor, Read, Write};

pub const MAGIC_UNCOMPRESSED: [u8; 4] = *b"META";
pub const MAGIC_COMPRESSED: [u8; 4] = *b"METZ";

/// Size in bytes of the fixed header preceding the index table.
const HEADER_LEN: usize = 16;
/// Size in bytes of one `{offset, size}` index entry.
const ENTRY_LEN: usize = 8;

/// An `n x n` block of tiles sharing one on-disk metatile file.
///
/// Slot `i` holds `Some(bytes)` for a rendered tile or `None` for a slot that
/// has not been rendered yet (emitted as a zero-length entry on disk, and
/// never surfaced to readers as "the tile is empty" — only as "missing").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metatile {
	pub n: u8,
	pub origin: TileCoord,
	pub tiles: Vec<Option<Vec<u8>>>,
	pub compressed: bool,
}

impl Metatile {
	#[must_use]
	pub fn new(n: u8, origin: TileCoord) -> Self {
		let count = usize::from(n) * usize::from(n);
		Metatile {
			n,
			origin,
			tiles: vec![None; count],
			compressed: false,
		}
	}

	/// Slot index of `(x, y)` within this metatile, per the format's
	/// `(xi & (n-1)) * n + (yi & (n-1))` rule.
	#[must_use]
	pub fn slot_for(&self, x: u32, y: u32) -> usize {
		renderd_core::slot_index(x, y, self.n)
	}

	pub fn set(&mut self, x: u32, y: u32, data: Vec<u8>) {
		let idx = self.slot_for(x, y);
		self.tiles[idx] = Some(data);
	}

	#[must_use]
	pub fn get(&self, x: u32, y: u32) -> Option<&[u8]> {
		self.tiles[self.slot_for(x, y)].as_deref()
	}

	/// Encodes the header + index + payload region, in the order the format requires.
	#[context("encoding metatile at z={} x={} y={}", self.origin.z, self.origin.x, self.origin.y)]
	pub fn encode(&self) -> Result<Vec<u8>> {
		let count = self.tiles.len();
		ensure!(count == usize::from(self.n) * usize::from(self.n), "tile count must be n^2");

		let header_len = HEADER_LEN + ENTRY_LEN * count;
		let mut entries = Vec::with_capacity(count);
		let mut payload = Vec::new();

		for slot in &self.tiles {
			let offset = i32::try_from(header_len + payload.len())?;
			let size = match slot {
				Some(bytes) => {
					payload.write_all(bytes)?;
					i32::try_from(bytes.len())?
				}
				None => 0,
			};
			entries.push((offset, size));
		}

		let mut out = Cursor::new(Vec::with_capacity(header_len + payload.len()));
		out.write_all(if self.compressed { &MAGIC_COMPRESSED } else { &MAGIC_UNCOMPRESSED })?;
		out.write_i32::<LittleEndian>(i32::try_from(count)?)?;
		out.write_i32::<LittleEndian>(i32::try_from(self.origin.x)?)?;
		out.write_i32::<LittleEndian>(i32::try_from(self.origin.y)?)?;
		out.write_i32::<LittleEndian>(i32::from(self.origin.z))?;
		for (offset, size) in entries {
			out.write_i32::<LittleEndian>(offset)?;
			out.write_i32::<LittleEndian>(size)?;
		}
		out.write_all(&payload)?;

		Ok(out.into_inner())
	}

	/// Validates the header and index table and returns the parsed metatile.
	#[context("decoding metatile")]
	pub fn decode(bytes: &[u8], n: u8) -> Result<Self> {
		let expected_count = usize::from(n) * usize::from(n);
		ensure!(bytes.len() >= HEADER_LEN, "metatile truncated before header");

		let mut cursor = Cursor::new(bytes);
		let mut magic = [0u8; 4];
		cursor.read_exact(&mut magic)?;
		let compressed = match magic {
			MAGIC_UNCOMPRESSED => false,
			MAGIC_COMPRESSED => true,
			_ => bail!("bad metatile magic {magic:?}"),
		};

		let count = cursor.read_i32::<LittleEndian>()?;
		ensure!(count >= 0, "negative tile count");
		let count = count as usize;
		ensure!(count == expected_count, "tile count {count} does not match n^2 ({expected_count})");

		let x = cursor.read_i32::<LittleEndian>()?;
		let y = cursor.read_i32::<LittleEndian>()?;
		let z = cursor.read_i32::<LittleEndian>()?;
		ensure!(x >= 0 && y >= 0 && (0..=255).contains(&z), "invalid metatile origin");
		let origin = TileCoord::new(z as u8, x as u32, y as u32)?;

		let index_len = count
			.checked_mul(ENTRY_LEN)
			.ok_or_else(|| anyhow::anyhow!("index size overflow"))?;
		let header_len = HEADER_LEN
			.checked_add(index_len)
			.ok_or_else(|| anyhow::anyhow!("header size overflow"))?;
		ensure!(bytes.len() >= header_len, "metatile truncated before index end");

		let mut entries = Vec::with_capacity(count);
		for _ in 0..count {
			let offset = cursor.read_i32::<LittleEndian>()?;
			let size = cursor.read_i32::<LittleEndian>()?;
			ensure!(offset >= 0 && size >= 0, "negative offset or size in metatile index");
			let offset = offset as usize;
			let size = size as usize;
			let end = offset.checked_add(size).ok_or_else(|| anyhow::anyhow!("index entry overflow"))?;
			ensure!(end <= bytes.len(), "index entry ({offset}, {size}) lies outside the file");
			entries.push((offset, size));
		}

		let tiles = entries
			.into_iter()
			.map(|(offset, size)| if size == 0 { None } else { Some(bytes[offset..offset + size].to_vec()) })
			.collect();

		Ok(Metatile {
			n,
			origin,
			tiles,
			compressed,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn origin(z: u8, x: u32, y: u32) -> TileCoord {
		TileCoord::new(z, x, y).unwrap()
	}

	#[test]
	fn round_trips_arbitrary_payloads() {
		let n = 8u8;
		let mut mt = Metatile::new(n, origin(10, 96, 200));
		for xi in 0..n {
			for yi in 0..n {
				let payload = vec![xi.wrapping_mul(17).wrapping_add(yi); 3];
				mt.set(u32::from(xi), u32::from(yi), payload);
			}
		}
		let bytes = mt.encode().unwrap();
		let decoded = Metatile::decode(&bytes, n).unwrap();
		assert_eq!(decoded, mt);
		for xi in 0..n {
			for yi in 0..n {
				assert_eq!(
					decoded.get(u32::from(xi), u32::from(yi)).unwrap(),
					mt.get(u32::from(xi), u32::from(yi)).unwrap()
				);
			}
		}
	}

	#[test]
	fn missing_slots_round_trip_as_none() {
		let n = 4u8;
		let mut mt = Metatile::new(n, origin(5, 0, 0));
		mt.set(1, 1, vec![1, 2, 3]);
		let bytes = mt.encode().unwrap();
		let decoded = Metatile::decode(&bytes, n).unwrap();
		assert!(decoded.get(0, 0).is_none());
		assert_eq!(decoded.get(1, 1).unwrap(), &[1, 2, 3]);
	}

	#[test]
	fn rejects_wrong_tile_count() {
		let mt = Metatile::new(8, origin(5, 0, 0));
		let bytes = mt.encode().unwrap();
		assert!(Metatile::decode(&bytes, 4).is_err());
	}

	#[test]
	fn rejects_bad_magic() {
		let mut bytes = Metatile::new(2, origin(5, 0, 0)).encode().unwrap();
		bytes[0] = b'X';
		assert!(Metatile::decode(&bytes, 2).is_err());
	}

	#[test]
	fn rejects_out_of_range_index_entry() {
		let mt = Metatile::new(2, origin(5, 0, 0));
		let mut bytes = mt.encode().unwrap();
		// Corrupt the first entry's size to point past the end of the file.
		let size_offset = HEADER_LEN + 4;
		let huge = 1_000_000i32.to_le_bytes();
		bytes[size_offset..size_offset + 4].copy_from_slice(&huge);
		assert!(Metatile::decode(&bytes, 2).is_err());
	}
}
