//! Web Mercator tile coordinates and the metatile alignment/slot-index arithmetic
//! shared by the storage backends, the metatile codec and the serving frontend.

use anyhow::{Result, bail};
use renderd_derive::context;

/// Upper bound on zoom levels this deployment will ever serve or store.
///
/// Matches the original server's `MAX_ZOOM`; a configured `Zmax` may lower
/// this further but never raise it.
pub const MAX_ZOOM: u8 = 20;

/// A single tile address in the Web Mercator pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
	pub z: u8,
	pub x: u32,
	pub y: u32,
}

impl TileCoord {
	/// Builds a coordinate, validating `0 <= z <= MAX_ZOOM` and `0 <= x,y < 2^z`.
	#[context("validating tile coordinate z={z} x={x} y={y}")]
	pub fn new(z: u8, x: u32, y: u32) -> Result<Self> {
		if z > MAX_ZOOM {
			bail!("zoom {z} exceeds maximum of {MAX_ZOOM}");
		}
		let limit = 1u32 << z;
		if x >= limit || y >= limit {
			bail!("coordinate ({x}, {y}) out of range for zoom {z} (limit {limit})");
		}
		Ok(TileCoord { z, x, y })
	}

	/// Aligns `x`/`y` down to the nearest multiple of the metatile size `n`
	/// (a power of two), returning the metatile's origin coordinate.
	#[must_use]
	pub fn aligned(&self, n: u8) -> TileCoord {
		let mask = !(u32::from(n) - 1);
		TileCoord {
			z: self.z,
			x: self.x & mask,
			y: self.y & mask,
		}
	}

	/// Index of this tile's slot within its containing `n x n` metatile,
	/// using the format's `(xi & (n-1)) * n + (yi & (n-1))` formula.
	#[must_use]
	pub fn slot_index(&self, n: u8) -> usize {
		slot_index(self.x, self.y, n)
	}
}

/// Slot index of tile `(x, y)` within its `n x n` metatile. A bijection
/// `[0,n)^2 -> [0,n^2)` for any power-of-two `n`.
#[must_use]
pub fn slot_index(x: u32, y: u32, n: u8) -> usize {
	let mask = u32::from(n) - 1;
	(((x & mask) * u32::from(n)) + (y & mask)) as usize
}
