//! Read-only compositing backend (`composite:{primary}{secondary}` URIs):
//! alpha-blends a primary and secondary backend's tiles in-memory.
//!
//! The blend always happens at a fixed 256x256 tile size regardless of the
//! backends' own metatile geometry, so callers must not rely on this
//! backend for metatile-shaped output.

use crate::backend::{StorageBackend, TileRead};
use crate::codec::Metatile;
use anyhow::{Result, bail};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use renderd_core::{StatRecord, TileCoord};
use std::io::Cursor;

const TILE_SIZE: u32 = 256;

pub struct CompositeBackend {
	primary: Box<dyn StorageBackend>,
	secondary: Box<dyn StorageBackend>,
}

impl CompositeBackend {
	#[must_use]
	pub fn new(primary: Box<dyn StorageBackend>, secondary: Box<dyn StorageBackend>) -> Self {
		CompositeBackend { primary, secondary }
	}

	fn decode(bytes: &[u8]) -> Result<RgbaImage> {
		let img = image::load_from_memory(bytes)?;
		Ok(img.to_rgba8())
	}

	fn blend(primary: &[u8], secondary: &[u8]) -> Result<Vec<u8>> {
		let bottom = Self::decode(primary)?;
		let top = Self::decode(secondary)?;

		let mut out = RgbaImage::new(TILE_SIZE, TILE_SIZE);
		for y in 0..TILE_SIZE {
			for x in 0..TILE_SIZE {
				let b = sample(&bottom, x, y);
				let t = sample(&top, x, y);
				out.put_pixel(x, y, alpha_over(b, t));
			}
		}

		let mut buf = Cursor::new(Vec::new());
		DynamicImage::ImageRgba8(out).write_to(&mut buf, ImageFormat::Png)?;
		Ok(buf.into_inner())
	}
}

fn sample(img: &RgbaImage, x: u32, y: u32) -> Rgba<u8> {
	if x < img.width() && y < img.height() {
		*img.get_pixel(x, y)
	} else {
		Rgba([0, 0, 0, 0])
	}
}

/// "source over" compositing: `top` painted above `bottom`.
fn alpha_over(bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
	let ta = f32::from(top[3]) / 255.0;
	let ba = f32::from(bottom[3]) / 255.0;
	let out_a = ta + ba * (1.0 - ta);
	if out_a <= f32::EPSILON {
		return Rgba([0, 0, 0, 0]);
	}
	let mut out = [0u8; 4];
	for c in 0..3 {
		let tc = f32::from(top[c]) / 255.0;
		let bc = f32::from(bottom[c]) / 255.0;
		let blended = (tc * ta + bc * ba * (1.0 - ta)) / out_a;
		out[c] = (blended * 255.0).round().clamp(0.0, 255.0) as u8;
	}
	out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
	Rgba(out)
}

impl StorageBackend for CompositeBackend {
	fn read(&self, style: &str, options: &str, coord: TileCoord) -> Result<Option<TileRead>> {
		let primary = self.primary.read(style, options, coord)?;
		let secondary = self.secondary.read(style, options, coord)?;
		let composed = match (primary, secondary) {
			(Some(p), Some(s)) => Self::blend(&p.bytes, &s.bytes)?,
			(Some(p), None) => p.bytes,
			(None, Some(s)) => s.bytes,
			(None, None) => return Ok(None),
		};
		Ok(Some(TileRead { bytes: composed, compressed: false }))
	}

	fn stat(&self, style: &str, options: &str, coord: TileCoord) -> Result<StatRecord> {
		let primary = self.primary.stat(style, options, coord)?;
		if !primary.is_missing() {
			return Ok(primary);
		}
		self.secondary.stat(style, options, coord)
	}

	fn write_metatile(&self, _style: &str, _options: &str, _metatile: &Metatile) -> Result<()> {
		bail!("composite backend is read-only")
	}

	fn delete_metatile(&self, _style: &str, _coord: TileCoord) -> Result<()> {
		bail!("composite backend is read-only")
	}

	fn expire_metatile(&self, _style: &str, _coord: TileCoord) -> Result<()> {
		bail!("composite backend is read-only")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::null::NullBackend;

	fn solid_png(r: u8, g: u8, b: u8, a: u8) -> Vec<u8> {
		let img = RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, Rgba([r, g, b, a]));
		let mut buf = Cursor::new(Vec::new());
		DynamicImage::ImageRgba8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
		buf.into_inner()
	}

	struct FixedBackend(Vec<u8>);
	impl StorageBackend for FixedBackend {
		fn read(&self, _style: &str, _options: &str, _coord: TileCoord) -> Result<Option<TileRead>> {
			Ok(Some(TileRead { bytes: self.0.clone(), compressed: false }))
		}
		fn stat(&self, _style: &str, _options: &str, _coord: TileCoord) -> Result<StatRecord> {
			Ok(StatRecord { size: self.0.len() as i64, ..StatRecord::missing() })
		}
		fn write_metatile(&self, _: &str, _: &str, _: &Metatile) -> Result<()> {
			bail!("read-only")
		}
		fn delete_metatile(&self, _: &str, _: TileCoord) -> Result<()> {
			bail!("read-only")
		}
		fn expire_metatile(&self, _: &str, _: TileCoord) -> Result<()> {
			bail!("read-only")
		}
	}

	#[test]
	fn opaque_top_fully_replaces_bottom() {
		let backend = CompositeBackend::new(
			Box::new(FixedBackend(solid_png(255, 0, 0, 255))),
			Box::new(FixedBackend(solid_png(0, 255, 0, 255))),
		);
		let coord = TileCoord::new(1, 0, 0).unwrap();
		let tile = backend.read("s", "", coord).unwrap().unwrap();
		let decoded = CompositeBackend::decode(&tile.bytes).unwrap();
		assert_eq!(*decoded.get_pixel(0, 0), Rgba([0, 255, 0, 255]));
	}

	#[test]
	fn missing_both_layers_is_missing() {
		let backend = CompositeBackend::new(Box::new(NullBackend), Box::new(NullBackend));
		let coord = TileCoord::new(1, 0, 0).unwrap();
		assert!(backend.read("s", "", coord).unwrap().is_none());
	}

	#[test]
	fn write_is_rejected() {
		let backend = CompositeBackend::new(Box::new(NullBackend), Box::new(NullBackend));
		let origin = TileCoord::new(1, 0, 0).unwrap();
		assert!(backend.write_metatile("s", "", &Metatile::new(8, origin)).is_err());
	}
}
