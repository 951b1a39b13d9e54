//! The renderer collaborator boundary (spec §1: Mapnik itself is explicitly
//! out of scope — this crate renders *around* it). `RenderEngine` is the seam
//! a real Mapnik binding would be plugged into; `MockEngine` stands in for
//! tests and for development without a renderer installed.

use anyhow::Result;
use renderd_core::TileCoord;
use renderd_derive::context;
use renderd_storage::Metatile;
use std::time::Duration;

/// Produces a fully-populated metatile for `origin`'s NxN block.
///
/// Implementations should treat `style`/`options` as opaque identifiers
/// (spec §3: the daemon never interprets their contents, only threads them
/// through to the renderer and the storage path).
pub trait RenderEngine: Send + Sync {
	fn render(&self, style: &str, options: &str, origin: TileCoord, n: u8) -> Result<Metatile>;
}

/// A deterministic stand-in renderer: emits a distinct byte per tile so
/// tests can assert on *which* tiles were produced without depending on any
/// actual map styling.
pub struct MockEngine {
	pub delay: Duration,
	pub fail_style: Option<String>,
}

impl Default for MockEngine {
	fn default() -> Self {
		MockEngine {
			delay: Duration::ZERO,
			fail_style: None,
		}
	}
}

impl MockEngine {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn failing_for(style: impl Into<String>) -> Self {
		MockEngine {
			fail_style: Some(style.into()),
			..Self::default()
		}
	}
}

impl RenderEngine for MockEngine {
	#[context("mock-rendering style '{style}' at {origin:?}")]
	fn render(&self, style: &str, options: &str, origin: TileCoord, n: u8) -> Result<Metatile> {
		if self.fail_style.as_deref() == Some(style) {
			anyhow::bail!("configured to fail for style '{style}'");
		}
		if !self.delay.is_zero() {
			std::thread::sleep(self.delay);
		}

		let mut metatile = Metatile::new(n, origin);
		let slots = usize::from(n) * usize::from(n);
		for slot in 0..slots {
			let payload = format!("{style}:{options}:{origin:?}:{slot}").into_bytes();
			metatile.tiles[slot] = Some(payload);
		}
		Ok(metatile)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mock_engine_fills_every_slot() {
		let engine = MockEngine::new();
		let origin = TileCoord::new(5, 0, 0).unwrap();
		let metatile = engine.render("osm", "", origin, 8).unwrap();
		for slot in 0..64 {
			assert!(metatile.tiles[slot].is_some());
		}
	}

	#[test]
	fn mock_engine_can_be_configured_to_fail_a_style() {
		let engine = MockEngine::failing_for("broken");
		let origin = TileCoord::new(5, 0, 0).unwrap();
		assert!(engine.render("broken", "", origin, 8).is_err());
		assert!(engine.render("osm", "", origin, 8).is_ok());
	}
}
