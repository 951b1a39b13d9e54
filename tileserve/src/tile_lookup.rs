//! Tile URL parsing: the inverse of
//! `renderd_storage::hash_path`'s *logical* addressing — turning a request
//! path into `(options, TileCoord)` plus an optional side-endpoint suffix.

use crate::config::TileLayerConfig;
use renderd_core::TileCoord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
	None,
	Status,
	Dirty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTileRequest {
	pub options: String,
	pub coord: TileCoord,
	pub suffix: Suffix,
}

/// Parses `[{options}/]z/x/y.{ext}[/status|/dirty]` against `layer`. Returns
/// `None` on any syntactic mismatch or an `(x, y, z)` outside the layer's
/// configured range — callers apply a fixed client-penalty delay and a
/// plain `404` in that case, never panicking on attacker-controlled input.
#[must_use]
pub fn parse(layer: &TileLayerConfig, rest: &str) -> Option<ParsedTileRequest> {
	let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

	let suffix = match segments.last().copied() {
		Some("status") => {
			segments.pop();
			Suffix::Status
		}
		Some("dirty") => {
			segments.pop();
			Suffix::Dirty
		}
		_ => Suffix::None,
	};

	let options = if layer.parameterized && segments.len() == 4 {
		segments.remove(0).to_string()
	} else {
		String::new()
	};

	if segments.len() != 3 {
		return None;
	}

	let z: u8 = segments[0].parse().ok()?;
	let x: u32 = segments[1].parse().ok()?;
	let (y_str, ext) = segments[2].rsplit_once('.')?;
	if ext != layer.file_extension {
		return None;
	}
	let y: u32 = y_str.parse().ok()?;

	if z < layer.minzoom || z > layer.maxzoom {
		return None;
	}
	let coord = TileCoord::new(z, x, y).ok()?;

	Some(ParsedTileRequest { options, coord, suffix })
}

#[cfg(test)]
mod tests {
	use super::*;

	fn layer() -> TileLayerConfig {
		TileLayerConfig {
			name: "osm".into(),
			base_uri: "/osm".into(),
			file_extension: "png".into(),
			mime_type: "image/png".into(),
			minzoom: 0,
			maxzoom: 18,
			aspect_x: 1,
			aspect_y: 1,
			parameterized: false,
			store_uri: "/tmp".into(),
			attribution: String::new(),
			description: String::new(),
			cors_policy: vec![],
			hostnames: vec![],
			cache_extended_duration: None,
			cache_duration_max: 3600,
			cache_duration_dirty: 15,
			very_old_threshold_secs: 3600,
			enable_dirty_url: true,
		}
	}

	#[test]
	fn parses_a_plain_tile_path() {
		let parsed = parse(&layer(), "5/3/4.png").unwrap();
		assert_eq!(parsed.coord, TileCoord::new(5, 3, 4).unwrap());
		assert_eq!(parsed.suffix, Suffix::None);
		assert!(parsed.options.is_empty());
	}

	#[test]
	fn parses_a_status_suffix() {
		let parsed = parse(&layer(), "5/3/4.png/status").unwrap();
		assert_eq!(parsed.suffix, Suffix::Status);
	}

	#[test]
	fn parses_a_dirty_suffix() {
		let parsed = parse(&layer(), "5/3/4.png/dirty").unwrap();
		assert_eq!(parsed.suffix, Suffix::Dirty);
	}

	#[test]
	fn rejects_wrong_extension() {
		assert!(parse(&layer(), "5/3/4.jpg").is_none());
	}

	#[test]
	fn rejects_out_of_range_zoom() {
		assert!(parse(&layer(), "99/3/4.png").is_none());
	}

	#[test]
	fn rejects_coordinates_outside_the_zoom_level() {
		assert!(parse(&layer(), "2/100/100.png").is_none());
	}

	#[test]
	fn parameterized_layer_accepts_a_leading_options_segment() {
		let mut l = layer();
		l.parameterized = true;
		let parsed = parse(&l, "grey/5/3/4.png").unwrap();
		assert_eq!(parsed.options, "grey");
	}

	#[test]
	fn garbage_input_is_rejected_not_panicked_on() {
		assert!(parse(&layer(), "").is_none());
		assert!(parse(&layer(), "../../etc/passwd").is_none());
	}
}
