//! Directory-hashed storage paths, grounded directly in `store_file_utils.c`'s
//! `xyz_to_path`/`path_to_xyz`: five hash bytes interleave the low nibbles of
//! `x` and `y`, clustering a 16x16 tile square per leaf directory while
//! capping directory fan-out.

use anyhow::{Result, bail, ensure};
use renderd_core::{MAX_ZOOM, TileCoord};
use std::path::PathBuf;

/// Builds `<root>/<style>/<z>/<h4>/<h3>/<h2>/<h1>/<h0>.meta[.<options>]` for
/// the metatile whose origin is `(x, y, z)`. Callers must pass an
/// already-aligned origin (see [`TileCoord::aligned`]) — every tile in a
/// metatile shares one file, so hashing an unaligned coordinate would
/// scatter tiles from the same block across different paths.
#[must_use]
pub fn hash_path(root: &std::path::Path, style: &str, options: &str, coord: TileCoord) -> PathBuf {
	let mut x = coord.x;
	let mut y = coord.y;
	let mut hash = [0u8; 5];
	for slot in &mut hash {
		*slot = (((x & 0xf) << 4) | (y & 0xf)) as u8;
		x >>= 4;
		y >>= 4;
	}

	let mut path = root.join(style).join(coord.z.to_string());
	for h in hash.iter().skip(1).rev() {
		path = path.join(h.to_string());
	}

	let filename = if options.is_empty() {
		format!("{}.meta", hash[0])
	} else {
		format!("{}.{}.meta", hash[0], options)
	};
	path.join(filename)
}

/// The inverse of [`hash_path`]: recovers `(style, z, x, y)` from a path
/// string, validating the hash bytes and the resulting coordinate range.
pub fn parse_hash_path(path: &str) -> Result<(String, TileCoord)> {
	let trimmed = path.trim_start_matches('/');
	let parts: Vec<&str> = trimmed.split('/').collect();
	ensure!(parts.len() >= 7, "path too short to be a metatile path: {path}");

	let n = parts.len();
	let filename = parts[n - 1];
	let stem = filename
		.strip_suffix(".meta")
		.ok_or_else(|| anyhow::anyhow!("expected a '.meta' file, got {filename}"))?;
	// stem is either "<h0>" or "<h0>.<options>"; only the leading hash byte matters here.
	let h0_str = stem.split('.').next().unwrap_or(stem);

	let h: [&str; 5] = [h0_str, parts[n - 2], parts[n - 3], parts[n - 4], parts[n - 5]];
	let z_str = parts[n - 6];
	let style = parts[..n - 6].join("/");

	let z: u8 = z_str.parse().map_err(|_| anyhow::anyhow!("bad zoom component '{z_str}'"))?;
	ensure!(z <= MAX_ZOOM, "zoom {z} exceeds maximum of {MAX_ZOOM}");

	let mut hash = [0u8; 5];
	for (i, s) in h.iter().enumerate() {
		let v: u32 = s.parse().map_err(|_| anyhow::anyhow!("bad hash byte '{s}'"))?;
		ensure!(v <= 255, "hash byte {v} out of range");
		hash[i] = v as u8;
	}

	let mut x: u32 = 0;
	let mut y: u32 = 0;
	for h in hash.iter().rev() {
		x = (x << 4) | u32::from(h >> 4);
		y = (y << 4) | u32::from(h & 0xf);
	}

	let coord = TileCoord::new(z, x, y)?;
	if style.is_empty() {
		bail!("path is missing a style component: {path}");
	}
	Ok((style, coord))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::Path;

	#[test]
	fn path_round_trips_to_aligned_origin() {
		let root = Path::new("/var/cache/renderd/tiles");
		let coord = TileCoord::new(12, 1234, 5678).unwrap();
		let path = hash_path(root, "default", "", coord);
		let path_str = path.strip_prefix(root).unwrap().to_str().unwrap();
		let (style, parsed) = parse_hash_path(path_str).unwrap();
		assert_eq!(style, "default");
		assert_eq!(parsed, coord);
	}

	#[test]
	fn embeds_options_suffix() {
		let root = Path::new("/tiles");
		let coord = TileCoord::new(5, 3, 4).unwrap();
		let path = hash_path(root, "bright", "grey", coord);
		assert!(path.to_str().unwrap().ends_with(".grey.meta"));
	}

	#[test]
	fn rejects_truncated_path() {
		assert!(parse_hash_path("default/5/1/2.meta").is_err());
	}

	#[test]
	fn rejects_zoom_above_max() {
		let path = format!("default/{}/0/0/0/0/0.meta", MAX_ZOOM as u32 + 1);
		assert!(parse_hash_path(&path).is_err());
	}
}
