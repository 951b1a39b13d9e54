//! Web Mercator lon/lat <-> tile conversion, grounded in
//! `render_speedtest.cpp`'s `GoogleProjection`: used by `render_list --all`'s
//! `--min-lon/--max-lon/--min-lat/--max-lat` form and by `render_speedtest`'s
//! benchmark bounding box.

use std::f64::consts::PI;

/// Tile column/row containing `(lon, lat)` at zoom `z`, clamping latitude to
/// the Mercator projection's valid range (±85.0511°) rather than producing
/// an out-of-range tile index.
#[must_use]
pub fn lonlat_to_tile(z: u8, lon: f64, lat: f64) -> (u32, u32) {
	let lat = lat.clamp(-85.051_13, 85.051_13);
	let n = f64::from(1u32 << z);
	let x = (lon + 180.0) / 360.0 * n;
	let lat_rad = lat * PI / 180.0;
	let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
	(x.floor().clamp(0.0, n - 1.0) as u32, y.floor().clamp(0.0, n - 1.0) as u32)
}

/// A lon/lat bounding box converted to an inclusive tile-coordinate box at
/// zoom `z`, normalizing `min <= max` on both axes (a swapped bbox such as
/// `min_lat > max_lat` is corrected rather than rejected, matching how tile
/// y increases southward while latitude increases northward).
#[must_use]
pub fn bbox_to_tile_range(z: u8, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> (u32, u32, u32, u32) {
	let (x0, y0) = lonlat_to_tile(z, min_lon, max_lat);
	let (x1, y1) = lonlat_to_tile(z, max_lon, min_lat);
	(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
}
