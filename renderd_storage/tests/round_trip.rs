//! Integration tests for the storage backend factory and the invariants
//! that should hold for the storage layer as a whole.

use renderd_core::TileCoord;
use renderd_storage::open;
use renderd_storage::{Metatile, hash_path, parse_hash_path};

fn coord(z: u8, x: u32, y: u32) -> TileCoord {
	TileCoord::new(z, x, y).unwrap()
}

#[test]
fn file_backend_round_trips_through_the_dispatcher() {
	let dir = tempfile::tempdir().unwrap();
	let backend = open(&format!("file://{}", dir.path().display()), 8).unwrap();

	let origin = coord(9, 8, 8);
	let mut mt = Metatile::new(8, origin);
	mt.set(8, 8, vec![42]);
	backend.write_metatile("osm", "", &mt).unwrap();

	let tile = backend.read("osm", "", coord(9, 8, 8)).unwrap().unwrap();
	assert_eq!(tile.bytes, vec![42]);
}

#[test]
fn null_backend_round_trips_through_the_dispatcher() {
	let backend = open("null://", 8).unwrap();
	let origin = coord(3, 0, 0);
	backend.write_metatile("osm", "", &Metatile::new(8, origin)).unwrap();
	assert!(backend.read("osm", "", origin).unwrap().is_none());
}

/// Path round-trip through an aligned origin, for a spread of zoom levels
/// and coordinates, not just one fixed example.
#[test]
fn path_round_trips_for_a_range_of_coordinates() {
	let root = std::path::Path::new("/var/cache/renderd");
	for z in [0u8, 1, 5, 10, 18, 20] {
		let limit = 1u32 << z;
		for &(x, y) in &[(0u32, 0u32), (limit.saturating_sub(1), limit.saturating_sub(1)), (limit / 2, limit / 3)] {
			if x >= limit || y >= limit {
				continue;
			}
			let coord = TileCoord::new(z, x, y).unwrap();
			let aligned = coord.aligned(8);
			let path = hash_path(root, "osm", "", coord);
			let path_str = path.strip_prefix(root).unwrap().to_str().unwrap();
			let (style, parsed) = parse_hash_path(path_str).unwrap();
			assert_eq!(style, "osm");
			assert_eq!(parsed, aligned);
		}
	}
}

#[test]
fn composite_of_file_backends_round_trips_through_the_dispatcher() {
	let dir_a = tempfile::tempdir().unwrap();
	let dir_b = tempfile::tempdir().unwrap();
	let uri = format!(
		"composite:{{file://{}}}{{file://{}}}",
		dir_a.path().display(),
		dir_b.path().display()
	);
	let backend = open(&uri, 8).unwrap();

	// Primary (dir_a) is empty; secondary (dir_b) has a tile. Composite should
	// fall back to the secondary layer when the primary is missing.
	let secondary = open(&format!("file://{}", dir_b.path().display()), 8).unwrap();
	let origin = coord(6, 0, 0);
	let mut mt = Metatile::new(8, origin);
	mt.set(0, 0, make_1x1_png());
	secondary.write_metatile("osm", "", &mt).unwrap();

	assert!(backend.read("osm", "", origin).unwrap().is_some());
}

fn make_1x1_png() -> Vec<u8> {
	use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
	use std::io::Cursor;
	let img = RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 255]));
	let mut buf = Cursor::new(Vec::new());
	DynamicImage::ImageRgba8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
	buf.into_inner()
}
