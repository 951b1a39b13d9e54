//! Offline bulk render submission (spec §1/§6.5), grounded in
//! `render_list.c`: either walks a zoom/coordinate range end to end
//! (`--all`), or reads `X Y Z` triples from stdin, skipping anything whose
//! stored metatile already looks current unless `--force` is given.

use anyhow::Result;
use clap::Parser;
use renderd_core::{Command, Style, TileCoord};
use renderd_tools::{check_zoom_range, parse_or_exit, CommonArgs, Counters, DaemonAddr, QueueItem, SubmitQueue};
use renderd_storage::StorageBackend;
use std::io::BufRead;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Tiles are rendered in whole metatile blocks; the original's `METATILE`.
const METATILE: u32 = 8;

#[derive(Parser, Debug)]
#[command(name = "render_list", version, about = "Submit a range or list of tiles for rendering")]
struct Args {
	#[command(flatten)]
	common: CommonArgs,

	/// Walk the full zoom/coordinate range instead of reading stdin.
	#[arg(short = 'a', long)]
	all: bool,
	/// Render tiles even if storage already reports them current.
	#[arg(short = 'f', long)]
	force: bool,

	#[arg(long)]
	min_x: Option<u32>,
	#[arg(long)]
	max_x: Option<u32>,
	#[arg(long)]
	min_y: Option<u32>,
	#[arg(long)]
	max_y: Option<u32>,

	#[arg(long)]
	min_lon: Option<f64>,
	#[arg(long)]
	max_lon: Option<f64>,
	#[arg(long)]
	min_lat: Option<f64>,
	#[arg(long)]
	max_lat: Option<f64>,
}

fn main() -> Result<()> {
	env_logger::init();
	let args: Args = parse_or_exit();
	if let Err(e) = run(args) {
		eprintln!("render_list: {e:#}");
		std::process::exit(1);
	}
	Ok(())
}

fn run(args: Args) -> Result<()> {
	let (min_zoom, max_zoom) = check_zoom_range(args.common.min_zoom, args.common.max_zoom)?;
	let style = Style::new(args.common.map.clone())?;

	let has_xy_bounds = args.min_x.is_some() || args.max_x.is_some() || args.min_y.is_some() || args.max_y.is_some();
	let has_latlon_bounds = args.min_lon.is_some() || args.max_lon.is_some() || args.min_lat.is_some() || args.max_lat.is_some();
	anyhow::ensure!(!(has_xy_bounds && has_latlon_bounds), "--min-x/--max-x/--min-y/--max-y and --min-lon/--max-lat/... are mutually exclusive");
	if has_xy_bounds && min_zoom != max_zoom {
		anyhow::bail!("--min-zoom must equal --max-zoom when using --min-x/--max-x/--min-y/--max-y");
	}

	let storage = renderd_storage::open(&args.common.tile_dir, METATILE as u8)?;
	let queue = SubmitQueue::new();
	let counters = Arc::new(Counters::default());
	let addr = DaemonAddr::parse(&args.common.socket);
	let workers = queue.spawn_workers(args.common.num_threads, addr, args.common.max_load, counters.clone());

	let start = Instant::now();
	let mut total_seen: u64 = 0;

	if args.all {
		total_seen = submit_all_in_range(&args, &queue, &*storage, &style, min_zoom, max_zoom)?;
	} else {
		total_seen = submit_from_stdin(&args, &queue, &*storage, &style, min_zoom, max_zoom)?;
	}

	queue.close();
	for handle in workers {
		let _ = handle.join();
	}

	let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
	let rendered = counters.rendered.load(Ordering::Relaxed);
	let failed = counters.failed.load(Ordering::Relaxed);
	log::info!(
		"metatiles rendered: {rendered} ({:.2}/s), failed: {failed}, tiles seen: {total_seen} ({:.2}/s), elapsed {elapsed:.2}s",
		rendered as f64 / elapsed,
		total_seen as f64 / elapsed,
	);
	Ok(())
}

fn submit_all_in_range(args: &Args, queue: &Arc<SubmitQueue>, storage: &dyn StorageBackend, style: &Style, min_zoom: u8, max_zoom: u8) -> Result<u64> {
	let mut total = 0u64;
	for z in min_zoom..=max_zoom {
		let zoom_limit = (1u32 << z).saturating_sub(1);

		let (min_x, min_y, max_x, max_y) = if let (Some(min_lon), Some(max_lon), Some(min_lat), Some(max_lat)) =
			(args.min_lon, args.max_lon, args.min_lat, args.max_lat)
		{
			renderd_tools::bbox_to_tile_range(z, min_lon, min_lat, max_lon, max_lat)
		} else {
			(args.min_x.unwrap_or(0), args.min_y.unwrap_or(0), args.max_x.unwrap_or(zoom_limit), args.max_y.unwrap_or(zoom_limit))
		};
		anyhow::ensure!(min_x <= zoom_limit && min_y <= zoom_limit && max_x <= zoom_limit && max_y <= zoom_limit, "tile range out of bounds for zoom {z} (limit {zoom_limit})");

		log::info!("rendering all tiles for zoom {z} from ({min_x}, {min_y}) to ({max_x}, {max_y})");
		let mut x = min_x;
		while x <= max_x {
			let mut y = min_y;
			while y <= max_y {
				total += 1;
				let coord = TileCoord::new(z, x, y)?;
				if args.force || storage.stat(style.as_str(), "", coord)?.classify(std::time::SystemTime::now(), std::time::Duration::from_secs(0)) != renderd_core::TileState::Current {
					queue.enqueue(QueueItem { style: style.clone(), coord, cmd: Command::RenderBulk });
				}
				y += METATILE;
			}
			x += METATILE;
		}
	}
	Ok(total)
}

fn submit_from_stdin(args: &Args, queue: &Arc<SubmitQueue>, storage: &dyn StorageBackend, style: &Style, min_zoom: u8, max_zoom: u8) -> Result<u64> {
	let stdin = std::io::stdin();
	let mut total = 0u64;
	for line in stdin.lock().lines() {
		let Ok(line) = line else { continue };
		let mut parts = line.split_whitespace();
		let (Some(x), Some(y), Some(z)) = (parts.next(), parts.next(), parts.next()) else {
			if args.common.verbose {
				log::warn!("bad line: {line}");
			}
			continue;
		};
		let (Ok(x), Ok(y), Ok(z)) = (x.parse::<u32>(), y.parse::<u32>(), z.parse::<u8>()) else {
			if args.common.verbose {
				log::warn!("bad line: {line}");
			}
			continue;
		};
		if z < min_zoom || z > max_zoom {
			log::info!("ignoring tile, zoom {z} outside valid range ({min_zoom}..{max_zoom})");
			continue;
		}
		let Ok(coord) = TileCoord::new(z, x, y) else {
			log::warn!("ignoring out-of-range tile x={x} y={y} z={z}");
			continue;
		};
		total += 1;
		if args.force || storage.stat(style.as_str(), "", coord)?.classify(std::time::SystemTime::now(), std::time::Duration::from_secs(0)) != renderd_core::TileState::Current {
			queue.enqueue(QueueItem { style: style.clone(), coord, cmd: Command::RenderBulk });
		} else if args.common.verbose {
			log::info!("tile {x}/{y}/{z} is clean, ignoring");
		}
	}
	Ok(total)
}
