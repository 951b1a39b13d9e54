//! Render throughput benchmark, grounded in `render_speedtest.cpp`: submit
//! every tile in a bounding box at each zoom level, timing how long the
//! daemon takes to clear the whole batch before moving to the next zoom.

use anyhow::Result;
use clap::Parser;
use renderd_core::{Command, Style, TileCoord};
use renderd_tools::{bbox_to_tile_range, check_zoom_range, parse_or_exit, CommonArgs, Counters, DaemonAddr, QueueItem, SubmitQueue};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bounding box: central London, matching the original's
/// hardcoded `boundx0/boundy0/boundx1/boundy1`.
const DEFAULT_MIN_LON: f64 = -0.5;
const DEFAULT_MIN_LAT: f64 = 51.25;
const DEFAULT_MAX_LON: f64 = 0.5;
const DEFAULT_MAX_LAT: f64 = 51.75;

#[derive(Parser, Debug)]
#[command(name = "render_speedtest", version, about = "Benchmark render throughput over a bounding box")]
struct Args {
	#[command(flatten)]
	common: CommonArgs,

	#[arg(long, default_value_t = DEFAULT_MIN_LON)]
	min_lon: f64,
	#[arg(long, default_value_t = DEFAULT_MIN_LAT)]
	min_lat: f64,
	#[arg(long, default_value_t = DEFAULT_MAX_LON)]
	max_lon: f64,
	#[arg(long, default_value_t = DEFAULT_MAX_LAT)]
	max_lat: f64,
}

fn main() -> Result<()> {
	env_logger::init();
	let args: Args = parse_or_exit();
	if let Err(e) = run(args) {
		eprintln!("render_speedtest: {e:#}");
		std::process::exit(1);
	}
	Ok(())
}

fn run(args: Args) -> Result<()> {
	let (min_zoom, max_zoom) = check_zoom_range(args.common.min_zoom, args.common.max_zoom)?;
	let style = Style::new(args.common.map.clone())?;

	let queue = SubmitQueue::new();
	let counters = Arc::new(Counters::default());
	let addr = DaemonAddr::parse(&args.common.socket);
	let workers = queue.spawn_workers(args.common.num_threads, addr, args.common.max_load, counters.clone());

	log::info!("Initial startup costs");
	let warmup_start = Instant::now();
	submit_and_wait(&queue, &counters, std::iter::once(TileCoord::new(0, 0, 0)?), &style);
	log::info!("1 in {:.2}s ({:.2}/s)", warmup_start.elapsed().as_secs_f64(), 1.0 / warmup_start.elapsed().as_secs_f64().max(f64::EPSILON));

	let overall_start = Instant::now();
	let mut total_tiles: u64 = 0;
	for z in min_zoom..=max_zoom {
		let (xmin, ymin, xmax, ymax) = bbox_to_tile_range(z, args.min_lon, args.min_lat, args.max_lon, args.max_lat);
		let num = u64::from(xmax - xmin + 1) * u64::from(ymax - ymin + 1);
		total_tiles += num;
		log::info!("zoom {z}: rendering {num} tiles");

		let zoom_start = Instant::now();
		let coords = (xmin..=xmax).flat_map(move |x| (ymin..=ymax).map(move |y| TileCoord::new(z, x, y)));
		let coords: Vec<_> = coords.collect::<Result<Vec<_>, _>>()?;
		submit_and_wait(&queue, &counters, coords.into_iter(), &style);

		let elapsed = zoom_start.elapsed().as_secs_f64().max(f64::EPSILON);
		log::info!("{num} in {elapsed:.2}s ({:.2}/s)", num as f64 / elapsed);
	}

	queue.close();
	for handle in workers {
		let _ = handle.join();
	}

	let elapsed = overall_start.elapsed().as_secs_f64().max(f64::EPSILON);
	log::info!("Total for all tiles rendered");
	log::info!("{total_tiles} in {elapsed:.2}s ({:.2}/s)", total_tiles as f64 / elapsed);
	Ok(())
}

/// Enqueues every coordinate in `coords`, then blocks the caller until the
/// workers have processed as many items as were just submitted (mirrors
/// `wait_for_empty_queue`'s per-batch synchronization).
fn submit_and_wait(queue: &Arc<SubmitQueue>, counters: &Arc<Counters>, coords: impl Iterator<Item = TileCoord>, style: &Style) {
	let already_done = counters.rendered.load(Ordering::Relaxed) + counters.failed.load(Ordering::Relaxed);
	let mut submitted = 0u64;
	for coord in coords {
		queue.enqueue(QueueItem { style: style.clone(), coord, cmd: Command::Render });
		submitted += 1;
	}
	while counters.rendered.load(Ordering::Relaxed) + counters.failed.load(Ordering::Relaxed) < already_done + submitted {
		std::thread::sleep(Duration::from_millis(20));
	}
}
