//! Walk the on-disk metatile tree and resubmit anything older than a
//! "planet" timestamp file, grounded in `render_old.c`'s `descend`/
//! `get_planet_time`: recurse `tile_dir/map/z/...` looking for `.meta`
//! files, compare each one's mtime against the timestamp file's mtime.

use anyhow::{Context, Result};
use clap::Parser;
use renderd_core::Command;
use renderd_tools::{check_zoom_range, parse_or_exit, CommonArgs, Counters, DaemonAddr, QueueItem, SubmitQueue};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

/// Matches `PLANET_TIMESTAMP`: the file whose mtime marks how far back a
/// rendered tile is allowed to lag before it's considered stale.
const PLANET_TIMESTAMP_FILE: &str = "planet-import-complete";

#[derive(Parser, Debug)]
#[command(name = "render_old", version, about = "Resubmit metatiles older than the last planet import")]
struct Args {
	#[command(flatten)]
	common: CommonArgs,
}

fn main() -> Result<()> {
	env_logger::init();
	let args: Args = parse_or_exit();
	if let Err(e) = run(args) {
		eprintln!("render_old: {e:#}");
		std::process::exit(1);
	}
	Ok(())
}

fn run(args: Args) -> Result<()> {
	let (min_zoom, max_zoom) = check_zoom_range(args.common.min_zoom, args.common.max_zoom)?;

	let planet_time = planet_timestamp(&args.common.tile_dir)?;
	log::info!("treating metatiles older than {planet_time:?} as stale");

	let queue = SubmitQueue::new();
	let counters = Arc::new(Counters::default());
	let addr = DaemonAddr::parse(&args.common.socket);
	let workers = queue.spawn_workers(args.common.num_threads, addr, args.common.max_load, counters.clone());

	let tile_dir = Path::new(&args.common.tile_dir);
	let start = Instant::now();
	let mut num_all: u64 = 0;
	let mut num_stale: u64 = 0;
	for z in min_zoom..=max_zoom {
		if args.common.verbose {
			log::info!("descending zoom {z}");
		}
		let search = tile_dir.join(&args.common.map).join(z.to_string());
		descend(tile_dir, &search, planet_time, &queue, &mut num_all, &mut num_stale)?;
	}

	queue.close();
	for handle in workers {
		let _ = handle.join();
	}

	let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
	let rendered = counters.rendered.load(Ordering::Relaxed);
	log::info!(
		"rendered {rendered} stale metatiles ({:.2}/s) out of {num_all} seen, {num_stale} were stale, elapsed {elapsed:.2}s",
		rendered as f64 / elapsed,
	);
	Ok(())
}

/// Reads the planet timestamp file's mtime, defaulting to three days ago
/// when the file is absent (matches the original's "make something up"
/// fallback rather than refusing to run).
fn planet_timestamp(tile_dir: &str) -> Result<SystemTime> {
	let path = Path::new(tile_dir).join(PLANET_TIMESTAMP_FILE);
	match std::fs::metadata(&path) {
		Ok(meta) => meta.modified().context("reading planet timestamp file mtime"),
		Err(_) => {
			log::info!("planet timestamp file ({}) is missing, assuming 3 days old", path.display());
			Ok(SystemTime::now() - std::time::Duration::from_secs(3 * 24 * 60 * 60))
		}
	}
}

/// Recurses into `dir` looking for `*.meta` files, enqueuing any whose mtime
/// predates `planet_time`. `tile_dir` is the storage root; a found file's
/// path relative to it is exactly the string [`renderd_storage::parse_hash_path`]
/// expects (`style/z/h4/h3/h2/h1/h0.meta`).
fn descend(tile_dir: &Path, dir: &Path, planet_time: SystemTime, queue: &Arc<SubmitQueue>, num_all: &mut u64, num_stale: &mut u64) -> Result<()> {
	let entries = match std::fs::read_dir(dir) {
		Ok(e) => e,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
		Err(e) => return Err(e).with_context(|| format!("reading directory {}", dir.display())),
	};

	for entry in entries {
		let entry = entry.with_context(|| format!("reading directory entry under {}", dir.display()))?;
		let path = entry.path();
		let file_type = entry.file_type().with_context(|| format!("stat of {}", path.display()))?;

		if file_type.is_dir() {
			descend(tile_dir, &path, planet_time, queue, num_all, num_stale)?;
			continue;
		}
		if path.extension().and_then(|e| e.to_str()) != Some("meta") {
			continue;
		}
		*num_all += 1;
		let mtime = entry.metadata().and_then(|m| m.modified()).with_context(|| format!("reading mtime of {}", path.display()))?;
		if mtime < planet_time {
			*num_stale += 1;
			let Ok(relative) = path.strip_prefix(tile_dir) else { continue };
			let Some(relative) = relative.to_str() else { continue };
			match renderd_storage::parse_hash_path(relative) {
				Ok((style, coord)) => {
					if let Ok(style) = renderd_core::Style::new(style) {
						queue.enqueue(QueueItem { style, coord, cmd: Command::RenderLow });
					}
				}
				Err(e) => log::debug!("skipping unparseable metatile path {}: {e:#}", path.display()),
			}
		}
	}
	Ok(())
}
