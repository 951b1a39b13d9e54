//! Argument-parsing conventions shared by every offline tool (spec §6.5):
//! `--help`/`--version` exit `0`, everything else wrong about the command
//! line exits `1` with a diagnostic on stderr — not clap's own default exit
//! code of `2`, which the original `getopt_long`-based tools never used.

use clap::error::ErrorKind;
use clap::Parser;
use renderd_core::MAX_ZOOM;

/// Parses `T` from `std::env::args`, translating a clap parse failure into
/// the process exit codes spec.md §6.5 requires: `0` for `--help`/`--version`
/// (clap already prints the message), `1` for anything else.
#[must_use]
pub fn parse_or_exit<T: Parser>() -> T {
	match T::try_parse() {
		Ok(args) => args,
		Err(e) => {
			if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
				print!("{e}");
				std::process::exit(0);
			}
			eprint!("{e}");
			std::process::exit(1);
		}
	}
}

/// Validates a `--min-zoom`/`--max-zoom` pair against spec §6.5: both values
/// clamped into `[0, MAX_ZOOM]`, `min <= max`. Returns a diagnostic instead
/// of panicking so callers can print it and `exit(1)`.
pub fn check_zoom_range(min_zoom: u8, max_zoom: u8) -> anyhow::Result<(u8, u8)> {
	anyhow::ensure!(min_zoom <= MAX_ZOOM, "--min-zoom {min_zoom} exceeds the maximum of {MAX_ZOOM}");
	anyhow::ensure!(max_zoom <= MAX_ZOOM, "--max-zoom {max_zoom} exceeds the maximum of {MAX_ZOOM}");
	anyhow::ensure!(min_zoom <= max_zoom, "--min-zoom {min_zoom} is larger than --max-zoom {max_zoom}");
	Ok((min_zoom, max_zoom))
}

/// Shared option block every tool accepts (spec §6.5): config/map/zoom
/// range/thread count/socket/tile-dir/load ceiling/verbosity.
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
	/// Renderd config file (reserved for future use; tools currently take
	/// socket/tile-dir directly rather than parsing renderd's own config).
	#[arg(short, long)]
	pub config: Option<String>,
	/// Map/style name to operate on.
	#[arg(short, long, default_value = "default")]
	pub map: String,
	/// Lowest zoom level to consider.
	#[arg(short = 'z', long, default_value_t = 0)]
	pub min_zoom: u8,
	/// Highest zoom level to consider.
	#[arg(short = 'Z', long, default_value_t = 18)]
	pub max_zoom: u8,
	/// Number of concurrent connections to the daemon.
	#[arg(short = 'n', long, default_value_t = 1)]
	pub num_threads: usize,
	/// Unix socket path or `host:port` of the render daemon.
	#[arg(short, long, default_value = "/run/renderd/renderd.sock")]
	pub socket: String,
	/// Tile cache directory, for tools that walk the on-disk store.
	#[arg(short, long, default_value = "/var/lib/renderd/tiles")]
	pub tile_dir: String,
	/// Sleep while the 1-minute load average is at or above this ceiling.
	#[arg(short = 'l', long, default_value_t = 16.0)]
	pub max_load: f64,
	#[arg(short, long)]
	pub verbose: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_an_in_range_non_decreasing_zoom_pair() {
		assert_eq!(check_zoom_range(0, 18).unwrap(), (0, 18));
		assert_eq!(check_zoom_range(5, 5).unwrap(), (5, 5));
	}

	#[test]
	fn rejects_min_above_max() {
		assert!(check_zoom_range(10, 5).is_err());
	}

	#[test]
	fn rejects_zoom_above_the_global_maximum() {
		assert!(check_zoom_range(0, MAX_ZOOM + 1).is_err());
	}
}
