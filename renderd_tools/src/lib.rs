//! Offline CLI front-ends that feed tile coordinates to the render daemon
//! (spec §1: "command-line front-ends that walk the tile tree or feed
//! coordinates to the daemon"). Each binary in `src/bin/` is a thin `main`
//! over the shared pieces here: argument conventions, a blocking daemon
//! client, the client-side submit queue, and lon/lat <-> tile conversion.

pub mod cli;
pub mod daemon;
pub mod geo;
pub mod submit_queue;

pub use cli::{check_zoom_range, parse_or_exit, CommonArgs};
pub use daemon::{DaemonAddr, DaemonConnection};
pub use geo::{bbox_to_tile_range, lonlat_to_tile};
pub use submit_queue::{Counters, QueueItem, SubmitQueue};
