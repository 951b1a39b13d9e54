//! Shared-counter observability: one
//! `StatsCounters` struct feeds both the human-readable `/mod_tile` dump and
//! the Prometheus-style `/metrics` exposition, matching `mod_tile.c`'s single
//! `stats_data` struct feeding both a status handler and a later exporter.
//!
//! Updates are best-effort: a writer that loses the `try_lock` race silently
//! drops its update rather than blocking the request path.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Default, Clone)]
struct Counters {
	by_status: HashMap<u16, u64>,
	by_zoom: HashMap<u8, u64>,
	by_layer: HashMap<String, u64>,
	fresh_hits: u64,
	stale_hits: u64,
	renders_enqueued: u64,
	read_latency_us_by_zoom: HashMap<u8, u64>,
}

pub struct StatsCounters {
	inner: Mutex<Counters>,
}

impl Default for StatsCounters {
	fn default() -> Self {
		StatsCounters { inner: Mutex::new(Counters::default()) }
	}
}

/// Whether a served tile came straight from cache or triggered a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheClass {
	Fresh,
	Stale,
}

impl StatsCounters {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record(&self, status: u16, zoom: u8, layer: &str, class: Option<CacheClass>, read_latency_us: u64) {
		let Some(mut counters) = self.inner.try_lock() else {
			return;
		};
		*counters.by_status.entry(status).or_insert(0) += 1;
		*counters.by_zoom.entry(zoom).or_insert(0) += 1;
		*counters.by_layer.entry(layer.to_string()).or_insert(0) += 1;
		*counters.read_latency_us_by_zoom.entry(zoom).or_insert(0) += read_latency_us;
		match class {
			Some(CacheClass::Fresh) => counters.fresh_hits += 1,
			Some(CacheClass::Stale) => counters.stale_hits += 1,
			None => {}
		}
	}

	pub fn record_render_enqueued(&self) {
		if let Some(mut counters) = self.inner.try_lock() {
			counters.renders_enqueued += 1;
		}
	}

	/// `/mod_tile`-style human-readable dump.
	#[must_use]
	pub fn render_text(&self) -> String {
		let counters = self.inner.lock().clone();
		let mut out = String::new();
		let _ = writeln!(out, "fresh_hits: {}", counters.fresh_hits);
		let _ = writeln!(out, "stale_hits: {}", counters.stale_hits);
		let _ = writeln!(out, "renders_enqueued: {}", counters.renders_enqueued);
		for (status, count) in sorted(&counters.by_status) {
			let _ = writeln!(out, "status[{status}]: {count}");
		}
		for (zoom, count) in sorted(&counters.by_zoom) {
			let _ = writeln!(out, "zoom[{zoom}]: {count}");
		}
		for (layer, count) in sorted_keys(&counters.by_layer) {
			let _ = writeln!(out, "layer[{layer}]: {count}");
		}
		out
	}

	/// Prometheus text exposition of the same counters.
	#[must_use]
	pub fn render_prometheus(&self) -> String {
		let counters = self.inner.lock().clone();
		let mut out = String::new();
		let _ = writeln!(out, "# TYPE tileserve_fresh_hits_total counter");
		let _ = writeln!(out, "tileserve_fresh_hits_total {}", counters.fresh_hits);
		let _ = writeln!(out, "# TYPE tileserve_stale_hits_total counter");
		let _ = writeln!(out, "tileserve_stale_hits_total {}", counters.stale_hits);
		let _ = writeln!(out, "# TYPE tileserve_renders_enqueued_total counter");
		let _ = writeln!(out, "tileserve_renders_enqueued_total {}", counters.renders_enqueued);
		let _ = writeln!(out, "# TYPE tileserve_responses_total counter");
		for (status, count) in sorted(&counters.by_status) {
			let _ = writeln!(out, "tileserve_responses_total{{status=\"{status}\"}} {count}");
		}
		out
	}
}

fn sorted<K: Ord + Copy + std::fmt::Display>(map: &HashMap<K, u64>) -> Vec<(K, u64)> {
	let mut entries: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
	entries.sort_by_key(|(k, _)| *k);
	entries
}

fn sorted_keys(map: &HashMap<String, u64>) -> Vec<(String, u64)> {
	let mut entries: Vec<_> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
	entries.sort();
	entries
}
