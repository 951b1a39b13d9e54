//! A small bounded client-side work queue feeding a pool of daemon-connected
//! worker threads, grounded directly in `render_submit_queue.c`: distinct
//! from the daemon's own internal priority queues (spec §4.4 supplement),
//! this is the offline tools' own `enqueue`/`fetch`/`spawn_workers` shape —
//! a condvar-guarded bounded MPSC queue that backs off while the local load
//! average exceeds a configured ceiling.

use crate::daemon::{DaemonAddr, DaemonConnection};
use renderd_core::{Command, Style, TileCoord, load_average};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Matches the original's `QMAX`: the client-side queue never grows past
/// this many pending items regardless of how fast the producer walks the
/// tile tree.
const QMAX: usize = 32;

#[derive(Debug, Clone)]
pub struct QueueItem {
	pub style: Style,
	pub coord: TileCoord,
	pub cmd: Command,
}

struct Inner {
	items: VecDeque<QueueItem>,
	closed: bool,
}

/// Tallies what every worker thread did, read back by the tool's `main` once
/// submission finishes to print a rate summary (spec's `display_rate`).
#[derive(Default)]
pub struct Counters {
	pub rendered: AtomicU64,
	pub failed: AtomicU64,
}

pub struct SubmitQueue {
	inner: Mutex<Inner>,
	not_empty: Condvar,
	not_full: Condvar,
}

impl SubmitQueue {
	#[must_use]
	pub fn new() -> Arc<Self> {
		Arc::new(SubmitQueue {
			inner: Mutex::new(Inner {
				items: VecDeque::new(),
				closed: false,
			}),
			not_empty: Condvar::new(),
			not_full: Condvar::new(),
		})
	}

	/// Blocks while the queue is at `QMAX` capacity, matching the original's
	/// `enqueue` backpressure (the producer is slowed rather than the queue
	/// growing unbounded while a slow daemon catches up).
	pub fn enqueue(&self, item: QueueItem) {
		let mut inner = self.inner.lock().unwrap();
		while inner.items.len() >= QMAX && !inner.closed {
			inner = self.not_full.wait(inner).unwrap();
		}
		inner.items.push_back(item);
		self.not_empty.notify_one();
	}

	fn fetch(&self) -> Option<QueueItem> {
		let mut inner = self.inner.lock().unwrap();
		loop {
			if let Some(item) = inner.items.pop_front() {
				self.not_full.notify_one();
				return Some(item);
			}
			if inner.closed {
				return None;
			}
			inner = self.not_empty.wait(inner).unwrap();
		}
	}

	/// Signals that no more items will be enqueued; workers drain what's left
	/// and then exit instead of blocking forever (matches `finish_workers`).
	pub fn close(&self) {
		self.inner.lock().unwrap().closed = true;
		self.not_empty.notify_all();
		self.not_full.notify_all();
	}

	/// Spawns `num` worker threads, each holding its own daemon connection,
	/// that `fetch()` items and call [`DaemonConnection::process`] until the
	/// queue is closed and drained (mirrors `spawn_workers`/`thread_main`).
	/// `max_load` reproduces `check_load`: a worker backs off in 5-second
	/// steps while the load average is at or above the ceiling.
	pub fn spawn_workers(self: &Arc<Self>, num: usize, addr: DaemonAddr, max_load: f64, counters: Arc<Counters>) -> Vec<JoinHandle<()>> {
		(0..num.max(1))
			.map(|id| {
				let queue = self.clone();
				let addr = addr.clone();
				let counters = counters.clone();
				std::thread::Builder::new()
					.name(format!("renderd-tools-worker-{id}"))
					.spawn(move || worker_loop(&queue, &addr, max_load, &counters))
					.expect("spawning a submit-queue worker thread")
			})
			.collect()
	}
}

fn worker_loop(queue: &SubmitQueue, addr: &DaemonAddr, max_load: f64, counters: &Counters) {
	let mut conn = match DaemonConnection::connect(addr) {
		Ok(c) => c,
		Err(e) => {
			log::error!("worker failed to connect to {addr:?}: {e:#}");
			return;
		}
	};

	while let Some(item) = queue.fetch() {
		while max_load > 0.0 && load_average() >= max_load {
			std::thread::sleep(Duration::from_secs(5));
		}
		match conn.process(item.cmd, &item.style, item.coord) {
			Ok(Command::Done) => {
				counters.rendered.fetch_add(1, Ordering::Relaxed);
			}
			Ok(_) => {
				log::warn!("render not done for {:?} {:?}, pausing", item.style, item.coord);
				counters.failed.fetch_add(1, Ordering::Relaxed);
				std::thread::sleep(Duration::from_secs(10));
			}
			Err(e) => {
				log::error!("request failed for {:?} {:?}: {e:#}", item.style, item.coord);
				counters.failed.fetch_add(1, Ordering::Relaxed);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fetch_drains_in_fifo_order_and_returns_none_once_closed() {
		let queue = SubmitQueue::new();
		let style = Style::new("osm").unwrap();
		let a = QueueItem {
			style: style.clone(),
			coord: TileCoord::new(5, 0, 0).unwrap(),
			cmd: Command::RenderBulk,
		};
		let b = QueueItem {
			style,
			coord: TileCoord::new(5, 1, 0).unwrap(),
			cmd: Command::RenderBulk,
		};
		queue.enqueue(a.clone());
		queue.enqueue(b.clone());
		assert_eq!(queue.fetch().unwrap().coord, a.coord);
		assert_eq!(queue.fetch().unwrap().coord, b.coord);

		queue.close();
		assert!(queue.fetch().is_none());
	}

	#[test]
	fn close_wakes_a_blocked_fetch() {
		let queue = SubmitQueue::new();
		let q2 = queue.clone();
		let handle = std::thread::spawn(move || q2.fetch());
		std::thread::sleep(Duration::from_millis(20));
		queue.close();
		assert!(handle.join().unwrap().is_none());
	}
}
