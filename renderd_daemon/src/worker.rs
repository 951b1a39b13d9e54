//! Render worker threads: dequeue a fingerprint, render it, store the
//! result, and wake every client waiting on it (spec §4.4/§5).

use crate::engine::RenderEngine;
use crate::queue::{Fingerprint, RequestQueue};
use log::{error, info, warn};
use renderd_core::TileCoord;
use renderd_storage::StorageBackend;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Renders are retried this many times against transient storage/render
/// failures before the waiters are told `NotDone` (spec §5: the daemon does
/// not retry forever — a style that is always broken must not wedge a
/// worker in a retry loop).
const MAX_ATTEMPTS: u32 = 2;

pub struct WorkerPool {
	handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
	/// Spawns `num_threads` workers sharing `queue`/`engine` and dispatching
	/// each fingerprint's storage by its style name. A single pool serves
	/// every configured style, since any worker can render any style equally
	/// well (spec §4.4: queues are shared across styles, not partitioned).
	pub fn spawn(num_threads: usize, queue: Arc<RequestQueue>, engine: Arc<dyn RenderEngine>, storages: Arc<HashMap<String, Arc<dyn StorageBackend>>>, n: u8) -> Self {
		let handles = (0..num_threads.max(1))
			.map(|id| {
				let queue = queue.clone();
				let engine = engine.clone();
				let storages = storages.clone();
				std::thread::Builder::new()
					.name(format!("renderd-worker-{id}"))
					.spawn(move || worker_loop(id, &queue, engine.as_ref(), &storages, n))
					.expect("spawning a render worker thread")
			})
			.collect();
		WorkerPool { handles }
	}

	/// Signals the queue closed and blocks until every worker has exited.
	pub fn shutdown(self, queue: &RequestQueue) {
		queue.close();
		for handle in self.handles {
			let _ = handle.join();
		}
	}
}

fn worker_loop(id: usize, queue: &RequestQueue, engine: &dyn RenderEngine, storages: &HashMap<String, Arc<dyn StorageBackend>>, n: u8) {
	info!("worker {id} started");
	while let Some(fp) = queue.dequeue_blocking() {
		let ok = match storages.get(&fp.style) {
			Some(storage) => render_one(engine, storage.as_ref(), n, &fp),
			None => {
				error!("no storage backend configured for style '{}'", fp.style);
				false
			}
		};
		let waiters = queue.complete(&fp);
		for waiter in waiters {
			let _ = waiter.send(ok);
		}
	}
	info!("worker {id} exiting");
}

fn render_one(engine: &dyn RenderEngine, storage: &dyn StorageBackend, n: u8, fp: &Fingerprint) -> bool {
	let origin = match TileCoord::new(fp.z, fp.x, fp.y) {
		Ok(c) => c,
		Err(e) => {
			error!("refusing malformed fingerprint {fp:?}: {e:#}");
			return false;
		}
	};

	for attempt in 1..=MAX_ATTEMPTS {
		match engine.render(&fp.style, &fp.options, origin, n) {
			Ok(metatile) => match storage.write_metatile(&fp.style, &fp.options, &metatile) {
				Ok(()) => return true,
				Err(e) => warn!("attempt {attempt}/{MAX_ATTEMPTS}: storing metatile for {fp:?} failed: {e:#}"),
			},
			Err(e) => warn!("attempt {attempt}/{MAX_ATTEMPTS}: rendering {fp:?} failed: {e:#}"),
		}
	}
	error!("giving up on {fp:?} after {MAX_ATTEMPTS} attempts");
	false
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::MockEngine;
	use crate::queue::EnqueueOutcome;
	use renderd_core::Priority;
	use renderd_storage::backends::FileBackend;
	use std::sync::mpsc::channel;
	use std::time::Duration;

	fn storages_with(name: &str, storage: Arc<dyn StorageBackend>) -> Arc<HashMap<String, Arc<dyn StorageBackend>>> {
		let mut map: HashMap<String, Arc<dyn StorageBackend>> = HashMap::new();
		map.insert(name.to_string(), storage);
		Arc::new(map)
	}

	#[test]
	fn a_queued_fingerprint_is_rendered_and_stored_and_waiters_are_woken() {
		let dir = tempfile::tempdir().unwrap();
		let storage: Arc<dyn StorageBackend> = Arc::new(FileBackend::new(dir.path(), 8));
		let engine: Arc<dyn RenderEngine> = Arc::new(MockEngine::new());
		let queue = Arc::new(RequestQueue::new([8, 8, 8, 8, 8], (3, 1)));

		let (tx, rx) = channel();
		let fp = Fingerprint {
			style: "osm".into(),
			options: String::new(),
			x: 0,
			y: 0,
			z: 5,
		};
		assert_eq!(queue.enqueue(fp.clone(), Priority::Normal, Some(tx)), EnqueueOutcome::Created);

		let pool = WorkerPool::spawn(1, queue.clone(), engine, storages_with("osm", storage.clone()), 8);
		let done = rx.recv_timeout(Duration::from_secs(5)).unwrap();
		assert!(done);
		pool.shutdown(&queue);

		let origin = TileCoord::new(5, 0, 0).unwrap();
		let stat = storage.stat("osm", "", origin).unwrap();
		assert!(!stat.is_missing());
	}

	#[test]
	fn a_render_that_always_fails_reports_not_done_to_waiters() {
		let dir = tempfile::tempdir().unwrap();
		let storage: Arc<dyn StorageBackend> = Arc::new(FileBackend::new(dir.path(), 8));
		let engine: Arc<dyn RenderEngine> = Arc::new(MockEngine::failing_for("broken"));
		let queue = Arc::new(RequestQueue::new([8, 8, 8, 8, 8], (3, 1)));

		let (tx, rx) = channel();
		let fp = Fingerprint {
			style: "broken".into(),
			options: String::new(),
			x: 0,
			y: 0,
			z: 5,
		};
		queue.enqueue(fp, Priority::Normal, Some(tx));

		let pool = WorkerPool::spawn(1, queue.clone(), engine, storages_with("broken", storage), 8);
		let done = rx.recv_timeout(Duration::from_secs(5)).unwrap();
		assert!(!done);
		pool.shutdown(&queue);
	}

	#[test]
	fn a_fingerprint_with_no_matching_style_fails_without_panicking() {
		let dir = tempfile::tempdir().unwrap();
		let storage: Arc<dyn StorageBackend> = Arc::new(FileBackend::new(dir.path(), 8));
		let engine: Arc<dyn RenderEngine> = Arc::new(MockEngine::new());
		let queue = Arc::new(RequestQueue::new([8, 8, 8, 8, 8], (3, 1)));

		let (tx, rx) = channel();
		let fp = Fingerprint {
			style: "unconfigured".into(),
			options: String::new(),
			x: 0,
			y: 0,
			z: 5,
		};
		queue.enqueue(fp, Priority::Normal, Some(tx));

		let pool = WorkerPool::spawn(1, queue.clone(), engine, storages_with("osm", storage), 8);
		let done = rx.recv_timeout(Duration::from_secs(5)).unwrap();
		assert!(!done);
		pool.shutdown(&queue);
	}
}
