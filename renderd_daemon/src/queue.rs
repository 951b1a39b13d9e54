//! The daemon's five FIFO priority queues plus fingerprint-based duplicate
//! coalescing (spec §3/§4.4).
//!
//! Everything lives behind one [`std::sync::Mutex`] with two condition
//! variables (`not_empty` for workers, `not_full` for — conceptually — the
//! enqueue path; a full queue never blocks here, it rejects immediately per
//! spec, so `not_full` exists for API symmetry with spec §5 and is signalled
//! when an entry is removed). Rust's ownership model has no analogue to the
//! C original's cyclic-pointer-graph concern (spec §9's "arena/slotmap"
//! design note exists there to avoid owning cycles between the queue and the
//! table) — a plain `HashMap<Fingerprint, InFlight>` under the same mutex as
//! the level queues satisfies the same requirement without an arena
//! indirection; see `DESIGN.md`.

use renderd_core::Priority;
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex};

/// Identity used for duplicate coalescing: `(style, options, x_aligned,
/// y_aligned, z)` per spec §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
	pub style: String,
	pub options: String,
	pub x: u32,
	pub y: u32,
	pub z: u8,
}

/// A waiter attached to an in-flight fingerprint, notified with `true`
/// (rendered) or `false` (failed) when the render completes.
pub type Waiter = Sender<bool>;

#[derive(Default)]
struct InFlight {
	priority: Priority,
	waiters: Vec<Waiter>,
}

const LEVELS: [Priority; 5] = [Priority::Prio, Priority::Normal, Priority::Low, Priority::Dirty, Priority::Bulk];

fn level_index(p: Priority) -> usize {
	LEVELS.iter().position(|&l| l == p).expect("every Priority is in LEVELS")
}

struct Inner {
	queues: [VecDeque<Fingerprint>; 5],
	caps: [usize; 5],
	in_flight: HashMap<Fingerprint, InFlight>,
	/// Rotating counter implementing the configurable Prio:Normal interleave
	/// ratio (spec §4.4: "round-robin breaks ties... so Normal cannot starve
	/// Prio work indefinitely or vice versa").
	round_robin: u32,
	prio_to_normal_ratio: (u32, u32),
	closed: bool,
}

/// Outcome of [`RequestQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
	/// A new fingerprint entry was created and queued.
	Created,
	/// The request joined an already in-flight (queued or rendering) entry.
	Attached,
	/// The target queue was at capacity; the daemon must reply `NotDone`.
	Full,
}

pub struct RequestQueue {
	inner: Mutex<Inner>,
	not_empty: Condvar,
}

impl RequestQueue {
	#[must_use]
	pub fn new(caps: [usize; 5], prio_to_normal_ratio: (u32, u32)) -> Self {
		RequestQueue {
			inner: Mutex::new(Inner {
				queues: Default::default(),
				caps,
				in_flight: HashMap::new(),
				round_robin: 0,
				prio_to_normal_ratio,
				closed: false,
			}),
			not_empty: Condvar::new(),
		}
	}

	/// Enqueues `fp` at `priority`, optionally attaching `waiter` to receive
	/// the completion reply. `Dirty` requests pass `waiter = None` (spec
	/// §4.4: the client is not added as a waiter for Dirty).
	///
	/// Promotion is monotonic (spec §3/§8 property 4): a duplicate arriving
	/// at a strictly more urgent priority raises the entry's effective
	/// priority and moves it between level queues if it hasn't started
	/// rendering yet; a less urgent duplicate never demotes it.
	pub fn enqueue(&self, fp: Fingerprint, priority: Priority, waiter: Option<Waiter>) -> EnqueueOutcome {
		let mut inner = self.inner.lock().unwrap();

		if let Some(entry) = inner.in_flight.get_mut(&fp) {
			if let Some(w) = waiter {
				entry.waiters.push(w);
			}
			if priority < entry.priority {
				let old_level = level_index(entry.priority);
				if let Some(pos) = inner.queues[old_level].iter().position(|f| f == &fp) {
					inner.queues[old_level].remove(pos);
					let new_level = level_index(priority);
					inner.queues[new_level].push_back(fp.clone());
				}
				inner.in_flight.get_mut(&fp).unwrap().priority = priority;
			}
			return EnqueueOutcome::Attached;
		}

		let level = level_index(priority);
		if inner.queues[level].len() >= inner.caps[level] {
			return EnqueueOutcome::Full;
		}

		inner.queues[level].push_back(fp.clone());
		inner.in_flight.insert(
			fp,
			InFlight {
				priority,
				waiters: waiter.into_iter().collect(),
			},
		);
		drop(inner);
		self.not_empty.notify_one();
		EnqueueOutcome::Created
	}

	/// Blocks until a fingerprint is available (or the queue is closed),
	/// pops it from its level queue, and returns it. The fingerprint's
	/// in-flight entry remains in the table — duplicates that arrive while
	/// this is rendering still coalesce via [`Self::enqueue`] (spec §3: "at
	/// most one render in flight" covers queued *and* rendering work).
	pub fn dequeue_blocking(&self) -> Option<Fingerprint> {
		let mut inner = self.inner.lock().unwrap();
		loop {
			if let Some(fp) = Self::pop_next(&mut inner) {
				return Some(fp);
			}
			if inner.closed {
				return None;
			}
			inner = self.not_empty.wait(inner).unwrap();
		}
	}

	fn pop_next(inner: &mut Inner) -> Option<Fingerprint> {
		let prio_empty = inner.queues[level_index(Priority::Prio)].is_empty();
		let normal_empty = inner.queues[level_index(Priority::Normal)].is_empty();

		if !prio_empty && !normal_empty {
			let (p, n) = inner.prio_to_normal_ratio;
			let total = (p + n).max(1);
			let pick_prio = inner.round_robin % total < p;
			inner.round_robin = inner.round_robin.wrapping_add(1);
			let level = level_index(if pick_prio { Priority::Prio } else { Priority::Normal });
			return inner.queues[level].pop_front();
		}

		for level in [Priority::Prio, Priority::Normal, Priority::Low, Priority::Dirty, Priority::Bulk] {
			if let Some(fp) = inner.queues[level_index(level)].pop_front() {
				return Some(fp);
			}
		}
		None
	}

	/// Removes the completed fingerprint's entry and returns its waiters,
	/// to be notified by the caller (outside the lock, so a slow or dead
	/// waiter channel never blocks the queue).
	#[must_use]
	pub fn complete(&self, fp: &Fingerprint) -> Vec<Waiter> {
		let mut inner = self.inner.lock().unwrap();
		inner.in_flight.remove(fp).map(|e| e.waiters).unwrap_or_default()
	}

	/// Wakes every blocked worker so they can observe shutdown.
	pub fn close(&self) {
		self.inner.lock().unwrap().closed = true;
		self.not_empty.notify_all();
	}

	#[must_use]
	pub fn priority_of(&self, fp: &Fingerprint) -> Option<Priority> {
		self.inner.lock().unwrap().in_flight.get(fp).map(|e| e.priority)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.lock().unwrap().in_flight.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::mpsc::channel;

	fn fp(x: u32) -> Fingerprint {
		Fingerprint {
			style: "osm".into(),
			options: String::new(),
			x,
			y: 0,
			z: 5,
		}
	}

	#[test]
	fn second_enqueue_for_same_fingerprint_attaches_instead_of_duplicating() {
		let q = RequestQueue::new([8, 8, 8, 8, 8], (3, 1));
		let (tx1, _rx1) = channel();
		let (tx2, _rx2) = channel();

		assert_eq!(q.enqueue(fp(1), Priority::Normal, Some(tx1)), EnqueueOutcome::Created);
		assert_eq!(q.enqueue(fp(1), Priority::Normal, Some(tx2)), EnqueueOutcome::Attached);
		assert_eq!(q.len(), 1);
	}

	#[test]
	fn higher_priority_duplicate_promotes_but_lower_never_demotes() {
		let q = RequestQueue::new([8, 8, 8, 8, 8], (3, 1));
		q.enqueue(fp(1), Priority::Normal, None);
		assert_eq!(q.priority_of(&fp(1)), Some(Priority::Normal));

		q.enqueue(fp(1), Priority::Low, None);
		assert_eq!(q.priority_of(&fp(1)), Some(Priority::Normal), "lower priority must not demote");

		q.enqueue(fp(1), Priority::Prio, None);
		assert_eq!(q.priority_of(&fp(1)), Some(Priority::Prio), "higher priority must promote");
	}

	#[test]
	fn full_queue_rejects_without_blocking() {
		let q = RequestQueue::new([1, 8, 8, 8, 8], (3, 1));
		assert_eq!(q.enqueue(fp(1), Priority::Prio, None), EnqueueOutcome::Created);
		assert_eq!(q.enqueue(fp(2), Priority::Prio, None), EnqueueOutcome::Full);
	}

	#[test]
	fn dequeue_respects_fifo_within_a_level() {
		let q = RequestQueue::new([8, 8, 8, 8, 8], (3, 1));
		q.enqueue(fp(1), Priority::Normal, None);
		q.enqueue(fp(2), Priority::Normal, None);
		assert_eq!(q.dequeue_blocking(), Some(fp(1)));
		assert_eq!(q.dequeue_blocking(), Some(fp(2)));
	}

	#[test]
	fn prio_queue_is_not_starved_by_a_long_normal_backlog() {
		let q = RequestQueue::new([64, 64, 64, 64, 64], (3, 1));
		for x in 0..20 {
			q.enqueue(fp(x), Priority::Normal, None);
		}
		q.enqueue(fp(1000), Priority::Prio, None);

		// Out of the next 4 pops, at least one must be the Prio entry — it is
		// never forced to wait behind the entire Normal backlog.
		let mut saw_prio = false;
		for _ in 0..4 {
			if q.dequeue_blocking() == Some(fp(1000)) {
				saw_prio = true;
			}
		}
		assert!(saw_prio);
	}

	#[test]
	fn low_dirty_bulk_drain_strictly_after_prio_and_normal() {
		let q = RequestQueue::new([8, 8, 8, 8, 8], (3, 1));
		q.enqueue(fp(1), Priority::Bulk, None);
		q.enqueue(fp(2), Priority::Prio, None);
		assert_eq!(q.dequeue_blocking(), Some(fp(2)));
		assert_eq!(q.dequeue_blocking(), Some(fp(1)));
	}

	#[test]
	fn closing_wakes_blocked_workers_with_none() {
		let q = std::sync::Arc::new(RequestQueue::new([8, 8, 8, 8, 8], (3, 1)));
		let q2 = q.clone();
		let handle = std::thread::spawn(move || q2.dequeue_blocking());
		std::thread::sleep(std::time::Duration::from_millis(20));
		q.close();
		assert_eq!(handle.join().unwrap(), None);
	}

	#[test]
	fn complete_returns_and_clears_all_waiters() {
		let q = RequestQueue::new([8, 8, 8, 8, 8], (3, 1));
		let (tx1, _rx1) = channel();
		let (tx2, _rx2) = channel();
		q.enqueue(fp(1), Priority::Normal, Some(tx1));
		q.enqueue(fp(1), Priority::Normal, Some(tx2));

		let waiters = q.complete(&fp(1));
		assert_eq!(waiters.len(), 2);
		assert_eq!(q.len(), 0);
	}
}
