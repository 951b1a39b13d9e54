//! The render-daemon command vocabulary shared by the wire protocol, the
//! request queue and the render workers.

use std::fmt;

/// A command as carried in a wire-protocol record, or as a daemon reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
	/// No-op / placeholder.
	Ignore,
	/// Normal priority render, reply when done.
	Render,
	/// Enqueue at lowest priority; daemon replies immediately and does not wait.
	Dirty,
	/// Reply: the render succeeded.
	Done,
	/// Reply: the render failed or was not attempted.
	NotDone,
	/// Highest priority, short deadline (missing tile on a live request).
	RenderPrio,
	/// Lowest priority, used by offline bulk jobs.
	RenderBulk,
	/// Below-normal priority (e.g. refreshing an "old" tile).
	RenderLow,
}

impl Command {
	/// Raw wire value, matching the C `enum protoCmd` ordering.
	#[must_use]
	pub fn as_i32(self) -> i32 {
		match self {
			Command::Ignore => 0,
			Command::Render => 1,
			Command::Dirty => 2,
			Command::Done => 3,
			Command::NotDone => 4,
			Command::RenderPrio => 5,
			Command::RenderBulk => 6,
			Command::RenderLow => 7,
		}
	}

	pub fn from_i32(value: i32) -> Option<Self> {
		Some(match value {
			0 => Command::Ignore,
			1 => Command::Render,
			2 => Command::Dirty,
			3 => Command::Done,
			4 => Command::NotDone,
			5 => Command::RenderPrio,
			6 => Command::RenderBulk,
			7 => Command::RenderLow,
			_ => return None,
		})
	}

	/// Which of the daemon's five queues a render request of this kind belongs to.
	/// Returns `None` for commands that are not render requests (replies, `Ignore`).
	#[must_use]
	pub fn priority(self) -> Option<Priority> {
		match self {
			Command::RenderPrio => Some(Priority::Prio),
			Command::Render => Some(Priority::Normal),
			Command::RenderLow => Some(Priority::Low),
			Command::Dirty => Some(Priority::Dirty),
			Command::RenderBulk => Some(Priority::Bulk),
			Command::Done | Command::NotDone | Command::Ignore => None,
		}
	}
}

/// The daemon's five FIFO queues, ordered from most to least urgent.
///
/// `Ord` reflects scheduling precedence except between `Prio` and `Normal`,
/// which are interleaved by a configurable ratio rather than strict priority
/// (see `prio_to_normal_ratio`); the derived ordering is still useful for
/// "is this at least as urgent" comparisons used by priority-promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
	Prio,
	Normal,
	Low,
	Dirty,
	#[default]
	Bulk,
}

impl fmt::Display for Priority {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Priority::Prio => "prio",
			Priority::Normal => "normal",
			Priority::Low => "low",
			Priority::Dirty => "dirty",
			Priority::Bulk => "bulk",
		})
	}
}
