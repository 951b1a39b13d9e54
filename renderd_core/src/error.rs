//! The typed error kinds callers can match on, wrapping a breadcrumb trail
//! built with `anyhow::Context` at the call boundary.
//!
//! Most functions in this workspace return `anyhow::Result<T>` and attach
//! context with `#[context("...")]` (see `renderd_derive`); `RenderdError` is
//! for the handful of call sites (the daemon's reply path, the serving
//! frontend's status-code mapping) that need to dispatch on *kind* rather
//! than just log and propagate a chain of strings.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderdError {
	/// Wire record size mismatch, unparseable URL, out-of-range coordinate.
	MalformedInput(String),
	/// A storage backend I/O call failed; callers may retry a bounded number of times.
	StorageIo(String),
	/// The render engine failed to produce a metatile.
	RenderFailed(String),
	/// A request queue was at capacity when an enqueue was attempted.
	QueueFull,
	/// No reply arrived from the daemon within the request's deadline.
	Timeout,
	/// The client's tile or render token bucket was empty.
	Throttled,
	/// A configuration file or section failed to parse or validate.
	Config(String),
}

impl fmt::Display for RenderdError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RenderdError::MalformedInput(msg) => write!(f, "malformed input: {msg}"),
			RenderdError::StorageIo(msg) => write!(f, "storage I/O error: {msg}"),
			RenderdError::RenderFailed(msg) => write!(f, "render failed: {msg}"),
			RenderdError::QueueFull => write!(f, "request queue is full"),
			RenderdError::Timeout => write!(f, "timed out waiting for daemon reply"),
			RenderdError::Throttled => write!(f, "client throttled"),
			RenderdError::Config(msg) => write!(f, "configuration error: {msg}"),
		}
	}
}

impl std::error::Error for RenderdError {}

impl RenderdError {
	/// Process exit status used for fatal configuration errors at startup,
	/// matching the original daemon's distinctive nonzero code.
	pub const CONFIG_EXIT_STATUS: i32 = 7;

	/// HTTP status the serving frontend maps this error kind to.
	#[must_use]
	pub fn status_code(&self) -> u16 {
		match self {
			RenderdError::MalformedInput(_) => 404,
			RenderdError::Throttled => 503,
			RenderdError::Timeout => 404,
			RenderdError::QueueFull | RenderdError::StorageIo(_) | RenderdError::RenderFailed(_) | RenderdError::Config(_) => 500,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn throttled_maps_to_503() {
		assert_eq!(RenderdError::Throttled.status_code(), 503);
	}

	#[test]
	fn malformed_input_maps_to_404() {
		assert_eq!(RenderdError::MalformedInput("bad url".into()).status_code(), 404);
	}

	#[test]
	fn display_includes_kind_and_detail() {
		let err = RenderdError::StorageIo("disk full".into());
		assert_eq!(err.to_string(), "storage I/O error: disk full");
	}
}
