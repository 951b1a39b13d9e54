//! Client for the render daemon's wire protocol: connect, send, and poll
//! with a deadline against the daemon socket, written against `tokio`'s
//! async I/O since the serving frontend is hosted by an async HTTP runtime
//! rather than a dedicated OS thread per request.
//!
//! On deadline expiry the connection is simply dropped — the daemon detects
//! the close on its next write and abandons the waiter without cancelling
//! the in-flight render; the result is still cached for the next request
//! to find.

use anyhow::{Context, Result};
use renderd_core::{Command, Style, TileCoord};
use renderd_protocol::{ProtocolVersion, RenderRequest};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::time::timeout;

/// How to reach the daemon: a Unix domain socket path, or a `host:port` pair.
#[derive(Debug, Clone)]
pub enum DaemonAddr {
	Unix(String),
	Tcp(String),
}

impl DaemonAddr {
	/// Parses `daemon_addr` config values: a path starting with `/` is a
	/// Unix socket, anything else is `host:port`.
	#[must_use]
	pub fn parse(value: &str) -> Self {
		if value.starts_with('/') {
			DaemonAddr::Unix(value.to_string())
		} else {
			DaemonAddr::Tcp(value.to_string())
		}
	}
}

#[derive(Clone)]
pub struct DaemonClient {
	addr: DaemonAddr,
}

impl DaemonClient {
	#[must_use]
	pub fn new(addr: DaemonAddr) -> Self {
		DaemonClient { addr }
	}

	/// Sends a render request for `style` at `coord` and blocks (up to
	/// `deadline`) for the daemon's `Done`/`NotDone` reply. Any connection or
	/// timeout error is reported as `Ok(Command::NotDone)` to the caller,
	/// since from the frontend's perspective a daemon that is unreachable is
	/// indistinguishable from one that could not render in time.
	pub async fn request(&self, cmd: Command, style: &Style, coord: TileCoord, deadline: Duration) -> Result<Command> {
		let request = RenderRequest {
			version: ProtocolVersion::V1,
			cmd,
			x: coord.x,
			y: coord.y,
			z: coord.z,
			style: style.clone(),
			mime: None,
			options: None,
		};

		match timeout(deadline, self.send_and_wait(&request)).await {
			Ok(Ok(reply)) => Ok(reply),
			Ok(Err(e)) => {
				log::warn!("daemon request failed: {e:#}");
				Ok(Command::NotDone)
			}
			Err(_) => {
				log::warn!("daemon request for {style} {coord:?} timed out after {deadline:?}");
				Ok(Command::NotDone)
			}
		}
	}

	async fn send_and_wait(&self, request: &RenderRequest) -> Result<Command> {
		let bytes = request.encode()?;
		let reply_len = request.version.record_len();

		let reply_bytes = match &self.addr {
			DaemonAddr::Unix(path) => {
				let mut stream = UnixStream::connect(path).await.context("connecting to daemon unix socket")?;
				stream.write_all(&bytes).await.context("writing render request")?;
				let mut buf = vec![0u8; reply_len];
				stream.read_exact(&mut buf).await.context("reading daemon reply")?;
				buf
			}
			DaemonAddr::Tcp(addr) => {
				let mut stream = TcpStream::connect(addr).await.context("connecting to daemon tcp socket")?;
				stream.write_all(&bytes).await.context("writing render request")?;
				let mut buf = vec![0u8; reply_len];
				stream.read_exact(&mut buf).await.context("reading daemon reply")?;
				buf
			}
		};

		let reply = RenderRequest::decode(&reply_bytes).context("decoding daemon reply")?;
		Ok(reply.cmd)
	}

	/// Fire-and-forget `Dirty` notification; the frontend does not wait for
	/// a reply (spec §4.4: a Dirty request is not added as a waiter).
	pub async fn notify_dirty(&self, style: &Style, coord: TileCoord) {
		let request = RenderRequest {
			version: ProtocolVersion::V1,
			cmd: Command::Dirty,
			x: coord.x,
			y: coord.y,
			z: coord.z,
			style: style.clone(),
			mime: None,
			options: None,
		};
		if let Ok(bytes) = request.encode() {
			let _ = timeout(Duration::from_secs(2), self.send_dirty(&bytes)).await;
		}
	}

	async fn send_dirty(&self, bytes: &[u8]) -> Result<()> {
		match &self.addr {
			DaemonAddr::Unix(path) => {
				let mut stream = UnixStream::connect(path).await?;
				stream.write_all(bytes).await?;
			}
			DaemonAddr::Tcp(addr) => {
				let mut stream = TcpStream::connect(addr).await?;
				stream.write_all(bytes).await?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_unix_and_tcp_addresses() {
		assert!(matches!(DaemonAddr::parse("/run/renderd.sock"), DaemonAddr::Unix(_)));
		assert!(matches!(DaemonAddr::parse("127.0.0.1:9000"), DaemonAddr::Tcp(_)));
	}

	#[tokio::test]
	async fn an_unreachable_daemon_reports_not_done_instead_of_erroring() {
		let client = DaemonClient::new(DaemonAddr::Tcp("127.0.0.1:1".to_string()));
		let style = Style::new("osm").unwrap();
		let coord = TileCoord::new(5, 0, 0).unwrap();
		let reply = client.request(Command::Render, &style, coord, Duration::from_millis(200)).await.unwrap();
		assert_eq!(reply, Command::NotDone);
	}
}
