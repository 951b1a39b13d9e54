//! Blocking connection to the render daemon, grounded directly in
//! `render_submit_queue.c`'s `process()`: send one request, block for one
//! reply. The offline tools are short-lived batch processes, not a hosted
//! async runtime, so they get their own thread-per-connection client rather
//! than reusing `tileserve`'s tokio-based one (spec §5: distinct suspension
//! points for the daemon/frontend/offline-tool roles).

use anyhow::{Context, Result};
use renderd_core::{Command, Style, TileCoord};
use renderd_protocol::{ProtocolVersion, RenderRequest};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;

/// Where the daemon listens: a Unix domain socket path, or a `host:port` pair.
#[derive(Debug, Clone)]
pub enum DaemonAddr {
	Unix(String),
	Tcp(String),
}

impl DaemonAddr {
	#[must_use]
	pub fn parse(value: &str) -> Self {
		if value.starts_with('/') {
			DaemonAddr::Unix(value.to_string())
		} else {
			DaemonAddr::Tcp(value.to_string())
		}
	}
}

enum Conn {
	Unix(UnixStream),
	Tcp(TcpStream),
}

impl Read for Conn {
	fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
		match self {
			Conn::Unix(s) => s.read(buf),
			Conn::Tcp(s) => s.read(buf),
		}
	}
}

impl Write for Conn {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		match self {
			Conn::Unix(s) => s.write(buf),
			Conn::Tcp(s) => s.write(buf),
		}
	}
	fn flush(&mut self) -> std::io::Result<()> {
		match self {
			Conn::Unix(s) => s.flush(),
			Conn::Tcp(s) => s.flush(),
		}
	}
}

/// One blocking connection to the daemon, reused by a worker thread across
/// many requests (mirrors `render_submit_queue.c`'s `thread_main`, which
/// connects once and then loops fetching work).
pub struct DaemonConnection {
	conn: Conn,
}

impl DaemonConnection {
	pub fn connect(addr: &DaemonAddr) -> Result<Self> {
		let conn = match addr {
			DaemonAddr::Unix(path) => Conn::Unix(UnixStream::connect(path).with_context(|| format!("connecting to daemon unix socket {path}"))?),
			DaemonAddr::Tcp(hostport) => Conn::Tcp(TcpStream::connect(hostport).with_context(|| format!("connecting to daemon tcp socket {hostport}"))?),
		};
		Ok(DaemonConnection { conn })
	}

	/// Sends `cmd` for `style`/`coord` and blocks for the daemon's reply,
	/// matching `process()`'s single send+recv round trip. Returns the
	/// reply's command (`Done` or `NotDone`).
	pub fn process(&mut self, cmd: Command, style: &Style, coord: TileCoord) -> Result<Command> {
		let request = RenderRequest {
			version: ProtocolVersion::V2,
			cmd,
			x: coord.x,
			y: coord.y,
			z: coord.z,
			style: style.clone(),
			mime: Some(String::new()),
			options: None,
		};
		let bytes = request.encode()?;
		self.conn.write_all(&bytes).context("sending render request")?;

		let mut reply_buf = vec![0u8; request.version.record_len()];
		self.conn.read_exact(&mut reply_buf).context("reading daemon reply")?;
		let reply = RenderRequest::decode(&reply_buf).context("decoding daemon reply")?;
		Ok(reply.cmd)
	}
}
