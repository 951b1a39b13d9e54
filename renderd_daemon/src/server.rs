//! Socket front end: accepts Unix-domain and/or TCP connections, decodes
//! wire records via `renderd_protocol`, and turns them into queue operations
//! (spec §4.1/§4.4/§5). One thread per connection, mirroring the blocking,
//! thread-per-client model of the original daemon rather than an async
//! runtime (see `SPEC_FULL.md` §5's rationale).

use crate::queue::{EnqueueOutcome, Fingerprint, RequestQueue};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use renderd_core::Command;
use renderd_protocol::{ProtocolVersion, RenderRequest};
use renderd_storage::StorageBackend;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long a connection blocks waiting for a render it is waiting on before
/// giving up and replying `NotDone` (spec §5: a stuck renderer must not wedge
/// a client forever).
const RENDER_DEADLINE: Duration = Duration::from_secs(60);

pub struct Server {
	queue: Arc<RequestQueue>,
	storages: Arc<HashMap<String, Arc<dyn StorageBackend>>>,
	metatile_n: u8,
	listeners: Vec<JoinHandle<()>>,
}

impl Server {
	#[must_use]
	pub fn new(queue: Arc<RequestQueue>, storages: HashMap<String, Arc<dyn StorageBackend>>, metatile_n: u8) -> Self {
		Server {
			queue,
			storages: Arc::new(storages),
			metatile_n,
			listeners: Vec::new(),
		}
	}

	pub fn listen_unix(&mut self, path: &str) -> Result<()> {
		let _ = std::fs::remove_file(path);
		let listener = UnixListener::bind(path).with_context(|| format!("binding unix socket {path}"))?;
		info!("listening on unix socket {path}");
		let queue = self.queue.clone();
		let storages = self.storages.clone();
		let n = self.metatile_n;
		self.listeners.push(std::thread::spawn(move || {
			for stream in listener.incoming().flatten() {
				let queue = queue.clone();
				let storages = storages.clone();
				std::thread::spawn(move || handle_connection(stream, &queue, &storages, n));
			}
		}));
		Ok(())
	}

	pub fn listen_tcp(&mut self, hostname: &str, port: u16) -> Result<()> {
		let addr = format!("{hostname}:{port}");
		let listener = TcpListener::bind(&addr).with_context(|| format!("binding tcp socket {addr}"))?;
		info!("listening on tcp {addr}");
		let queue = self.queue.clone();
		let storages = self.storages.clone();
		let n = self.metatile_n;
		self.listeners.push(std::thread::spawn(move || {
			for stream in listener.incoming().flatten() {
				let _ = stream.set_nodelay(true);
				let queue = queue.clone();
				let storages = storages.clone();
				std::thread::spawn(move || handle_connection(stream, &queue, &storages, n));
			}
		}));
		Ok(())
	}

	/// Blocks forever (or until the process is killed) keeping the accept
	/// threads alive. Accept loops never return on their own, so this just
	/// joins them to keep `main` from exiting.
	pub fn join(self) {
		for handle in self.listeners {
			let _ = handle.join();
		}
	}
}

trait Stream: Read + Write + Send {}
impl Stream for UnixStream {}
impl Stream for TcpStream {}

fn handle_connection(mut stream: impl Stream, queue: &RequestQueue, storages: &HashMap<String, Arc<dyn StorageBackend>>, n: u8) {
	loop {
		let request = match read_request(&mut stream) {
			Ok(Some(req)) => req,
			Ok(None) => return,
			Err(e) => {
				debug!("closing connection after malformed record: {e:#}");
				return;
			}
		};

		let Some(priority) = request.cmd.priority() else {
			debug!("ignoring non-request command {:?}", request.cmd);
			continue;
		};
		if !storages.contains_key(request.style.as_str()) {
			warn!("request for unknown style '{}'", request.style.as_str());
			let _ = write_reply(&mut stream, &request, Command::NotDone);
			continue;
		}

		let Ok(coord) = request.coord() else {
			let _ = write_reply(&mut stream, &request, Command::NotDone);
			continue;
		};
		let aligned = coord.aligned(n);
		let fp = Fingerprint {
			style: request.style.as_str().to_string(),
			options: request.options.as_ref().map_or(String::new(), |o| o.as_str().to_string()),
			x: aligned.x,
			y: aligned.y,
			z: aligned.z,
		};

		// Dirty requests are never added as waiters (spec §4.4): the daemon
		// acknowledges immediately with `Done` ("accepted for later") and
		// pushes the fingerprint onto the Dirty queue if not already in
		// flight, rather than blocking the connection on a render.
		if request.cmd == Command::Dirty {
			queue.enqueue(fp, priority, None);
			let _ = write_reply(&mut stream, &request, Command::Done);
			continue;
		}

		let (tx, rx) = channel();
		match queue.enqueue(fp, priority, Some(tx)) {
			EnqueueOutcome::Full => {
				let _ = write_reply(&mut stream, &request, Command::NotDone);
				continue;
			}
			EnqueueOutcome::Created | EnqueueOutcome::Attached => {}
		}

		let done = rx.recv_timeout(RENDER_DEADLINE).unwrap_or(false);
		let reply_cmd = if done { Command::Done } else { Command::NotDone };
		if write_reply(&mut stream, &request, reply_cmd).is_err() {
			return;
		}
	}
}

fn read_request(stream: &mut impl Read) -> Result<Option<RenderRequest>> {
	let mut prefix = vec![0u8; ProtocolVersion::v1_prefix_len()];
	if let Err(e) = stream.read_exact(&mut prefix) {
		if e.kind() == std::io::ErrorKind::UnexpectedEof {
			return Ok(None);
		}
		return Err(e).context("reading wire record prefix");
	}

	let version = RenderRequest::peek_version(&prefix)?;
	let total_len = version.record_len();
	let mut full = prefix;
	full.resize(total_len, 0);
	stream.read_exact(&mut full[ProtocolVersion::v1_prefix_len()..]).context("reading wire record tail")?;

	RenderRequest::decode(&full).map(Some)
}

fn write_reply(stream: &mut impl Write, request: &RenderRequest, cmd: Command) -> Result<()> {
	let reply = request.reply(cmd);
	let bytes = reply.encode()?;
	stream.write_all(&bytes).context("writing wire reply")
}
