//! CLI entry point for the render daemon (spec §6.2).

use anyhow::Result;
use clap::Parser;
use log::info;
use renderd_daemon::{DaemonConfig, MockEngine, RenderEngine, RequestQueue, Server, WorkerPool};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "renderd", about = "Tile render daemon")]
struct Cli {
	/// Path to the daemon's YAML config file.
	#[arg(short, long, default_value = "/etc/renderd.yaml")]
	config: String,
	/// Run in the foreground instead of detaching (detaching is not
	/// implemented; this flag exists for command-line compatibility with the
	/// original daemon).
	#[arg(short = 'f', long)]
	foreground: bool,
}

fn main() -> Result<()> {
	env_logger::init();
	let cli = Cli::parse();
	if !cli.foreground {
		info!("running in the foreground regardless of -f (daemonizing is out of scope)");
	}

	let config = DaemonConfig::load(&cli.config)?;
	let storages = renderd_daemon::open_storages(&config)?;
	info!("serving styles: {}", storages.keys().cloned().collect::<Vec<_>>().join(", "));
	let shared_storages = Arc::new(storages.clone());

	let queue = Arc::new(RequestQueue::new(config.queue_caps(), config.prio_to_normal_ratio));
	let engine: Arc<dyn RenderEngine> = Arc::new(MockEngine::new());

	info!("starting {} render workers", config.num_threads);
	// Held for the process lifetime; `server.join()` below never returns in
	// normal operation, so the pool's JoinHandles outlive the accept loops too.
	let _pool = WorkerPool::spawn(config.num_threads, queue.clone(), engine, shared_storages, config.metatile_size);

	let mut server = Server::new(queue.clone(), storages, config.metatile_size);
	if let Some(socket_path) = &config.socket_path {
		server.listen_unix(socket_path)?;
	}
	if let (Some(hostname), Some(port)) = (&config.ip_hostname, config.ip_port) {
		server.listen_tcp(hostname, port)?;
	}

	server.join();
	Ok(())
}
