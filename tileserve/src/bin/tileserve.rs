//! CLI entry point for the tile-serving frontend.

use anyhow::Result;
use clap::Parser;
use log::info;
use tileserve::{ServeConfig, TileServeApp, build_state};

#[derive(Parser, Debug)]
#[command(name = "tileserve", about = "HTTP frontend serving rendered map tiles")]
struct Cli {
	/// Path to the frontend's YAML config file.
	#[arg(short, long, default_value = "/etc/tileserve.yaml")]
	config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	env_logger::init();
	let cli = Cli::parse();

	let config = ServeConfig::load(&cli.config)?;
	info!("serving layers: {}", config.layers.iter().map(|l| l.name.as_str()).collect::<Vec<_>>().join(", "));

	let state = build_state(&config)?;
	let mut app = TileServeApp::new(&config, state);
	app.start().await?;

	tokio::signal::ctrl_c().await.ok();
	info!("shutting down");
	app.stop().await;
	Ok(())
}
