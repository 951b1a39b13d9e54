//! Typed serving-frontend configuration, loaded via `serde_yaml_ng` matching
//! the daemon's config style: typed records, not a hand-rolled INI grammar.

use anyhow::{Context, Result};
use renderd_derive::context;
use serde::Deserialize;
use std::path::Path;

fn default_aspect() -> u32 {
	1
}

fn default_very_old_secs() -> u64 {
	7 * 24 * 3600
}

fn default_cache_duration_max() -> u64 {
	7 * 24 * 3600
}

fn default_cache_duration_dirty() -> u64 {
	15
}

fn default_max_size() -> usize {
	1 << 20
}

/// Defaults from the original `render_config.h`'s `MAX_LOAD_OLD`/`MAX_LOAD_MISSING`.
fn default_max_load_old() -> f64 {
	16.0
}
fn default_max_load_missing() -> f64 {
	50.0
}

/// One served tile layer: its URL prefix, storage, and policy knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct TileLayerConfig {
	pub name: String,
	/// URL path prefix this layer is mounted under, e.g. `/osm`.
	pub base_uri: String,
	#[serde(default = "default_extension")]
	pub file_extension: String,
	#[serde(default = "default_mime")]
	pub mime_type: String,
	#[serde(default)]
	pub minzoom: u8,
	#[serde(default = "default_maxzoom")]
	pub maxzoom: u8,
	#[serde(default = "default_aspect")]
	pub aspect_x: u32,
	#[serde(default = "default_aspect")]
	pub aspect_y: u32,
	/// Whether `{options}/` is accepted as a URL prefix segment.
	#[serde(default)]
	pub parameterized: bool,
	/// A `renderd_storage::open`-compatible URI.
	pub store_uri: String,
	#[serde(default)]
	pub attribution: String,
	#[serde(default)]
	pub description: String,
	/// Substring allowlist for `Origin`; `["*"]` allows any origin.
	#[serde(default)]
	pub cors_policy: Vec<String>,
	/// `Host` header values that get `cache_extended_duration` instead of
	/// the usual zoom-banded `max-age`.
	#[serde(default)]
	pub hostnames: Vec<String>,
	#[serde(default)]
	pub cache_extended_duration: Option<u64>,
	#[serde(default = "default_cache_duration_max")]
	pub cache_duration_max: u64,
	#[serde(default = "default_cache_duration_dirty")]
	pub cache_duration_dirty: u64,
	#[serde(default = "default_very_old_secs")]
	pub very_old_threshold_secs: u64,
	#[serde(default)]
	pub enable_dirty_url: bool,
}

fn default_extension() -> String {
	"png".to_string()
}
fn default_mime() -> String {
	"image/png".to_string()
}
fn default_maxzoom() -> u8 {
	18
}

/// Whole-process serving configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServeConfig {
	#[serde(default = "default_bind_host")]
	pub bind_host: String,
	#[serde(default = "default_bind_port")]
	pub bind_port: u16,
	/// `ip:port` or a Unix socket path of the render daemon.
	pub daemon_addr: String,
	pub layers: Vec<TileLayerConfig>,
	#[serde(default)]
	pub throttle_whitelist: Vec<std::net::Ipv4Addr>,
	#[serde(default = "default_max_size")]
	pub max_tile_size: usize,
	#[serde(default)]
	pub request_timeout_secs: Option<u64>,
	#[serde(default)]
	pub request_timeout_priority_secs: Option<u64>,
	/// Load-average ceiling past which an `Old` tile is served stale with
	/// only a background `Dirty` refresh, rather than blocking on a render
	/// (spec §4.6 step 4; original `MAX_LOAD_OLD`).
	#[serde(default = "default_max_load_old")]
	pub max_load_old: f64,
	/// Load-average ceiling past which a `Missing` tile is answered `404`
	/// with a background `Dirty` refresh, rather than blocking on
	/// `RenderPrio` (spec §4.6 step 4; original `MAX_LOAD_MISSING`).
	#[serde(default = "default_max_load_missing")]
	pub max_load_missing: f64,
}

fn default_bind_host() -> String {
	"0.0.0.0".to_string()
}
fn default_bind_port() -> u16 {
	8080
}

impl ServeConfig {
	#[context("loading tileserve config from '{}'", path.as_ref().display())]
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let text = std::fs::read_to_string(path.as_ref()).context("reading config file")?;
		let config: ServeConfig = serde_yaml_ng::from_str(&text).context("parsing config YAML")?;
		if config.layers.is_empty() {
			anyhow::bail!("config must declare at least one layer");
		}
		Ok(config)
	}
}
