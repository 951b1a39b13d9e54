//! Daemon configuration, loaded from a YAML file (spec §6.2/§9: the original
//! `renderd.conf` is INI; this port uses `serde_yaml_ng` to match the rest of
//! the toolchain's config handling, per `SPEC_FULL.md`).

use anyhow::{Context, Result};
use renderd_derive::context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_socket() -> Option<String> {
	Some("/run/renderd/renderd.sock".to_string())
}

fn default_num_threads() -> usize {
	num_cpus::get()
}

fn default_metatile_size() -> u8 {
	8
}

fn default_queue_capacity() -> usize {
	256
}

fn default_prio_to_normal_ratio() -> (u32, u32) {
	(3, 1)
}

/// One `[style]`-equivalent section: where a style's tiles are stored.
#[derive(Debug, Clone, Deserialize)]
pub struct StyleConfig {
	pub name: String,
	/// A `renderd_storage::open`-compatible URI.
	pub storage_uri: String,
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
	/// Unix domain socket path to listen on. Mutually usable alongside `ip_port`.
	#[serde(default = "default_socket")]
	pub socket_path: Option<String>,
	/// TCP bind address, e.g. `"0.0.0.0"`. `None` disables the TCP listener.
	#[serde(default)]
	pub ip_hostname: Option<String>,
	#[serde(default)]
	pub ip_port: Option<u16>,
	#[serde(default = "default_num_threads")]
	pub num_threads: usize,
	#[serde(default = "default_metatile_size")]
	pub metatile_size: u8,
	#[serde(default = "default_queue_capacity")]
	pub queue_capacity: usize,
	/// How many Prio requests are dequeued for every `n` Normal requests
	/// (spec §4.4), so neither queue starves the other.
	#[serde(default = "default_prio_to_normal_ratio")]
	pub prio_to_normal_ratio: (u32, u32),
	pub styles: Vec<StyleConfig>,
	#[serde(default)]
	pub stats_file: Option<PathBuf>,
}

impl DaemonConfig {
	#[context("loading daemon config from '{}'", path.as_ref().display())]
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let text = std::fs::read_to_string(path.as_ref()).context("reading config file")?;
		let config: DaemonConfig = serde_yaml_ng::from_str(&text).context("parsing config YAML")?;
		if config.socket_path.is_none() && config.ip_port.is_none() {
			anyhow::bail!("config must set at least one of socket_path or ip_port");
		}
		if config.styles.is_empty() {
			anyhow::bail!("config must declare at least one style");
		}
		Ok(config)
	}

	#[must_use]
	pub fn queue_caps(&self) -> [usize; 5] {
		[self.queue_capacity; 5]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_a_minimal_config() {
		let yaml = r"
socket_path: /tmp/renderd.sock
styles:
  - name: osm
    storage_uri: /tmp/tiles
";
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("renderd.yaml");
		std::fs::write(&path, yaml).unwrap();

		let config = DaemonConfig::load(&path).unwrap();
		assert_eq!(config.styles.len(), 1);
		assert_eq!(config.metatile_size, 8);
		assert_eq!(config.prio_to_normal_ratio, (3, 1));
	}

	#[test]
	fn rejects_a_config_with_no_listener() {
		let yaml = r"
socket_path: null
styles:
  - name: osm
    storage_uri: /tmp/tiles
";
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("renderd.yaml");
		std::fs::write(&path, yaml).unwrap();
		assert!(DaemonConfig::load(&path).is_err());
	}

	#[test]
	fn rejects_a_config_with_no_styles() {
		let yaml = "socket_path: /tmp/renderd.sock\nstyles: []\n";
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("renderd.yaml");
		std::fs::write(&path, yaml).unwrap();
		assert!(DaemonConfig::load(&path).is_err());
	}
}
