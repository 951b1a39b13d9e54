//! Shared, cloneable request-handler state: one `AppState` handed to every
//! Axum handler via `State<AppState>`, keyed by layer name in a `DashMap`
//! for future hot add/remove of layers without restarting the process.

use crate::config::TileLayerConfig;
use crate::daemon_client::DaemonClient;
use crate::stats::StatsCounters;
use dashmap::DashMap;
use renderd_core::ThrottlePool;
use renderd_storage::StorageBackend;
use std::sync::Arc;
use std::time::Duration;

/// A configured tile layer plus the storage backend it was opened against.
#[derive(Clone)]
pub struct LayerRuntime {
	pub config: TileLayerConfig,
	pub storage: Arc<dyn StorageBackend>,
}

#[derive(Clone)]
pub struct AppState {
	pub layers: Arc<DashMap<String, Arc<LayerRuntime>>>,
	pub daemon: DaemonClient,
	pub throttle: Arc<ThrottlePool>,
	pub stats: Arc<StatsCounters>,
	pub max_tile_size: usize,
	pub request_timeout: Duration,
	pub request_timeout_priority: Duration,
	pub max_load_old: f64,
	pub max_load_missing: f64,
}
