pub mod config;
pub mod engine;
pub mod queue;
pub mod server;
pub mod worker;

pub use config::{DaemonConfig, StyleConfig};
pub use engine::{MockEngine, RenderEngine};
pub use queue::{EnqueueOutcome, Fingerprint, RequestQueue};
pub use server::Server;
pub use worker::WorkerPool;

use anyhow::Result;
use renderd_derive::context;
use renderd_storage::StorageBackend;
use std::collections::HashMap;
use std::sync::Arc;

/// Opens every configured style's storage backend, keyed by style name.
#[context("opening storage backends")]
pub fn open_storages(config: &DaemonConfig) -> Result<HashMap<String, Arc<dyn StorageBackend>>> {
	config
		.styles
		.iter()
		.map(|style| {
			let backend = renderd_storage::open(&style.storage_uri, config.metatile_size)?;
			Ok((style.name.clone(), Arc::from(backend)))
		})
		.collect()
}
