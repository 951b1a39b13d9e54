//! The tile-serving frontend: routes tile requests to a layer,
//! classifies cache state, throttles, talks to the render daemon on a miss,
//! and serves bytes with cache/CORS headers plus the side endpoints (status,
//! dirty, stats, metrics, TileJSON).
//!
//! A `TileServeApp` owns the bound listener and a graceful-shutdown signal;
//! `start`/`stop` are idempotent, and global backpressure (`tower`'s
//! load-shed/concurrency limit/timeout stack) sits outside the router.

pub mod config;
pub mod cors;
pub mod daemon_client;
pub mod handlers;
pub mod state;
pub mod stats;
pub mod tile_lookup;

pub use config::{ServeConfig, TileLayerConfig};
pub use daemon_client::{DaemonAddr, DaemonClient};
pub use state::{AppState, LayerRuntime};
pub use stats::StatsCounters;

use anyhow::{Context, Result};
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{BoxError, Router};
use dashmap::DashMap;
use renderd_core::{ThrottleConfig, ThrottlePool};
use renderd_derive::context;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::{ServiceBuilder, buffer::BufferLayer, limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer};
use tower_http::catch_panic::CatchPanicLayer;

/// Default request deadlines when a config doesn't override them.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT_PRIORITY: Duration = Duration::from_secs(15);

/// Builds the `AppState` a running server needs, opening every configured
/// layer's storage backend. The DashMap is keyed by `base_uri` with its
/// leading slash stripped, since routing matches the first path segment
/// against a layer's `base_uri`.
#[context("building tileserve application state")]
pub fn build_state(config: &ServeConfig) -> Result<AppState> {
	let layers = Arc::new(DashMap::new());
	for layer in &config.layers {
		let key = layer.base_uri.trim_start_matches('/').to_string();
		let storage: Arc<dyn renderd_storage::StorageBackend> =
			Arc::from(renderd_storage::open(&layer.store_uri, 8).with_context(|| format!("opening storage for layer '{}'", layer.name))?);
		layers.insert(
			key,
			Arc::new(LayerRuntime {
				config: layer.clone(),
				storage,
			}),
		);
	}

	let throttle = Arc::new(ThrottlePool::new(ThrottleConfig::default(), config.throttle_whitelist.clone(), Instant::now()));

	Ok(AppState {
		layers,
		daemon: DaemonClient::new(DaemonAddr::parse(&config.daemon_addr)),
		throttle,
		stats: Arc::new(StatsCounters::new()),
		max_tile_size: config.max_tile_size,
		request_timeout: config.request_timeout_secs.map(Duration::from_secs).unwrap_or(DEFAULT_REQUEST_TIMEOUT),
		request_timeout_priority: config
			.request_timeout_priority_secs
			.map(Duration::from_secs)
			.unwrap_or(DEFAULT_REQUEST_TIMEOUT_PRIORITY),
		max_load_old: config.max_load_old,
		max_load_missing: config.max_load_missing,
	})
}

/// Assembles the Axum router: side endpoints plus the generic per-layer tile
/// route. One route pattern serves every layer; the handler looks the layer
/// up by its first path segment rather than the router dispatching on it, so
/// layers can be added/removed from the `DashMap` without rebuilding routes.
#[must_use]
pub fn build_router(state: AppState) -> Router {
	Router::new()
		.route("/healthz", get(handlers::healthz))
		.route("/mod_tile", get(handlers::mod_tile_status))
		.route("/metrics", get(handlers::metrics))
		.route("/{layer_name}/tile-layer.json", get(handlers::tile_layer_json))
		.route(
			"/{layer_name}/{*rest}",
			get(handlers::serve_layer_tile).options(handlers::cors_preflight),
		)
		.with_state(state)
}

/// Owns the bound listener and shutdown signal for a running `tileserve`
/// process, with an idempotent `start`/`stop` lifecycle so the frontend
/// can be embedded in tests without a subprocess.
pub struct TileServeApp {
	bind_host: String,
	bind_port: u16,
	state: AppState,
	exit_signal: Option<oneshot::Sender<()>>,
	join: Option<tokio::task::JoinHandle<()>>,
}

impl TileServeApp {
	#[must_use]
	pub fn new(config: &ServeConfig, state: AppState) -> Self {
		TileServeApp {
			bind_host: config.bind_host.clone(),
			bind_port: config.bind_port,
			state,
			exit_signal: None,
			join: None,
		}
	}

	/// Starts listening and serving requests. Idempotent: an already-running
	/// instance is stopped first so a restart never leaks a bound socket.
	#[context("starting tileserve")]
	pub async fn start(&mut self) -> Result<()> {
		if self.exit_signal.is_some() || self.join.is_some() {
			self.stop().await;
		}

		let router = build_router(self.state.clone());

		// Outermost-to-innermost: fail fast on overload, cap in-flight work,
		// bound the queue in front of the service, cap per-request wall time,
		// and never let a handler panic take the process down. Matches the
		// teacher's `tile_server.rs` protection stack.
		let overload_handler = HandleErrorLayer::new(|_err: BoxError| async move {
			Ok::<_, std::convert::Infallible>((StatusCode::SERVICE_UNAVAILABLE, "overloaded, try later\n").into_response())
		});
		let protection = ServiceBuilder::new()
			.layer(overload_handler)
			.layer(CatchPanicLayer::new())
			.layer(TimeoutLayer::new(Duration::from_secs(15)))
			.layer(BufferLayer::new(512))
			.layer(ConcurrencyLimitLayer::new(256))
			.layer(LoadShedLayer::new());
		let router = router.layer(protection);

		let addr = format!("{}:{}", self.bind_host, self.bind_port);
		log::info!("tileserve binding on {addr}");
		let listener = TcpListener::bind(&addr).await.context("binding tileserve listener")?;
		if self.bind_port == 0 {
			self.bind_port = listener.local_addr()?.port();
		}

		let (tx, rx) = oneshot::channel::<()>();
		let handle = tokio::spawn(async move {
			if let Err(err) = axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
				.with_graceful_shutdown(async {
					rx.await.ok();
				})
				.await
			{
				log::error!("tileserve task exited with error: {err}");
			}
		});

		self.exit_signal = Some(tx);
		self.join = Some(handle);
		Ok(())
	}

	/// Triggers graceful shutdown and waits (bounded) for in-flight requests
	/// to drain. Idempotent: a no-op if not running.
	pub async fn stop(&mut self) {
		if self.exit_signal.is_none() && self.join.is_none() {
			return;
		}
		log::info!("stopping tileserve");
		if let Some(tx) = self.exit_signal.take() {
			let _ = tx.send(());
		}
		if let Some(handle) = self.join.take() {
			match tokio::time::timeout(Duration::from_secs(10), handle).await {
				Ok(Ok(())) => {}
				Ok(Err(join_err)) => log::warn!("tileserve task join error: {join_err}"),
				Err(_) => log::warn!("tileserve task did not shut down within timeout; continuing"),
			}
		}
	}

	#[must_use]
	pub fn port(&self) -> u16 {
		self.bind_port
	}
}
