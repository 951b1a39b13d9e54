//! The tile-GET request pipeline: parse, stat,
//! classify, throttle, dispatch to the render daemon if needed, then serve
//! bytes with cache headers, CORS and observability counters.

use crate::cors::origin_allowed;
use crate::daemon_client::DaemonClient;
use crate::stats::{CacheClass, StatsCounters};
use crate::tile_lookup::{self, Suffix};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use renderd_core::{Command, RenderOptions, Style, TileState, load_average};
use renderd_storage::StorageBackend;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::config::TileLayerConfig;
use crate::state::{AppState, LayerRuntime};

/// Penalty sleep applied before replying `404` to a syntactically-malformed
/// request, to discourage URL-guessing scans.
const CLIENT_PENALTY: Duration = Duration::from_millis(50);

pub async fn serve_layer_tile(
	State(state): State<AppState>,
	Path((layer_name, rest)): Path<(String, String)>,
	headers: HeaderMap,
	ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
	let Some(runtime) = state.layers.get(&layer_name).map(|r| r.clone()) else {
		return not_found();
	};

	let Some(parsed) = tile_lookup::parse(&runtime.config, &rest) else {
		tokio::time::sleep(CLIENT_PENALTY).await;
		return not_found();
	};

	match parsed.suffix {
		Suffix::Status => serve_status(&state, &runtime, &parsed.options, parsed.coord).await,
		Suffix::Dirty => serve_dirty(&state, &runtime, &parsed.options, parsed.coord).await,
		Suffix::None => serve_tile(&state, &runtime, &headers, peer.ip(), &parsed.options, parsed.coord).await,
	}
}

async fn serve_status(state: &AppState, runtime: &LayerRuntime, options: &str, coord: renderd_core::TileCoord) -> Response {
	let storage = runtime.storage.clone();
	let layer_name = runtime.config.name.clone();
	let options_owned = options.to_string();
	let stat = tokio::task::spawn_blocking(move || storage.stat(&layer_name, &options_owned, coord))
		.await
		.unwrap_or_else(|e| Err(anyhow::anyhow!(e)));

	match stat {
		Ok(record) => {
			let tile_state = record.classify(SystemTime::now(), Duration::from_secs(runtime.config.very_old_threshold_secs));
			let text = format!(
				"z={} x={} y={} size={} state={:?}\n",
				coord.z, coord.x, coord.y, record.size, tile_state
			);
			(StatusCode::OK, text).into_response()
		}
		Err(e) => {
			log::warn!("status stat failed: {e:#}");
			internal_error()
		}
	}
}

async fn serve_dirty(state: &AppState, runtime: &LayerRuntime, options: &str, coord: renderd_core::TileCoord) -> Response {
	if !runtime.config.enable_dirty_url {
		return not_found();
	}
	let Ok(style) = Style::new(runtime.config.name.clone()) else {
		return internal_error();
	};
	let _ = RenderOptions::new(options);
	state.daemon.notify_dirty(&style, coord).await;
	state.stats.record_render_enqueued();
	(StatusCode::OK, "submitted\n").into_response()
}

async fn serve_tile(
	state: &AppState,
	runtime: &LayerRuntime,
	headers: &HeaderMap,
	client_ip: std::net::IpAddr,
	options: &str,
	coord: renderd_core::TileCoord,
) -> Response {
	let start = Instant::now();
	let layer = &runtime.config;
	let storage = runtime.storage.clone();
	let layer_name = layer.name.clone();
	let options_owned = options.to_string();

	let stat = {
		let storage = storage.clone();
		let layer_name = layer_name.clone();
		let options_owned = options_owned.clone();
		tokio::task::spawn_blocking(move || storage.stat(&layer_name, &options_owned, coord)).await
	};
	let read_latency_us = start.elapsed().as_micros() as u64;

	let record = match stat {
		Ok(Ok(r)) => r,
		_ => {
			log::warn!("stat failed for {layer_name} {coord:?}");
			state.stats.record(500, coord.z, &layer.name, None, read_latency_us);
			return internal_error();
		}
	};

	let tile_state = record.classify(SystemTime::now(), Duration::from_secs(layer.very_old_threshold_secs));
	let needs_render = !matches!(tile_state, TileState::Current);

	if !state.throttle.try_consume(client_ip, needs_render, Instant::now()) {
		state.stats.record(503, coord.z, &layer.name, None, read_latency_us);
		return (StatusCode::SERVICE_UNAVAILABLE, "throttled\n").into_response();
	}

	let Ok(style) = Style::new(layer.name.clone()) else {
		return internal_error();
	};
	let render_options = RenderOptions::new(options).unwrap_or_default();

	let load = load_average();
	let overloaded_old = load > state.max_load_old;
	let overloaded_missing = load > state.max_load_missing;

	match tile_state {
		TileState::Current => {
			state.stats.record(200, coord.z, &layer.name, Some(CacheClass::Fresh), read_latency_us);
			read_and_respond(state, runtime, &style, &render_options, coord, headers, false, read_latency_us).await
		}
		TileState::Old => {
			if overloaded_old {
				state.daemon.notify_dirty(&style, coord).await;
				state.stats.record_render_enqueued();
			} else {
				let deadline = state.request_timeout;
				let _ = state.daemon.request(Command::RenderLow, &style, coord, deadline).await;
			}
			state.stats.record(200, coord.z, &layer.name, Some(CacheClass::Stale), read_latency_us);
			read_and_respond(state, runtime, &style, &render_options, coord, headers, true, read_latency_us).await
		}
		TileState::VeryOld => {
			if overloaded_old {
				state.daemon.notify_dirty(&style, coord).await;
				state.stats.record_render_enqueued();
			} else {
				let deadline = state.request_timeout;
				let _ = state.daemon.request(Command::Render, &style, coord, deadline).await;
			}
			state.stats.record(200, coord.z, &layer.name, Some(CacheClass::Stale), read_latency_us);
			read_and_respond(state, runtime, &style, &render_options, coord, headers, true, read_latency_us).await
		}
		TileState::Missing => {
			if overloaded_missing {
				state.daemon.notify_dirty(&style, coord).await;
				state.stats.record_render_enqueued();
				state.stats.record(404, coord.z, &layer.name, None, read_latency_us);
				return not_found();
			}
			let deadline = state.request_timeout_priority;
			let reply = state.daemon.request(Command::RenderPrio, &style, coord, deadline).await.unwrap_or(Command::NotDone);
			if reply != Command::Done {
				state.stats.record(404, coord.z, &layer.name, None, read_latency_us);
				return not_found();
			}
			state.stats.record(200, coord.z, &layer.name, Some(CacheClass::Fresh), read_latency_us);
			read_and_respond(state, runtime, &style, &render_options, coord, headers, false, read_latency_us).await
		}
	}
}

#[allow(clippy::too_many_arguments)]
async fn read_and_respond(
	state: &AppState,
	runtime: &LayerRuntime,
	style: &Style,
	options: &RenderOptions,
	coord: renderd_core::TileCoord,
	headers: &HeaderMap,
	stale: bool,
	_read_latency_us: u64,
) -> Response {
	let storage = runtime.storage.clone();
	let style_name = style.as_str().to_string();
	let options_str = options.as_str().to_string();
	let max_size = state.max_tile_size;

	let read = tokio::task::spawn_blocking(move || storage.read(&style_name, &options_str, coord)).await;

	let bytes = match read {
		Ok(Ok(Some(tile))) if tile.bytes.len() <= max_size => tile.bytes,
		Ok(Ok(Some(_))) => return (StatusCode::INTERNAL_SERVER_ERROR, "tile exceeds max size\n").into_response(),
		Ok(Ok(None)) => return not_found(),
		_ => return internal_error(),
	};

	let etag = format!("\"{:x}\"", md5::compute(&bytes));
	let if_none_match = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok());
	if if_none_match == Some(etag.as_str()) {
		return StatusCode::NOT_MODIFIED.into_response();
	}

	let max_age = cache_max_age(&runtime.config, coord.z, stale, headers);

	let mut response = Bytes::from(bytes).into_response();
	response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_str(&runtime.config.mime_type).unwrap());
	response
		.headers_mut()
		.insert(header::CACHE_CONTROL, HeaderValue::from_str(&format!("public, max-age={max_age}")).unwrap());
	if let Ok(value) = HeaderValue::from_str(&etag) {
		response.headers_mut().insert(header::ETAG, value);
	}

	if !runtime.config.cors_policy.is_empty() {
		if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
			if origin_allowed(origin, &runtime.config.cors_policy) {
				if let Ok(value) = HeaderValue::from_str(origin) {
					response.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
				}
				response.headers_mut().insert(header::VARY, HeaderValue::from_static("Origin"));
			}
		}
	}

	response
}

/// Zoom-banded `max-age` with a random age factor and jitter, clamped to
/// `cache_duration_max`; stale tiles use the shorter `cache_duration_dirty`
/// window instead. A `Host` header matching one of the
/// layer's configured `hostnames` substitutes `cache_extended_duration`.
fn cache_max_age(layer: &TileLayerConfig, zoom: u8, stale: bool, headers: &HeaderMap) -> u64 {
	if let Some(extended) = layer.cache_extended_duration {
		if let Some(host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
			if layer.hostnames.iter().any(|h| h == host) {
				return extended;
			}
		}
	}

	if stale {
		let jitter = rand::random::<u64>() % layer.cache_duration_dirty.max(1);
		return layer.cache_duration_dirty + jitter;
	}

	// Higher zooms churn less; band max-age roughly proportional to zoom,
	// then perturb with a random age factor so caches don't expire in lockstep.
	let base = 60u64 * u64::from(zoom + 1);
	let age_factor = 0.5 + rand::random::<f64>();
	let with_factor = (base as f64 * age_factor) as u64;
	let jitter = rand::random::<u64>() % 30;
	(with_factor + jitter).min(layer.cache_duration_max)
}

fn not_found() -> Response {
	(StatusCode::NOT_FOUND, "not found\n").into_response()
}

fn internal_error() -> Response {
	(StatusCode::INTERNAL_SERVER_ERROR, "internal error\n").into_response()
}

pub async fn mod_tile_status(State(state): State<AppState>) -> Response {
	(StatusCode::OK, state.stats.render_text()).into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
	(StatusCode::OK, state.stats.render_prometheus()).into_response()
}

pub async fn healthz() -> Response {
	(StatusCode::OK, "ok\n").into_response()
}

/// Answers a CORS preflight: an `OPTIONS` request carrying
/// `Access-Control-Request-Method` gets the origin echoed back (if allowed by
/// the layer's `cors_policy`), its requested headers echoed, and a fixed
/// `Access-Control-Max-Age: 604800`.
pub async fn cors_preflight(State(state): State<AppState>, Path((layer_name, _rest)): Path<(String, String)>, headers: HeaderMap) -> Response {
	let Some(runtime) = state.layers.get(&layer_name).map(|r| r.clone()) else {
		return StatusCode::NO_CONTENT.into_response();
	};
	let cors_policy = &runtime.config.cors_policy;
	if cors_policy.is_empty() || headers.get(header::ACCESS_CONTROL_REQUEST_METHOD).is_none() {
		return StatusCode::NO_CONTENT.into_response();
	}
	let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
		return StatusCode::NO_CONTENT.into_response();
	};
	if !origin_allowed(origin, cors_policy) {
		return StatusCode::NO_CONTENT.into_response();
	}

	let mut response = StatusCode::NO_CONTENT.into_response();
	if let Ok(value) = HeaderValue::from_str(origin) {
		response.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
	}
	if let Some(requested_headers) = headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
		response.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested_headers.clone());
	}
	response
		.headers_mut()
		.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("604800"));
	response
}

pub async fn tile_layer_json(State(state): State<AppState>, Path(layer_name): Path<String>) -> Response {
	let Some(runtime) = state.layers.get(&layer_name).map(|r| r.clone()) else {
		return not_found();
	};
	let layer = &runtime.config;
	let doc = serde_json::json!({
		"tilejson": "2.0.0",
		"name": layer.name,
		"description": layer.description,
		"attribution": layer.attribution,
		"minzoom": layer.minzoom,
		"maxzoom": layer.maxzoom,
		"tiles": [format!("{}/{{z}}/{{x}}/{{y}}.{}", layer.base_uri, layer.file_extension)],
	});
	axum::Json(doc).into_response()
}
