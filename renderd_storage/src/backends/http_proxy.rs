//! Read-through HTTP backend (`ro_http_proxy://` URIs).
//!
//! GETs a remote `.../z/x/y.{ext}`. Writes are unsupported. A small
//! per-instance tile cache avoids firing a duplicate GET when `stat` is
//! immediately followed by `read` for the same tile, which is the usual
//! access pattern from the serving frontend.

use crate::backend::{StorageBackend, TileRead};
use crate::codec::Metatile;
use anyhow::{Result, bail};
use renderd_core::{LimitedCache, StatRecord, TileCoord};
use std::sync::Mutex;
use std::time::SystemTime;

/// Bytes budgeted for the cache; well above a handful of PNG tiles but small
/// enough that a misbehaving upstream can't grow this backend unbounded.
const CACHE_SIZE_BYTES: usize = 16 * 1024 * 1024;

/// `None` cached against a key means the upstream returned 404 ("missing").
type CacheKey = (String, String, TileCoord);

pub struct HttpProxyBackend {
	base_url: String,
	client: reqwest::blocking::Client,
	extension: String,
	cache: Mutex<LimitedCache<CacheKey, Option<Vec<u8>>>>,
}

impl HttpProxyBackend {
	#[must_use]
	pub fn new(base_url: impl Into<String>, extension: impl Into<String>) -> Self {
		HttpProxyBackend {
			base_url: base_url.into(),
			client: reqwest::blocking::Client::new(),
			extension: extension.into(),
			cache: Mutex::new(LimitedCache::with_maximum_size(CACHE_SIZE_BYTES)),
		}
	}

	fn tile_url(&self, coord: TileCoord) -> String {
		format!(
			"{}/{}/{}/{}.{}",
			self.base_url.trim_end_matches('/'),
			coord.z,
			coord.x,
			coord.y,
			self.extension
		)
	}

	/// Fetches a tile, consulting and populating the cache.
	fn fetch(&self, style: &str, options: &str, coord: TileCoord) -> Result<Option<Vec<u8>>> {
		let key = (style.to_string(), options.to_string(), coord);
		if let Some(cached) = self.cache.lock().unwrap().get(&key) {
			return Ok(cached);
		}

		let url = self.tile_url(coord);
		let response = self.client.get(&url).send()?;
		let value = if response.status().is_success() {
			Some(response.bytes()?.to_vec())
		} else if response.status().as_u16() == 404 {
			None
		} else {
			bail!("ro_http_proxy GET {url} failed with status {}", response.status());
		};

		self.cache.lock().unwrap().add(key, value.clone());
		Ok(value)
	}
}

impl StorageBackend for HttpProxyBackend {
	fn read(&self, style: &str, options: &str, coord: TileCoord) -> Result<Option<TileRead>> {
		Ok(self
			.fetch(style, options, coord)?
			.map(|bytes| TileRead { bytes, compressed: false }))
	}

	fn stat(&self, style: &str, options: &str, coord: TileCoord) -> Result<StatRecord> {
		match self.fetch(style, options, coord)? {
			None => Ok(StatRecord::missing()),
			Some(bytes) => {
				let now = SystemTime::now();
				Ok(StatRecord {
					size: i64::try_from(bytes.len()).unwrap_or(i64::MAX),
					mtime: now,
					atime: now,
					ctime: now,
					expired: false,
				})
			}
		}
	}

	fn write_metatile(&self, _style: &str, _options: &str, _metatile: &Metatile) -> Result<()> {
		bail!("ro_http_proxy backend is read-only")
	}

	fn delete_metatile(&self, _style: &str, _coord: TileCoord) -> Result<()> {
		bail!("ro_http_proxy backend is read-only")
	}

	fn expire_metatile(&self, _style: &str, _coord: TileCoord) -> Result<()> {
		bail!("ro_http_proxy backend is read-only")
	}
}
