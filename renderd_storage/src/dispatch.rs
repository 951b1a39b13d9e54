//! Storage backend factory: parses a storage URI and
//! constructs the matching [`StorageBackend`]. The dispatcher is open to
//! extension — a new scheme prefix is a new match arm, never a change to
//! callers.
//!
//! `s3://` construction here always backs onto [`InMemoryObjectStore`]: this
//! workspace deliberately keeps the object-store backend generic over
//! [`ObjectStoreClient`] rather than depending on a concrete cloud SDK (see
//! `DESIGN.md`). A deployment wiring in a real S3 client constructs
//! [`ObjectStoreBackend`] directly with that client instead of going through
//! this factory.

use crate::backend::StorageBackend;
use crate::backends::{CompositeBackend, FileBackend, HttpProxyBackend, InMemoryObjectStore, NullBackend, ObjectStoreBackend};
use anyhow::{Result, bail, ensure};

/// Parses `uri` per the storage URI grammar and constructs the
/// matching backend. `n` is the metatile edge length backends that store
/// whole metatiles (file, object-store) align and key their paths by.
pub fn open(uri: &str, n: u8) -> Result<Box<dyn StorageBackend>> {
	if let Some(rest) = uri.strip_prefix("file://") {
		return Ok(Box::new(FileBackend::new(rest, n)));
	}
	if let Some(rest) = uri.strip_prefix("s3://") {
		let (keyid_secret_host, bucket_prefix) = rest.split_once('/').ok_or_else(|| anyhow::anyhow!("s3 URI missing bucket: {uri}"))?;
		ensure!(!bucket_prefix.is_empty(), "s3 URI missing bucket: {uri}");
		let _ = keyid_secret_host; // credentials/host are consumed by the real SDK client, not the fake.
		return Ok(Box::new(ObjectStoreBackend::new(InMemoryObjectStore::new(), n)));
	}
	if let Some(rest) = uri.strip_prefix("ro_http_proxy://") {
		return Ok(Box::new(HttpProxyBackend::new(format!("https://{rest}"), "png")));
	}
	if let Some(rest) = uri.strip_prefix("composite:") {
		let (primary_uri, secondary_uri) = split_composite(rest)?;
		let primary = open(&primary_uri, n)?;
		let secondary = open(&secondary_uri, n)?;
		return Ok(Box::new(CompositeBackend::new(primary, secondary)));
	}
	if uri == "null://" || uri.starts_with("null://") {
		return Ok(Box::new(NullBackend));
	}
	if !uri.contains("://") {
		// A bare path is an implicit file:// backend.
		return Ok(Box::new(FileBackend::new(uri, n)));
	}
	bail!("unrecognized storage URI scheme: {uri}")
}

/// Splits `"{primary}{secondary}"` (the text after `composite:`) into its two
/// brace-delimited URIs, respecting nested braces inside either sub-URI.
fn split_composite(rest: &str) -> Result<(String, String)> {
	let mut uris = Vec::new();
	let mut depth = 0i32;
	let mut current = String::new();
	let mut started = false;

	for ch in rest.chars() {
		match ch {
			'{' => {
				if depth > 0 {
					current.push(ch);
				}
				depth += 1;
				started = true;
			}
			'}' => {
				depth -= 1;
				if depth < 0 {
					bail!("unbalanced braces in composite URI: {rest}");
				}
				if depth == 0 {
					uris.push(std::mem::take(&mut current));
				} else {
					current.push(ch);
				}
			}
			_ => current.push(ch),
		}
	}
	ensure!(started && depth == 0, "malformed composite URI: {rest}");
	ensure!(uris.len() == 2, "composite URI needs exactly two sub-URIs, got {}: {rest}", uris.len());
	Ok((uris.remove(0), uris.remove(0)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dispatches_file_scheme() {
		assert!(open("file:///tmp/tiles", 8).is_ok());
	}

	#[test]
	fn bare_path_is_implicit_file_backend() {
		assert!(open("/tmp/tiles", 8).is_ok());
	}

	#[test]
	fn dispatches_null_scheme() {
		assert!(open("null://", 8).is_ok());
	}

	#[test]
	fn dispatches_http_proxy_scheme() {
		assert!(open("ro_http_proxy://tiles.example/osm", 8).is_ok());
	}

	#[test]
	fn dispatches_s3_scheme() {
		assert!(open("s3://key:secret@host/bucket/prefix", 8).is_ok());
	}

	#[test]
	fn rejects_s3_without_bucket() {
		assert!(open("s3://key:secret@host", 8).is_err());
	}

	#[test]
	fn dispatches_composite_scheme_with_nested_uris() {
		let uri = "composite:{file:///tmp/a}{file:///tmp/b}";
		assert!(open(uri, 8).is_ok());
	}

	#[test]
	fn rejects_unknown_scheme() {
		assert!(open("ftp://example.com/tiles", 8).is_err());
	}

	#[test]
	fn split_composite_handles_braces() {
		let (a, b) = split_composite("{file:///a}{file:///b}").unwrap();
		assert_eq!(a, "file:///a");
		assert_eq!(b, "file:///b");
	}
}
