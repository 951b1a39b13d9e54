//! CORS origin matching, applied per tile layer (each layer carries its own
//! `cors_policy`, so there is no single process-wide origin allowlist to
//! build a `tower_http::cors::CorsLayer` from — `handlers.rs`'s
//! `cors_preflight`/`read_and_respond` consult [`origin_allowed`] directly,
//! once per layer, instead).
//!
//! Supports the following `allowed_origins` patterns (strings):
//! - `"*"`                     → allow all origins
//! - `"*.example.com"`        → suffix match (implemented as `*example.com`)
//! - `"https://example.com*"` → prefix match
//! - `"/^https://(foo|bar)\.example\.com$/"` → custom regex (leading and trailing `/`)
//! - exact strings like `"https://maps.example.org"`

use anyhow::Result;
use regex::Regex;

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync + 'static>;

fn compile_checks(allowed_origins: &[String]) -> Result<Vec<Predicate>> {
	allowed_origins
		.iter()
		.map(|pattern| {
			Ok::<Predicate, anyhow::Error>(if pattern == "*" {
				// Allow everything.
				Box::new(|_: &str| true)
			} else if Regex::new(r"^\*[^*]+$")?.is_match(pattern) {
				// "*suffix" → suffix match
				let suffix = pattern[1..].to_string();
				Box::new(move |origin: &str| origin.ends_with(&suffix))
			} else if Regex::new(r"^[^*]+\*$")?.is_match(pattern) {
				// "prefix*" → prefix match
				let prefix = pattern[..pattern.len() - 1].to_string();
				Box::new(move |origin: &str| origin.starts_with(&prefix))
			} else if Regex::new(r"^/.+/$")?.is_match(pattern) {
				// "/regex/" → full regex (strip slashes)
				let re = Regex::new(&pattern[1..pattern.len() - 1])?;
				Box::new(move |origin: &str| re.is_match(origin))
			} else {
				// Exact match
				let exact = pattern.clone();
				Box::new(move |origin: &str| origin == exact)
			})
		})
		.collect()
}

/// Whether `origin` is allowed by a layer's `cors_policy` (spec §4.6 step 6).
#[must_use]
pub fn origin_allowed(origin: &str, allowed_origins: &[String]) -> bool {
	match compile_checks(allowed_origins) {
		Ok(checks) => checks.iter().any(|f| f(origin)),
		Err(_) => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exact_match() {
		let origins = ["https://maps.example.org".to_string()];
		assert!(origin_allowed("https://maps.example.org", &origins));
		assert!(!origin_allowed("https://maps.example.com", &origins));
	}

	#[test]
	fn star_all() {
		let origins = ["*".to_string()];
		assert!(origin_allowed("http://anything.local", &origins));
		assert!(origin_allowed("https://whatever.example", &origins));
	}

	#[test]
	fn suffix_match() {
		let origins = ["*example.com".to_string()];
		assert!(origin_allowed("https://foo.example.com", &origins));
		assert!(origin_allowed("https://bar.example.com", &origins));
		assert!(!origin_allowed("https://example.org", &origins));
	}

	#[test]
	fn prefix_match() {
		let origins = ["https://dev-*".to_string()];
		assert!(origin_allowed("https://dev-01.example.com", &origins));
		assert!(!origin_allowed("https://prod-01.example.com", &origins));
	}

	#[test]
	fn regex_match() {
		let origins = ["/^https://(foo|bar)\\.example\\.com$/".to_string()];
		assert!(origin_allowed("https://foo.example.com", &origins));
		assert!(origin_allowed("https://bar.example.com", &origins));
		assert!(!origin_allowed("https://baz.example.com", &origins));
	}
}
