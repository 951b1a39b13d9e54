//! Short ASCII identifiers carried in the wire protocol's fixed-size `char[41]`
//! fields: the map `style` name and the per-request `options` string.

use anyhow::{Result, bail};

/// Fields in the wire protocol are `char[41]`: 40 data bytes plus a NUL.
pub const MAX_FIELD_LEN: usize = 40;

macro_rules! ascii_field {
	($name:ident, $what:literal) => {
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
		pub struct $name(String);

		impl $name {
			pub fn new(value: impl Into<String>) -> Result<Self> {
				let value = value.into();
				if value.len() > MAX_FIELD_LEN {
					bail!(concat!($what, " '{}' exceeds {} bytes"), value, MAX_FIELD_LEN);
				}
				if !value.is_ascii() {
					bail!(concat!($what, " '{}' must be ASCII"), value);
				}
				Ok($name(value))
			}

			#[must_use]
			pub fn as_str(&self) -> &str {
				&self.0
			}

			#[must_use]
			pub fn is_empty(&self) -> bool {
				self.0.is_empty()
			}
		}

		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl std::str::FromStr for $name {
			type Err = anyhow::Error;
			fn from_str(s: &str) -> Result<Self> {
				$name::new(s)
			}
		}
	};
}

ascii_field!(Style, "style name");
ascii_field!(RenderOptions, "options string");

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_overlong_names() {
		let too_long = "x".repeat(MAX_FIELD_LEN + 1);
		assert!(Style::new(too_long).is_err());
	}

	#[test]
	fn rejects_non_ascii() {
		assert!(Style::new("caf\u{e9}").is_err());
	}

	#[test]
	fn accepts_boundary_length() {
		let exact = "x".repeat(MAX_FIELD_LEN);
		assert!(Style::new(exact).is_ok());
	}

	#[test]
	fn empty_options_is_allowed() {
		let opts = RenderOptions::new("").unwrap();
		assert!(opts.is_empty());
	}
}
