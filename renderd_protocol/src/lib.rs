//! The render-daemon wire protocol (spec §4.1/§6.1): fixed-layout command
//! records exchanged over a stream socket (Unix domain or TCP).
//!
//! Versions v1/v2/v3 differ only by trailing optional fields (`mime`,
//! `options`); a receiver reads the fixed v1 prefix first, inspects
//! `version`, then reads the rest of the record for v2/v3. Senders always
//! send exactly one version; unknown versions are a [`ProtocolError`] the
//! caller turns into "close the connection" (spec §7, malformed input).
//!
//! Integers are encoded little-endian (spec §6.1 permits host-endian single-site
//! deployments; little-endian is chosen here for a deterministic, portable
//! encoding — see `DESIGN.md`). String fields are fixed-size, NUL-terminated,
//! zero-padded `[u8; 41]` buffers, matching the original `char style[41]`.

use anyhow::{Context as _, bail};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use renderd_core::{Command, RenderOptions, Style, TileCoord};
use std::io::{Cursor, Read, Write};

/// Width of each fixed string field (`style`, `mime`, `options`): 40 data
/// bytes plus a NUL, matching the wire record's `char[41]`.
pub const FIELD_LEN: usize = 41;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
	V1,
	V2,
	V3,
}

impl ProtocolVersion {
	#[must_use]
	pub fn as_i32(self) -> i32 {
		match self {
			ProtocolVersion::V1 => 1,
			ProtocolVersion::V2 => 2,
			ProtocolVersion::V3 => 3,
		}
	}

	pub fn from_i32(value: i32) -> anyhow::Result<Self> {
		Ok(match value {
			1 => ProtocolVersion::V1,
			2 => ProtocolVersion::V2,
			3 => ProtocolVersion::V3,
			other => bail!("unknown protocol version {other}"),
		})
	}

	/// Total record length on the wire for this version, including the
	/// fixed `{version, cmd, x, y, z}` prefix and every trailing field.
	#[must_use]
	pub fn record_len(self) -> usize {
		let base = 5 * 4 + FIELD_LEN; // version, cmd, x, y, z, style
		match self {
			ProtocolVersion::V1 => base,
			ProtocolVersion::V2 => base + FIELD_LEN,
			ProtocolVersion::V3 => base + 2 * FIELD_LEN,
		}
	}

	/// Length of just the fixed v1 prefix every version shares; a receiver
	/// reads this many bytes first to learn `version`, then reads the rest.
	#[must_use]
	pub fn v1_prefix_len() -> usize {
		ProtocolVersion::V1.record_len()
	}
}

/// A parsed render command record (spec §3/§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
	pub version: ProtocolVersion,
	pub cmd: Command,
	pub x: u32,
	pub y: u32,
	pub z: u8,
	pub style: Style,
	/// Present only for v2 and v3 records.
	pub mime: Option<String>,
	/// Present only for v3 records.
	pub options: Option<RenderOptions>,
}

impl RenderRequest {
	#[must_use]
	pub fn coord(&self) -> anyhow::Result<TileCoord> {
		TileCoord::new(self.z, self.x, self.y)
	}

	/// Peeks the version out of the first 4 little-endian bytes of a record,
	/// without consuming or validating the rest. Callers use this to decide
	/// how many additional bytes to read from the socket.
	pub fn peek_version(prefix: &[u8]) -> anyhow::Result<ProtocolVersion> {
		if prefix.len() < 4 {
			bail!("record too short to contain a version field");
		}
		let raw = i32::from_le_bytes(prefix[0..4].try_into().unwrap());
		ProtocolVersion::from_i32(raw).context("parsing wire record version")
	}

	/// Decodes a complete record. `bytes.len()` must equal exactly
	/// `version.record_len()` for the version encoded in the first 4 bytes;
	/// a mismatch is a malformed-input error (spec §7), never a panic.
	pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
		let version = Self::peek_version(bytes)?;
		let expected = version.record_len();
		if bytes.len() != expected {
			bail!("record size {} does not match expected {expected} for {version:?}", bytes.len());
		}

		let mut cursor = Cursor::new(bytes);
		let _version_raw = cursor.read_i32::<LittleEndian>()?;
		let cmd_raw = cursor.read_i32::<LittleEndian>()?;
		let cmd = Command::from_i32(cmd_raw).ok_or_else(|| anyhow::anyhow!("unknown command code {cmd_raw}"))?;
		let x = cursor.read_i32::<LittleEndian>()?;
		let y = cursor.read_i32::<LittleEndian>()?;
		let z = cursor.read_i32::<LittleEndian>()?;
		if x < 0 || y < 0 || !(0..=255).contains(&z) {
			bail!("negative or out-of-range coordinate in wire record: x={x} y={y} z={z}");
		}
		let style = Style::new(read_field(&mut cursor)?)?;

		let mime = if matches!(version, ProtocolVersion::V2 | ProtocolVersion::V3) {
			Some(read_field(&mut cursor)?)
		} else {
			None
		};
		let options = if version == ProtocolVersion::V3 {
			Some(RenderOptions::new(read_field(&mut cursor)?)?)
		} else {
			None
		};

		Ok(RenderRequest {
			version,
			cmd,
			x: x as u32,
			y: y as u32,
			z: z as u8,
			style,
			mime,
			options,
		})
	}

	/// Encodes this record at exactly its own `version`'s length. A server
	/// replying to a client must echo the client's version (spec §4.1: "must
	/// accept a v2 client and respond with a v2 reply, never widening").
	pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
		let mut out = Cursor::new(Vec::with_capacity(self.version.record_len()));
		out.write_i32::<LittleEndian>(self.version.as_i32())?;
		out.write_i32::<LittleEndian>(self.cmd.as_i32())?;
		out.write_i32::<LittleEndian>(i32::try_from(self.x)?)?;
		out.write_i32::<LittleEndian>(i32::try_from(self.y)?)?;
		out.write_i32::<LittleEndian>(i32::from(self.z))?;
		write_field(&mut out, self.style.as_str())?;

		if matches!(self.version, ProtocolVersion::V2 | ProtocolVersion::V3) {
			write_field(&mut out, self.mime.as_deref().unwrap_or(""))?;
		}
		if self.version == ProtocolVersion::V3 {
			write_field(&mut out, self.options.as_ref().map_or("", RenderOptions::as_str))?;
		}

		let bytes = out.into_inner();
		debug_assert_eq!(bytes.len(), self.version.record_len());
		Ok(bytes)
	}

	/// Builds a reply record of the same version and coordinate as `self`,
	/// carrying `cmd` (`Done` or `NotDone`) — the shape every waiter receives
	/// when a render completes (spec §4.4).
	#[must_use]
	pub fn reply(&self, cmd: Command) -> RenderRequest {
		RenderRequest {
			version: self.version,
			cmd,
			x: self.x,
			y: self.y,
			z: self.z,
			style: self.style.clone(),
			mime: self.mime.clone(),
			options: self.options.clone(),
		}
	}
}

fn read_field(cursor: &mut Cursor<&[u8]>) -> anyhow::Result<String> {
	let mut buf = [0u8; FIELD_LEN];
	cursor.read_exact(&mut buf)?;
	let nul_at = buf.iter().position(|&b| b == 0).unwrap_or(FIELD_LEN);
	Ok(String::from_utf8_lossy(&buf[..nul_at]).into_owned())
}

fn write_field(out: &mut Cursor<Vec<u8>>, value: &str) -> anyhow::Result<()> {
	if value.len() >= FIELD_LEN {
		bail!("field '{value}' too long for {FIELD_LEN}-byte wire field");
	}
	let mut buf = [0u8; FIELD_LEN];
	buf[..value.len()].copy_from_slice(value.as_bytes());
	out.write_all(&buf)?;
	Ok(())
}
