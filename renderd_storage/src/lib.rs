//! The metatile storage layer: the binary packed-tile codec,
//! directory-hashed path construction, and a polymorphic storage backend
//! trait with one implementation per URI scheme.
//!
//! Backends are constructed through [`open`], which dispatches on the
//! scheme prefix of a storage URI. Callers that already know
//! their concrete backend (e.g. the render daemon configuring its own
//! write target) may construct one directly instead.

pub mod backend;
pub mod backends;
pub mod codec;
mod dispatch;

pub use backend::{StorageBackend, TileRead};
pub use codec::{Metatile, hash_path, parse_hash_path};
pub use dispatch::open;
