//! One module per storage backend implementation.

pub mod composite;
pub mod file;
pub mod http_proxy;
pub mod null;
pub mod object_store;

pub use composite::CompositeBackend;
pub use file::FileBackend;
pub use http_proxy::HttpProxyBackend;
pub use null::NullBackend;
pub use object_store::{InMemoryObjectStore, ObjectStoreBackend, ObjectStoreClient};
