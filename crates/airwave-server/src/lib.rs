//! Broadcast server coordination.
//!
//! Resolves and caches where stream encoders should connect (host, port and
//! source credential), re-discovers after connection failures, and probes
//! the server for liveness.

mod coordinator;
mod discovery;
mod error;
mod probe;
mod target;

pub use coordinator::{IngestResolver, ServerCoordinator, ServerSettings};
pub use discovery::{DiscoveredServer, IcecastConfigSource, StatusSource};
pub use error::ServerError;
pub use probe::probe_tcp;
pub use target::{mount_for, normalize_connect_host, IngestTarget};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Default broadcast server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default user name for source connections.
pub const DEFAULT_SOURCE_USER: &str = "source";

/// Host used when the configured or discovered host is a wildcard address.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Default bound on a single discovery in milliseconds.
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 2000;
