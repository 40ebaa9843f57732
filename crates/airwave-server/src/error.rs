//! Error types for the server module.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while coordinating with the broadcast server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The status source could not be read or parsed.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// The status source did not answer in time.
    #[error("Discovery timed out after {0:?}")]
    DiscoveryTimeout(Duration),

    /// Neither discovery nor configuration supplied a source password.
    #[error("No source password configured or discovered")]
    MissingCredential,

    /// Host/port/mount do not form a valid connection URL.
    #[error("Invalid ingest target: {0}")]
    InvalidTarget(String),

    /// The server did not accept a connection.
    #[error("Broadcast server {address} unreachable: {reason}")]
    Unreachable {
        /// host:port that was probed.
        address: String,

        /// Failure description.
        reason: String,
    },

    /// The server config is not well-formed XML.
    #[error("Malformed server config: {0}")]
    Xml(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for ServerError {
    fn from(err: quick_xml::Error) -> Self {
        ServerError::Xml(err.to_string())
    }
}
