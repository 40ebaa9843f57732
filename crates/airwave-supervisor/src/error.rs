//! Error types for the supervisor.

use thiserror::Error;

use airwave_encoder::EncoderError;
use airwave_ipc::ConfigurationError;
use airwave_server::ServerError;

use crate::process::LaunchError;

/// Errors returned synchronously by supervisor operations.
///
/// Failures after an encoder is running are never returned; they are
/// recorded as the stream's diagnosis instead.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The request is invalid or collides with an active stream.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The encoder process could not be spawned.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// The ingest target could not be resolved.
    #[error("Cannot resolve broadcast server: {0}")]
    Server(#[from] ServerError),

    /// The format list or encoder arguments are unusable.
    #[error(transparent)]
    Encoder(#[from] EncoderError),

    /// A stream worker thread could not be started.
    #[error("Failed to start stream worker: {0}")]
    Worker(#[source] std::io::Error),

    /// The stream's worker is no longer accepting messages.
    #[error("Stream {0:?} is not responding")]
    WorkerGone(String),
}
