//! Synchronous rejection reasons for stream requests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stream request that can never succeed as given.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ConfigurationError {
    /// Stream id is empty or contains characters unusable in a mount name.
    #[error("Invalid stream id {0:?}: use letters, digits, '.', '_' or '-'")]
    InvalidId(String),

    /// Display name is empty.
    #[error("Stream name must not be empty")]
    EmptyName,

    /// Input descriptor is empty.
    #[error("Stream {0:?} has no input device or source")]
    MissingInput(String),

    /// Bitrate outside the supported range.
    #[error("Unsupported bitrate {0} kbps (expected 32-320)")]
    InvalidBitrate(u32),

    /// Sample rate not supported by every format.
    #[error("Unsupported sample rate {0} Hz")]
    InvalidSampleRate(u32),

    /// Channel count other than mono or stereo.
    #[error("Unsupported channel count {0}")]
    InvalidChannels(u16),

    /// A stream with this id is already active.
    #[error("Stream {0:?} is already active")]
    DuplicateId(String),

    /// Another active stream already uses this name.
    #[error("Stream name {name:?} is already used by stream {existing:?}")]
    DuplicateName {
        /// Requested name.
        name: String,

        /// Id of the active stream holding the name.
        existing: String,
    },
}
