//! Classified failure explanations attached to streams.

use serde::{Deserialize, Serialize};

/// Broad cause of an encoder failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisCategory {
    /// The audio input is held by another application.
    DeviceBusy,

    /// The audio input or source file does not exist.
    InputNotFound,

    /// The encoder was denied access to the input or output.
    PermissionDenied,

    /// The broadcast server rejected the source credential.
    Authentication,

    /// Another source is already publishing on the mount.
    MountInUse,

    /// The ingest target could not be reached.
    Network,

    /// The encoder build lacks the requested codec.
    EncoderUnavailable,

    /// The codec/container combination was refused.
    FormatUnsupported,

    /// The input could not be decoded.
    InvalidInput,

    /// Generic read/write failure.
    Io,

    /// The encoder executable or one of its libraries is missing.
    EncoderMissing,

    /// The encoder crashed.
    Crash,

    /// The encoder was interrupted by something other than the supervisor.
    Interrupted,

    /// The encoder could not be spawned at all.
    Launch,

    /// Every format in the fallback list failed.
    Exhausted,

    /// Nothing in the signature table matched.
    Unknown,
}

impl DiagnosisCategory {
    /// Returns true if this category is a connectivity problem with the ingest target.
    pub fn is_network(self) -> bool {
        matches!(self, Self::Network)
    }

    /// Returns a short display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::DeviceBusy => "device_busy",
            Self::InputNotFound => "input_not_found",
            Self::PermissionDenied => "permission_denied",
            Self::Authentication => "authentication",
            Self::MountInUse => "mount_in_use",
            Self::Network => "network",
            Self::EncoderUnavailable => "encoder_unavailable",
            Self::FormatUnsupported => "format_unsupported",
            Self::InvalidInput => "invalid_input",
            Self::Io => "io",
            Self::EncoderMissing => "encoder_missing",
            Self::Crash => "crash",
            Self::Interrupted => "interrupted",
            Self::Launch => "launch",
            Self::Exhausted => "exhausted",
            Self::Unknown => "unknown",
        }
    }
}

/// A classified, human-readable explanation of a stream failure.
///
/// Diagnoses are immutable. A later failure produces a new diagnosis that
/// replaces the previous one on the stream snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Broad cause.
    pub category: DiagnosisCategory,

    /// Operator-facing message.
    pub message: String,

    /// Whether the supervisor may try again with another format.
    pub retryable: bool,

    /// Identifier of the signature that produced this diagnosis.
    pub signature: String,
}

impl Diagnosis {
    /// Create a diagnosis.
    pub fn new(
        category: DiagnosisCategory,
        message: impl Into<String>,
        retryable: bool,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            retryable,
            signature: signature.into(),
        }
    }

    /// Fallback diagnosis for output nothing recognises.
    pub fn unknown() -> Self {
        Self::new(
            DiagnosisCategory::Unknown,
            "The encoder stopped for an unrecognised reason",
            false,
            "unknown",
        )
    }

    /// Terminal diagnosis once every format has been tried.
    pub fn exhausted(attempts: usize, last: Option<&Diagnosis>) -> Self {
        let message = match last {
            Some(last) => format!(
                "All {attempts} stream formats failed; last failure: {}",
                last.message
            ),
            None => format!("All {attempts} stream formats failed"),
        };
        Self::new(DiagnosisCategory::Exhausted, message, false, "exhausted")
    }

    /// Terminal diagnosis when the ingest target stays unreachable after re-discovery.
    pub fn network_exhausted(last: &Diagnosis) -> Self {
        Self::new(
            DiagnosisCategory::Network,
            format!(
                "Broadcast server still unreachable after re-discovery: {}",
                last.message
            ),
            false,
            "network_exhausted",
        )
    }

    /// Terminal diagnosis for a process that could not be spawned.
    pub fn launch(reason: impl std::fmt::Display) -> Self {
        Self::new(
            DiagnosisCategory::Launch,
            format!("The encoder could not be started: {reason}"),
            false,
            "launch",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_is_not_retryable() {
        let diagnosis = Diagnosis::unknown();
        assert_eq!(diagnosis.category, DiagnosisCategory::Unknown);
        assert!(!diagnosis.retryable);
    }

    #[test]
    fn test_exhausted_carries_last_message() {
        let last = Diagnosis::new(DiagnosisCategory::EncoderUnavailable, "no vorbis", true, "x");
        let diagnosis = Diagnosis::exhausted(3, Some(&last));

        assert_eq!(diagnosis.category, DiagnosisCategory::Exhausted);
        assert!(!diagnosis.retryable);
        assert!(diagnosis.message.contains("All 3"));
        assert!(diagnosis.message.contains("no vorbis"));
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&DiagnosisCategory::MountInUse).unwrap();
        assert_eq!(json, "\"mount_in_use\"");
    }
}
