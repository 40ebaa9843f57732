//! Per-stream state machine types.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single stream.
///
/// `Starting → Running → Stopping → Stopped` is the happy path. `Error` is
/// reached on a fatal diagnosis or once every format has failed. `Stopped`
/// and `Error` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Resolving the ingest target and launching the encoder.
    #[default]
    Starting,

    /// The encoder process is up.
    Running,

    /// Termination has been requested; waiting for the process to exit.
    Stopping,

    /// Stopped on request.
    Stopped,

    /// Failed permanently.
    Error,
}

impl StreamStatus {
    /// Returns true for `Stopped` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }

    /// Returns true while an encoder process may exist for the stream.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Returns a simple string representation of the status.
    pub fn name(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(StreamStatus::Stopped.is_terminal());
        assert!(StreamStatus::Error.is_terminal());
        assert!(!StreamStatus::Starting.is_terminal());
        assert!(!StreamStatus::Running.is_terminal());
        assert!(!StreamStatus::Stopping.is_terminal());
    }
}
