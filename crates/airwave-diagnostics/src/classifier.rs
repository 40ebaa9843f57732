//! First-match-wins classification of encoder output.

use tracing::trace;

use airwave_ipc::{Diagnosis, DiagnosisCategory};

use crate::exit_code::{self, normalize_exit_code};
use crate::signatures::{self, Signature};

/// How an encoder process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitDetails {
    /// Exit code as reported by the platform, possibly unsigned.
    pub code: Option<i64>,

    /// Terminating signal, on Unix.
    pub signal: Option<i32>,
}

/// Ordered signature table. Pure; holds no state between calls.
#[derive(Debug, Clone)]
pub struct Classifier {
    signatures: Vec<Signature>,
}

impl Classifier {
    /// Classifier over the built-in table.
    pub fn new() -> Self {
        Self {
            signatures: signatures::builtin(),
        }
    }

    /// Classifier over a caller-supplied table, in priority order.
    pub fn with_signatures(signatures: Vec<Signature>) -> Self {
        Self { signatures }
    }

    /// The table, in priority order.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Classify raw output. The first signature that matches wins.
    pub fn classify(&self, output: &str) -> Diagnosis {
        self.match_output(output).unwrap_or_else(Diagnosis::unknown)
    }

    /// Classify a process exit: output signatures, then known exit codes,
    /// then terminating signals.
    pub fn classify_exit(&self, output: &str, exit: ExitDetails) -> Diagnosis {
        if let Some(diagnosis) = self.match_output(output) {
            return diagnosis;
        }

        if let Some(signature) = exit.code.and_then(exit_code::lookup) {
            trace!(signature = signature.id, "Matched exit code");
            return signature.diagnosis();
        }

        if let Some(diagnosis) = exit.signal.and_then(exit_code::signal_diagnosis) {
            return diagnosis;
        }

        match (exit.code, exit.signal) {
            (Some(code), _) => Diagnosis::new(
                DiagnosisCategory::Unknown,
                format!(
                    "The encoder exited with code {} for an unrecognised reason",
                    normalize_exit_code(code).map_or(code, i64::from)
                ),
                false,
                "unknown",
            ),
            (None, Some(signal)) => Diagnosis::new(
                DiagnosisCategory::Unknown,
                format!("The encoder was stopped by signal {signal}"),
                false,
                "unknown",
            ),
            (None, None) => Diagnosis::unknown(),
        }
    }

    fn match_output(&self, output: &str) -> Option<Diagnosis> {
        let signature = self.signatures.iter().find(|s| s.matches(output))?;
        trace!(signature = signature.id(), "Matched output signature");
        Some(signature.diagnosis())
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
