//! The built-in output signature table.
//!
//! Order is priority. A signature must sit above any generic signature whose
//! pattern also matches the output it is meant to catch; each entry has a
//! regression test in `classifier.rs` pinning that.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use airwave_ipc::{Diagnosis, DiagnosisCategory};

/// A pattern over raw encoder output and the diagnosis it yields.
#[derive(Debug, Clone)]
pub struct Signature {
    id: String,
    pattern: Regex,
    category: DiagnosisCategory,
    message: String,
    retryable: bool,
}

impl Signature {
    /// Compile a case-insensitive signature.
    pub fn new(
        id: impl Into<String>,
        pattern: &str,
        category: DiagnosisCategory,
        message: impl Into<String>,
        retryable: bool,
    ) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            id: id.into(),
            pattern,
            category,
            message: message.into(),
            retryable,
        })
    }

    /// Signature identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Category of the diagnosis this signature produces.
    pub fn category(&self) -> DiagnosisCategory {
        self.category
    }

    /// Returns true if the output contains this signature.
    pub fn matches(&self, output: &str) -> bool {
        self.pattern.is_match(output)
    }

    /// Build the diagnosis for a match.
    pub fn diagnosis(&self) -> Diagnosis {
        Diagnosis::new(self.category, self.message.clone(), self.retryable, self.id.clone())
    }
}

struct SignatureSpec {
    id: &'static str,
    pattern: &'static str,
    category: DiagnosisCategory,
    message: &'static str,
    retryable: bool,
}

const BUILTIN: &[SignatureSpec] = &[
    // Busy devices usually also print a generic I/O error.
    SignatureSpec {
        id: "device_busy",
        pattern: r"device or resource busy|\bEBUSY\b|audio device[^\n]*\b(busy|in use)\b",
        category: DiagnosisCategory::DeviceBusy,
        message: "The audio input is in use by another application. Close it or choose another input.",
        retryable: false,
    },
    SignatureSpec {
        id: "permission_denied",
        pattern: r"permission denied|access is denied|operation not permitted",
        category: DiagnosisCategory::PermissionDenied,
        message: "The encoder is not allowed to open the audio input. Check microphone permissions.",
        retryable: false,
    },
    SignatureSpec {
        id: "input_not_found",
        pattern: r"no such file or directory|no such device|could not find audio (only )?device|audio device not found|cannot open audio device|unknown input format",
        category: DiagnosisCategory::InputNotFound,
        message: "The audio input could not be found. It may have been unplugged or renamed.",
        retryable: false,
    },
    SignatureSpec {
        id: "authentication",
        pattern: r"401 unauthori[sz]ed|authentication failed|\bunauthori[sz]ed\b",
        category: DiagnosisCategory::Authentication,
        message: "The broadcast server rejected the source password.",
        retryable: false,
    },
    SignatureSpec {
        id: "mount_in_use",
        pattern: r"403 forbidden|mount ?point (is )?(already )?in use|source already connected",
        category: DiagnosisCategory::MountInUse,
        message: "Another source is already broadcasting on this stream's mount point.",
        retryable: false,
    },
    // Connection failures are often reported as a header write failure too.
    SignatureSpec {
        id: "network",
        pattern: r"connection refused|connection timed out|operation timed out|no route to host|network is unreachable|connection reset by peer|broken pipe|failed to resolve hostname|name or service not known|could not resolve host",
        category: DiagnosisCategory::Network,
        message: "The broadcast server could not be reached.",
        retryable: true,
    },
    SignatureSpec {
        id: "encoder_unavailable",
        pattern: r"unknown encoder|encoder not found|no such encoder|encoder \S+ not found",
        category: DiagnosisCategory::EncoderUnavailable,
        message: "The installed encoder does not support this audio format.",
        retryable: true,
    },
    SignatureSpec {
        id: "format_unsupported",
        pattern: r"not currently supported in container|could not write header|not a suitable output format|unable to find a suitable output format|unsupported codec|incorrect codec parameters|error initializing output stream",
        category: DiagnosisCategory::FormatUnsupported,
        message: "The audio format could not be streamed with this codec and container.",
        retryable: true,
    },
    SignatureSpec {
        id: "invalid_input",
        pattern: r"invalid data found when processing input|could not find codec parameters|moov atom not found",
        category: DiagnosisCategory::InvalidInput,
        message: "The audio source could not be decoded.",
        retryable: false,
    },
    SignatureSpec {
        id: "io",
        pattern: r"input/output error|\bI/O error\b|\bEIO\b",
        category: DiagnosisCategory::Io,
        message: "Reading the audio input or writing the stream failed.",
        retryable: false,
    },
];

static BUILTIN_SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    BUILTIN
        .iter()
        .map(|spec| {
            Signature::new(spec.id, spec.pattern, spec.category, spec.message, spec.retryable)
                .expect("built-in signature patterns are valid")
        })
        .collect()
});

/// The built-in table, in priority order.
pub(crate) fn builtin() -> Vec<Signature> {
    BUILTIN_SIGNATURES.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_compiles() {
        assert_eq!(builtin().len(), BUILTIN.len());
    }

    #[test]
    fn test_builtin_ids_are_unique() {
        let mut ids: Vec<_> = BUILTIN.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), BUILTIN.len());
    }

    #[test]
    fn test_signature_is_case_insensitive() {
        let signature = Signature::new(
            "x",
            "connection refused",
            DiagnosisCategory::Network,
            "m",
            true,
        )
        .unwrap();
        assert!(signature.matches("tcp://h:1: Connection Refused"));
    }
}
