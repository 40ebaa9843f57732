//! Error types for the encoder module.

use thiserror::Error;

/// Errors that can occur while building encoder invocations.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// A fallback policy needs at least one format.
    #[error("Format fallback list is empty")]
    EmptyFormatList,

    /// A format profile is missing a required field.
    #[error("Format {name:?} is missing its {field}")]
    IncompleteProfile {
        /// Profile name.
        name: String,

        /// Missing field.
        field: &'static str,
    },

    /// Format index outside the fallback list.
    #[error("Format index {index} out of range (list has {count} entries)")]
    OutOfRange {
        /// Requested index.
        index: usize,

        /// Entries in the list.
        count: usize,
    },
}
