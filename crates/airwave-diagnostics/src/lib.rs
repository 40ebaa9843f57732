//! Encoder failure classification.
//!
//! Raw encoder output is matched against an ordered signature table to
//! produce a [`Diagnosis`]. The first matching signature wins, so specific
//! signatures sit above the generic ones they would otherwise be masked by.

mod classifier;
mod exit_code;
mod signatures;

pub use classifier::{Classifier, ExitDetails};
pub use exit_code::{normalize_exit_code, ExitCodeSignature};
pub use signatures::Signature;

pub use airwave_ipc::{Diagnosis, DiagnosisCategory};
