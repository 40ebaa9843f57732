//! Exit code normalization and the known exit code table.

use airwave_ipc::{Diagnosis, DiagnosisCategory};

/// Normalize an exit code into its signed 32-bit interpretation.
///
/// Windows reports NTSTATUS failures such as `0xC0000135` as large unsigned
/// values on some paths and as negative `i32` values on others. Both map to
/// the same signed code here. Values that fit neither representation have
/// no 32-bit form and yield `None`.
pub fn normalize_exit_code(raw: i64) -> Option<i32> {
    i32::try_from(raw)
        .ok()
        .or_else(|| u32::try_from(raw).ok().map(|code| code as i32))
}

/// A known exit code and the diagnosis it yields.
#[derive(Debug, Clone, Copy)]
pub struct ExitCodeSignature {
    /// Normalized exit code.
    pub code: i32,

    /// Signature identifier.
    pub id: &'static str,

    /// Diagnosis category.
    pub category: DiagnosisCategory,

    /// Operator-facing message.
    pub message: &'static str,

    /// Whether another format may be tried.
    pub retryable: bool,
}

impl ExitCodeSignature {
    /// Build the diagnosis for a match.
    pub fn diagnosis(&self) -> Diagnosis {
        Diagnosis::new(self.category, self.message, self.retryable, self.id)
    }
}

/// STATUS_DLL_NOT_FOUND
const STATUS_DLL_NOT_FOUND: u32 = 0xC000_0135;
/// STATUS_ACCESS_VIOLATION
const STATUS_ACCESS_VIOLATION: u32 = 0xC000_0005;
/// STATUS_STACK_OVERFLOW
const STATUS_STACK_OVERFLOW: u32 = 0xC000_00FD;
/// STATUS_CONTROL_C_EXIT
const STATUS_CONTROL_C_EXIT: u32 = 0xC000_013A;

pub(crate) const EXIT_CODES: &[ExitCodeSignature] = &[
    ExitCodeSignature {
        code: 0,
        id: "exit_clean",
        category: DiagnosisCategory::Unknown,
        message: "The encoder exited on its own; the input may have ended.",
        retryable: false,
    },
    ExitCodeSignature {
        code: 127,
        id: "exit_command_not_found",
        category: DiagnosisCategory::EncoderMissing,
        message: "The encoder executable could not be found.",
        retryable: false,
    },
    ExitCodeSignature {
        code: 126,
        id: "exit_not_executable",
        category: DiagnosisCategory::PermissionDenied,
        message: "The encoder executable is not runnable.",
        retryable: false,
    },
    ExitCodeSignature {
        code: STATUS_DLL_NOT_FOUND as i32,
        id: "exit_dll_not_found",
        category: DiagnosisCategory::EncoderMissing,
        message: "The encoder is missing a required library. Reinstall it.",
        retryable: false,
    },
    ExitCodeSignature {
        code: STATUS_ACCESS_VIOLATION as i32,
        id: "exit_access_violation",
        category: DiagnosisCategory::Crash,
        message: "The encoder crashed.",
        retryable: true,
    },
    ExitCodeSignature {
        code: STATUS_STACK_OVERFLOW as i32,
        id: "exit_stack_overflow",
        category: DiagnosisCategory::Crash,
        message: "The encoder crashed.",
        retryable: true,
    },
    ExitCodeSignature {
        code: STATUS_CONTROL_C_EXIT as i32,
        id: "exit_control_c",
        category: DiagnosisCategory::Interrupted,
        message: "The encoder was interrupted from outside airwave.",
        retryable: false,
    },
];

/// Look up a raw exit code, normalizing it first.
pub(crate) fn lookup(raw: i64) -> Option<&'static ExitCodeSignature> {
    let code = normalize_exit_code(raw)?;
    EXIT_CODES.iter().find(|s| s.code == code)
}

/// Diagnosis for a process killed by a Unix signal.
pub(crate) fn signal_diagnosis(signal: i32) -> Option<Diagnosis> {
    let (id, category, message, retryable) = match signal {
        6 | 11 => (
            "signal_crash",
            DiagnosisCategory::Crash,
            "The encoder crashed.",
            true,
        ),
        9 => (
            "signal_killed",
            DiagnosisCategory::Interrupted,
            "The encoder was killed by the operating system, possibly for lack of memory.",
            false,
        ),
        2 | 15 => (
            "signal_terminated",
            DiagnosisCategory::Interrupted,
            "The encoder was terminated from outside airwave.",
            false,
        ),
        _ => return None,
    };
    Some(Diagnosis::new(category, message, retryable, id))
}
