//! Stream process supervisor for airwave.
//!
//! The supervisor owns every active stream and its encoder process. It
//! starts one encoder per stream, watches its output and exit, falls back
//! through the configured formats on retryable failures, re-discovers the
//! broadcast server on network failures, and stops streams on request
//! with a grace period before killing.
//!
//! Control-plane callers use [`Supervisor`] and receive snapshots and
//! [`SupervisorEvent`]s; they never touch process handles.

pub mod error;
mod notify;
pub mod policy;
pub mod process;
mod registry;
mod supervisor;
mod worker;

#[cfg(test)]
mod testing;

pub use error::SupervisorError;
pub use policy::RetryPolicy;
pub use process::{
    ExitInfo, LaunchError, LaunchSpec, OsLauncher, ProcessEvent, ProcessEvents, ProcessHandle,
    ProcessLauncher, Termination,
};
pub use supervisor::{StopOutcome, Supervisor, SupervisorConfig, STREAM_CHANNEL_CAPACITY};

pub use airwave_ipc::{StreamSnapshot, StreamStatus, SupervisorEvent};

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
