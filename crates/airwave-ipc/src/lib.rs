//! Typed control-plane messages for airwave.
//!
//! This crate defines the stream configuration, snapshot, diagnosis and
//! change-notification types exchanged between the stream supervisor and
//! whatever control plane drives it.

mod diagnosis;
mod error;
mod events;
mod state;
mod types;

pub use diagnosis::{Diagnosis, DiagnosisCategory};
pub use error::ConfigurationError;
pub use events::SupervisorEvent;
pub use state::StreamStatus;
pub use types::{
    validate_stream_id, EncodingConfig, InputDescriptor, StreamConfig, StreamSnapshot,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for change notifications (Supervisor → control plane).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded change-notification channel.
pub fn event_channel() -> (Sender<SupervisorEvent>, Receiver<SupervisorEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
