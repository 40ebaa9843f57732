//! Change notifications sent from the supervisor to the control plane.

use serde::{Deserialize, Serialize};

use crate::diagnosis::Diagnosis;
use crate::state::StreamStatus;
use crate::types::StreamSnapshot;

/// Events the supervisor publishes to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SupervisorEvent {
    /// A stream was accepted and entered `Starting`.
    Added {
        /// Stream id.
        id: String,

        /// Initial snapshot.
        snapshot: Box<StreamSnapshot>,
    },

    /// A stream changed status.
    StatusChanged {
        /// Stream id.
        id: String,

        /// Previous status.
        previous: StreamStatus,

        /// Current status.
        current: StreamStatus,

        /// Snapshot taken right after the transition.
        snapshot: Box<StreamSnapshot>,
    },

    /// A stream's encoder failed and was classified.
    Diagnosed {
        /// Stream id.
        id: String,

        /// The new diagnosis.
        diagnosis: Diagnosis,
    },

    /// A terminal stream left the active set; its id may be reused.
    Removed {
        /// Stream id.
        id: String,
    },
}

impl SupervisorEvent {
    /// Id of the stream the event concerns.
    pub fn stream_id(&self) -> &str {
        match self {
            Self::Added { id, .. }
            | Self::StatusChanged { id, .. }
            | Self::Diagnosed { id, .. }
            | Self::Removed { id } => id,
        }
    }
}
