//! Change-notification fan-out.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::warn;

use airwave_ipc::{event_channel, SupervisorEvent};

/// Delivers supervisor events to every subscriber without blocking.
#[derive(Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<SupervisorEvent>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self) -> Receiver<SupervisorEvent> {
        let (tx, rx) = event_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn publish(&self, event: SupervisorEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(stream_id = %event.stream_id(), "Subscriber lagging, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}
