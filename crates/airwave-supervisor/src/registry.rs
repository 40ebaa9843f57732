//! The active stream set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::RwLock;
use tracing::debug;

use airwave_ipc::{ConfigurationError, StreamSnapshot, StreamStatus};

use crate::worker::StreamMessage;

/// One active stream: its snapshot and the way to reach its worker.
///
/// The snapshot has a single writer at a time: `Supervisor::start` until
/// the worker thread exists, the worker afterwards.
pub(crate) struct StreamSlot {
    id: String,
    seq: u64,
    snapshot: RwLock<StreamSnapshot>,
    control: Sender<StreamMessage>,
}

impl StreamSlot {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn snapshot(&self) -> StreamSnapshot {
        self.snapshot.read().clone()
    }

    pub(crate) fn status(&self) -> StreamStatus {
        self.snapshot.read().status
    }

    /// Apply `f` and return the status before it together with the result.
    pub(crate) fn update(&self, f: impl FnOnce(&mut StreamSnapshot)) -> (StreamStatus, StreamSnapshot) {
        let mut snapshot = self.snapshot.write();
        let previous = snapshot.status;
        f(&mut snapshot);
        (previous, snapshot.clone())
    }

    pub(crate) fn send(&self, message: StreamMessage) -> bool {
        self.control.send(message).is_ok()
    }
}

/// Active streams keyed by id, plus the final snapshot of streams that
/// have left the active set.
#[derive(Default)]
pub(crate) struct Registry {
    active: RwLock<HashMap<String, Arc<StreamSlot>>>,
    recent: RwLock<HashMap<String, StreamSnapshot>>,
    next_seq: AtomicU64,
}

impl Registry {
    /// Insert a new stream, enforcing id and case-insensitive name uniqueness.
    pub(crate) fn reserve(
        &self,
        snapshot: StreamSnapshot,
        control: Sender<StreamMessage>,
    ) -> Result<Arc<StreamSlot>, ConfigurationError> {
        let mut active = self.active.write();

        if active.contains_key(&snapshot.id) {
            return Err(ConfigurationError::DuplicateId(snapshot.id));
        }

        let folded = snapshot.name.to_lowercase();
        if let Some(existing) = active
            .values()
            .find(|slot| slot.snapshot.read().name.to_lowercase() == folded)
        {
            return Err(ConfigurationError::DuplicateName {
                name: snapshot.name,
                existing: existing.id.clone(),
            });
        }

        let slot = Arc::new(StreamSlot {
            id: snapshot.id.clone(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            snapshot: RwLock::new(snapshot),
            control,
        });
        active.insert(slot.id.clone(), Arc::clone(&slot));
        self.recent.write().remove(&slot.id);

        debug!(stream_id = %slot.id, active = active.len(), "Stream registered");
        Ok(slot)
    }

    /// Move a terminal stream out of the active set.
    pub(crate) fn retire(&self, slot: &StreamSlot) {
        let snapshot = slot.snapshot();
        let mut active = self.active.write();

        // Only retire the slot we own; the id may have been reused since.
        if active.get(&slot.id).is_some_and(|s| s.seq == slot.seq) {
            active.remove(&slot.id);
            self.recent.write().insert(slot.id.clone(), snapshot);
            debug!(stream_id = %slot.id, active = active.len(), "Stream retired");
        }
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<StreamSlot>> {
        self.active.read().get(id).cloned()
    }

    pub(crate) fn is_active(&self, id: &str) -> bool {
        self.active.read().contains_key(id)
    }

    /// Active snapshot, or the final snapshot of a retired stream.
    pub(crate) fn snapshot(&self, id: &str) -> Option<StreamSnapshot> {
        if let Some(slot) = self.get(id) {
            return Some(slot.snapshot());
        }
        self.recent.read().get(id).cloned()
    }

    /// Active streams in start order.
    pub(crate) fn active(&self) -> Vec<Arc<StreamSlot>> {
        let mut slots: Vec<_> = self.active.read().values().cloned().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots
    }

    pub(crate) fn len(&self) -> usize {
        self.active.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwave_ipc::{InputDescriptor, StreamConfig};

    fn snapshot(id: &str, name: &str) -> StreamSnapshot {
        let config = StreamConfig::new(name, InputDescriptor::Device("mic".into()));
        StreamSnapshot::new(id, &config, "MP3")
    }

    fn channel() -> Sender<StreamMessage> {
        crossbeam_channel::unbounded().0
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = Registry::default();
        registry.reserve(snapshot("fr", "French"), channel()).unwrap();

        let result = registry.reserve(snapshot("fr", "Other"), channel());
        assert!(matches!(result, Err(ConfigurationError::DuplicateId(id)) if id == "fr"));
    }

    #[test]
    fn test_duplicate_name_is_case_insensitive() {
        let registry = Registry::default();
        registry.reserve(snapshot("a", "X"), channel()).unwrap();

        let result = registry.reserve(snapshot("b", "x"), channel());
        assert!(matches!(
            result,
            Err(ConfigurationError::DuplicateName { existing, .. }) if existing == "a"
        ));
    }

    #[test]
    fn test_retire_keeps_final_snapshot() {
        let registry = Registry::default();
        let slot = registry.reserve(snapshot("fr", "French"), channel()).unwrap();
        slot.update(|s| s.status = StreamStatus::Stopped);

        registry.retire(&slot);

        assert!(!registry.is_active("fr"));
        assert_eq!(registry.snapshot("fr").map(|s| s.status), Some(StreamStatus::Stopped));
        assert!(registry.reserve(snapshot("fr", "French"), channel()).is_ok());
        assert_eq!(registry.snapshot("fr").map(|s| s.status), Some(StreamStatus::Starting));
    }

    #[test]
    fn test_stale_retire_does_not_remove_successor() {
        let registry = Registry::default();
        let first = registry.reserve(snapshot("fr", "French"), channel()).unwrap();
        registry.retire(&first);
        let _second = registry.reserve(snapshot("fr", "French"), channel()).unwrap();

        registry.retire(&first);
        assert!(registry.is_active("fr"));
    }

    #[test]
    fn test_active_in_start_order() {
        let registry = Registry::default();
        for id in ["c", "a", "b"] {
            registry.reserve(snapshot(id, id), channel()).unwrap();
        }

        let ids: Vec<_> = registry.active().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
        assert_eq!(registry.len(), 3);
    }
}
