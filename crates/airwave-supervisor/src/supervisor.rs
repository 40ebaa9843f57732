//! The supervisor: public entry points and state shared with stream workers.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, instrument, warn};

use airwave_diagnostics::Classifier;
use airwave_encoder::{EncoderArgs, FormatPolicy, DEFAULT_ENCODER_PATH};
use airwave_ipc::{
    validate_stream_id, Diagnosis, StreamConfig, StreamSnapshot, StreamStatus, SupervisorEvent,
};
use airwave_server::{mount_for, IngestResolver};

use crate::error::SupervisorError;
use crate::notify::EventHub;
use crate::policy::RetryPolicy;
use crate::process::{LaunchSpec, ProcessEvents, ProcessHandle, ProcessLauncher};
use crate::registry::{Registry, StreamSlot};
use crate::worker::{StreamMessage, StreamWorker};
use crate::SupervisorResult;

/// Messages queued per stream before process events block.
pub const STREAM_CHANNEL_CAPACITY: usize = 1024;

/// Supervisor-wide settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Encoder executable.
    pub encoder_path: PathBuf,

    /// Time a stopping encoder gets before it is killed.
    pub grace_period: Duration,

    /// Automatic retry timing.
    pub retry: RetryPolicy,

    /// Ordered format fallback list.
    pub formats: FormatPolicy,

    /// Encoder output lines kept per attempt for classification.
    pub output_tail_lines: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            encoder_path: PathBuf::from(DEFAULT_ENCODER_PATH),
            grace_period: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            formats: FormatPolicy::default(),
            output_tail_lines: 64,
        }
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The stream is shutting down.
    Stopping,

    /// No active stream had that id. Not an error.
    NotFound,
}

/// State shared by the supervisor and its stream workers.
pub(crate) struct Shared {
    pub(crate) config: SupervisorConfig,
    pub(crate) launcher: Arc<dyn ProcessLauncher>,
    pub(crate) resolver: Arc<dyn IngestResolver>,
    pub(crate) classifier: Classifier,
    pub(crate) registry: Registry,
    pub(crate) hub: EventHub,
}

impl Shared {
    /// Resolve the ingest target and spawn one encoder attempt.
    pub(crate) fn launch_attempt(
        &self,
        slot: &StreamSlot,
        config: &StreamConfig,
        format_index: usize,
        attempt: u32,
        tx: &Sender<StreamMessage>,
    ) -> SupervisorResult<Box<dyn ProcessHandle>> {
        let profile = self.config.formats.require(format_index)?;
        let target = self.resolver.resolve_ingest_target()?;
        let output_url = target.connection_url(&mount_for(slot.id()))?;

        let args = EncoderArgs {
            input: &config.input,
            encoding: &config.encoding,
            profile,
            stream_name: &config.name,
            output_url: &output_url,
        }
        .build();

        info!(
            stream_id = %slot.id(),
            attempt,
            format = %profile.name,
            server = %target.address(),
            "Launching encoder"
        );

        let spec = LaunchSpec {
            stream_id: slot.id().to_string(),
            program: self.config.encoder_path.clone(),
            args,
        };
        let handle = self
            .launcher
            .launch(&spec, ProcessEvents::new(attempt, tx.clone()))?;
        Ok(handle)
    }

    /// Record a successful launch and move the stream to `Running`.
    pub(crate) fn mark_running(
        &self,
        slot: &StreamSlot,
        handle: &dyn ProcessHandle,
        format_index: usize,
        attempt: u32,
    ) -> StreamSnapshot {
        let pid = handle.pid();
        let format_name = self
            .config
            .formats
            .format_at(format_index)
            .map(|p| p.name.clone())
            .unwrap_or_default();

        self.transition(slot, |s| {
            s.status = StreamStatus::Running;
            s.pid = pid;
            s.started_at_ms = Some(now_ms());
            s.format_index = format_index;
            s.format_name = format_name;
            s.attempt = attempt;
        })
    }

    /// Apply `f` to the snapshot and announce a status change if there was one.
    pub(crate) fn transition(
        &self,
        slot: &StreamSlot,
        f: impl FnOnce(&mut StreamSnapshot),
    ) -> StreamSnapshot {
        let (previous, snapshot) = slot.update(f);
        if previous != snapshot.status {
            debug!(
                stream_id = %slot.id(),
                "Status: {} -> {}",
                previous,
                snapshot.status
            );
            self.hub.publish(SupervisorEvent::StatusChanged {
                id: slot.id().to_string(),
                previous,
                current: snapshot.status,
                snapshot: Box::new(snapshot.clone()),
            });
        }
        snapshot
    }

    /// Attach a diagnosis to the stream and announce it.
    pub(crate) fn diagnose(&self, slot: &StreamSlot, diagnosis: Diagnosis) {
        slot.update(|s| s.last_diagnosis = Some(diagnosis.clone()));
        self.hub.publish(SupervisorEvent::Diagnosed {
            id: slot.id().to_string(),
            diagnosis,
        });
    }

    /// Enter a terminal status and leave the active set.
    pub(crate) fn finish(&self, slot: &StreamSlot, status: StreamStatus, diagnosis: Option<Diagnosis>) {
        if let Some(diagnosis) = diagnosis {
            self.diagnose(slot, diagnosis);
        }
        self.transition(slot, |s| {
            s.status = status;
            s.pid = None;
        });
        self.registry.retire(slot);
        self.hub.publish(SupervisorEvent::Removed {
            id: slot.id().to_string(),
        });
        info!(stream_id = %slot.id(), status = %status, "Stream finished");
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Runs one encoder process per active stream and keeps them alive.
///
/// Every stream is driven by its own worker thread, which owns the encoder
/// handle and serializes everything that happens to the stream: process
/// output, exits, retries and stop requests. Callers only ever see
/// snapshots.
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Create a supervisor.
    pub fn new(
        config: SupervisorConfig,
        launcher: Arc<dyn ProcessLauncher>,
        resolver: Arc<dyn IngestResolver>,
    ) -> Self {
        info!(
            encoder = %config.encoder_path.display(),
            formats = config.formats.count(),
            "Supervisor created"
        );
        Self {
            shared: Arc::new(Shared {
                config,
                launcher,
                resolver,
                classifier: Classifier::new(),
                registry: Registry::default(),
                hub: EventHub::default(),
            }),
        }
    }

    /// Supervisor settings.
    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    /// Start streaming `config` under `id`.
    ///
    /// Returns once the first encoder process is running. Launch failures
    /// are returned here; failures after that are handled by the stream's
    /// worker and surface as diagnoses.
    #[instrument(name = "start_stream", skip(self, config))]
    pub fn start(&self, id: &str, config: StreamConfig) -> SupervisorResult<StreamSnapshot> {
        validate_stream_id(id)?;
        config.validate()?;
        let first = self.shared.config.formats.require(0)?;

        let (tx, rx) = crossbeam_channel::bounded(STREAM_CHANNEL_CAPACITY);
        let snapshot = StreamSnapshot::new(id, &config, first.name.clone());
        let slot = self.shared.registry.reserve(snapshot.clone(), tx.clone())?;

        info!(name = %config.name, input = %config.input.as_str(), "Starting stream");
        self.shared.hub.publish(SupervisorEvent::Added {
            id: id.to_string(),
            snapshot: Box::new(snapshot),
        });

        let handle = match self.shared.launch_attempt(&slot, &config, 0, 1, &tx) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to start stream: {}", e);
                self.shared
                    .finish(&slot, StreamStatus::Error, Some(Diagnosis::launch(&e)));
                return Err(e);
            }
        };

        let snapshot = self.shared.mark_running(&slot, handle.as_ref(), 0, 1);
        self.spawn_worker(slot, config, handle, tx, rx)?;
        Ok(snapshot)
    }

    fn spawn_worker(
        &self,
        slot: Arc<StreamSlot>,
        config: StreamConfig,
        handle: Box<dyn ProcessHandle>,
        tx: Sender<StreamMessage>,
        rx: Receiver<StreamMessage>,
    ) -> SupervisorResult<()> {
        let worker = StreamWorker::new(Arc::clone(&self.shared), Arc::clone(&slot), config, tx, rx);

        let spawned = thread::Builder::new()
            .name(format!("airwave-stream-{}", slot.id()))
            .spawn(move || worker.run(handle));

        // The closure, and with it the encoder handle, is dropped on failure,
        // which kills the process.
        if let Err(e) = spawned {
            error!("Failed to spawn stream worker: {}", e);
            self.shared
                .finish(&slot, StreamStatus::Error, Some(Diagnosis::launch(&e)));
            return Err(SupervisorError::Worker(e));
        }
        Ok(())
    }

    /// Ask a stream to stop. Does not wait for the encoder to exit.
    #[instrument(name = "stop_stream", skip(self))]
    pub fn stop(&self, id: &str) -> SupervisorResult<StopOutcome> {
        let Some(slot) = self.shared.registry.get(id) else {
            debug!("No active stream, nothing to stop");
            return Ok(StopOutcome::NotFound);
        };

        if !slot.send(StreamMessage::Stop) {
            // The worker may have finished between the lookup and the send.
            if !self.shared.registry.is_active(id) {
                return Ok(StopOutcome::NotFound);
            }
            return Err(SupervisorError::WorkerGone(id.to_string()));
        }

        info!(status = %slot.status(), "Stop requested");
        Ok(StopOutcome::Stopping)
    }

    /// Stop every active stream, returning how many were asked to stop.
    ///
    /// A failure on one stream is logged and does not prevent the rest
    /// from being stopped.
    pub fn stop_all(&self) -> usize {
        let mut stopping = 0;
        for slot in self.shared.registry.active() {
            match self.stop(slot.id()) {
                Ok(StopOutcome::Stopping) => stopping += 1,
                Ok(StopOutcome::NotFound) => {}
                Err(e) => error!(stream_id = %slot.id(), "Failed to stop stream: {}", e),
            }
        }
        info!(stopping, "Stop requested for all streams");
        stopping
    }

    /// Current snapshot of a stream, including the final snapshot of a
    /// stream that has already stopped or failed.
    pub fn status(&self, id: &str) -> Option<StreamSnapshot> {
        self.shared.registry.snapshot(id)
    }

    /// Snapshots of every active stream in start order.
    pub fn list_active(&self) -> Vec<StreamSnapshot> {
        self.shared
            .registry
            .active()
            .iter()
            .map(|slot| slot.snapshot())
            .collect()
    }

    /// Number of active streams.
    pub fn active_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Receive change notifications from now on.
    pub fn subscribe(&self) -> Receiver<SupervisorEvent> {
        self.shared.hub.subscribe()
    }

    /// Wait until `id` has left the active set. Returns false on timeout.
    pub fn wait_for_exit(&self, id: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.shared.registry.is_active(id) {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    /// Stop everything and wait up to `timeout` for the streams to finish.
    /// Returns the number of streams still active afterwards.
    pub fn shutdown(&self, timeout: Duration) -> usize {
        self.stop_all();

        let deadline = Instant::now() + timeout;
        while self.shared.registry.len() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let remaining = self.shared.registry.len();
        if remaining > 0 {
            warn!(remaining, "Streams still active after shutdown timeout");
        }
        remaining
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.shared.registry.len() > 0 {
            self.stop_all();
        }
    }
}
