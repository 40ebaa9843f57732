//! Per-stream worker.
//!
//! Each stream has one worker thread. It owns the encoder handle and is the
//! only writer of the stream snapshot once it exists, so process exits,
//! retries and stop requests for one stream never race each other.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, trace, warn};

use airwave_diagnostics::{normalize_exit_code, ExitDetails};
use airwave_ipc::{Diagnosis, StreamConfig, StreamStatus};

use crate::process::{ExitInfo, ProcessEvent, ProcessHandle, Termination};
use crate::registry::StreamSlot;
use crate::supervisor::{now_ms, Shared};

/// Everything a stream worker reacts to.
#[derive(Debug)]
pub(crate) enum StreamMessage {
    /// Something happened to the encoder launched as `attempt`.
    Process { attempt: u32, event: ProcessEvent },

    /// The stream should stop.
    Stop,
}

enum Phase {
    Running(Box<dyn ProcessHandle>),
    Stopping {
        handle: Box<dyn ProcessHandle>,
        deadline: Instant,
        forced: bool,
    },
}

pub(crate) struct StreamWorker {
    shared: Arc<Shared>,
    slot: Arc<StreamSlot>,
    config: StreamConfig,
    tx: Sender<StreamMessage>,
    rx: Receiver<StreamMessage>,
    attempt: u32,
    format_index: usize,
    network_retries: u32,
    launched_at: Instant,
    output: VecDeque<String>,
}

impl StreamWorker {
    /// Worker for a stream whose first attempt is already running.
    pub(crate) fn new(
        shared: Arc<Shared>,
        slot: Arc<StreamSlot>,
        config: StreamConfig,
        tx: Sender<StreamMessage>,
        rx: Receiver<StreamMessage>,
    ) -> Self {
        let tail = shared.config.output_tail_lines;
        Self {
            shared,
            slot,
            config,
            tx,
            rx,
            attempt: 1,
            format_index: 0,
            network_retries: 0,
            launched_at: Instant::now(),
            output: VecDeque::with_capacity(tail),
        }
    }

    pub(crate) fn run(mut self, handle: Box<dyn ProcessHandle>) {
        debug!(stream_id = %self.slot.id(), "Stream worker started");
        let mut phase = Phase::Running(handle);

        loop {
            let message = match &phase {
                Phase::Running(_) => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                Phase::Stopping { deadline, .. } => self
                    .rx
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
            };

            phase = match message {
                Ok(StreamMessage::Stop) => self.on_stop(phase),
                Ok(StreamMessage::Process { attempt, .. }) if attempt != self.attempt => {
                    trace!(stream_id = %self.slot.id(), attempt, "Ignoring event from earlier attempt");
                    phase
                }
                Ok(StreamMessage::Process {
                    event: ProcessEvent::Output(line),
                    ..
                }) => {
                    self.record_output(line);
                    phase
                }
                Ok(StreamMessage::Process {
                    event: ProcessEvent::Exited(info),
                    ..
                }) => match self.on_exit(phase, info) {
                    Some(next) => next,
                    None => break,
                },
                Err(RecvTimeoutError::Timeout) => self.on_grace_expired(phase),
                Err(RecvTimeoutError::Disconnected) => {
                    // Unreachable while we hold `tx`; finish rather than spin.
                    error!(stream_id = %self.slot.id(), "Stream queue closed");
                    self.finish(StreamStatus::Error, Some(Diagnosis::unknown()));
                    break;
                }
            };
        }

        debug!(stream_id = %self.slot.id(), "Stream worker finished");
    }

    fn on_stop(&mut self, phase: Phase) -> Phase {
        let mut handle = match phase {
            Phase::Running(handle) => handle,
            stopping @ Phase::Stopping { .. } => {
                debug!(stream_id = %self.slot.id(), "Already stopping");
                return stopping;
            }
        };

        self.shared.transition(&self.slot, |s| s.status = StreamStatus::Stopping);

        let forced = match handle.terminate(Termination::Graceful) {
            Ok(()) => false,
            Err(e) => {
                warn!(stream_id = %self.slot.id(), "Graceful termination failed, killing: {}", e);
                self.kill(handle.as_mut());
                true
            }
        };

        Phase::Stopping {
            handle,
            deadline: Instant::now() + self.shared.config.grace_period,
            forced,
        }
    }

    fn on_grace_expired(&mut self, phase: Phase) -> Phase {
        match phase {
            Phase::Stopping {
                mut handle, forced, ..
            } => {
                if forced {
                    warn!(stream_id = %self.slot.id(), "Encoder still running after kill");
                } else {
                    warn!(
                        stream_id = %self.slot.id(),
                        grace_ms = self.shared.config.grace_period.as_millis() as u64,
                        "Encoder ignored stop request, killing"
                    );
                }
                self.kill(handle.as_mut());
                Phase::Stopping {
                    handle,
                    deadline: Instant::now() + self.shared.config.grace_period,
                    forced: true,
                }
            }
            running => running,
        }
    }

    fn kill(&self, handle: &mut dyn ProcessHandle) {
        if let Err(e) = handle.terminate(Termination::Forceful) {
            error!(stream_id = %self.slot.id(), "Failed to kill encoder: {}", e);
        }
    }

    fn record_output(&mut self, line: String) {
        if self.shared.config.output_tail_lines == 0 {
            return;
        }
        if self.output.len() == self.shared.config.output_tail_lines {
            self.output.pop_front();
        }
        self.output.push_back(line);
    }

    fn record_exit(&self, info: ExitInfo) {
        self.slot.update(|s| {
            s.pid = None;
            s.exited_at_ms = Some(now_ms());
            s.exit_code = info.code.and_then(normalize_exit_code);
            s.exit_signal = info.signal;
        });
    }

    /// Handle the current attempt's exit. Returns the next phase, or `None`
    /// once the stream is terminal.
    fn on_exit(&mut self, phase: Phase, info: ExitInfo) -> Option<Phase> {
        self.record_exit(info);

        match phase {
            Phase::Stopping { .. } => {
                info!(stream_id = %self.slot.id(), "Encoder stopped");
                self.finish(StreamStatus::Stopped, None);
                None
            }
            Phase::Running(_) => self.on_failure(info),
        }
    }

    fn on_failure(&mut self, info: ExitInfo) -> Option<Phase> {
        let output = Vec::from(std::mem::take(&mut self.output)).join("\n");
        let diagnosis = self.shared.classifier.classify_exit(
            &output,
            ExitDetails {
                code: info.code,
                signal: info.signal,
            },
        );

        warn!(
            stream_id = %self.slot.id(),
            attempt = self.attempt,
            category = diagnosis.category.name(),
            signature = %diagnosis.signature,
            "Encoder exited: {}",
            diagnosis.message
        );
        self.shared.diagnose(&self.slot, diagnosis.clone());

        if self.shared.config.retry.is_stable(self.launched_at.elapsed()) {
            self.network_retries = 0;
        }

        if diagnosis.category.is_network() {
            self.shared.resolver.invalidate();
            if self.shared.config.retry.allows_network_retry(self.network_retries) {
                self.network_retries += 1;
                info!(stream_id = %self.slot.id(), "Retrying after re-discovering the server");
                return self.relaunch();
            }
            self.finish(StreamStatus::Error, Some(Diagnosis::network_exhausted(&diagnosis)));
            return None;
        }

        if !diagnosis.retryable {
            self.finish(StreamStatus::Error, None);
            return None;
        }

        let formats = &self.shared.config.formats;
        if !formats.has_next(self.format_index) {
            let exhausted = Diagnosis::exhausted(formats.count(), Some(&diagnosis));
            self.finish(StreamStatus::Error, Some(exhausted));
            return None;
        }

        self.format_index += 1;
        info!(
            stream_id = %self.slot.id(),
            format = formats.format_at(self.format_index).map(|p| p.name.as_str()).unwrap_or("?"),
            "Falling back to next format"
        );
        self.relaunch()
    }

    fn relaunch(&mut self) -> Option<Phase> {
        self.attempt += 1;
        self.shared.transition(&self.slot, |s| s.status = StreamStatus::Starting);

        let delay = self.shared.config.retry.delay_for_attempt(self.attempt);
        if !self.wait_before_retry(delay) {
            info!(stream_id = %self.slot.id(), "Stopped before retry");
            self.finish(StreamStatus::Stopped, None);
            return None;
        }

        let launched = self.shared.launch_attempt(
            &self.slot,
            &self.config,
            self.format_index,
            self.attempt,
            &self.tx,
        );

        match launched {
            Ok(handle) => {
                self.launched_at = Instant::now();
                self.shared
                    .mark_running(&self.slot, handle.as_ref(), self.format_index, self.attempt);
                Some(Phase::Running(handle))
            }
            Err(e) => {
                error!(stream_id = %self.slot.id(), attempt = self.attempt, "Relaunch failed: {}", e);
                self.finish(StreamStatus::Error, Some(Diagnosis::launch(&e)));
                None
            }
        }
    }

    /// Sleep out the retry delay. Returns false if a stop arrived meanwhile.
    fn wait_before_retry(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            match self
                .rx
                .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            {
                Ok(StreamMessage::Stop) => return false,
                // Only events from finished attempts can arrive here.
                Ok(StreamMessage::Process { .. }) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return true,
            }
        }
    }

    fn finish(&self, status: StreamStatus, diagnosis: Option<Diagnosis>) {
        self.shared.finish(&self.slot, status, diagnosis);
    }
}
