//! Encoder process execution.
//!
//! A launcher spawns one encoder process per attempt and reports its output
//! lines and exit as typed events onto the owning stream's queue. All output
//! of a process is delivered before its `Exited` event.

use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::worker::StreamMessage;

/// How a process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code as reported by the platform.
    pub code: Option<i64>,

    /// Terminating signal (Unix only).
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Exit with a code.
    pub fn code(code: i64) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Exit by signal.
    pub fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code().map(i64::from),
            signal,
        }
    }
}

/// Something that happened to an encoder process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One line of diagnostic output.
    Output(String),

    /// The process has exited and been reaped.
    Exited(ExitInfo),
}

/// Kind of termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Ask the process to finish (SIGTERM on Unix).
    Graceful,

    /// Kill the process.
    Forceful,
}

/// What to run for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Stream the process belongs to.
    pub stream_id: String,

    /// Executable path.
    pub program: PathBuf,

    /// Argument list.
    pub args: Vec<String>,
}

/// The encoder process could not be spawned.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The executable does not exist.
    #[error("Encoder executable {0:?} not found")]
    NotFound(PathBuf),

    /// The executable may not be run.
    #[error("Encoder executable {0:?} is not executable")]
    PermissionDenied(PathBuf),

    /// Any other spawn failure.
    #[error("Failed to spawn {program:?}: {source}")]
    Io {
        /// Executable path.
        program: PathBuf,

        /// Underlying error.
        source: io::Error,
    },
}

impl LaunchError {
    /// Map a spawn error onto the launch taxonomy.
    pub fn from_io(program: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(program),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(program),
            _ => Self::Io { program, source },
        }
    }
}

/// Where a process reports its events. Each sink is tagged with the
/// attempt it belongs to so events from an earlier attempt can be told apart.
#[derive(Debug, Clone)]
pub struct ProcessEvents {
    attempt: u32,
    tx: Sender<StreamMessage>,
}

impl ProcessEvents {
    pub(crate) fn new(attempt: u32, tx: Sender<StreamMessage>) -> Self {
        Self { attempt, tx }
    }

    /// Report an output line. Returns false once nobody is listening.
    pub fn output(&self, line: impl Into<String>) -> bool {
        self.send(ProcessEvent::Output(line.into()))
    }

    /// Report the exit. Returns false once nobody is listening.
    pub fn exited(&self, info: ExitInfo) -> bool {
        self.send(ProcessEvent::Exited(info))
    }

    fn send(&self, event: ProcessEvent) -> bool {
        self.tx
            .send(StreamMessage::Process {
                attempt: self.attempt,
                event,
            })
            .is_ok()
    }
}

/// A running encoder process, exclusively owned by its stream.
pub trait ProcessHandle: Send {
    /// OS process id, if known.
    fn pid(&self) -> Option<u32>;

    /// Request termination. Exit is still reported through the event sink.
    fn terminate(&mut self, kind: Termination) -> io::Result<()>;
}

/// Spawns encoder processes.
pub trait ProcessLauncher: Send + Sync {
    /// Spawn `spec`, reporting its output and exit to `events`.
    fn launch(
        &self,
        spec: &LaunchSpec,
        events: ProcessEvents,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError>;
}

/// Launches real OS processes.
#[derive(Debug, Clone)]
pub struct OsLauncher {
    poll_interval: Duration,
}

impl OsLauncher {
    /// Launcher that checks for exit every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for OsLauncher {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl ProcessLauncher for OsLauncher {
    fn launch(
        &self,
        spec: &LaunchSpec,
        events: ProcessEvents,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LaunchError::from_io(spec.program.clone(), e))?;

        let pid = child.id();
        debug!(stream_id = %spec.stream_id, pid, "Encoder process spawned");

        let stderr = child.stderr.take();
        let child = Arc::new(Mutex::new(child));

        let reader = stderr.map(|stderr| {
            let events = events.clone();
            let stream_id = spec.stream_id.clone();
            thread::spawn(move || read_output(stderr, &events, &stream_id))
        });

        let watched = Arc::clone(&child);
        let poll_interval = self.poll_interval;
        let stream_id = spec.stream_id.clone();
        let watcher = thread::Builder::new()
            .name(format!("airwave-exit-{}", spec.stream_id))
            .spawn(move || {
                let info = watch_exit(&watched, poll_interval, &stream_id);
                if let Some(reader) = reader {
                    let _ = reader.join();
                }
                events.exited(info);
            });

        if let Err(e) = watcher {
            let _ = child.lock().kill();
            return Err(LaunchError::Io {
                program: spec.program.clone(),
                source: e,
            });
        }

        Ok(Box::new(OsProcess { pid, child }))
    }
}

/// Forward encoder output line by line until EOF. Lines that are not valid
/// UTF-8 (device names in a local code page) are decoded lossily.
fn read_output(stderr: impl Read, events: &ProcessEvents, stream_id: &str) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                trace!(%stream_id, "encoder: {}", line);
                if !events.output(line) {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(%stream_id, "Encoder output closed: {}", e);
                break;
            }
        }
    }
}

fn watch_exit(child: &Mutex<Child>, poll_interval: Duration, stream_id: &str) -> ExitInfo {
    loop {
        let mut guard = child.lock();
        match guard.try_wait() {
            Ok(Some(status)) => return ExitInfo::from_status(status),
            Ok(None) => {}
            Err(e) => {
                warn!(%stream_id, "Failed to poll encoder process, killing: {}", e);
                let _ = guard.kill();
                return ExitInfo::default();
            }
        }
        drop(guard);
        thread::sleep(poll_interval);
    }
}

struct OsProcess {
    pid: u32,
    child: Arc<Mutex<Child>>,
}

impl ProcessHandle for OsProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn terminate(&mut self, kind: Termination) -> io::Result<()> {
        let mut child = self.child.lock();

        // Already reaped; the pid may belong to someone else by now.
        if child.try_wait()?.is_some() {
            return Ok(());
        }

        match kind {
            Termination::Graceful => graceful(&mut child, self.pid),
            Termination::Forceful => child.kill(),
        }
    }
}

impl Drop for OsProcess {
    fn drop(&mut self) {
        let mut child = self.child.lock();
        // Only a confirmed exit is left alone; a failed poll still kills.
        if !matches!(child.try_wait(), Ok(Some(_))) {
            warn!(pid = self.pid, "Encoder handle dropped while running, killing");
            let _ = child.kill();
        }
    }
}

#[cfg(unix)]
fn graceful(_child: &mut Child, pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid).map_err(io::Error::other)?;
    // SAFETY: kill(2) has no memory-safety preconditions; the child is not
    // yet reaped (checked under the lock), so the pid is still ours.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn graceful(child: &mut Child, _pid: u32) -> io::Result<()> {
    // No portable polite signal here.
    child.kill()
}
