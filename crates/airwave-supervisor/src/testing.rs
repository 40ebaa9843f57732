//! Scripted launcher and resolver for supervisor tests.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use airwave_server::{IngestResolver, IngestTarget, ServerCoordinator, ServerResult, ServerSettings};

use crate::process::{
    ExitInfo, LaunchError, LaunchSpec, ProcessEvents, ProcessHandle, ProcessLauncher, Termination,
};

const SIGKILL: i32 = 9;
const SIGTERM: i32 = 15;

/// What a fake encoder does once launched.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Print `output`, then exit with `code`.
    Fail { output: Vec<String>, code: i64 },

    /// Run until terminated either way.
    RunUntilTerminated,

    /// Only a forceful termination ends it.
    IgnoreGraceful,

    /// Graceful termination fails; forceful termination works.
    TerminateErrors,

    /// The executable cannot be spawned.
    SpawnFails,
}

impl Script {
    pub(crate) fn fail(line: &str, code: i64) -> Self {
        Self::Fail {
            output: vec![line.to_string()],
            code,
        }
    }
}

/// Launcher that plays queued scripts, then `fallback` forever.
pub(crate) struct FakeLauncher {
    queue: Mutex<VecDeque<Script>>,
    fallback: Script,
    launches: Mutex<Vec<LaunchSpec>>,
    terminations: Arc<Mutex<Vec<(String, Termination)>>>,
    next_pid: AtomicU32,
}

impl FakeLauncher {
    pub(crate) fn new(fallback: Script) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            launches: Mutex::new(Vec::new()),
            terminations: Arc::new(Mutex::new(Vec::new())),
            next_pid: AtomicU32::new(1000),
        })
    }

    pub(crate) fn scripted(scripts: Vec<Script>, fallback: Script) -> Arc<Self> {
        let launcher = Self::new(fallback);
        launcher.queue.lock().extend(scripts);
        launcher
    }

    pub(crate) fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().clone()
    }

    pub(crate) fn launches_for(&self, stream_id: &str) -> usize {
        self.launches
            .lock()
            .iter()
            .filter(|spec| spec.stream_id == stream_id)
            .count()
    }

    pub(crate) fn terminations_for(&self, stream_id: &str) -> Vec<Termination> {
        self.terminations
            .lock()
            .iter()
            .filter(|(id, _)| id == stream_id)
            .map(|(_, kind)| *kind)
            .collect()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(
        &self,
        spec: &LaunchSpec,
        events: ProcessEvents,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        let script = self
            .queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        self.launches.lock().push(spec.clone());

        if let Script::SpawnFails = script {
            return Err(LaunchError::NotFound(spec.program.clone()));
        }

        let mut handle = FakeHandle {
            stream_id: spec.stream_id.clone(),
            pid: self.next_pid.fetch_add(1, Ordering::Relaxed),
            script: script.clone(),
            events,
            exited: false,
            terminations: Arc::clone(&self.terminations),
        };

        if let Script::Fail { output, code } = script {
            for line in output {
                handle.events.output(line);
            }
            handle.exit(ExitInfo::code(code));
        }

        Ok(Box::new(handle))
    }
}

struct FakeHandle {
    stream_id: String,
    pid: u32,
    script: Script,
    events: ProcessEvents,
    exited: bool,
    terminations: Arc<Mutex<Vec<(String, Termination)>>>,
}

impl FakeHandle {
    fn exit(&mut self, info: ExitInfo) {
        if !self.exited {
            self.exited = true;
            self.events.exited(info);
        }
    }
}

impl ProcessHandle for FakeHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn terminate(&mut self, kind: Termination) -> io::Result<()> {
        self.terminations.lock().push((self.stream_id.clone(), kind));

        match (&self.script, kind) {
            (_, Termination::Forceful) => self.exit(ExitInfo::signal(SIGKILL)),
            (Script::IgnoreGraceful, Termination::Graceful) => {}
            (Script::TerminateErrors, Termination::Graceful) => {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            (_, Termination::Graceful) => self.exit(ExitInfo::signal(SIGTERM)),
        }
        Ok(())
    }
}

/// Resolver over fixed settings that counts how it is used.
pub(crate) struct CountingResolver {
    inner: ServerCoordinator,
    resolves: AtomicU32,
    invalidations: AtomicU32,
}

impl CountingResolver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: ServerCoordinator::from_settings(ServerSettings {
                source_password: Some("hackme".into()),
                ..ServerSettings::default()
            }),
            resolves: AtomicU32::new(0),
            invalidations: AtomicU32::new(0),
        })
    }

    pub(crate) fn resolves(&self) -> u32 {
        self.resolves.load(Ordering::SeqCst)
    }

    pub(crate) fn invalidations(&self) -> u32 {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl IngestResolver for CountingResolver {
    fn resolve_ingest_target(&self) -> ServerResult<Arc<IngestTarget>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve_ingest_target()
    }

    fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.inner.invalidate();
    }
}

/// Poll `check` until it holds or five seconds pass.
pub(crate) fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}
