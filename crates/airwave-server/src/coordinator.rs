//! Ingest target resolution and caching.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::discovery::{DiscoveredServer, StatusSource};
use crate::error::ServerError;
use crate::probe::probe_tcp;
use crate::target::IngestTarget;
use crate::{ServerResult, DEFAULT_DISCOVERY_TIMEOUT_MS, DEFAULT_PORT, DEFAULT_SOURCE_USER, LOOPBACK_HOST};

/// Resolves where encoders should connect.
pub trait IngestResolver: Send + Sync {
    /// Best-known reachable ingest target.
    fn resolve_ingest_target(&self) -> ServerResult<Arc<IngestTarget>>;

    /// Forget freshness so the next resolution re-discovers.
    fn invalidate(&self);
}

/// Configured broadcast server parameters, used as defaults and as the
/// fallback when discovery fails.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Configured host; wildcards are replaced with loopback.
    pub host: String,

    /// Configured port.
    pub port: u16,

    /// Source user name.
    pub source_user: String,

    /// Configured source password.
    pub source_password: Option<String>,

    /// Upper bound on one discovery.
    pub discovery_timeout: Duration,

    /// Upper bound on one liveness probe.
    pub probe_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: LOOPBACK_HOST.to_string(),
            port: DEFAULT_PORT,
            source_user: DEFAULT_SOURCE_USER.to_string(),
            source_password: None,
            discovery_timeout: Duration::from_millis(DEFAULT_DISCOVERY_TIMEOUT_MS),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

struct CachedTarget {
    target: Arc<IngestTarget>,
    fresh: bool,
}

/// Owns the ingest target cache.
///
/// Targets are handed out as `Arc`s and replaced wholesale on
/// re-discovery, so streams holding an older target keep it.
pub struct ServerCoordinator {
    settings: ServerSettings,
    source: Option<Arc<dyn StatusSource>>,
    cache: RwLock<Option<CachedTarget>>,
    discovery: Mutex<()>,
}

impl ServerCoordinator {
    /// Coordinator that discovers through `source`.
    pub fn new(settings: ServerSettings, source: Option<Arc<dyn StatusSource>>) -> Self {
        Self {
            settings,
            source,
            cache: RwLock::new(None),
            discovery: Mutex::new(()),
        }
    }

    /// Coordinator with no discovery; the configured settings are always fresh.
    pub fn from_settings(settings: ServerSettings) -> Self {
        Self::new(settings, None)
    }

    /// Configured settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Returns true if a fresh target is cached.
    pub fn is_fresh(&self) -> bool {
        self.cache.read().as_ref().is_some_and(|c| c.fresh)
    }

    /// Check that the resolved target accepts connections.
    #[instrument(name = "verify_live", skip(self))]
    pub fn verify_live(&self) -> ServerResult<Arc<IngestTarget>> {
        let target = self.resolve_ingest_target()?;
        probe_tcp(&target.host, target.port, self.settings.probe_timeout)?;
        Ok(target)
    }

    fn cached_fresh(&self) -> Option<Arc<IngestTarget>> {
        self.cache
            .read()
            .as_ref()
            .filter(|c| c.fresh)
            .map(|c| Arc::clone(&c.target))
    }

    fn refresh(&self) -> ServerResult<Arc<IngestTarget>> {
        let _guard = self.discovery.lock();

        // Another caller may have refreshed while we waited.
        if let Some(target) = self.cached_fresh() {
            return Ok(target);
        }

        let (target, fresh) = match &self.source {
            None => (self.target_from(DiscoveredServer::default())?, true),
            Some(source) => match discover_bounded(source, self.settings.discovery_timeout) {
                Ok(discovered) => (self.target_from(discovered)?, true),
                Err(e) => {
                    warn!(source = %source.describe(), "Discovery failed, using configured server: {}", e);
                    (self.target_from(DiscoveredServer::default())?, false)
                }
            },
        };

        let target = Arc::new(target);
        let previous = self.cache.write().replace(CachedTarget {
            target: Arc::clone(&target),
            fresh,
        });

        match previous {
            Some(prev) if *prev.target != *target => {
                info!(
                    previous = %prev.target.address(),
                    current = %target.address(),
                    "Ingest target changed"
                );
            }
            None => info!(address = %target.address(), fresh, "Ingest target resolved"),
            _ => debug!(address = %target.address(), fresh, "Ingest target unchanged"),
        }

        Ok(target)
    }

    fn target_from(&self, discovered: DiscoveredServer) -> ServerResult<IngestTarget> {
        let host = discovered.host.unwrap_or_else(|| self.settings.host.clone());
        let port = discovered.port.unwrap_or(self.settings.port);
        let password = discovered
            .source_password
            .or_else(|| self.settings.source_password.clone())
            .ok_or(ServerError::MissingCredential)?;

        Ok(IngestTarget::new(
            &host,
            port,
            self.settings.source_user.clone(),
            password,
        ))
    }
}

impl IngestResolver for ServerCoordinator {
    fn resolve_ingest_target(&self) -> ServerResult<Arc<IngestTarget>> {
        if let Some(target) = self.cached_fresh() {
            return Ok(target);
        }
        self.refresh()
    }

    fn invalidate(&self) {
        if let Some(cached) = self.cache.write().as_mut() {
            if cached.fresh {
                debug!("Ingest target invalidated");
            }
            cached.fresh = false;
        }
    }
}

/// Run discovery on a helper thread and give up after `timeout`.
fn discover_bounded(
    source: &Arc<dyn StatusSource>,
    timeout: Duration,
) -> ServerResult<DiscoveredServer> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let source = Arc::clone(source);

    thread::Builder::new()
        .name("airwave-discovery".into())
        .spawn(move || {
            let _ = tx.send(source.discover());
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ServerError::DiscoveryTimeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(ServerError::Discovery("discovery thread exited".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicU16, Ordering};
    use std::time::Instant;

    struct FakeSource {
        calls: AtomicU32,
        port: AtomicU16,
        fail: bool,
        delay: Duration,
    }

    impl FakeSource {
        fn new(port: u16) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                port: AtomicU16::new(port),
                fail: false,
                delay: Duration::ZERO,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                port: AtomicU16::new(0),
                fail: true,
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                port: AtomicU16::new(9000),
                fail: false,
                delay,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StatusSource for FakeSource {
        fn discover(&self) -> ServerResult<DiscoveredServer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if self.fail {
                return Err(ServerError::Discovery("status endpoint down".into()));
            }
            Ok(DiscoveredServer {
                host: Some("0.0.0.0".into()),
                port: Some(self.port.load(Ordering::SeqCst)),
                source_password: Some("discovered".into()),
            })
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    fn settings() -> ServerSettings {
        ServerSettings {
            source_password: Some("configured".into()),
            discovery_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    fn coordinator(source: &Arc<FakeSource>) -> ServerCoordinator {
        let source: Arc<dyn StatusSource> = Arc::clone(source) as Arc<dyn StatusSource>;
        ServerCoordinator::new(settings(), Some(source))
    }

    #[test]
    fn test_fresh_cache_skips_discovery() {
        let source = FakeSource::new(8010);
        let coordinator = coordinator(&source);

        let first = coordinator.resolve_ingest_target().unwrap();
        let second = coordinator.resolve_ingest_target().unwrap();

        assert_eq!(source.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.host, LOOPBACK_HOST);
        assert_eq!(first.port, 8010);
        assert_eq!(first.source_password, "discovered");
    }

    #[test]
    fn test_invalidate_picks_up_new_port() {
        let source = FakeSource::new(8010);
        let coordinator = coordinator(&source);

        let before = coordinator.resolve_ingest_target().unwrap();
        source.port.store(8020, Ordering::SeqCst);
        coordinator.invalidate();
        assert!(!coordinator.is_fresh());

        let after = coordinator.resolve_ingest_target().unwrap();

        assert_eq!(source.calls(), 2);
        assert_eq!(after.port, 8020);
        // Holders of the old target are unaffected.
        assert_eq!(before.port, 8010);
    }

    #[test]
    fn test_discovery_failure_falls_back_to_settings() {
        let source = FakeSource::failing();
        let coordinator = coordinator(&source);

        let target = coordinator.resolve_ingest_target().unwrap();
        assert_eq!(target.port, DEFAULT_PORT);
        assert_eq!(target.source_password, "configured");
        assert!(!coordinator.is_fresh());

        coordinator.resolve_ingest_target().unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_discovery_is_bounded() {
        let source = FakeSource::slow(Duration::from_secs(5));
        let coordinator = coordinator(&source);

        let started = Instant::now();
        let target = coordinator.resolve_ingest_target().unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(target.port, DEFAULT_PORT);
    }

    #[test]
    fn test_without_source_settings_are_fresh() {
        let coordinator = ServerCoordinator::from_settings(ServerSettings {
            host: "0.0.0.0".into(),
            ..settings()
        });

        let target = coordinator.resolve_ingest_target().unwrap();
        assert_eq!(target.host, LOOPBACK_HOST);
        assert!(coordinator.is_fresh());
    }

    #[test]
    fn test_missing_credential() {
        let coordinator = ServerCoordinator::from_settings(ServerSettings::default());
        assert!(matches!(
            coordinator.resolve_ingest_target(),
            Err(ServerError::MissingCredential)
        ));
    }

    #[test]
    fn test_verify_live_against_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let coordinator = ServerCoordinator::from_settings(ServerSettings {
            port,
            ..settings()
        });

        let target = coordinator.verify_live().unwrap();
        assert_eq!(target.port, port);
    }
}
