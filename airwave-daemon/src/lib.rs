//! airwave daemon: boots the supervisor from configuration and runs the
//! configured streams until interrupted.

pub mod config;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airwave_server::{IcecastConfigSource, ServerCoordinator, StatusSource};
use airwave_supervisor::{OsLauncher, Supervisor, SupervisorEvent};

pub use config::{Config, ConfigError};

/// Time allowed for streams to stop on shutdown, beyond the grace period.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(2);

/// Initialize logging.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "airwave=info,airwave_daemon=info,airwave_supervisor=debug,airwave_server=info,airwave_diagnostics=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the ingest target coordinator for `config`.
pub fn coordinator(config: &Config) -> ServerCoordinator {
    let source = config.server.config_path.as_ref().map(|path| {
        info!(path = %path.display(), "Discovering broadcast server from its config file");
        Arc::new(IcecastConfigSource::new(path)) as Arc<dyn StatusSource>
    });
    ServerCoordinator::new(config.server_settings(), source)
}

/// Start every configured stream. Failures are logged; returns how many started.
pub fn start_configured(supervisor: &Supervisor, config: &Config) -> usize {
    let mut started = 0;
    for entry in &config.streams {
        match supervisor.start(&entry.id, entry.config.clone()) {
            Ok(snapshot) => {
                info!(stream_id = %entry.id, pid = ?snapshot.pid, format = %snapshot.format_name, "Stream started");
                started += 1;
            }
            Err(e) => error!(stream_id = %entry.id, "Failed to start stream: {}", e),
        }
    }
    started
}

fn log_event(event: &SupervisorEvent) {
    match event {
        SupervisorEvent::Added { id, snapshot } => {
            info!(stream_id = %id, name = %snapshot.name, "Stream added")
        }
        SupervisorEvent::StatusChanged {
            id,
            previous,
            current,
            snapshot,
        } => info!(
            stream_id = %id,
            attempt = snapshot.attempt,
            format = %snapshot.format_name,
            "{} -> {}",
            previous,
            current
        ),
        SupervisorEvent::Diagnosed { id, diagnosis } => warn!(
            stream_id = %id,
            category = diagnosis.category.name(),
            retryable = diagnosis.retryable,
            "{}",
            diagnosis.message
        ),
        SupervisorEvent::Removed { id } => info!(stream_id = %id, "Stream removed"),
    }
}

/// Run the daemon until Ctrl-C.
pub fn run(config: Config) -> Result<()> {
    let supervisor_config = config
        .supervisor_config()
        .context("Invalid supervisor configuration")?;
    let grace_period = supervisor_config.grace_period;

    let coordinator = Arc::new(coordinator(&config));
    match coordinator.verify_live() {
        Ok(target) => info!(server = %target.address(), "Broadcast server is reachable"),
        Err(e) => warn!("Broadcast server check failed, streams may not connect: {}", e),
    }

    let supervisor = Supervisor::new(supervisor_config, Arc::new(OsLauncher::default()), coordinator);

    let events = supervisor.subscribe();
    thread::Builder::new()
        .name("airwave-events".into())
        .spawn(move || {
            for event in events.iter() {
                log_event(&event);
            }
        })
        .context("Failed to spawn event logger")?;

    let started = start_configured(&supervisor, &config);
    info!(started, configured = config.streams.len(), "airwave running");

    wait_for_ctrl_c()?;

    info!("Shutting down");
    let remaining = supervisor.shutdown(grace_period + SHUTDOWN_SLACK);
    if remaining > 0 {
        error!(remaining, "Some streams did not stop");
    }
    Ok(())
}

fn wait_for_ctrl_c() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("Failed to listen for Ctrl-C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwave_server::IngestResolver;
    use airwave_supervisor::StreamStatus;

    #[test]
    fn test_coordinator_reads_server_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icecast.xml");
        std::fs::write(
            &path,
            "<icecast>\n  <authentication><source-password>from-file</source-password></authentication>\n  <listen-socket><port>8123</port><bind-address>0.0.0.0</bind-address></listen-socket>\n</icecast>\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.server.config_path = Some(path);

        let target = coordinator(&config).resolve_ingest_target().unwrap();
        assert_eq!(target.host, "127.0.0.1");
        assert_eq!(target.port, 8123);
        assert_eq!(target.source_password, "from-file");
    }

    #[test]
    fn test_start_configured_logs_and_counts_failures() {
        let config = Config::from_json(
            r#"{
                "encoder_path": "/definitely/not/here/ffmpeg",
                "server": { "source_password": "hackme" },
                "streams": [
                    { "id": "fr", "name": "French", "input": { "kind": "device", "value": "mic-2" } },
                    { "id": "bad id", "name": "Broken", "input": { "kind": "device", "value": "mic-3" } }
                ]
            }"#,
        )
        .unwrap();

        let supervisor = Supervisor::new(
            config.supervisor_config().unwrap(),
            Arc::new(OsLauncher::default()),
            Arc::new(coordinator(&config)),
        );

        assert_eq!(start_configured(&supervisor, &config), 0);
        assert_eq!(supervisor.status("fr").map(|s| s.status), Some(StreamStatus::Error));
        assert!(supervisor.status("bad id").is_none());
    }
}
