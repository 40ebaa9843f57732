//! Daemon configuration: a JSON file plus environment overrides.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use airwave_encoder::{EncoderError, FormatPolicy, FormatProfile, DEFAULT_ENCODER_PATH};
use airwave_ipc::StreamConfig;
use airwave_server::{
    ServerSettings, DEFAULT_DISCOVERY_TIMEOUT_MS, DEFAULT_PORT, DEFAULT_SOURCE_USER, LOOPBACK_HOST,
};
use airwave_supervisor::policy::{BASE_RETRY_DELAY_MS, NETWORK_RETRIES};
use airwave_supervisor::{RetryPolicy, SupervisorConfig};

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "AIRWAVE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidVar { var: String, value: String },

    #[error("Invalid format list: {0}")]
    Formats(#[from] EncoderError),
}

/// Broadcast server section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub source_user: String,
    pub source_password: Option<String>,

    /// The server's own config file, used to discover its port and credential.
    pub config_path: Option<PathBuf>,

    pub discovery_timeout_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: LOOPBACK_HOST.to_string(),
            port: DEFAULT_PORT,
            source_user: DEFAULT_SOURCE_USER.to_string(),
            source_password: None,
            config_path: None,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            probe_timeout_ms: 2000,
        }
    }
}

/// A stream to start at boot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamEntry {
    pub id: String,

    #[serde(flatten)]
    pub config: StreamConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub encoder_path: PathBuf,
    pub grace_period_ms: u64,
    pub retry_delay_ms: u64,
    pub network_retries: u32,

    /// Custom format fallback list; the built-in list when absent.
    pub formats: Option<Vec<FormatProfile>>,

    pub server: ServerSection,
    pub streams: Vec<StreamEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encoder_path: PathBuf::from(DEFAULT_ENCODER_PATH),
            grace_period_ms: 5000,
            retry_delay_ms: BASE_RETRY_DELAY_MS,
            network_retries: NETWORK_RETRIES,
            formats: None,
            server: ServerSection::default(),
            streams: Vec::new(),
        }
    }
}

impl Config {
    /// Load from the file named by `path_arg` or `AIRWAVE_CONFIG`, then apply
    /// environment overrides.
    pub fn from_env(path_arg: Option<PathBuf>) -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars().collect();
        let path = path_arg.or_else(|| vars.get(CONFIG_PATH_VAR).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(&vars)?;
        Ok(config)
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = match vars.get(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(path))?,
            None => Self::default(),
        };
        config.apply_overrides(vars)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    fn apply_overrides(&mut self, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(path) = vars.get("AIRWAVE_ENCODER_PATH") {
            self.encoder_path = PathBuf::from(path);
        }
        if let Some(host) = vars.get("AIRWAVE_SERVER_HOST") {
            self.server.host = host.clone();
        }
        if let Some(port) = vars.get("AIRWAVE_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidVar {
                var: "AIRWAVE_SERVER_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(password) = vars.get("AIRWAVE_SOURCE_PASSWORD") {
            self.server.source_password = Some(password.clone());
        }
        if let Some(path) = vars.get("AIRWAVE_SERVER_CONFIG") {
            self.server.config_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn supervisor_config(&self) -> Result<SupervisorConfig, ConfigError> {
        let formats = match &self.formats {
            Some(profiles) => FormatPolicy::new(profiles.clone())?,
            None => FormatPolicy::default(),
        };

        Ok(SupervisorConfig {
            encoder_path: self.encoder_path.clone(),
            grace_period: Duration::from_millis(self.grace_period_ms),
            retry: RetryPolicy {
                retry_delay: Duration::from_millis(self.retry_delay_ms),
                network_retries: self.network_retries,
                ..RetryPolicy::default()
            },
            formats,
            ..SupervisorConfig::default()
        })
    }

    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            host: self.server.host.clone(),
            port: self.server.port,
            source_user: self.server.source_user.clone(),
            source_password: self.server.source_password.clone(),
            discovery_timeout: Duration::from_millis(self.server.discovery_timeout_ms),
            probe_timeout: Duration::from_millis(self.server.probe_timeout_ms),
        }
    }
}
