//! Common types used across control-plane messages.

use serde::{Deserialize, Serialize};

use crate::diagnosis::Diagnosis;
use crate::error::ConfigurationError;
use crate::state::StreamStatus;

/// Where a stream's audio comes from. Opaque to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputDescriptor {
    /// A capture device identifier as reported by the platform.
    Device(String),

    /// A file or media source path, played in real time.
    File(String),
}

impl InputDescriptor {
    /// The raw identifier or path.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Device(id) => id,
            Self::File(path) => path,
        }
    }

    /// Returns true if this is a capture device.
    pub fn is_device(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

/// Audio encoding parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Target bitrate in kbps (default: 128).
    pub bitrate_kbps: u32,

    /// Output sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Output channel count (default: 2).
    pub channels: u16,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            bitrate_kbps: 128,
            sample_rate: 48000,
            channels: 2,
        }
    }
}

impl EncodingConfig {
    /// Sample rates every format in the fallback list accepts.
    pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [22050, 32000, 44100, 48000];

    /// Check the parameters against what every fallback format can encode.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(32..=320).contains(&self.bitrate_kbps) {
            return Err(ConfigurationError::InvalidBitrate(self.bitrate_kbps));
        }
        if !Self::SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(ConfigurationError::InvalidSampleRate(self.sample_rate));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(ConfigurationError::InvalidChannels(self.channels));
        }
        Ok(())
    }
}

/// Configuration for starting a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Display label, unique (case-insensitive) among active streams.
    pub name: String,

    /// Audio source.
    pub input: InputDescriptor,

    /// Encoding parameters.
    #[serde(default)]
    pub encoding: EncodingConfig,
}

impl StreamConfig {
    /// Create a config with default encoding parameters.
    pub fn new(name: impl Into<String>, input: InputDescriptor) -> Self {
        Self {
            name: name.into(),
            input,
            encoding: EncodingConfig::default(),
        }
    }

    /// Validate the config on its own, without regard to other streams.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        if self.input.as_str().trim().is_empty() {
            return Err(ConfigurationError::MissingInput(self.name.clone()));
        }
        self.encoding.validate()
    }
}

/// Check that a stream id can be used verbatim as a mount name.
pub fn validate_stream_id(id: &str) -> Result<(), ConfigurationError> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidId(id.to_string()))
    }
}

/// Point-in-time view of a stream, as exposed to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    /// Caller-supplied unique id.
    pub id: String,

    /// Display label.
    pub name: String,

    /// Audio source.
    pub input: InputDescriptor,

    /// Encoding parameters.
    pub encoding: EncodingConfig,

    /// Lifecycle status.
    pub status: StreamStatus,

    /// Position in the format fallback list.
    pub format_index: usize,

    /// Name of the format currently in use.
    pub format_name: String,

    /// Number of launch attempts made so far (1 for the first launch).
    pub attempt: u32,

    /// OS process id of the encoder, while one exists.
    pub pid: Option<u32>,

    /// Wall-clock time the current encoder process was launched (ms since epoch).
    pub started_at_ms: Option<u64>,

    /// Wall-clock time the last encoder process exited (ms since epoch).
    pub exited_at_ms: Option<u64>,

    /// Normalized exit code of the last encoder process.
    pub exit_code: Option<i32>,

    /// Signal that terminated the last encoder process.
    pub exit_signal: Option<i32>,

    /// Most recent failure diagnosis.
    pub last_diagnosis: Option<Diagnosis>,
}

impl StreamSnapshot {
    /// Initial snapshot for a stream that has just been accepted.
    pub fn new(id: impl Into<String>, config: &StreamConfig, format_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: config.name.clone(),
            input: config.input.clone(),
            encoding: config.encoding.clone(),
            status: StreamStatus::Starting,
            format_index: 0,
            format_name: format_name.into(),
            attempt: 0,
            pid: None,
            started_at_ms: None,
            exited_at_ms: None,
            exit_code: None,
            exit_signal: None,
            last_diagnosis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn french() -> StreamConfig {
        StreamConfig::new("French", InputDescriptor::Device("mic-2".into()))
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(french().validate(), Ok(()));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut config = french();
        config.name = "  ".into();
        assert_eq!(config.validate(), Err(ConfigurationError::EmptyName));
    }

    #[test]
    fn test_empty_input_rejected() {
        let mut config = french();
        config.input = InputDescriptor::File(String::new());
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingInput(_))
        ));
    }

    #[test]
    fn test_encoding_bounds() {
        let mut config = french();
        config.encoding.bitrate_kbps = 16;
        assert_eq!(config.validate(), Err(ConfigurationError::InvalidBitrate(16)));

        config.encoding.bitrate_kbps = 96;
        config.encoding.sample_rate = 96000;
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::InvalidSampleRate(96000))
        );

        config.encoding.sample_rate = 44100;
        config.encoding.channels = 6;
        assert_eq!(config.validate(), Err(ConfigurationError::InvalidChannels(6)));
    }

    #[test]
    fn test_stream_id_validation() {
        assert!(validate_stream_id("fr").is_ok());
        assert!(validate_stream_id("room-1_main.v2").is_ok());
        assert!(validate_stream_id("").is_err());
        assert!(validate_stream_id("../etc").is_err());
        assert!(validate_stream_id("with space").is_err());
        assert!(validate_stream_id(".hidden").is_err());
    }

    #[test]
    fn test_config_deserializes_with_default_encoding() {
        let json = r#"{"name":"French","input":{"kind":"device","value":"mic-2"}}"#;
        let config: StreamConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.input, InputDescriptor::Device("mic-2".into()));
        assert_eq!(config.encoding, EncodingConfig::default());
    }
}
