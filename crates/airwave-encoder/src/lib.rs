//! Format fallback policy and encoder command lines.
//!
//! Streams are encoded by an external ffmpeg process. This crate owns the
//! ordered list of formats to try and the construction of the encoder's
//! argument list for a given format and ingest URL.

mod args;
mod error;

pub use args::{EncoderArgs, DEFAULT_ENCODER_PATH};
pub use error::EncoderError;

use serde::{Deserialize, Serialize};

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// One codec/container combination the encoder can stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatProfile {
    /// Display name (e.g. "MP3").
    pub name: String,

    /// ffmpeg audio codec (e.g. "libmp3lame").
    pub codec: String,

    /// ffmpeg output container (e.g. "mp3").
    pub container: String,

    /// MIME type announced to the broadcast server.
    pub content_type: String,

    /// File extension listeners would expect.
    pub extension: String,

    /// Extra muxer options placed before the output.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl FormatProfile {
    /// MPEG-1 Layer III, the most widely playable choice.
    pub fn mp3() -> Self {
        Self {
            name: "MP3".into(),
            codec: "libmp3lame".into(),
            container: "mp3".into(),
            content_type: "audio/mpeg".into(),
            extension: "mp3".into(),
            extra_args: Vec::new(),
        }
    }

    /// AAC in fragmented MP4, streamable without seeking.
    pub fn aac() -> Self {
        Self {
            name: "AAC".into(),
            codec: "aac".into(),
            container: "mp4".into(),
            content_type: "audio/mp4".into(),
            extension: "m4a".into(),
            extra_args: vec![
                "-movflags".into(),
                "frag_keyframe+empty_moov+default_base_moof".into(),
            ],
        }
    }

    /// Vorbis in Ogg.
    pub fn ogg() -> Self {
        Self {
            name: "OGG".into(),
            codec: "libvorbis".into(),
            container: "ogg".into(),
            content_type: "audio/ogg".into(),
            extension: "ogg".into(),
            extra_args: Vec::new(),
        }
    }

    fn check(&self) -> EncoderResult<()> {
        let missing = if self.codec.is_empty() {
            Some("codec")
        } else if self.container.is_empty() {
            Some("container")
        } else if self.content_type.is_empty() {
            Some("content type")
        } else {
            None
        };

        match missing {
            Some(field) => Err(EncoderError::IncompleteProfile {
                name: self.name.clone(),
                field,
            }),
            None => Ok(()),
        }
    }
}

/// Ordered list of formats tried in turn when encoding fails.
///
/// Earlier entries are preferred for listener compatibility; later ones
/// trade compatibility for encoder availability. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPolicy {
    profiles: Vec<FormatProfile>,
}

impl FormatPolicy {
    /// Build a policy from a custom list.
    pub fn new(profiles: Vec<FormatProfile>) -> EncoderResult<Self> {
        if profiles.is_empty() {
            return Err(EncoderError::EmptyFormatList);
        }
        for profile in &profiles {
            profile.check()?;
        }
        Ok(Self { profiles })
    }

    /// Profile at `index`, or `None` past the end of the list.
    pub fn format_at(&self, index: usize) -> Option<&FormatProfile> {
        self.profiles.get(index)
    }

    /// Profile at `index`, as an error past the end of the list.
    pub fn require(&self, index: usize) -> EncoderResult<&FormatProfile> {
        self.format_at(index).ok_or(EncoderError::OutOfRange {
            index,
            count: self.count(),
        })
    }

    /// Number of formats in the list.
    pub fn count(&self) -> usize {
        self.profiles.len()
    }

    /// Returns true if another format follows `index`.
    pub fn has_next(&self, index: usize) -> bool {
        index + 1 < self.count()
    }

    /// All profiles, in order.
    pub fn profiles(&self) -> &[FormatProfile] {
        &self.profiles
    }
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self {
            profiles: vec![FormatProfile::mp3(), FormatProfile::aac(), FormatProfile::ogg()],
        }
    }
}
