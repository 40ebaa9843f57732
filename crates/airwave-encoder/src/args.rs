//! ffmpeg argument construction.

use airwave_ipc::{EncodingConfig, InputDescriptor};

use crate::FormatProfile;

/// Encoder executable used when none is configured.
pub const DEFAULT_ENCODER_PATH: &str = "ffmpeg";

/// Everything needed to build one encoder invocation.
#[derive(Debug, Clone)]
pub struct EncoderArgs<'a> {
    /// Audio source.
    pub input: &'a InputDescriptor,

    /// Encoding parameters.
    pub encoding: &'a EncodingConfig,

    /// Format for this attempt.
    pub profile: &'a FormatProfile,

    /// Display name announced to the broadcast server.
    pub stream_name: &'a str,

    /// Ingest connection string, credential included.
    pub output_url: &'a str,
}

impl EncoderArgs<'_> {
    /// Build the argument list for the current platform.
    pub fn build(&self) -> Vec<String> {
        self.build_for(std::env::consts::OS)
    }

    /// Build the argument list as it would be on `os`.
    pub fn build_for(&self, os: &str) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostats", "-loglevel", "warning"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        args.extend(input_args(self.input, os));

        args.extend([
            "-vn".to_string(),
            "-c:a".to_string(),
            self.profile.codec.clone(),
            "-b:a".to_string(),
            format!("{}k", self.encoding.bitrate_kbps),
            "-ar".to_string(),
            self.encoding.sample_rate.to_string(),
            "-ac".to_string(),
            self.encoding.channels.to_string(),
        ]);
        args.extend(self.profile.extra_args.iter().cloned());
        args.extend([
            "-content_type".to_string(),
            self.profile.content_type.clone(),
            "-ice_name".to_string(),
            self.stream_name.to_string(),
            "-f".to_string(),
            self.profile.container.clone(),
            self.output_url.to_string(),
        ]);

        args
    }
}

fn input_args(input: &InputDescriptor, os: &str) -> Vec<String> {
    match input {
        InputDescriptor::File(path) => vec!["-re".into(), "-i".into(), path.clone()],
        InputDescriptor::Device(id) => {
            let (format, source) = match os {
                "windows" => ("dshow", format!("audio={id}")),
                "macos" => ("avfoundation", format!(":{id}")),
                _ => ("alsa", id.clone()),
            };
            vec!["-f".into(), format.into(), "-i".into(), source]
        }
    }
}
