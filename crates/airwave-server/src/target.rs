//! Ingest target and connection string construction.

use std::fmt;

use url::Url;

use crate::error::ServerError;
use crate::{ServerResult, LOOPBACK_HOST};

/// Where an encoder connects to publish audio.
#[derive(Clone, PartialEq, Eq)]
pub struct IngestTarget {
    /// Connectable host (never a wildcard address).
    pub host: String,

    /// Ingest port.
    pub port: u16,

    /// Source user name.
    pub source_user: String,

    /// Source password.
    pub source_password: String,
}

impl IngestTarget {
    /// Create a target, replacing wildcard hosts with loopback.
    pub fn new(
        host: &str,
        port: u16,
        source_user: impl Into<String>,
        source_password: impl Into<String>,
    ) -> Self {
        Self {
            host: normalize_connect_host(host),
            port,
            source_user: source_user.into(),
            source_password: source_password.into(),
        }
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        format!("{}:{}", bracket_ipv6(&self.host), self.port)
    }

    /// Connection string for publishing on `mount`, with the credential
    /// percent-encoded into the userinfo.
    pub fn connection_url(&self, mount: &str) -> ServerResult<String> {
        let base = format!("icecast://{}/", self.address());
        let mut url = Url::parse(&base).map_err(|e| ServerError::InvalidTarget(e.to_string()))?;

        url.set_username(&self.source_user)
            .map_err(|_| ServerError::InvalidTarget(format!("cannot set user on {base}")))?;
        url.set_password(Some(&self.source_password))
            .map_err(|_| ServerError::InvalidTarget(format!("cannot set password on {base}")))?;
        url.set_path(mount);

        Ok(url.into())
    }
}

impl fmt::Debug for IngestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("source_user", &self.source_user)
            .field("source_password", &"<redacted>")
            .finish()
    }
}

/// Mount point for a stream id. Ids are validated to be mount-safe upstream.
pub fn mount_for(stream_id: &str) -> String {
    format!("/{stream_id}")
}

/// Replace wildcard listen addresses with loopback.
///
/// `0.0.0.0`, `::` and friends are valid to listen on but not to connect to.
pub fn normalize_connect_host(host: &str) -> String {
    let trimmed = host.trim();
    match trimmed {
        "" | "*" | "0.0.0.0" | "::" | "[::]" | "0:0:0:0:0:0:0:0" => LOOPBACK_HOST.to_string(),
        _ => trimmed
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string(),
    }
}

fn bracket_ipv6(host: &str) -> String {
    if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}
