//! Discovery of the broadcast server's live connection parameters.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, instrument};

use crate::error::ServerError;
use crate::ServerResult;

/// Connection parameters reported by the broadcast server. Fields the
/// source does not know are left empty and filled from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredServer {
    /// Host the server listens on, possibly a wildcard.
    pub host: Option<String>,

    /// Port the server listens on.
    pub port: Option<u16>,

    /// Source password.
    pub source_password: Option<String>,
}

/// Something that can report the broadcast server's current parameters.
pub trait StatusSource: Send + Sync {
    /// Query the server's status/config. May block; callers bound it.
    fn discover(&self) -> ServerResult<DiscoveredServer>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Reads an Icecast-style XML configuration file.
#[derive(Debug, Clone)]
pub struct IcecastConfigSource {
    path: PathBuf,
}

impl IcecastConfigSource {
    /// Source reading the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extract connection parameters from config file contents.
    ///
    /// Port and bind address come from the first `<listen-socket>`; the
    /// source password from the first `<source-password>`. Comments are
    /// skipped, entities and character references decoded, CDATA taken as is.
    pub fn parse(contents: &str) -> ServerResult<DiscoveredServer> {
        let mut reader = Reader::from_str(contents);
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();
        let mut sockets = 0usize;
        let mut port_text = None;
        let mut discovered = DiscoveredServer::default();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if name == "listen-socket" {
                        sockets += 1;
                    }
                    path.push(name);
                    text.clear();
                }
                Event::Text(t) => text.push_str(&t.unescape()?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
                Event::End(_) => {
                    let value = text.trim();
                    let in_first_socket = sockets == 1
                        && path.len() >= 2
                        && path[path.len() - 2] == "listen-socket";

                    match path.last().map(String::as_str) {
                        Some("port") if in_first_socket && port_text.is_none() => {
                            port_text = Some(value.to_string());
                        }
                        Some("bind-address") if in_first_socket && discovered.host.is_none() => {
                            discovered.host = Some(value.to_string());
                        }
                        Some("source-password") if discovered.source_password.is_none() => {
                            discovered.source_password = Some(value.to_string());
                        }
                        _ => {}
                    }
                    path.pop();
                    text.clear();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(port) = port_text {
            discovered.port = Some(port.parse::<u16>().map_err(|e| {
                ServerError::Discovery(format!("invalid port {port:?}: {e}"))
            })?);
        }

        if discovered.port.is_none() && discovered.source_password.is_none() {
            return Err(ServerError::Discovery(
                "no listen port or source password in server config".to_string(),
            ));
        }

        Ok(discovered)
    }
}

impl StatusSource for IcecastConfigSource {
    #[instrument(name = "icecast_discover", skip(self), fields(path = %self.path.display()))]
    fn discover(&self) -> ServerResult<DiscoveredServer> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            ServerError::Discovery(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let discovered = Self::parse(&contents)?;
        debug!(host = ?discovered.host, port = ?discovered.port, "Discovered server config");
        Ok(discovered)
    }

    fn describe(&self) -> String {
        format!("icecast config {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"<icecast>
    <authentication>
        <!-- <source-password>old</source-password> -->
        <source-password>s3cr&amp;t</source-password>
        <admin-password>admin</admin-password>
    </authentication>
    <hostname>radio.example.org</hostname>
    <listen-socket>
        <port>8010</port>
        <bind-address>0.0.0.0</bind-address>
    </listen-socket>
</icecast>"#;

    #[test]
    fn test_parse_extracts_port_host_password() {
        let discovered = IcecastConfigSource::parse(CONFIG).unwrap();

        assert_eq!(discovered.port, Some(8010));
        assert_eq!(discovered.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(discovered.source_password.as_deref(), Some("s3cr&t"));
    }

    #[test]
    fn test_parse_without_bind_address() {
        let config = "<icecast><listen-socket><port>9000</port></listen-socket></icecast>";
        let discovered = IcecastConfigSource::parse(config).unwrap();

        assert_eq!(discovered.port, Some(9000));
        assert_eq!(discovered.host, None);
        assert_eq!(discovered.source_password, None);
    }

    #[test]
    fn test_parse_rejects_unrelated_file() {
        assert!(matches!(
            IcecastConfigSource::parse("<html></html>"),
            Err(ServerError::Discovery(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        let config = "<listen-socket><port>99999</port></listen-socket>";
        assert!(IcecastConfigSource::parse(config).is_err());
    }

    #[test]
    fn test_parse_decodes_character_references() {
        let config = "<icecast><authentication>\
            <source-password>p&#38;ss&#x21;&lt;</source-password>\
            </authentication></icecast>";
        let discovered = IcecastConfigSource::parse(config).unwrap();

        assert_eq!(discovered.source_password.as_deref(), Some("p&ss!<"));
    }

    #[test]
    fn test_parse_reads_cdata_password() {
        let config = "<icecast><authentication>\
            <source-password><![CDATA[a<b&c]]></source-password>\
            </authentication></icecast>";
        let discovered = IcecastConfigSource::parse(config).unwrap();

        assert_eq!(discovered.source_password.as_deref(), Some("a<b&c"));
    }

    #[test]
    fn test_parse_uses_first_listen_socket_only() {
        let config = r#"<icecast>
    <listen-socket>
        <!-- <port>7000</port> -->
        <port>8010</port>
    </listen-socket>
    <listen-socket>
        <port>8443</port>
        <bind-address>10.0.0.1</bind-address>
        <ssl>1</ssl>
    </listen-socket>
    <relay><server>upstream.example.org</server><port>9000</port></relay>
</icecast>"#;
        let discovered = IcecastConfigSource::parse(config).unwrap();

        assert_eq!(discovered.port, Some(8010));
        assert_eq!(discovered.host, None);
    }

    #[test]
    fn test_parse_rejects_malformed_xml() {
        let config = "<icecast><listen-socket><port>8000</listen-socket></icecast>";
        assert!(matches!(
            IcecastConfigSource::parse(config),
            Err(ServerError::Xml(_))
        ));
    }

    #[test]
    fn test_discover_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let source = IcecastConfigSource::new(file.path());
        let discovered = source.discover().unwrap();
        assert_eq!(discovered.port, Some(8010));
    }

    #[test]
    fn test_discover_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = IcecastConfigSource::new(dir.path().join("icecast.xml"));
        assert!(matches!(source.discover(), Err(ServerError::Discovery(_))));
    }
}
