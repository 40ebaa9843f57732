//! Liveness probing of the broadcast server.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::runtime::Builder;
use tracing::{debug, instrument};

use crate::error::ServerError;
use crate::ServerResult;

/// Check that `host:port` accepts TCP connections within `timeout`.
#[instrument(name = "probe_tcp", skip(timeout))]
pub fn probe_tcp(host: &str, port: u16, timeout: Duration) -> ServerResult<()> {
    let address = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };

    // Private runtime; the supervisor itself is thread based.
    let runtime = Builder::new_current_thread().enable_all().build()?;

    let result = runtime.block_on(async {
        tokio::time::timeout(timeout, TcpStream::connect(address.as_str())).await
    });

    match result {
        Ok(Ok(_stream)) => {
            debug!(%address, "Broadcast server reachable");
            Ok(())
        }
        Ok(Err(e)) => Err(ServerError::Unreachable {
            address,
            reason: e.to_string(),
        }),
        Err(_) => Err(ServerError::Unreachable {
            address,
            reason: format!("no answer within {timeout:?}"),
        }),
    }
}
