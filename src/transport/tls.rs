// MIT License - Copyright (c) 2026 The ad2sock authors
// ser2sock keypad client

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error};

use crate::error::{Ad2Error, Result};

/// Run a TLS client handshake over an already-connected socket.
pub async fn wrap_stream<S>(
    socket: S,
    server_name: &str,
    config: Arc<rustls::ClientConfig>,
) -> Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // rustls expects IPv6 addresses without the surrounding [] brackets
    let name = server_name
        .strip_prefix('[')
        .and_then(|n| n.strip_suffix(']'))
        .unwrap_or(server_name);
    let domain = ServerName::try_from(name.to_string()).map_err(|_| {
        Ad2Error::InvalidServerName {
            name: server_name.to_string(),
        }
    })?;

    let stream = TlsConnector::from(config)
        .connect(domain, socket)
        .await
        .map_err(|e| {
            error!("TLS handshake failed: {}", e);
            Ad2Error::Io(e)
        })?;
    debug!("TLS session established with {}", server_name);
    Ok(stream)
}
