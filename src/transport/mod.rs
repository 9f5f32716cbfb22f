// MIT License - Copyright (c) 2026 The ad2sock authors
// ser2sock keypad client

pub mod tls;

use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::error::{Ad2Error, Result};

/// Anything the client can read protocol lines from.
pub trait LineStream: AsyncRead + Send + Unpin {}

impl<T: AsyncRead + Send + Unpin> LineStream for T {}

pub type BoxedStream = Box<dyn LineStream>;

/// Open the transport described by `config`: plain TCP, or TCP wrapped in
/// TLS when a rustls configuration is present.
pub async fn open(config: &ClientConfig) -> Result<BoxedStream> {
    let address = config.address();
    info!("Connecting to ser2sock at {}", address);

    let stream = TcpStream::connect(&address).await.map_err(|e| {
        error!("TCP connect to {} failed: {}", address, e);
        Ad2Error::Io(e)
    })?;
    debug!("TCP socket connected");

    match &config.tls {
        Some(tls) => {
            let stream = tls::wrap_stream(stream, config.server_name(), tls.clone()).await?;
            Ok(Box::new(stream))
        }
        None => Ok(Box::new(stream)),
    }
}
