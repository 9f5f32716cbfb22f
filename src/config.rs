// MIT License - Copyright (c) 2026 The ad2sock authors
// ser2sock keypad client

use std::sync::Arc;
use std::time::Duration;

use crate::parser::Parser;

/// Default ser2sock listening port.
pub const DEFAULT_PORT: u16 = 10000;

/// Configuration for connecting to a ser2sock server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or IP address
    pub host: String,
    /// Server TCP port (default: 10000)
    pub port: u16,
    /// TLS client configuration; `None` connects in plaintext
    pub tls: Option<Arc<rustls::ClientConfig>>,
    /// Name to verify the server certificate against (default: `host`)
    pub tls_server_name: Option<String>,
    /// How long to wait for the `!SER2SOCK` banner (default: 5000)
    pub banner_timeout_ms: u64,
    /// Messages buffered per subscriber before the read loop blocks (default: 1)
    pub subscriber_capacity: usize,
    /// Base delay after a failed read, doubled per consecutive failure (default: 100)
    pub read_error_backoff_ms: u64,
    /// Consecutive read failures after which the read loop gives up (default: 10)
    pub max_read_errors: u32,
    /// Line parser; replace to decode additional message families
    pub parser: Parser,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            tls: None,
            tls_server_name: None,
            banner_timeout_ms: 5000,
            subscriber_capacity: 1,
            read_error_backoff_ms: 100,
            max_read_errors: 10,
            parser: Parser::new(),
        }
    }
}

impl ClientConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// `host:port` string handed to the TCP connector.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Name used for TLS server verification.
    pub fn server_name(&self) -> &str {
        self.tls_server_name.as_deref().unwrap_or(&self.host)
    }

    pub fn banner_timeout(&self) -> Duration {
        Duration::from_millis(self.banner_timeout_ms)
    }

    pub fn read_error_backoff(&self) -> Duration {
        Duration::from_millis(self.read_error_backoff_ms)
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn tls(mut self, tls: Arc<rustls::ClientConfig>) -> Self {
        self.config.tls = Some(tls);
        self
    }

    pub fn tls_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.tls_server_name = Some(name.into());
        self
    }

    pub fn banner_timeout_ms(mut self, ms: u64) -> Self {
        self.config.banner_timeout_ms = ms;
        self
    }

    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.config.subscriber_capacity = capacity;
        self
    }

    pub fn read_error_backoff_ms(mut self, ms: u64) -> Self {
        self.config.read_error_backoff_ms = ms;
        self
    }

    pub fn max_read_errors(mut self, max: u32) -> Self {
        self.config.max_read_errors = max;
        self
    }

    pub fn parser(mut self, parser: Parser) -> Self {
        self.config.parser = parser;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Zone tracker timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// How long a fault stays open without being refreshed (default: 30000)
    pub fault_timeout_ms: u64,
    /// How often faults are checked for expiry between messages (default: 1000)
    pub sweep_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            fault_timeout_ms: 30_000,
            sweep_interval_ms: 1000,
        }
    }
}

impl TrackerConfig {
    pub fn fault_timeout(&self) -> Duration {
        Duration::from_millis(self.fault_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
