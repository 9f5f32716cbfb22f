// MIT License - Copyright (c) 2026 The ad2sock authors
// MQTT bridge

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use ad2sock::{Client, ClientConfig, KeypadMessage, Message, TrackerConfig, ZoneId, ZoneTracker};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "ad2sock")]
#[command(about = "Bridge between a ser2sock keypad stream and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    connection: ConnectionToml,
    #[serde(default)]
    tracker: TrackerToml,
    #[serde(default)]
    mqtt: Option<MqttToml>,
    #[serde(default, deserialize_with = "deserialize_zone_names")]
    zone_names: HashMap<ZoneId, String>,
}

fn deserialize_zone_names<'de, D>(deserializer: D) -> Result<HashMap<ZoneId, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let string_map: HashMap<String, String> = HashMap::deserialize(deserializer)?;
    string_map
        .into_iter()
        .map(|(k, v)| {
            k.parse::<ZoneId>()
                .map(|id| (id, v))
                .map_err(|_| serde::de::Error::custom(format!("invalid zone ID: {k}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ConnectionToml {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_banner_timeout")]
    banner_timeout_ms: u64,
    /// Optional; plaintext when omitted
    #[serde(default)]
    tls: Option<TlsToml>,
}

fn default_port() -> u16 {
    ad2sock::config::DEFAULT_PORT
}
fn default_banner_timeout() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
struct TlsToml {
    ca_file: String,
    /// Client certificate chain, for servers that require client auth
    #[serde(default)]
    cert_file: Option<String>,
    #[serde(default)]
    key_file: Option<String>,
    /// Name to verify the server certificate against (default: host)
    #[serde(default)]
    server_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackerToml {
    #[serde(default = "default_fault_timeout")]
    fault_timeout_secs: u64,
}

impl Default for TrackerToml {
    fn default() -> Self {
        Self {
            fault_timeout_secs: default_fault_timeout(),
        }
    }
}

fn default_fault_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
}

fn default_client_id() -> String {
    "ad2sock".to_string()
}
fn default_publish_topic() -> String {
    "alarm".to_string()
}

fn build_client_config(toml: &ConnectionToml) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .banner_timeout_ms(toml.banner_timeout_ms);

    if let Some(tls) = &toml.tls {
        builder = builder.tls(build_tls_config(tls)?);
        if let Some(name) = &tls.server_name {
            builder = builder.tls_server_name(name);
        }
    }

    Ok(builder.build())
}

fn build_tracker_config(toml: &TrackerToml) -> TrackerConfig {
    TrackerConfig {
        fault_timeout_ms: toml.fault_timeout_secs * 1000,
        ..TrackerConfig::default()
    }
}

// ---------------------------------------------------------------------------
// TLS
// ---------------------------------------------------------------------------

fn build_tls_config(toml: &TlsToml) -> Result<Arc<rustls::ClientConfig>> {
    if toml.cert_file.is_some() != toml.key_file.is_some() {
        anyhow::bail!("cert_file and key_file must be given together");
    }

    let mut roots = rustls::RootCertStore::empty();
    for cert in load_certs(Path::new(&toml.ca_file))? {
        roots
            .add(cert)
            .with_context(|| format!("Invalid CA certificate in {}", toml.ca_file))?;
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(roots);

    let config = match (&toml.cert_file, &toml.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let chain = load_certs(Path::new(cert_file))?;
            let key = load_private_key(Path::new(key_file))?;
            builder
                .with_client_auth_cert(chain, key)
                .context("Invalid client certificate or key")?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {path:?}"))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read certificates from {path:?}"))?;
    if certs.is_empty() {
        anyhow::bail!("No certificates found in {path:?}");
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("Failed to open {path:?}"))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("Failed to read private key from {path:?}"))?
        .with_context(|| format!("No private key found in {path:?}"))
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages share a flat {now, op, ...} structure

// Zone events: {now, op, zone, name}
#[derive(Serialize)]
struct MqttZoneEvent {
    now: u64,
    op: String,
    zone: ZoneId,
    name: String,
}

// Keypad status: one document per keypad line
#[derive(Serialize)]
struct MqttKeypadEvent {
    now: u64,
    op: String,
    zone: ZoneId,
    text: String,
    ready: bool,
    #[serde(rename = "armedAway")]
    armed_away: bool,
    #[serde(rename = "armedHome")]
    armed_home: bool,
    #[serde(rename = "acPower")]
    ac_power: bool,
    #[serde(rename = "alarmSounding")]
    alarm_sounding: bool,
    #[serde(rename = "batteryLow")]
    battery_low: bool,
    fire: bool,
    beeps: u8,
}

impl MqttKeypadEvent {
    fn from_keypad(msg: &KeypadMessage) -> Self {
        Self {
            now: now_epoch_ms(),
            op: "KEYPAD".to_string(),
            zone: msg.zone(),
            text: msg.text.clone(),
            ready: msg.fields.ready(),
            armed_away: msg.fields.armed_away(),
            armed_home: msg.fields.armed_home(),
            ac_power: msg.fields.ac_power(),
            alarm_sounding: msg.fields.alarm_sounding(),
            battery_low: msg.fields.battery_low(),
            fire: msg.fields.fire(),
            beeps: msg.fields.beep_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn zone_label(zone_id: ZoneId, overrides: &HashMap<ZoneId, String>) -> String {
    match overrides.get(&zone_id) {
        Some(name) => name.clone(),
        None => format!("Zone {zone_id}"),
    }
}

/// Publishes JSON documents without awaiting, so it can be used from the
/// synchronous zone callbacks.
#[derive(Clone)]
struct Publisher {
    client: AsyncClient,
    topic: String,
}

impl Publisher {
    fn publish(&self, payload: &impl Serialize) {
        match serde_json::to_string(payload) {
            Ok(json) => {
                if let Err(e) = self.client.try_publish(&self.topic, QoS::AtLeastOnce, false, json) {
                    error!("Failed to publish to {}: {e}", self.topic);
                }
            }
            Err(e) => error!("Failed to serialize MQTT payload: {e}"),
        }
    }
}

fn zone_callback(
    op: &'static str,
    publisher: Option<Publisher>,
    zone_names: Arc<HashMap<ZoneId, String>>,
) -> impl Fn(ZoneId) + Send + Sync + 'static {
    move |zone| {
        let name = zone_label(zone, &zone_names);
        info!("{op} zone {zone} ({name})");
        if let Some(publisher) = &publisher {
            publisher.publish(&MqttZoneEvent {
                now: now_epoch_ms(),
                op: op.to_string(),
                zone,
                name,
            });
        }
    }
}

fn handle_message(msg: &Message, publisher: Option<&Publisher>) {
    match msg {
        Message::Keypad(keypad) => {
            debug!("Keypad [{:03}] {}", keypad.zone(), keypad);
            if let Some(publisher) = publisher {
                publisher.publish(&MqttKeypadEvent::from_keypad(keypad));
            }
        }
        Message::Aui(_) | Message::Rfx(_) | Message::Banner(_) => {
            debug!("{}: {}", msg.kind(), msg);
        }
    }
}

fn start_mqtt(toml: &MqttToml) -> Result<(Publisher, JoinHandle<()>)> {
    let (host, port) = parse_mqtt_url(&toml.url)?;
    let mut mqtt_opts = MqttOptions::new(&toml.client_id, &host, port);
    mqtt_opts.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

    let handle = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("MQTT: connected to {host}:{port}");
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT event loop error: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let publisher = Publisher {
        client,
        topic: toml.publish_topic.clone(),
    };
    Ok((publisher, handle))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=ad2sock=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    // Load config
    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;

    let client_config = build_client_config(&config.connection)?;
    let tracker_config = build_tracker_config(&config.tracker);
    let zone_names = Arc::new(config.zone_names);

    let mqtt = config.mqtt.as_ref().map(start_mqtt).transpose()?;
    let publisher = mqtt.as_ref().map(|(publisher, _)| publisher.clone());

    let mut sigterm = signal(SignalKind::terminate())?;

    let client = Client::connect(client_config)
        .await
        .context("Failed to connect to ser2sock")?;
    info!("Connected: {}", client.banner());

    let tracker = ZoneTracker::with_config(
        &client,
        tracker_config,
        zone_callback("FAULT", publisher.clone(), zone_names.clone()),
        zone_callback("RESTORE", publisher.clone(), zone_names.clone()),
    );

    let mut messages = client.subscribe();

    info!("Bridge running. Send SIGINT/SIGTERM to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
            msg = messages.recv() => match msg {
                Some(msg) => handle_message(&msg, publisher.as_ref()),
                None => {
                    warn!("Connection to ser2sock ended");
                    break;
                }
            },
        }
    }

    messages.cancel();
    tracker.wait_for_callbacks().await;
    tracker.stop().await;
    if let Err(e) = client.shutdown().await {
        warn!("Error shutting down client: {e}");
    }

    if let Some((_, handle)) = mqtt {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}
