// MIT License - Copyright (c) 2026 The ad2sock authors
// ser2sock keypad client
//
//! # ad2sock
//!
//! Client for the line protocol spoken by ser2sock, the serial-to-socket
//! relay used in front of AlarmDecoder keypad interfaces.
//!
//! The [`Client`] performs the `!SER2SOCK` banner handshake, reads one
//! message per line and fans every decoded [`Message`] out to its
//! subscribers. [`ZoneTracker`] builds on a subscription to report when
//! zones fault and restore.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ad2sock::{Client, ClientConfig, ZoneTracker};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::builder()
//!         .host("alarmdecoder.local")
//!         .port(10000)
//!         .build();
//!
//!     let client = Client::connect(config).await?;
//!
//!     let tracker = ZoneTracker::spawn(
//!         &client,
//!         |zone| println!("zone {zone} faulted"),
//!         |zone| println!("zone {zone} restored"),
//!     );
//!
//!     let mut messages = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Some(msg) = messages.recv().await {
//!             println!("{}: {}", msg.kind(), msg);
//!         }
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     tracker.stop().await;
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod parser;
pub mod tracker;
pub mod transport;

// Re-exports for convenience
pub use client::{Client, Subscription};
pub use config::{ClientConfig, ClientConfigBuilder, TrackerConfig};
pub use dispatch::CallbackDispatcher;
pub use error::{Ad2Error, ParseError, Result};
pub use message::{BitFields, KeypadFlags, KeypadMessage, Message, MessageKind, NumericCode, PanelKind, ZoneId};
pub use parser::{Decoder, Parser};
pub use tracker::{ZoneCallback, ZoneFaults, ZoneTracker, ZoneTransition};
