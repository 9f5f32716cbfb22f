// MIT License - Copyright (c) 2026 The ad2sock authors
// ser2sock keypad client

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::{Ad2Error, ParseError, Result};
use crate::message::Message;
use crate::parser::{Parser, BANNER_PREFIX};
use crate::transport;

pub use tokio::sync::mpsc::error::TryRecvError;

/// Connection to a ser2sock server.
///
/// Construction performs the banner handshake and starts a single read
/// task. Every successfully decoded line is handed to each live
/// [`Subscription`] as the same `Arc<Message>`.
///
/// # Delivery
///
/// Each subscriber has a small bounded queue (`subscriber_capacity`).
/// When a queue is full the read task waits for that subscriber to make
/// room before offering the message to the next subscriber and before
/// reading the next line. A slow subscriber therefore slows everyone down;
/// nothing is dropped. Cancelling or dropping a subscription releases any
/// send waiting on it.
pub struct Client {
    registry: Arc<Registry>,
    subscriber_capacity: usize,
    banner: String,
    peer: Option<String>,
    shutdown_tx: watch::Sender<bool>,
    reader_handle: Option<JoinHandle<()>>,
}

impl Client {
    /// Connect to the server named in `config` and complete the handshake.
    ///
    /// The transport is closed again if the handshake fails.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let stream = transport::open(&config).await?;
        let mut client = Self::from_stream(stream, &config).await?;
        client.peer = Some(config.address());
        info!("Connected to ser2sock at {}", config.address());
        Ok(client)
    }

    /// Run the handshake over an already-open stream and start reading.
    ///
    /// `config` supplies the parser, banner timeout and read loop tuning;
    /// its address and TLS settings are ignored.
    pub async fn from_stream<S>(stream: S, config: &ClientConfig) -> Result<Self>
    where
        S: AsyncRead + Send + Unpin + 'static,
    {
        let mut reader = BufReader::new(stream);
        let banner = read_banner(&mut reader, config.banner_timeout()).await?;

        let registry = Arc::new(Registry::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let read_loop = ReadLoop {
            parser: config.parser.clone(),
            registry: registry.clone(),
            shutdown: shutdown_rx,
            backoff: config.read_error_backoff(),
            max_errors: config.max_read_errors.max(1),
        };
        let reader_handle = tokio::spawn(read_loop.run(reader));

        Ok(Self {
            registry,
            subscriber_capacity: config.subscriber_capacity.max(1),
            banner,
            peer: None,
            shutdown_tx,
            reader_handle: Some(reader_handle),
        })
    }

    /// Register a new subscriber.
    ///
    /// The subscription receives every message decoded after this call
    /// until it is cancelled or dropped, or the read loop ends.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        let id = self.registry.register(tx);
        debug!("Subscriber {} registered", id);
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
            cancelled: false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// The banner line the server greeted us with.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// `host:port` of the server, when connected through [`Client::connect`].
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Whether the read loop has stopped (server closed, too many read
    /// errors, or shutdown).
    pub fn is_finished(&self) -> bool {
        self.reader_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Stop the read loop and wait for it to exit. Open subscriptions see
    /// the end of their stream.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down ser2sock client");
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.reader_handle.take() {
            handle.await?;
        }
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // The read loop exits at its next suspension point and closes
        // every subscription on the way out.
        let _ = self.shutdown_tx.send(true);
    }
}

/// A receive handle for decoded messages.
///
/// Dropping the subscription deregisters it.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<Message>>,
    registry: Weak<Registry>,
    cancelled: bool,
}

impl Subscription {
    /// Unique for the lifetime of the client; ids start at 1 and only grow.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next message, or `None` once the subscription is cancelled and
    /// drained or the read loop has ended.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> std::result::Result<Arc<Message>, TryRecvError> {
        self.rx.try_recv()
    }

    /// Stop receiving new messages. Messages already queued can still be
    /// drained with [`recv`](Self::recv).
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(self.id);
        }
        self.rx.close();
        debug!("Subscriber {} cancelled", self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Clone)]
struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Arc<Message>>,
}

/// Subscriber list published as an immutable snapshot.
///
/// Registration swaps in a new list; the read loop broadcasts over
/// whichever snapshot it loaded without taking a lock.
struct Registry {
    next_id: AtomicU64,
    subscribers: ArcSwap<Vec<Subscriber>>,
    closed: AtomicBool,
}

impl Registry {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: ArcSwap::from_pointee(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn register(&self, tx: mpsc::Sender<Arc<Message>>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let subscriber = Subscriber { id, tx };
        self.subscribers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(subscriber.clone());
            next
        });
        // Registered after the read loop ended: drop the sender again so
        // the receiver sees the end of the stream.
        if self.closed.load(Ordering::SeqCst) {
            self.deregister(id);
        }
        id
    }

    fn deregister(&self, id: u64) {
        self.subscribers.rcu(|current| {
            current
                .iter()
                .filter(|s| s.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    fn snapshot(&self) -> Arc<Vec<Subscriber>> {
        self.subscribers.load_full()
    }

    fn len(&self) -> usize {
        self.subscribers.load().len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers.store(Arc::new(Vec::new()));
    }
}

/// Wait for the `!SER2SOCK` greeting line.
async fn read_banner<R>(reader: &mut R, limit: Duration) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = match timeout(limit, reader.read_until(b'\n', &mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            error!("Failed to read connection banner: {}", e);
            return Err(Ad2Error::Io(e));
        }
        Err(_) => {
            error!("No connection banner within {:?}", limit);
            return Err(Ad2Error::BannerTimeout);
        }
    };
    if n == 0 {
        return Err(Ad2Error::Disconnected);
    }

    let line = strip_line_ending(&String::from_utf8_lossy(&buf)).to_string();
    if !line.starts_with(BANNER_PREFIX) {
        error!("Unexpected connection banner: {}", line);
        return Err(Ad2Error::BannerMismatch { line });
    }
    debug!("Connection banner: {}", line);
    Ok(line)
}

fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(|c| c == '\n' || c == '\r')
}

/// Delay before retrying after the `attempt`th consecutive read error:
/// `base` doubled per attempt, capped at 16x.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(4))
}

struct ReadLoop {
    parser: Parser,
    registry: Arc<Registry>,
    shutdown: watch::Receiver<bool>,
    backoff: Duration,
    max_errors: u32,
}

impl ReadLoop {
    async fn run<R>(mut self, mut reader: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::with_capacity(256);
        let mut consecutive_errors: u32 = 0;

        loop {
            buf.clear();
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read,
                _ = self.shutdown.changed() => {
                    debug!("Read loop: shutdown requested");
                    break;
                }
            };

            match read {
                Ok(0) => {
                    info!("Read loop: connection closed by server");
                    break;
                }
                Ok(_) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.max_errors {
                        error!(
                            "Read loop: giving up after {} consecutive read errors: {}",
                            consecutive_errors, e
                        );
                        break;
                    }
                    let delay = backoff_delay(self.backoff, consecutive_errors);
                    warn!(
                        "Read error ({}/{}), retrying in {:?}: {}",
                        consecutive_errors, self.max_errors, delay, e
                    );
                    tokio::select! {
                        _ = sleep(delay) => continue,
                        _ = self.shutdown.changed() => break,
                    }
                }
            }

            let text = String::from_utf8_lossy(&buf);
            let line = strip_line_ending(&text);
            match self.parser.parse(line) {
                Ok(msg) => {
                    if !self.broadcast(Arc::new(msg)).await {
                        debug!("Read loop: shutdown requested during delivery");
                        break;
                    }
                }
                Err(ParseError::Unhandled(kind)) => {
                    debug!("Ignoring unhandled {} message: {}", kind, line);
                }
                Err(e) => {
                    warn!("Dropping line ({}): {}", e, line);
                }
            }
        }

        self.registry.close();
        debug!("Read loop exited");
    }

    /// Offer `msg` to every current subscriber in turn. Returns `false` if
    /// shutdown was requested while waiting on a subscriber.
    async fn broadcast(&mut self, msg: Arc<Message>) -> bool {
        let subscribers = self.registry.snapshot();
        for subscriber in subscribers.iter() {
            tokio::select! {
                sent = subscriber.tx.send(msg.clone()) => {
                    if sent.is_err() {
                        debug!("Subscriber {} went away", subscriber.id);
                        self.registry.deregister(subscriber.id);
                    }
                }
                _ = self.shutdown.changed() => return false,
            }
        }
        true
    }
}
