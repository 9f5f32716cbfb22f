// MIT License - Copyright (c) 2026 The ad2sock authors
// ser2sock keypad client

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::{Client, Subscription};
use crate::config::TrackerConfig;
use crate::dispatch::CallbackDispatcher;
use crate::message::{KeypadMessage, Message, ZoneId};

/// Callback invoked with the zone number on a fault or restore.
pub type ZoneCallback = Arc<dyn Fn(ZoneId) + Send + Sync>;

/// A change in a zone's fault state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneTransition {
    Fault(ZoneId),
    Restore(ZoneId),
}

/// Fault state for every zone, keyed by zone with the instant each fault
/// lapses.
///
/// The panel only reports faults; it never says a zone has closed. A zone
/// is considered restored when the panel reports ready, or when no FAULT
/// line has mentioned it for the fault timeout.
#[derive(Debug, Clone)]
pub struct ZoneFaults {
    timeout: Duration,
    faults: BTreeMap<ZoneId, Instant>,
}

impl ZoneFaults {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            faults: BTreeMap::new(),
        }
    }

    /// Apply one keypad line at `now`.
    ///
    /// In order: a FAULT line opens or refreshes its zone, a ready panel
    /// restores every open zone, then lapsed faults are restored. A zone
    /// that is already faulted only has its expiry pushed back; it does not
    /// produce a second [`ZoneTransition::Fault`].
    pub fn apply(&mut self, msg: &KeypadMessage, now: Instant) -> Vec<ZoneTransition> {
        let mut transitions = Vec::new();

        if msg.is_fault() {
            let zone = msg.zone();
            if self.faults.insert(zone, now + self.timeout).is_none() {
                transitions.push(ZoneTransition::Fault(zone));
            }
        }

        if msg.fields.ready() {
            let cleared = std::mem::take(&mut self.faults);
            transitions.extend(cleared.into_keys().map(ZoneTransition::Restore));
        }

        transitions.extend(self.expire(now));
        transitions
    }

    /// Restore every zone whose fault lapsed at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<ZoneTransition> {
        let expired: Vec<ZoneId> = self
            .faults
            .iter()
            .filter(|(_, expires)| **expires <= now)
            .map(|(zone, _)| *zone)
            .collect();
        for zone in &expired {
            self.faults.remove(zone);
        }
        expired.into_iter().map(ZoneTransition::Restore).collect()
    }

    pub fn is_faulted(&self, zone: ZoneId) -> bool {
        self.faults.contains_key(&zone)
    }

    /// Currently faulted zones in ascending order.
    pub fn faulted(&self) -> Vec<ZoneId> {
        self.faults.keys().copied().collect()
    }

    pub fn expires_at(&self, zone: ZoneId) -> Option<Instant> {
        self.faults.get(&zone).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Tracks zone faults from a client's keypad stream and reports changes.
///
/// Callbacks run on their own tasks through a [`CallbackDispatcher`], so
/// they may run concurrently with each other and with later messages.
/// Callbacks should not block.
pub struct ZoneTracker {
    state: Arc<Mutex<ZoneFaults>>,
    dispatcher: Arc<CallbackDispatcher>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl ZoneTracker {
    /// Subscribe to `client` and start tracking with the default timing.
    pub fn spawn<F, R>(client: &Client, on_fault: F, on_restore: R) -> Self
    where
        F: Fn(ZoneId) + Send + Sync + 'static,
        R: Fn(ZoneId) + Send + Sync + 'static,
    {
        Self::with_config(client, TrackerConfig::default(), on_fault, on_restore)
    }

    pub fn with_config<F, R>(client: &Client, config: TrackerConfig, on_fault: F, on_restore: R) -> Self
    where
        F: Fn(ZoneId) + Send + Sync + 'static,
        R: Fn(ZoneId) + Send + Sync + 'static,
    {
        let state = Arc::new(Mutex::new(ZoneFaults::new(config.fault_timeout())));
        let dispatcher = Arc::new(CallbackDispatcher::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let consumer = Consumer {
            subscription: client.subscribe(),
            state: state.clone(),
            dispatcher: dispatcher.clone(),
            on_fault: Arc::new(on_fault),
            on_restore: Arc::new(on_restore),
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(consumer.run(config.sweep_interval()));

        Self {
            state,
            dispatcher,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Zones currently considered faulted, in ascending order.
    pub fn faulted_zones(&self) -> Vec<ZoneId> {
        lock(&self.state).faulted()
    }

    /// Wait until every fault/restore callback dispatched so far has run.
    pub async fn wait_for_callbacks(&self) {
        self.dispatcher.idle().await;
    }

    /// Unsubscribe and stop tracking. No new callbacks are dispatched once
    /// this returns; callbacks already dispatched still run.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Zone tracker task failed: {}", e);
            }
        }
        debug!("Zone tracker stopped");
    }
}

impl Drop for ZoneTracker {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn lock(state: &Mutex<ZoneFaults>) -> MutexGuard<'_, ZoneFaults> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Consumer {
    subscription: Subscription,
    state: Arc<Mutex<ZoneFaults>>,
    dispatcher: Arc<CallbackDispatcher>,
    on_fault: ZoneCallback,
    on_restore: ZoneCallback,
    shutdown: watch::Receiver<bool>,
}

impl Consumer {
    async fn run(mut self, sweep_interval: Duration) {
        let mut sweep = interval(sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = self.subscription.recv() => match msg.as_deref() {
                    Some(Message::Keypad(keypad)) => {
                        let transitions = lock(&self.state).apply(keypad, Instant::now());
                        self.fire(transitions);
                    }
                    Some(Message::Aui(_) | Message::Rfx(_) | Message::Banner(_)) => {}
                    None => {
                        info!("Zone tracker: message stream ended");
                        break;
                    }
                },
                _ = sweep.tick() => {
                    let transitions = lock(&self.state).expire(Instant::now());
                    self.fire(transitions);
                }
                _ = self.shutdown.changed() => break,
            }
        }

        self.subscription.cancel();
    }

    fn fire(&self, transitions: Vec<ZoneTransition>) {
        for transition in transitions {
            let (zone, callback) = match transition {
                ZoneTransition::Fault(zone) => {
                    info!("Zone {} faulted", zone);
                    (zone, self.on_fault.clone())
                }
                ZoneTransition::Restore(zone) => {
                    info!("Zone {} restored", zone);
                    (zone, self.on_restore.clone())
                }
            };
            self.dispatcher.dispatch(move || callback(zone));
        }
    }
}
