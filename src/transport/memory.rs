//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended primarily for testing, local execution,
//! and as a reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory transport defines the **reference behavior** for the transport
//! layer. Broker-backed transports are expected to approximate this behavior
//! as closely as their underlying systems allow and to document any
//! unavoidable deviations.
//!
//! In particular, the in-memory transport establishes the following expectations:
//!
//! - Once `subscribe()` returns successfully, frames published *after* that
//!   point to the same destination are deliverable.
//! - A publish reaches every transport subscribed to the destination
//!   (topic-style fan-out across connections).
//! - Frames are delivered in publish order per subscriber.
//! - `publish()` never waits on a subscriber. Each inbox buffers
//!   `INBOX_CAPACITY` frames; a frame arriving at a full inbox is dropped and
//!   logged at `warn`, for that subscriber only. A consumer that stops
//!   draining, or one that publishes into its own destination, therefore
//!   cannot stall other publishers or itself.
//! - `unsubscribe()` and `close()` drop the subscriber's sender, so the inbox
//!   drains what is already buffered and then ends.
//!
//! ## Non-Goals
//!
//! This transport does not attempt to emulate the failure modes, persistence,
//! or delivery guarantees of any specific broker. It exists to provide a clear,
//! deterministic baseline against which higher-level behavior can be validated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    log_debug,
    log_info,
    log_warn,
    ConnectionSpec,
    Destination,
    Frame,
    Inbox,
    MessagingError,
    Result,
    Transport,
    TransportPtr,
};

/// Capacity of each subscriber inbox.
const INBOX_CAPACITY: usize = 64;

struct Subscriber {
    transport_key: u64,
    tx: mpsc::Sender<Frame>,
}

/// Shared message bus for the in-memory transport.
///
/// Simulates a message broker within a single process. All transports
/// created on the same hub can publish and receive each other's frames,
/// exactly as connections to one real broker would.
///
/// A hub can require login credentials and can be marked unavailable, which
/// makes [`Transport::open`] fail the way an unreachable broker would.
///
/// ```
/// # use mom_reqrep::{create_memory_transport, MemoryHub};
/// let hub = MemoryHub::new();
/// let transport = create_memory_transport(&hub, "client");
/// assert_eq!(transport.transport_id(), "client");
/// ```
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<HashMap<Destination, Vec<Subscriber>>>,
    credentials: Option<(String, String)>,
    available: AtomicBool,
    next_key: AtomicU64,
}

impl MemoryHub {
    /// Create a new, empty hub that accepts any login.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self::default())
    }

    /// Create a hub that only accepts the given username and password.
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Arc<Self> {
        // ---
        Arc::new(Self {
            credentials: Some((username.into(), password.into())),
            ..Self::default()
        })
    }

    /// Mark the simulated broker reachable or unreachable for new connections.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live subscribers for a destination, across all transports.
    pub async fn subscriber_count(&self, destination: &Destination) -> usize {
        // ---
        let subs = self.subscriptions.read().await;
        subs.get(destination)
            .map(|subscribers| subscribers.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn login(&self, transport_id: &str, spec: &ConnectionSpec) -> Result<()> {
        // ---
        if !self.available.load(Ordering::SeqCst) {
            return Err(MessagingError::Connect(format!(
                "can't create connection to {}: broker unavailable",
                spec.broker_address()
            )));
        }

        if let Some((username, password)) = &self.credentials {
            let supplied_user = spec.username.as_deref().unwrap_or_default();
            let supplied_pass = spec.password.as_deref().unwrap_or_default();
            if supplied_user != username || supplied_pass != password {
                return Err(MessagingError::Connect(format!(
                    "login refused for '{supplied_user}' at {}",
                    spec.broker_address()
                )));
            }
        }

        log_debug!("{transport_id}: connected to {}", spec.broker_address());
        Ok(())
    }

    async fn publish(&self, transport_id: &str, destination: &Destination, frame: Frame) {
        // ---
        let subs = self.subscriptions.read().await;
        let Some(subscribers) = subs.get(destination) else {
            log_debug!("{transport_id}: publish to {destination} (no subscribers)");
            return;
        };

        log_debug!(
            "{transport_id}: publish to {destination} ({} subscribers)",
            subscribers.len()
        );

        // Never waits: a full inbox loses the frame, as a slow consumer on a
        // real broker eventually would.
        for subscriber in subscribers {
            match subscriber.tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log_warn!("{transport_id}: dropped frame for {destination}: inbox full");
                }
                Err(TrySendError::Closed(_)) => {
                    log_info!("{transport_id}: dropped frame for {destination}: inbox closed");
                }
            }
        }
    }

    async fn subscribe(&self, transport_key: u64, destination: &Destination) -> Inbox {
        // ---
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let mut subs = self.subscriptions.write().await;
        subs.entry(destination.clone())
            .or_default()
            .push(Subscriber { transport_key, tx });

        rx
    }

    async fn unsubscribe(&self, transport_key: u64, destination: &Destination) -> bool {
        // ---
        let mut subs = self.subscriptions.write().await;

        let Some(subscribers) = subs.get_mut(destination) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|s| s.transport_key != transport_key);
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            subs.remove(destination);
        }
        removed
    }

    async fn unsubscribe_all(&self, transport_key: u64) {
        // ---
        let mut subs = self.subscriptions.write().await;
        for subscribers in subs.values_mut() {
            subscribers.retain(|s| s.transport_key != transport_key);
        }
        subs.retain(|_, subscribers| !subscribers.is_empty());
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            credentials: None,
            available: AtomicBool::new(true),
            next_key: AtomicU64::new(1),
        }
    }
}

/// In-memory transport.
///
/// Routes frames through a shared [`MemoryHub`]. Each transport is one
/// simulated broker connection; subscriptions it creates are tagged with its
/// key so that unsubscribe and close only affect its own inboxes.
struct MemoryTransport {
    // ---
    transport_id: String,
    key: u64,
    hub: Arc<MemoryHub>,
    open: AtomicBool,
}

impl MemoryTransport {
    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MessagingError::Closed)
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn transport_id(&self) -> &str {
        &self.transport_id
    }

    async fn open(&self, spec: &ConnectionSpec) -> Result<()> {
        // ---
        self.hub.login(&self.transport_id, spec)?;
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Close the transport, dropping every subscription it created on the hub.
    async fn close(&self) -> Result<()> {
        // ---
        log_debug!("{}: closing transport...", self.transport_id);

        self.open.store(false, Ordering::SeqCst);
        self.hub.unsubscribe_all(self.key).await;
        Ok(())
    }

    /// Publish a frame to all subscribers of the destination.
    ///
    /// Matching semantics are intentionally simple: a subscription matches
    /// a destination if their names are exactly equal.
    async fn publish(
        &self,
        destination: &Destination,
        content_type: &str,
        body: Bytes,
    ) -> Result<()> {
        // ---
        self.ensure_open()?;

        let frame = Frame::message(body, content_type);
        self.hub.publish(&self.transport_id, destination, frame).await;
        Ok(())
    }

    async fn subscribe(&self, destination: &Destination) -> Result<Inbox> {
        // ---
        self.ensure_open()?;

        log_debug!("{}: subscribe to {destination}", self.transport_id);
        Ok(self.hub.subscribe(self.key, destination).await)
    }

    async fn unsubscribe(&self, destination: &Destination) -> Result<()> {
        // ---
        self.ensure_open()?;

        log_debug!("{}: unsubscribe from {destination}", self.transport_id);
        if self.hub.unsubscribe(self.key, destination).await {
            Ok(())
        } else {
            Err(MessagingError::Transport(format!(
                "no transport subscription for {destination}"
            )))
        }
    }
}

/// Create a new in-memory transport attached to `hub`.
///
/// The transport starts closed; [`Connection::open`](crate::Connection::open)
/// opens it. Transports sharing a hub see each other's publishes.
pub fn create_memory_transport(hub: &Arc<MemoryHub>, transport_id: impl Into<String>) -> TransportPtr {
    // ---
    let transport_id = transport_id.into();
    log_debug!("{transport_id}: create memory transport");

    Arc::new(MemoryTransport {
        transport_id,
        key: hub.next_key.fetch_add(1, Ordering::Relaxed),
        hub: hub.clone(),
        open: AtomicBool::new(false),
    })
}
