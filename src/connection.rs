//! Broker connection and destination registry.
//!
//! A [`Connection`] wraps one [`Transport`](crate::Transport) and enforces
//! the subscription discipline the correlation layer depends on: a
//! destination has at most one active subscription per connection. Inbound
//! frames for a destination therefore have exactly one place to go, and the
//! requestor's pending table and the responder's handler binding never need
//! to fan messages out.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::protocol::codec;
use crate::{
    // ---
    log_debug,
    log_info,
    log_warn,
    ConnectionSpec,
    Destination,
    Frame,
    Inbox,
    Listener,
    Message,
    MessagingError,
    Requestor,
    Responder,
    Result,
    TransportPtr,
};

/// Logical connection to a broker.
///
/// Cheap to clone; clones share the same transport and registry. Pass the
/// handle explicitly to whatever needs it.
///
/// # Example
///
/// ```
/// # use mom_reqrep::{create_memory_transport, Connection, ConnectionSpec, MemoryHub, Message};
/// # use serde_json::json;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> mom_reqrep::Result<()> {
/// let hub = MemoryHub::new();
/// let connection =
///     Connection::open(create_memory_transport(&hub, "app"), ConnectionSpec::default()).await?;
///
/// let mut subscription = connection.subscribe("events").await?;
/// connection
///     .publish(&Message::from_value(json!({"value": 42}))?, "events")
///     .await?;
///
/// let frame = subscription.recv().await.expect("frame");
/// assert_eq!(&frame.body[..], br#"{"value":42}"#);
///
/// connection.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    transport: TransportPtr,
    spec: ConnectionSpec,

    // Guarded by an async mutex held across the transport call, so duplicate
    // detection and registration are one atomic step.
    registry: Mutex<BTreeSet<Destination>>,
    closed: AtomicBool,
}

/// An active subscription returned by [`Connection::subscribe`].
///
/// Yields inbound frames until the destination is unsubscribed or the
/// connection is closed.
#[derive(Debug)]
pub struct Subscription {
    destination: Destination,
    inbox: Inbox,
}

impl Subscription {
    /// Destination this subscription is bound to.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Receive the next frame, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbox.recv().await
    }

    /// Give up the wrapper and keep the raw inbox.
    pub fn into_inbox(self) -> Inbox {
        self.inbox
    }
}

impl Connection {
    // ---
    /// Open a connection over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Connect`] if the transport cannot reach the
    /// broker or the login is refused.
    pub async fn open(transport: TransportPtr, spec: ConnectionSpec) -> Result<Self> {
        // ---
        transport.open(&spec).await.map_err(|e| match e {
            MessagingError::Connect(msg) => MessagingError::Connect(msg),
            other => MessagingError::Connect(format!(
                "can't connect to {}: {other}",
                spec.broker_address()
            )),
        })?;

        log_info!(
            "{}: connected to message broker at {}",
            transport.transport_id(),
            spec.broker_address()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                spec,
                registry: Mutex::new(BTreeSet::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Close the connection, releasing every subscription and the transport.
    ///
    /// Once closed the connection can't be reused; every later operation,
    /// including a second `close`, fails with [`MessagingError::Closed`].
    pub async fn close(&self) -> Result<()> {
        // ---
        let mut registry = self.inner.registry.lock().await;

        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(MessagingError::Closed);
        }

        for destination in std::mem::take(&mut *registry) {
            if let Err(_err) = self.inner.transport.unsubscribe(&destination).await {
                log_warn!("failed to unsubscribe from {destination} while closing: {_err}");
            }
        }

        log_debug!("{}: closing connection", self.transport_id());
        self.inner.transport.close().await
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Parameters this connection was opened with.
    pub fn spec(&self) -> &ConnectionSpec {
        &self.inner.spec
    }

    /// Identifier of the underlying transport.
    pub fn transport_id(&self) -> &str {
        self.inner.transport.transport_id()
    }

    /// Encode `message` and publish it to `destination`.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::Closed`] if the connection is closed
    /// - [`MessagingError::Encode`] if the payload cannot be encoded
    /// - [`MessagingError::Send`] if the transport rejects the publish
    pub async fn publish(&self, message: &Message, destination: impl Into<Destination>) -> Result<()> {
        // ---
        self.ensure_open()?;

        let destination = destination.into();
        let (body, content_type) = codec::encode(message)?;

        self.inner
            .transport
            .publish(&destination, &content_type, body)
            .await
            .map_err(|e| match e {
                MessagingError::Closed => MessagingError::Closed,
                other => MessagingError::Send(format!("publish to {destination} failed: {other}")),
            })
    }

    /// Subscribe to `destination`.
    ///
    /// The registry entry exists before this returns.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::DuplicateSubscription`] if the destination already
    ///   has an active subscription on this connection; nothing changes
    /// - [`MessagingError::Closed`] if the connection is closed
    /// - transport errors from the underlying subscribe
    pub async fn subscribe(&self, destination: impl Into<Destination>) -> Result<Subscription> {
        // ---
        let destination = destination.into();
        let mut registry = self.inner.registry.lock().await;

        self.ensure_open()?;

        if registry.contains(&destination) {
            return Err(MessagingError::DuplicateSubscription(destination.to_string()));
        }

        let inbox = self.inner.transport.subscribe(&destination).await?;
        registry.insert(destination.clone());

        log_debug!("{}: subscribed to {destination}", self.transport_id());
        Ok(Subscription { destination, inbox })
    }

    /// Cancel the subscription for `destination` and remove its registry entry.
    ///
    /// Waits for the transport to confirm. On transport failure the entry is
    /// kept, so the caller may retry.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::NotSubscribed`] if there is no active subscription
    /// - [`MessagingError::Closed`] if the connection is closed
    pub async fn unsubscribe(&self, destination: impl Into<Destination>) -> Result<()> {
        // ---
        let destination = destination.into();
        let mut registry = self.inner.registry.lock().await;

        self.ensure_open()?;

        if !registry.contains(&destination) {
            return Err(MessagingError::NotSubscribed(destination.to_string()));
        }

        self.inner.transport.unsubscribe(&destination).await?;
        registry.remove(&destination);

        log_debug!("{}: unsubscribed from {destination}", self.transport_id());
        Ok(())
    }

    /// Whether `destination` currently has an active subscription.
    pub async fn is_subscribed(&self, destination: impl Into<Destination>) -> bool {
        let destination = destination.into();
        self.inner.registry.lock().await.contains(&destination)
    }

    /// Destinations with an active subscription, in sorted order.
    pub async fn subscriptions(&self) -> Vec<Destination> {
        self.inner.registry.lock().await.iter().cloned().collect()
    }

    /// Subscribe to `destination` and invoke `callback` for every frame.
    ///
    /// See [`Listener`] for delivery details.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub async fn listen<F>(&self, destination: impl Into<Destination>, callback: F) -> Result<Listener>
    where
        F: FnMut(Message, &Destination) + Send + 'static,
    {
        Listener::open(self, destination, callback).await
    }

    /// Create a [`Requestor`] publishing on `requests` and receiving on `responses`.
    pub async fn requestor(
        &self,
        requests: impl Into<Destination>,
        responses: impl Into<Destination>,
    ) -> Result<Requestor> {
        Requestor::open(self, requests, responses).await
    }

    /// Create a [`Responder`] serving requests on `requests` with `handler`.
    pub async fn responder<F>(&self, requests: impl Into<Destination>, handler: F) -> Result<Responder>
    where
        F: Fn(Message) -> Result<Message> + Send + Sync + 'static,
    {
        Responder::open(self, requests, handler).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(MessagingError::Closed)
        } else {
            Ok(())
        }
    }
}
