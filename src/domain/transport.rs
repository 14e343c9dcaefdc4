// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the interface the correlation layer consumes from a
//! broker backend. It intentionally avoids any reference to concrete
//! protocols, sockets, or client libraries.
//!
//! The transport layer is responsible only for moving opaque byte frames
//! between publishers and subscribed consumers. Correlation, envelope fields
//! and the one-subscription-per-destination rule are handled above it, by
//! [`Connection`](crate::Connection), [`Requestor`](crate::Requestor) and
//! [`Responder`](crate::Responder).
//!
//! Concrete implementations of this interface live under `src/transport/`.
use crate::{ConnectionSpec, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// A broker destination (queue or topic).
///
/// Destinations are opaque, immutable and cheap to clone. The domain layer
/// makes no assumptions about their syntax or hierarchy.
///
/// ```
/// # use mom_reqrep::Destination;
/// let destination = Destination::from("q.req");
/// assert_eq!(destination.as_str(), "q.req");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination(pub Arc<str>);

impl Destination {
    /// Borrow the destination name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Destination {
    fn from(value: &str) -> Self {
        Destination(Arc::from(value))
    }
}

impl From<String> for Destination {
    fn from(value: String) -> Self {
        Destination(Arc::from(value))
    }
}

impl From<Arc<str>> for Destination {
    fn from(value: Arc<str>) -> Self {
        Destination(value)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single inbound frame delivered on a subscription.
///
/// In most cases a frame carries one message body published to the
/// destination. If `error` is set, the frame represents a transport-level
/// error (for example a broker ERROR frame) and `body`/`content_type`
/// describe that error frame when the broker supplied one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    /// Raw message body.
    pub body: Bytes,

    /// MIME type the publisher attached, if any.
    pub content_type: Option<Arc<str>>,

    /// Transport-level error carried by this frame.
    pub error: Option<Arc<str>>,
}

impl Frame {
    /// A regular message frame.
    pub fn message(body: impl Into<Bytes>, content_type: impl Into<Arc<str>>) -> Self {
        // ---
        Self {
            body: body.into(),
            content_type: Some(content_type.into()),
            error: None,
        }
    }

    /// A frame representing a transport-level error.
    pub fn error(message: impl Into<Arc<str>>) -> Self {
        // ---
        Self {
            body: Bytes::new(),
            content_type: None,
            error: Some(message.into()),
        }
    }
}

/// Receiving side of a transport subscription.
///
/// Yields frames until the transport cancels the subscription (unsubscribe
/// or close), at which point `recv()` returns `None`.
pub type Inbox = mpsc::Receiver<Frame>;

/// Broker transport abstraction.
///
/// A `Transport` is one logical connection to a broker. It provides
/// best-effort delivery of byte frames; everything stronger is layered on top.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, frames published *after* that
///   point to the same destination are deliverable to the returned inbox.
/// - `unsubscribe()` returns only once the subscription is cancelled, and the
///   matching inbox then terminates.
/// - `publish()` never blocks on a slow subscriber; a subscriber that cannot
///   keep up may lose frames.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Identifier of this transport instance, used in diagnostics.
    fn transport_id(&self) -> &str;

    /// Establish the broker connection (socket, TLS, login).
    ///
    /// Must fail with [`MessagingError::Connect`](crate::MessagingError::Connect)
    /// when the broker is unreachable or refuses the credentials.
    async fn open(&self, spec: &ConnectionSpec) -> Result<()>;

    /// Close the broker connection and cancel every subscription.
    async fn close(&self) -> Result<()>;

    /// Publish a byte payload with a content type to a destination.
    async fn publish(&self, destination: &Destination, content_type: &str, body: Bytes)
        -> Result<()>;

    /// Subscribe to a destination and return its inbox.
    async fn subscribe(&self, destination: &Destination) -> Result<Inbox>;

    /// Cancel the subscription for a destination.
    async fn unsubscribe(&self, destination: &Destination) -> Result<()>;
}

/// Shared transport pointer.
///
/// This is an `Arc<dyn Transport>`, which means:
/// - `.clone()` is cheap (only increments a reference count)
/// - Multiple clones share the same underlying broker connection
pub type TransportPtr = Arc<dyn Transport>;
