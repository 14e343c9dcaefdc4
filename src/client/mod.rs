//! Requestor: correlated requests over a pair of destinations
mod pending;

pub use pending::ResponseCallback;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::protocol::{codec, envelope, Payload};
use crate::transport::runner::{self, FrameConsumer};
use crate::{
    // ---
    lock_ignore_poison,
    log_debug,
    Connection,
    Destination,
    Frame,
    Message,
    MessagingError,
    RequestId,
    Result,
};
use pending::PendingRequests;

type SharedPending = Arc<Mutex<PendingRequests>>;

/// Issues requests on a requests destination and routes each response
/// arriving on a dedicated responses destination back to its caller.
///
/// Opening a requestor subscribes to the responses destination and starts
/// exactly one background listener bound to it. Every response is matched
/// against the pending request table by its `requestID`; the matching
/// callback runs once, on the listener task. Responses that are malformed,
/// of the wrong kind, late, duplicated or addressed to some other requestor
/// are dropped silently.
///
/// No timeout is imposed. Callers that need liveness use
/// [`request_with_timeout`](Self::request_with_timeout), or call
/// [`forget`](Self::forget) / [`prune_older_than`](Self::prune_older_than)
/// when they stop waiting.
///
/// Cloning is cheap; clones share the same pending table and listener.
///
/// # Example
///
/// ```
/// # use mom_reqrep::{ConnectionBuilder, Message};
/// # use serde_json::json;
/// # use std::time::Duration;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> mom_reqrep::Result<()> {
/// let connection = ConnectionBuilder::new().open().await?;
///
/// let _responder = connection
///     .responder("q.req", |request: Message| Ok(request))
///     .await?;
/// let requestor = connection.requestor("q.req", "q.res").await?;
///
/// let response = requestor
///     .request_with_timeout(
///         Message::from_value(json!({"body": "ping"}))?,
///         Duration::from_secs(1),
///     )
///     .await?;
/// assert_eq!(response.get("body"), Some(&json!("ping")));
/// # connection.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Requestor {
    inner: Arc<Inner>,
}

struct Inner {
    connection: Connection,
    requests: Destination,
    responses: Destination,
    pending: SharedPending,
    listener: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Listener side: resolves responses against the pending table.
struct ResponseConsumer {
    responses: Destination,
    pending: SharedPending,
}

#[async_trait::async_trait]
impl FrameConsumer for ResponseConsumer {
    fn destination(&self) -> &Destination {
        &self.responses
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        // ---
        if let Some(error) = &frame.error {
            return Err(MessagingError::Transport(format!(
                "error frame on {}: {error}",
                self.responses
            )));
        }

        let mut document = codec::decode(&frame.body)?;

        let request_id = envelope::parse_response(&document)
            .map_err(|rejection| MessagingError::Decode(rejection.to_string()))?;

        let callback = {
            let mut pending = lock_ignore_poison(&self.pending);
            pending.take(&request_id)
        };

        let Some(callback) = callback else {
            log_debug!("no pending request for requestID {request_id}, ignoring response");
            return Ok(());
        };

        envelope::strip(&mut document);
        let response = Message {
            payload: Payload::Document(document),
            content_type: frame.content_type,
            error: None,
        };

        callback(response, request_id);
        Ok(())
    }
}

impl Requestor {
    // ---

    /// Open a requestor.
    ///
    /// Subscribes `connection` to `responses` and starts the response
    /// listener. Fails atomically: on error nothing is registered.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::DuplicateSubscription`] if `responses` already has
    ///   a subscription on this connection
    /// - [`MessagingError::Closed`] if the connection is closed
    /// - transport errors from the subscribe
    pub async fn open(
        connection: &Connection,
        requests: impl Into<Destination>,
        responses: impl Into<Destination>,
    ) -> Result<Self> {
        // ---
        let requests = requests.into();
        let subscription = connection.subscribe(responses).await?;
        let responses = subscription.destination().clone();

        let pending: SharedPending = Arc::new(Mutex::new(PendingRequests::new()));

        let consumer = ResponseConsumer {
            responses: responses.clone(),
            pending: pending.clone(),
        };
        let listener = runner::spawn(subscription.into_inbox(), consumer);

        log_debug!("requestor open: requests={requests} responses={responses}");

        Ok(Self {
            inner: Arc::new(Inner {
                connection: connection.clone(),
                requests,
                responses,
                pending,
                listener: Mutex::new(Some(listener)),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Destination requests are published to.
    pub fn requests(&self) -> &Destination {
        &self.inner.requests
    }

    /// Destination responses are received on.
    pub fn responses(&self) -> &Destination {
        &self.inner.responses
    }

    /// Send a request; `on_response` is invoked once with its response.
    ///
    /// Stamps `kind=Request`, a fresh `requestID` and `respondTo` onto the
    /// message, records the callback, then publishes. The callback is
    /// recorded *before* publishing so a fast response cannot race past it;
    /// if the publish fails the record is removed again before returning, so
    /// a late response can never reach it.
    ///
    /// # Returns
    ///
    /// The request ID, which the response will carry.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::Closed`] if the requestor or connection is closed
    /// - [`MessagingError::Encode`] for raw payloads, which cannot carry
    ///   envelope fields
    /// - [`MessagingError::Send`] if the publish fails
    pub async fn send<F>(&self, message: Message, on_response: F) -> Result<RequestId>
    where
        F: FnOnce(Message, RequestId) + Send + 'static,
    {
        // ---
        if self.is_closed() {
            return Err(MessagingError::Closed);
        }

        let mut document = match message.payload {
            Payload::Document(document) => document,
            Payload::Raw(_) => {
                return Err(MessagingError::Encode(
                    "raw payloads cannot carry request envelope fields".into(),
                ))
            }
        };

        let request_id = RequestId::generate();
        envelope::stamp_request(&mut document, &request_id, &self.inner.responses);

        let request = Message {
            payload: Payload::Document(document),
            content_type: message.content_type,
            error: None,
        };

        {
            // `close` flips the flag under this lock, so a request registered
            // here is either refused or discarded by that close.
            let mut pending = lock_ignore_poison(&self.inner.pending);
            if self.is_closed() {
                return Err(MessagingError::Closed);
            }
            pending.register(request_id.clone(), Box::new(on_response));
        }

        if let Err(err) = self
            .inner
            .connection
            .publish(&request, self.inner.requests.clone())
            .await
        {
            let mut pending = lock_ignore_poison(&self.inner.pending);
            pending.remove(&request_id);
            return Err(err);
        }

        log_debug!("sent request {request_id} to {}", self.inner.requests);
        Ok(request_id)
    }

    /// Send a request and get a future resolving to its response.
    ///
    /// The future fails with [`MessagingError::Closed`] if the request is
    /// abandoned first (requestor closed, [`forget`](Self::forget), prune).
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn request(&self, message: Message) -> Result<(RequestId, PendingResponse)> {
        // ---
        let (tx, rx) = oneshot::channel();

        let request_id = self
            .send(message, move |response, _request_id| {
                // Receiver dropped means the caller stopped waiting.
                let _ = tx.send(response);
            })
            .await?;

        Ok((request_id, PendingResponse { rx }))
    }

    /// Send a request and wait up to `timeout` for its response.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Timeout`] if no response arrives in time;
    /// the pending entry is removed, so a late response is dropped. Otherwise
    /// same as [`send`](Self::send).
    pub async fn request_with_timeout(&self, message: Message, timeout: Duration) -> Result<Message> {
        // ---
        let (request_id, response) = self.request(message).await?;

        match tokio::time::timeout(timeout, response).await {
            Ok(result) => result,
            Err(_) => {
                self.forget(&request_id);
                Err(MessagingError::Timeout)
            }
        }
    }

    /// Stop waiting for `request_id`; its callback will never be invoked.
    ///
    /// Returns `false` if the request already resolved or was unknown.
    pub fn forget(&self, request_id: &RequestId) -> bool {
        lock_ignore_poison(&self.inner.pending).remove(request_id)
    }

    /// Forget every request sent more than `age` ago.
    ///
    /// Returns how many were removed.
    pub fn prune_older_than(&self, age: Duration) -> usize {
        lock_ignore_poison(&self.inner.pending).prune_older_than(age)
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock_ignore_poison(&self.inner.pending).len()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close the requestor.
    ///
    /// Unsubscribes from the responses destination, stops the listener and
    /// discards every pending request without invoking its callback.
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates unsubscribe failures other than an already-closed
    /// connection. The requestor then stays open and subscribed, and `close`
    /// may be retried.
    pub async fn close(&self) -> Result<()> {
        // ---
        if self.is_closed() {
            return Ok(());
        }

        match self
            .inner
            .connection
            .unsubscribe(self.inner.responses.clone())
            .await
        {
            Ok(()) | Err(MessagingError::Closed) | Err(MessagingError::NotSubscribed(_)) => {}
            Err(err) => return Err(err),
        }

        let _discarded = {
            let mut pending = lock_ignore_poison(&self.inner.pending);
            if self.inner.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            pending.clear()
        };

        if let Some(listener) = lock_ignore_poison(&self.inner.listener).take() {
            listener.abort();
        }

        log_debug!(
            "requestor on {} closed, {_discarded} pending requests discarded",
            self.inner.responses
        );
        Ok(())
    }
}

/// Future resolving to the response of a request sent with
/// [`Requestor::request`].
pub struct PendingResponse {
    rx: oneshot::Receiver<Message>,
}

impl Future for PendingResponse {
    type Output = Result<Message>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| MessagingError::Closed))
    }
}
