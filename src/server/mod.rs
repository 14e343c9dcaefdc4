//! Responder: serves requests and publishes correlated responses
mod handler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::protocol::{codec, envelope, Payload};
use crate::transport::runner::{self, FrameConsumer};
use crate::{
    // ---
    lock_ignore_poison,
    log_debug,
    log_error,
    Connection,
    Destination,
    Frame,
    Message,
    MessagingError,
    Result,
};
use handler::{wrap_handler, wrap_typed_handler, BoxedHandler};

/// Serves requests arriving on a requests destination.
///
/// Opening a responder subscribes to the requests destination and starts a
/// background listener. For every well-formed request (`kind=Request` with
/// `requestID` and `respondTo`) the handler is invoked on the listener task:
///
/// - on success the returned message is stamped with `kind=Response` and the
///   request's `requestID`, and published once to `respondTo`;
/// - on failure nothing is published, and the requester is left to time out.
///
/// Malformed and foreign frames are dropped. Response publish failures are
/// logged and never retried.
///
/// # Example
///
/// ```
/// # use mom_reqrep::{ConnectionBuilder, Message, MessagingError};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> mom_reqrep::Result<()> {
/// let connection = ConnectionBuilder::new().open().await?;
///
/// let responder = connection
///     .responder("q.req", |request: Message| match request.get("body") {
///         Some(_) => Ok(request),
///         None => Err(MessagingError::Handler("empty request".into())),
///     })
///     .await?;
///
/// responder.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Responder {
    connection: Connection,
    requests: Destination,
    listener: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Listener side: validates requests, runs the handler, publishes responses.
struct RequestConsumer {
    connection: Connection,
    requests: Destination,
    handler: BoxedHandler,
}

#[async_trait::async_trait]
impl FrameConsumer for RequestConsumer {
    fn destination(&self) -> &Destination {
        &self.requests
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        // ---
        if let Some(error) = &frame.error {
            return Err(MessagingError::Transport(format!(
                "error frame on {}: {error}",
                self.requests
            )));
        }

        let mut document = codec::decode(&frame.body)?;

        let fields = envelope::parse_request(&document)
            .map_err(|rejection| MessagingError::Decode(rejection.to_string()))?;

        envelope::strip(&mut document);
        let request = Message {
            payload: Payload::Document(document),
            content_type: frame.content_type,
            error: None,
        };

        let response = (self.handler)(request)?;

        let mut reply = match response.payload {
            Payload::Document(reply) => reply,
            Payload::Raw(_) => {
                return Err(MessagingError::Encode(format!(
                    "raw response to request {} cannot carry envelope fields",
                    fields.request_id
                )))
            }
        };
        envelope::stamp_response(&mut reply, &fields.request_id);

        let reply = Message {
            payload: Payload::Document(reply),
            content_type: response.content_type,
            error: None,
        };

        match self
            .connection
            .publish(&reply, fields.respond_to.clone())
            .await
        {
            Ok(()) => {
                log_debug!(
                    "responded to request {} on {}",
                    fields.request_id,
                    fields.respond_to
                );
            }
            Err(_err) => {
                log_error!(
                    "failed to publish response to request {} on {}: {_err}",
                    fields.request_id,
                    fields.respond_to
                );
            }
        }

        Ok(())
    }
}

impl Responder {
    // ---

    /// Open a responder on `requests` with a message handler.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::DuplicateSubscription`] if `requests` already has
    ///   a subscription on this connection
    /// - [`MessagingError::Closed`] if the connection is closed
    /// - transport errors from the subscribe
    pub async fn open<F>(connection: &Connection, requests: impl Into<Destination>, handler: F) -> Result<Self>
    where
        F: Fn(Message) -> Result<Message> + Send + Sync + 'static,
    {
        Self::start(connection, requests.into(), wrap_handler(handler)).await
    }

    /// Open a responder whose handler works on serde types.
    ///
    /// Requests that do not deserialize into `Req` are dropped.
    ///
    /// # Example
    ///
    /// ```
    /// # use mom_reqrep::{ConnectionBuilder, Responder};
    /// # use serde::{Deserialize, Serialize};
    /// #[derive(Deserialize)]
    /// struct AddRequest { a: i32, b: i32 }
    ///
    /// #[derive(Serialize)]
    /// struct AddResponse { sum: i32 }
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> mom_reqrep::Result<()> {
    /// let connection = ConnectionBuilder::new().open().await?;
    /// let responder = Responder::open_typed(&connection, "math.add", |req: AddRequest| {
    ///     Ok(AddResponse { sum: req.a + req.b })
    /// })
    /// .await?;
    /// # responder.close().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open_typed<F, Req, Resp>(
        connection: &Connection,
        requests: impl Into<Destination>,
        handler: F,
    ) -> Result<Self>
    where
        F: Fn(Req) -> Result<Resp> + Send + Sync + 'static,
        Req: DeserializeOwned + 'static,
        Resp: Serialize + 'static,
    {
        Self::start(connection, requests.into(), wrap_typed_handler(handler)).await
    }

    async fn start(connection: &Connection, requests: Destination, handler: BoxedHandler) -> Result<Self> {
        // ---
        let subscription = connection.subscribe(requests.clone()).await?;

        let consumer = RequestConsumer {
            connection: connection.clone(),
            requests: requests.clone(),
            handler,
        };
        let listener = runner::spawn(subscription.into_inbox(), consumer);

        log_debug!("responder open on {requests}");

        Ok(Self {
            connection: connection.clone(),
            requests,
            listener: Mutex::new(Some(listener)),
            closed: AtomicBool::new(false),
        })
    }

    /// Destination requests are received on.
    pub fn requests(&self) -> &Destination {
        &self.requests
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Unsubscribe from the requests destination and stop the listener.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates unsubscribe failures other than an already-closed
    /// connection. The responder then stays open and subscribed, and `close`
    /// may be retried.
    pub async fn close(&self) -> Result<()> {
        // ---
        if self.is_closed() {
            return Ok(());
        }

        match self.connection.unsubscribe(self.requests.clone()).await {
            Ok(()) | Err(MessagingError::Closed) | Err(MessagingError::NotSubscribed(_)) => {}
            Err(err) => return Err(err),
        }

        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(listener) = lock_ignore_poison(&self.listener).take() {
            listener.abort();
        }

        log_debug!("responder on {} closed", self.requests);
        Ok(())
    }
}
