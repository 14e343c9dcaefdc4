//! Plain destination listener.
//!
//! The callback-style subscription of the messaging client: every frame on
//! the destination is handed to an application callback, with no envelope
//! interpretation.

use std::sync::Mutex;

use tokio::task::JoinHandle;

use crate::protocol::{codec, Payload};
use crate::transport::runner::{self, FrameConsumer};
use crate::{
    // ---
    lock_ignore_poison,
    Connection,
    Destination,
    Frame,
    Message,
    MessagingError,
    Result,
};

/// Background listener created by [`Connection::listen`].
///
/// Frames that decode as JSON objects are delivered as
/// [`Payload::Document`]; anything else is delivered untouched as
/// [`Payload::Raw`], so the callback sees every frame, including transport
/// error frames. The callback runs on the listener task, one frame at a time.
pub struct Listener {
    connection: Connection,
    destination: Destination,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct CallbackConsumer<F> {
    destination: Destination,
    callback: F,
}

#[async_trait::async_trait]
impl<F> FrameConsumer for CallbackConsumer<F>
where
    F: FnMut(Message, &Destination) + Send + 'static,
{
    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        // ---
        let message = match codec::decode_frame(&frame) {
            Ok(message) => message,
            Err(_) => Message {
                payload: Payload::Raw(frame.body),
                content_type: frame.content_type,
                error: frame.error,
            },
        };

        (self.callback)(message, &self.destination);
        Ok(())
    }
}

impl Listener {
    pub(crate) async fn open<F>(
        connection: &Connection,
        destination: impl Into<Destination>,
        callback: F,
    ) -> Result<Self>
    where
        F: FnMut(Message, &Destination) + Send + 'static,
    {
        // ---
        let subscription = connection.subscribe(destination).await?;
        let destination = subscription.destination().clone();

        let consumer = CallbackConsumer {
            destination: destination.clone(),
            callback,
        };
        let task = runner::spawn(subscription.into_inbox(), consumer);

        Ok(Self {
            connection: connection.clone(),
            destination,
            task: Mutex::new(Some(task)),
        })
    }

    /// Destination this listener is bound to.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Unsubscribe and stop the listener task.
    ///
    /// Closing twice, or after the connection was closed, is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates other unsubscribe failures. The listener then keeps
    /// running, and `close` may be retried.
    pub async fn close(&self) -> Result<()> {
        // ---
        if lock_ignore_poison(&self.task).is_none() {
            return Ok(());
        }

        match self.connection.unsubscribe(self.destination.clone()).await {
            Ok(()) | Err(MessagingError::Closed) | Err(MessagingError::NotSubscribed(_)) => {}
            Err(err) => return Err(err),
        }

        if let Some(task) = lock_ignore_poison(&self.task).take() {
            task.abort();
        }
        Ok(())
    }

    /// Whether [`close`](Self::close) has completed.
    pub fn is_closed(&self) -> bool {
        lock_ignore_poison(&self.task).is_none()
    }
}
