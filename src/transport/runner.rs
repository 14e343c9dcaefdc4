//! Subscription listener runner.
//!
//! This module provides the glue between a subscription inbox and the
//! roles that consume it (requestor, responder, plain listeners).
//!
//! The runner is responsible for:
//! - driving a receive loop over one subscription inbox
//! - dispatching received [`Frame`]s to the consumer, strictly one at a time
//! - consolidating logging for frames the consumer drops
//!
//! It does **not** define correlation semantics, decode payloads, or impose
//! timeouts. Those belong to the consumers.
//!
//! ## Receive loop
//!
//! [`spawn`] starts a long-running task that waits for incoming frames. When
//! the transport cancels the subscription (unsubscribe or close) the inbox
//! ends and the loop exits naturally. Owners may also abort the returned
//! handle to stop it immediately.
//!
//! ## Error handling
//!
//! Errors returned by [`FrameConsumer::handle_frame`] are per-frame failures:
//! a malformed or foreign message on a shared destination. They are logged
//! at `warn` level and never terminate the loop. A panicking consumer does
//! terminate it; [`spawn`] supervises the loop and logs that at `error`.

use tokio::task::{AbortHandle, JoinHandle};

use crate::{
    // ---
    log_debug,
    log_error,
    log_warn,
    Destination,
    Frame,
    Inbox,
    Result,
};

/// A consumer of frames delivered on one subscription.
#[async_trait::async_trait]
pub(crate) trait FrameConsumer: Send + 'static {
    /// Destination this consumer is bound to, used in diagnostics.
    fn destination(&self) -> &Destination;

    /// Handle a single incoming frame.
    ///
    /// Returning an error drops the frame; processing continues with the
    /// next one.
    async fn handle_frame(&mut self, frame: Frame) -> Result<()>;
}

/// Start the receive loop for `consumer` over `inbox`.
///
/// The returned [`JoinHandle`] represents the lifetime of the loop; aborting
/// it stops the loop. Dropping the handle does not stop it.
///
/// A panic inside the consumer ends the loop. It is logged at `error`, since
/// the owning role will not see another frame.
pub(crate) fn spawn<C>(inbox: Inbox, consumer: C) -> JoinHandle<()>
where
    C: FrameConsumer,
{
    // ---
    let destination = consumer.destination().clone();

    tokio::spawn(async move {
        // ---
        let receive = tokio::spawn(receive_loop(inbox, consumer));
        let _abort_on_drop = AbortOnDrop(receive.abort_handle());

        match receive.await {
            Err(err) if err.is_panic() => {
                log_error!("listener for {destination} panicked, no further frames will be handled");
            }
            _ => {}
        }
    })
}

async fn receive_loop<C>(mut inbox: Inbox, mut consumer: C)
where
    C: FrameConsumer,
{
    // ---
    log_debug!("listener started for {}", consumer.destination());

    while let Some(frame) = inbox.recv().await {
        if let Err(_err) = consumer.handle_frame(frame).await {
            log_warn!(
                "dropping frame received on {}: {_err}",
                consumer.destination()
            );
        }
    }

    log_debug!("listener stopped for {}", consumer.destination());
}

/// Aborts the receive task when the supervising task is aborted.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
