use crate::{Message, MessagingError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Type-erased request handler
///
/// Takes the request message (envelope fields removed) and returns the
/// response message, or an error to drop the request without replying.
///
/// Wrapped in Arc so clones of a responder share one handler.
pub(super) type BoxedHandler = Arc<dyn Fn(Message) -> Result<Message> + Send + Sync>;

/// Wrap a message handler into a type-erased handler
pub(super) fn wrap_handler<F>(handler: F) -> BoxedHandler
where
    F: Fn(Message) -> Result<Message> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Wrap a typed handler into a type-erased handler
///
/// The request document is deserialized into `Req` and the returned `Resp`
/// serialized back into a document. A request that does not match `Req` is
/// treated as a handler failure.
pub(super) fn wrap_typed_handler<F, Req, Resp>(handler: F) -> BoxedHandler
where
    F: Fn(Req) -> Result<Resp> + Send + Sync + 'static,
    Req: DeserializeOwned + 'static,
    Resp: Serialize + 'static,
{
    // ---
    Arc::new(move |request: Message| {
        let typed: Req = request
            .parse()
            .map_err(|e| MessagingError::Handler(format!("request does not match handler type: {e}")))?;

        let response = handler(typed)?;
        Message::from_serialize(&response)
    })
}
