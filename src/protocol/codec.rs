//! Payload codec.
//!
//! Converts [`Message`] payloads to and from the bytes handed to the
//! transport. Structured documents travel as JSON objects; raw payloads are
//! passed through untouched.
//!
//! The codec is deliberately ignorant of envelope fields. `kind`,
//! `requestID` and `respondTo` are ordinary keys as far as it is concerned.

use crate::protocol::message::{Document, Message, Payload};
use crate::{Frame, MessagingError, Result};
use bytes::Bytes;
use std::sync::Arc;

/// Content type attached when a message does not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Encode a message into the bytes and content type to publish.
///
/// Raw payloads are emitted verbatim; documents are serialized to JSON.
///
/// # Errors
///
/// Returns [`MessagingError::Encode`] if the document cannot be serialized.
pub fn encode(message: &Message) -> Result<(Bytes, Arc<str>)> {
    // ---
    let content_type: Arc<str> = message
        .content_type
        .clone()
        .unwrap_or_else(|| Arc::from(DEFAULT_CONTENT_TYPE));

    let body = match &message.payload {
        Payload::Raw(bytes) => bytes.clone(),
        Payload::Document(document) => serde_json::to_vec(document)
            .map(Bytes::from)
            .map_err(|e| MessagingError::Encode(e.to_string()))?,
    };

    Ok((body, content_type))
}

/// Decode received bytes into a structured document.
///
/// # Errors
///
/// Returns [`MessagingError::Decode`] if the bytes are not JSON or the
/// top-level JSON value is not an object.
pub fn decode(body: &[u8]) -> Result<Document> {
    // ---
    serde_json::from_slice::<Document>(body).map_err(|e| MessagingError::Decode(e.to_string()))
}

/// Decode an inbound frame into a document message, keeping its content type
/// and carried error.
pub(crate) fn decode_frame(frame: &Frame) -> Result<Message> {
    // ---
    let document = decode(&frame.body)?;

    Ok(Message {
        payload: Payload::Document(document),
        content_type: frame.content_type.clone(),
        error: frame.error.clone(),
    })
}
