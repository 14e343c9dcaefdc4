use crate::protocol::codec::DEFAULT_CONTENT_TYPE;
use crate::{MessagingError, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Structured message body: a string-keyed JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Message payload.
///
/// Either a structured document, which the codec serializes to JSON, or a
/// raw byte blob that is published verbatim and bypasses structured encoding
/// entirely.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Key/value document, encoded as a JSON object.
    Document(Document),

    /// Opaque bytes, sent as-is.
    Raw(Bytes),
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Document(Document::new())
    }
}

/// A message sent or received through a [`Connection`](crate::Connection).
///
/// If `error` is set, the message corresponds to a transport-level error
/// frame rather than an application message; `payload` and `content_type`
/// then describe the error frame when the broker supplied one.
///
/// Messages handed to requestor and responder callbacks never contain the
/// reserved envelope fields (`kind`, `requestID`, `respondTo`); those are
/// owned by the correlation layer.
///
/// ```
/// # use mom_reqrep::Message;
/// # use serde_json::json;
/// let message = Message::from_value(json!({"body": "hi"})).unwrap();
/// assert_eq!(message.get("body"), Some(&json!("hi")));
/// assert_eq!(message.content_type(), "application/json");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    // ---
    /// Message body.
    pub payload: Payload,

    /// MIME type of the body; `application/json` when unset.
    pub content_type: Option<Arc<str>>,

    /// Transport-level error carried by this message.
    pub error: Option<Arc<str>>,
}

impl Message {
    // ---
    /// Create a message from a structured document.
    pub fn document(document: Document) -> Self {
        // ---
        Self {
            payload: Payload::Document(document),
            content_type: None,
            error: None,
        }
    }

    /// Create a message whose bytes are published verbatim.
    pub fn raw(body: impl Into<Bytes>) -> Self {
        // ---
        Self {
            payload: Payload::Raw(body.into()),
            content_type: None,
            error: None,
        }
    }

    /// Create a document message from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Encode`] if the value is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        // ---
        match value {
            Value::Object(document) => Ok(Self::document(document)),
            other => Err(MessagingError::Encode(format!(
                "message payload must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Create a document message from any serializable type.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Encode`] if serialization fails or the type
    /// does not serialize to a JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        // ---
        let value =
            serde_json::to_value(value).map_err(|e| MessagingError::Encode(e.to_string()))?;
        Self::from_value(value)
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<Arc<str>>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Content type, falling back to `application/json`.
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Borrow the structured document, if this is not a raw message.
    pub fn as_document(&self) -> Option<&Document> {
        match &self.payload {
            Payload::Document(document) => Some(document),
            Payload::Raw(_) => None,
        }
    }

    /// Look up a field of a structured document.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_document().and_then(|document| document.get(key))
    }

    /// Deserialize the payload into a typed value.
    ///
    /// Raw payloads are parsed as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Decode`] if the payload does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        // ---
        let parsed = match &self.payload {
            Payload::Document(document) => serde_json::from_value(Value::Object(document.clone())),
            Payload::Raw(bytes) => serde_json::from_slice(bytes),
        };

        parsed.map_err(|e| MessagingError::Decode(e.to_string()))
    }

    /// Whether this message carries a transport-level error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
