use thiserror::Error;

/// Errors that can occur while talking to a broker through a [`Connection`](crate::Connection).
///
/// Transport and registry errors are returned to the caller of the operation
/// that triggered them. Codec and envelope problems hit inside a listener task
/// are never surfaced here; the offending frame is logged and dropped.
#[derive(Error, Debug)]
pub enum MessagingError {
    /// The transport could not be reached, or the broker refused the login.
    ///
    /// Fatal to the connection; open a new one.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Operation attempted on a closed connection, requestor or responder.
    #[error("connection is closed")]
    Closed,

    /// The destination already has an active subscription on this connection.
    #[error("only one subscription per destination is allowed: {0}")]
    DuplicateSubscription(String),

    /// Unsubscribe was called for a destination with no active subscription.
    #[error("not subscribed to destination: {0}")]
    NotSubscribed(String),

    /// The payload could not be encoded for publishing.
    #[error("encode error: {0}")]
    Encode(String),

    /// Inbound bytes could not be decoded into a structured document.
    #[error("decode error: {0}")]
    Decode(String),

    /// Publishing to the broker failed.
    #[error("send failed: {0}")]
    Send(String),

    /// No response arrived within the caller-supplied timeout.
    #[error("request timed out")]
    Timeout,

    /// An application request handler declined to produce a response.
    #[error("handler error: {0}")]
    Handler(String),

    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for messaging operations
pub type Result<T> = std::result::Result<T, MessagingError>;
