use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier binding a request to its eventual response.
///
/// Request IDs travel *in-band* as the `requestID` envelope field and are
/// opaque to the transport. Generated IDs are UUID v7: a millisecond
/// timestamp prefix followed by random bits, so they sort by creation time
/// and never repeat across the lifetime of a responses destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(Arc<str>);

impl RequestId {
    /// Generate a new unique request ID.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string().into())
    }

    /// Borrow the request ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
