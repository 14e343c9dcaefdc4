//! Envelope fields used for request/response correlation.
//!
//! Requests and responses are ordinary documents carrying three reserved
//! keys. Only the requestor and responder read or write them.

use crate::protocol::message::Document;
use crate::{Destination, RequestId};
use serde_json::Value;
use thiserror::Error;

/// Envelope kind key.
pub const KIND: &str = "kind";

/// Correlation id key.
pub const REQUEST_ID: &str = "requestID";

/// Reply destination key, present on requests only.
pub const RESPOND_TO: &str = "respondTo";

/// Envelope kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Request,
    Response,
}

impl Kind {
    /// Wire value of the `kind` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Request => "Request",
            Kind::Response => "Response",
        }
    }
}

/// Why an inbound document was not accepted as an envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum Rejection {
    #[error("expected kind '{expected}', found {found}")]
    WrongKind { expected: &'static str, found: String },

    #[error("missing 'requestID' field")]
    MissingRequestId,

    #[error("missing 'respondTo' field")]
    MissingRespondTo,
}

/// Correlation fields extracted from a request.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RequestFields {
    pub request_id: RequestId,
    pub respond_to: Destination,
}

/// Add request envelope fields to an outgoing document.
pub(crate) fn stamp_request(document: &mut Document, id: &RequestId, respond_to: &Destination) {
    // ---
    document.insert(KIND.into(), Value::from(Kind::Request.as_str()));
    document.insert(REQUEST_ID.into(), Value::from(id.as_str()));
    document.insert(RESPOND_TO.into(), Value::from(respond_to.as_str()));
}

/// Add response envelope fields to an outgoing document.
///
/// Any `respondTo` left over from the request is removed; responses never
/// carry one.
pub(crate) fn stamp_response(document: &mut Document, id: &RequestId) {
    // ---
    document.remove(RESPOND_TO);
    document.insert(KIND.into(), Value::from(Kind::Response.as_str()));
    document.insert(REQUEST_ID.into(), Value::from(id.as_str()));
}

/// Remove all reserved keys, leaving only application fields.
pub(crate) fn strip(document: &mut Document) {
    // ---
    document.remove(KIND);
    document.remove(REQUEST_ID);
    document.remove(RESPOND_TO);
}

/// Validate a response envelope and return its request ID.
pub(crate) fn parse_response(document: &Document) -> Result<RequestId, Rejection> {
    // ---
    expect_kind(document, Kind::Response)?;
    string_field(document, REQUEST_ID)
        .map(RequestId::from)
        .ok_or(Rejection::MissingRequestId)
}

/// Validate a request envelope and return its correlation fields.
pub(crate) fn parse_request(document: &Document) -> Result<RequestFields, Rejection> {
    // ---
    expect_kind(document, Kind::Request)?;

    let request_id = string_field(document, REQUEST_ID)
        .map(RequestId::from)
        .ok_or(Rejection::MissingRequestId)?;

    let respond_to = string_field(document, RESPOND_TO)
        .map(Destination::from)
        .ok_or(Rejection::MissingRespondTo)?;

    Ok(RequestFields {
        request_id,
        respond_to,
    })
}

fn expect_kind(document: &Document, expected: Kind) -> Result<(), Rejection> {
    // ---
    match document.get(KIND) {
        Some(Value::String(kind)) if kind == expected.as_str() => Ok(()),
        Some(other) => Err(Rejection::WrongKind {
            expected: expected.as_str(),
            found: other.to_string(),
        }),
        None => Err(Rejection::WrongKind {
            expected: expected.as_str(),
            found: "nothing".into(),
        }),
    }
}

// Empty strings are treated as missing; they can neither correlate nor route.
fn string_field<'a>(document: &'a Document, key: &str) -> Option<&'a str> {
    document
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}
