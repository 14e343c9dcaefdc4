//! Message model, payload codec and correlation envelope
//!
//! This module defines the payload representation exchanged with
//! applications, its byte encoding, and the reserved envelope fields used to
//! correlate requests with responses.
pub mod codec;
pub(crate) mod envelope;
mod message;

pub use envelope::Kind;
pub use message::{Document, Message, Payload};
