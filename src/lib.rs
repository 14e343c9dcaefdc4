//! Request/response messaging over pub/sub destinations
//!
//! This library layers correlated request/response on top of a
//! message-oriented middleware connection. It handles request ID
//! generation, envelope stamping, response matching, single-subscription
//! discipline per destination and background listeners, so applications
//! only deal with JSON documents and callbacks.
//!
//! The building blocks:
//!
//! - [`Connection`]: one broker connection plus its destination registry
//! - [`Requestor`]: publishes requests and routes responses to callbacks
//! - [`Responder`]: serves requests with a handler and publishes responses
//! - [`Listener`]: plain callback subscription without envelope handling
//!
//! Brokers plug in through the [`Transport`] trait; [`MemoryHub`] provides an
//! in-process broker for tests and demos.
//!
//! # Example
//!
//! ```
//! use mom_reqrep::{ConnectionBuilder, Message};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> mom_reqrep::Result<()> {
//! let connection = ConnectionBuilder::new().open().await?;
//!
//! let _responder = connection
//!     .responder("q.req", |request: Message| {
//!         let name = request.get("name").and_then(|v| v.as_str()).unwrap_or("stranger");
//!         Message::from_value(json!({ "greeting": format!("hello, {name}") }))
//!     })
//!     .await?;
//!
//! let requestor = connection.requestor("q.req", "q.res").await?;
//! let (_id, response) = requestor
//!     .request(Message::from_value(json!({ "name": "ada" }))?)
//!     .await?;
//!
//! assert_eq!(response.await?.get("greeting"), Some(&json!("hello, ada")));
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod macros;
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

mod client;
mod connection;
mod connection_builder;
mod connection_spec;
mod correlation;
mod domain;
mod error;
mod listener;
pub mod protocol;
mod server;
mod transport;
mod util;

pub(crate) use util::lock_ignore_poison;

// Re-export main types
pub use client::{PendingResponse, Requestor, ResponseCallback};
pub use connection::{Connection, Subscription};
pub use connection_builder::ConnectionBuilder;
pub use connection_spec::{ConnectionSpec, DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT};
pub use correlation::RequestId;
pub use error::{MessagingError, Result};
pub use listener::Listener;
pub use server::Responder;

pub use protocol::{Document, Kind, Message, Payload};

pub use transport::{create_memory_transport, MemoryHub};

// --- public re-exports
pub use domain::{
    //
    Destination,
    Frame,
    Inbox,
    Transport,
    TransportPtr,
};
