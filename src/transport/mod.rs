//! Transport implementations.
//!
//! This module provides the in-memory reference implementation of the
//! domain-level `Transport` trait, and the runner that binds a subscription
//! inbox to a background listener task.
//!
//! Broker-backed transports (STOMP, AMQP, ...) live outside this crate and
//! plug in through [`TransportPtr`](crate::TransportPtr). Domain code must not
//! depend on transport-specific types.

mod memory;
pub(crate) mod runner;

pub use memory::{create_memory_transport, MemoryHub};
