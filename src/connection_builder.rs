//! Connection builder.
//!
//! Fluent construction of a [`Connection`]: broker parameters on one side,
//! the transport carrying them on the other.

use std::sync::Arc;

use crate::{
    // ---
    create_memory_transport,
    Connection,
    ConnectionSpec,
    MemoryHub,
    Result,
    TransportPtr,
};

/// Builder for opening a [`Connection`].
///
/// Without an explicit transport the connection runs over a private
/// [`MemoryHub`], which is only useful for tests and demos. Connections that
/// must talk to each other share a hub and pass their transports in.
///
/// # Examples
///
/// ## Defaults
/// ```
/// use mom_reqrep::ConnectionBuilder;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> mom_reqrep::Result<()> {
/// let connection = ConnectionBuilder::new().open().await?;
/// assert_eq!(connection.spec().broker_address(), "127.0.0.1:61613");
/// # Ok(())
/// # }
/// ```
///
/// ## Shared hub with login
/// ```
/// use mom_reqrep::{ConnectionBuilder, MemoryHub};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> mom_reqrep::Result<()> {
/// let hub = MemoryHub::with_credentials("svc", "secret");
///
/// let connection = ConnectionBuilder::new()
///     .host("broker.internal")
///     .credentials("svc", "secret")
///     .hub(&hub, "worker-1")
///     .open()
///     .await?;
/// assert_eq!(connection.transport_id(), "worker-1");
/// # Ok(())
/// # }
/// ```
pub struct ConnectionBuilder {
    spec: ConnectionSpec,
    transport: Option<TransportPtr>,
}

impl ConnectionBuilder {
    /// Create a builder with [`ConnectionSpec::default`] parameters.
    pub fn new() -> Self {
        Self {
            spec: ConnectionSpec::default(),
            transport: None,
        }
    }

    /// Set the broker host. An empty host keeps the default.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.spec = self.spec.with_host(host);
        self
    }

    /// Set the broker port. Zero keeps the default.
    pub fn port(mut self, port: u16) -> Self {
        self.spec = self.spec.with_port(port);
        self
    }

    /// Log in with `username` and `password`.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.spec = self.spec.with_credentials(username, password);
        self
    }

    /// Wrap the connection in TLS.
    pub fn tls(mut self, use_tls: bool) -> Self {
        self.spec = self.spec.with_tls(use_tls);
        self
    }

    /// Skip broker certificate verification.
    pub fn insecure_tls(mut self, insecure: bool) -> Self {
        self.spec = self.spec.with_insecure_tls(insecure);
        self
    }

    /// Replace all broker parameters at once, e.g. from a config file.
    pub fn spec(mut self, spec: ConnectionSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Use `transport` instead of a private in-memory hub.
    pub fn transport(mut self, transport: TransportPtr) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Run over `hub` with a fresh in-memory transport named `transport_id`.
    pub fn hub(self, hub: &Arc<MemoryHub>, transport_id: impl Into<String>) -> Self {
        self.transport(create_memory_transport(hub, transport_id))
    }

    /// Open the connection (consumes self).
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Connect`](crate::MessagingError::Connect) if
    /// the transport cannot reach the broker or the login is refused.
    pub async fn open(self) -> Result<Connection> {
        // ---
        let transport = match self.transport {
            Some(transport) => transport,
            None => create_memory_transport(&MemoryHub::new(), "memory"),
        };

        Connection::open(transport, self.spec).await
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
