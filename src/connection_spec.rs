//! Public, transport-agnostic connection configuration.
//!
//! This type intentionally contains no protocol-specific concepts. Transport
//! implementations interpret it into concrete socket, TLS and login settings.

use serde::Deserialize;
use std::fmt;

/// Broker host used when none is configured.
pub const DEFAULT_BROKER_HOST: &str = "127.0.0.1";

/// Broker port used when none is configured (the STOMP default).
pub const DEFAULT_BROKER_PORT: u16 = 61613;

/// Connection parameters passed to [`Transport::open`](crate::Transport::open).
///
/// Deserializable with every field optional, so applications can embed it in
/// their own configuration files:
///
/// ```
/// # use mom_reqrep::ConnectionSpec;
/// let spec: ConnectionSpec = serde_json::from_str(r#"{"port": 61614, "use_tls": true}"#).unwrap();
/// assert_eq!(spec.host, "127.0.0.1");
/// assert_eq!(spec.port, 61614);
/// assert!(spec.use_tls);
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionSpec {
    // ---
    /// Broker host name or address.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// Login name; no login is attempted when `None`.
    pub username: Option<String>,

    /// Login password, used together with `username`.
    pub password: Option<String>,

    /// Wrap the connection in TLS.
    pub use_tls: bool,

    /// Skip broker certificate verification (TLS only).
    pub insecure_tls: bool,
}

impl Default for ConnectionSpec {
    /// Plain TCP connection to `127.0.0.1:61613` without login.
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            username: None,
            password: None,
            use_tls: false,
            insecure_tls: false,
        }
    }
}

impl ConnectionSpec {
    /// Create a spec for the given broker host and port.
    ///
    /// An empty host or a zero port fall back to the defaults.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::default().with_host(host).with_port(port)
    }

    /// Set the broker host; an empty host keeps the default.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        self.host = if host.is_empty() {
            DEFAULT_BROKER_HOST.to_string()
        } else {
            host
        };
        self
    }

    /// Set the broker port; zero keeps the default.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = if port == 0 { DEFAULT_BROKER_PORT } else { port };
        self
    }

    /// Set login credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Enable or disable TLS.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Skip certificate verification when TLS is enabled.
    pub fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }

    /// `host:port` address as required by socket dialers.
    pub fn broker_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("use_tls", &self.use_tls)
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}
