//! Connection configuration.
//!
//! All knobs come through [`ConnectConfiguration`]; nothing is read from
//! the environment. Fields are public and set directly on a value started
//! from [`ConnectConfiguration::new`], which carries the defaults.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub use crate::transport::socket::{DialFn, TlsOptions};

/// Default number of rows per fetch batch.
pub const DEFAULT_FETCH_SIZE: i64 = 1000;
/// Default pause between operation-status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Default registry namespace for discovery.
pub const DEFAULT_REGISTRY_NAMESPACE: &str = "hiveserver2";
/// Default maximum SASL frame length in bytes.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384_000;

/// How the RPC stream reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Thrift binary over TCP, optionally SASL-framed.
    #[default]
    Binary,
    /// Thrift binary in HTTP POST bodies.
    Http,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Binary => f.write_str("binary"),
            TransportMode::Http => f.write_str("http"),
        }
    }
}

/// Authentication scheme requested for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Raw buffered socket, no SASL at all.
    NoSasl,
    /// SASL PLAIN with the configured credentials (server may ignore them).
    None,
    /// SASL PLAIN against the server's LDAP backend.
    Ldap,
    /// SASL PLAIN against a custom server-side authenticator.
    Custom,
    /// SASL GSSAPI (Kerberos).
    Kerberos,
    /// SASL DIGEST-MD5.
    DigestMd5,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthScheme::NoSasl => "NOSASL",
            AuthScheme::None => "NONE",
            AuthScheme::Ldap => "LDAP",
            AuthScheme::Custom => "CUSTOM",
            AuthScheme::Kerberos => "KERBEROS",
            AuthScheme::DigestMd5 => "DIGEST-MD5",
        };
        f.write_str(name)
    }
}

/// Immutable options for a session. Not every field applies to every
/// transport/auth combination.
#[derive(Clone)]
pub struct ConnectConfiguration {
    /// Username; empty means the current OS user with spaces stripped.
    pub username: String,
    /// Password; empty is replaced by `"x"` because SASL mechanisms
    /// reject empty passwords even when the server ignores them.
    pub password: String,
    /// Kerberos service name (also the DIGEST-MD5 digest-uri service).
    pub service: String,
    /// Server-side configuration overrides sent with OpenSession.
    pub hive_configuration: Option<HashMap<String, String>>,
    /// Pause between operation-status polls.
    pub poll_interval: Duration,
    /// Rows requested per fetch batch.
    pub fetch_size: i64,
    /// Binary (TCP) or HTTP transport.
    pub transport_mode: TransportMode,
    /// URL path for the HTTP transport.
    pub http_path: String,
    /// TLS options; `None` disables TLS.
    pub tls: Option<TlsOptions>,
    /// Registry namespace used by discovery.
    pub registry_namespace: String,
    /// Initial database; non-empty issues `USE <database>` on connect.
    pub database: String,
    /// Bound on dialing, including the dial hook.
    pub connect_timeout: Option<Duration>,
    /// Bound on each RPC over the binary transport.
    pub socket_timeout: Option<Duration>,
    /// Bound on each HTTP round-trip.
    pub http_timeout: Option<Duration>,
    /// Custom dialer for the binary transport.
    pub dial: Option<DialFn>,
    /// Disable HTTP keep-alive between requests.
    pub disable_keep_alives: bool,
    /// Maximum SASL frame length in bytes, both directions.
    pub max_frame_size: u32,
}

impl Default for ConnectConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectConfiguration {
    /// A configuration with the library defaults filled in.
    pub fn new() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            service: String::new(),
            hive_configuration: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fetch_size: DEFAULT_FETCH_SIZE,
            transport_mode: TransportMode::Binary,
            http_path: "cliservice".to_string(),
            tls: None,
            registry_namespace: DEFAULT_REGISTRY_NAMESPACE.to_string(),
            database: String::new(),
            connect_timeout: None,
            socket_timeout: None,
            http_timeout: None,
            dial: None,
            disable_keep_alives: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

// Never let the password or the dial hook reach logs.
impl fmt::Debug for ConnectConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfiguration")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("service", &self.service)
            .field("hive_configuration", &self.hive_configuration)
            .field("poll_interval", &self.poll_interval)
            .field("fetch_size", &self.fetch_size)
            .field("transport_mode", &self.transport_mode)
            .field("http_path", &self.http_path)
            .field("tls", &self.tls)
            .field("registry_namespace", &self.registry_namespace)
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .field("http_timeout", &self.http_timeout)
            .field("dial", &self.dial.as_ref().map(|_| "<fn>"))
            .field("disable_keep_alives", &self.disable_keep_alives)
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}
