//! Error types for hive2-rs.
//!
//! Errors are organized by functional area: connection setup, transport,
//! SASL authentication, server-side operations, and row materialization.

use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug, Clone)]
pub enum HiveError {
    /// Connection establishment and configuration errors
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Transport-level errors (dial, TLS, framing, timeouts)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Errors surfaced by server operations
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Row fetch and destination-binding errors
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl HiveError {
    /// True if this error is a context-cancellation report.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HiveError::Operation(OperationError::Cancelled))
    }

    /// The engine's semantic error code, if this is a server error.
    pub fn error_code(&self) -> Option<i32> {
        match self {
            HiveError::Operation(OperationError::Server { error_code, .. }) => Some(*error_code),
            _ => None,
        }
    }
}

/// Errors related to establishing a session.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// The (transport mode, auth scheme) pair has no supported transport
    #[error("unsupported transport/auth combination: {transport_mode} with {auth}")]
    UnsupportedCombination {
        transport_mode: String,
        auth: String,
    },

    /// The local username could not be determined
    #[error("cannot determine the local username")]
    UsernameLookup,

    /// Built without the `kerberos` cargo feature
    #[error("Kerberos support requires the `kerberos` feature")]
    KerberosDisabled,

    /// The registry listed no servers under the namespace
    #[error("no server is registered in the registry namespace {namespace}")]
    NoServersRegistered { namespace: String },

    /// Every discovered server refused the connection
    #[error("all {attempted} discovered servers are unavailable, last error: {last_error}")]
    AllServersUnavailable {
        attempted: usize,
        last_error: String,
    },
}

/// Errors related to the wire transport.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Network I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// TCP dial failed
    #[error("failed to connect to {host}:{port}: {message}")]
    DialFailed {
        host: String,
        port: u16,
        message: String,
    },

    /// Dial did not complete within the connect timeout
    #[error("dial timeout after {timeout_ms}ms connecting to {host}:{port}")]
    DialTimeout {
        host: String,
        port: u16,
        timeout_ms: u64,
    },

    /// TLS setup or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Operation attempted on a transport that is not open
    #[error("transport is not open")]
    NotOpen,

    /// Received or about-to-send frame exceeds the SASL maximum
    #[error("frame of {size} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge { size: u32, max: u32 },

    /// SASL handshake failed
    #[error("SASL handshake failed: {0}")]
    SaslHandshake(String),

    /// Mechanism-level SASL failure
    #[error(transparent)]
    Sasl(#[from] AuthError),

    /// HTTP round-trip returned a non-success status
    #[error("HTTP request failed with status {status}")]
    Http { status: u16 },

    /// HTTP client-side failure
    #[error("HTTP transport error: {0}")]
    HttpRequest(String),

    /// Malformed or unexpected wire data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Remote application exception on an RPC
    #[error("server exception on {method}: {message}")]
    ApplicationException { method: String, message: String },

    /// A single RPC exceeded the socket timeout
    #[error("RPC timeout after {timeout_ms}ms")]
    RpcTimeout { timeout_ms: u64 },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Errors produced by SASL mechanisms.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// Server rejected the handshake (SASL BAD or ERROR status)
    #[error("authentication rejected by server: {0}")]
    Rejected(String),

    /// A challenge could not be parsed or answered
    #[error("bad SASL challenge: {0}")]
    BadChallenge(String),

    /// The server insisted on a protection level the mechanism cannot provide
    #[error("unsupported quality of protection: {0}")]
    UnsupportedQop(String),

    /// Mechanism-internal failure (e.g. GSSAPI context error)
    #[error("SASL mechanism failure: {0}")]
    Mechanism(String),

    /// Server proof (rspauth) did not match
    #[error("server authentication proof mismatch")]
    ServerProofMismatch,
}

/// Errors surfaced from server-side operations.
#[derive(Error, Debug, Clone)]
pub enum OperationError {
    /// Statement rejected by the engine; carries the engine's error taxonomy
    /// code (e.g. 10001 = table not found).
    #[error("error while executing query: {message}")]
    Server { message: String, error_code: i32 },

    /// A non-execute RPC returned a non-success status
    #[error("{0}")]
    Failed(String),

    /// The caller's context was done before the operation completed
    #[error("context was done before the operation completed")]
    Cancelled,
}

/// Errors from fetching rows and binding destinations.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The result stream is exhausted
    #[error("No more rows are left")]
    NoMoreRows,

    /// Destination count does not match the column count
    #[error("{actual} destinations were passed for filling but the number of columns is {expected}")]
    ArgumentCount { expected: usize, actual: usize },

    /// Destination type does not match the column's value family
    #[error("unexpected destination type {dest} for column {column_index} holding {expected} values")]
    TypeMismatch {
        column_index: usize,
        expected: &'static str,
        dest: &'static str,
    },

    /// A NULL cell was bound to a non-optional destination
    #[error("column {column_index} is NULL at this row; bind an Option<{expected}> destination")]
    NullInto {
        column_index: usize,
        expected: &'static str,
    },

    /// Cursor has no live operation to describe or fetch from
    #[error("no operation is active; execute a statement first")]
    NoOperation,

    /// A column arrived with no recognizable value vector
    #[error("column {column_index} carries no values")]
    EmptyColumn { column_index: usize },

    /// Fewer rows than requested were received
    #[error("only {got} rows were received where {wanted} were required")]
    ShortBatch { wanted: usize, got: usize },
}
