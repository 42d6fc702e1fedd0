//! # hive2-rs
//!
//! Async client for HiveServer2-compatible SQL engines (Hive, Impala,
//! Spark Thrift Server). Statements run asynchronously on the server: the
//! client submits, polls for completion while optionally streaming
//! server-side logs, then pages through columnar result batches and
//! materializes typed rows.
//!
//! The wire is Thrift binary over TCP — optionally SASL-framed (PLAIN,
//! GSSAPI/Kerberos behind the `kerberos` feature, DIGEST-MD5) and
//! optionally TLS — or carried in HTTP POST bodies with cookie affinity
//! and `Negotiate` authentication.
//!
//! ## Example
//!
//! ```no_run
//! use hive2_rs::{connect, AuthScheme, ConnectConfiguration};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), hive2_rs::HiveError> {
//! let mut config = ConnectConfiguration::new();
//! config.username = "hive".to_string();
//!
//! let session = connect("hs2.example.com", 10000, AuthScheme::None, config).await?;
//! let mut cursor = session.cursor();
//! let ctx = CancellationToken::new();
//!
//! cursor.exec(&ctx, "SELECT id, name FROM people").await?;
//! while cursor.has_more(&ctx).await? {
//!     let mut id = 0i32;
//!     let mut name = String::new();
//!     cursor
//!         .fetch_one(&ctx, &mut [(&mut id).into(), (&mut name).into()])
//!         .await?;
//!     println!("{id} {name}");
//! }
//! cursor.close().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod connection;
pub mod error;
pub mod query;
pub mod rpc;
pub mod transport;
pub mod types;

pub use connection::{
    connect_any, parse_server_entries, AuthScheme, ConnectConfiguration, DialFn, Session,
    TlsOptions, TransportMode,
};
pub use error::{
    AuthError, ConnectionError, FetchError, HiveError, OperationError, TransportError,
};
pub use query::{Cursor, CursorState, Description, Dest, Value};
pub use types::{HiveType, ValueFamily};

/// Connect to a server and open a session.
///
/// Shorthand for [`Session::connect`].
pub async fn connect(
    host: &str,
    port: u16,
    auth: AuthScheme,
    config: ConnectConfiguration,
) -> Result<Session, HiveError> {
    Session::connect(host, port, auth, config).await
}
