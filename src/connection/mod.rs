//! Session establishment and lifecycle.

pub mod discovery;
pub mod params;
pub mod session;

pub use discovery::{connect_any, parse_server_entries};
pub use params::{AuthScheme, ConnectConfiguration, DialFn, TlsOptions, TransportMode};
pub use session::Session;
