//! SASL mechanisms for the framed transport.
//!
//! A mechanism produces the handshake tokens and, once the exchange is
//! complete, wraps and unwraps application frames according to the
//! negotiated quality of protection.

pub mod digest;
#[cfg(feature = "kerberos")]
pub mod gssapi;
pub mod plain;

use crate::error::AuthError;

pub use digest::DigestMd5Mechanism;
#[cfg(feature = "kerberos")]
pub use gssapi::GssapiMechanism;
pub use plain::PlainMechanism;

/// Quality of protection negotiated during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    /// Authentication only; frames pass through unmodified.
    Auth,
    /// Per-frame integrity.
    AuthInt,
    /// Per-frame confidentiality.
    AuthConf,
}

/// A SASL mechanism driving one authentication exchange.
pub trait SaslMechanism: Send {
    /// IANA mechanism name sent in the START message.
    fn name(&self) -> &'static str;

    /// Produce the initial response token.
    fn start(&mut self) -> Result<Vec<u8>, AuthError>;

    /// Answer a server challenge.
    fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>, AuthError>;

    /// Whether the exchange has established a security context.
    fn is_complete(&self) -> bool;

    /// Negotiated protection level; meaningful once complete.
    fn qop(&self) -> Qop {
        Qop::Auth
    }

    /// Wrap one outgoing frame. Identity under `Qop::Auth`.
    fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, AuthError> {
        Ok(data.to_vec())
    }

    /// Unwrap one incoming frame. Identity under `Qop::Auth`.
    fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, AuthError> {
        Ok(data.to_vec())
    }

    /// Release mechanism resources. Idempotent.
    fn dispose(&mut self) {}
}
