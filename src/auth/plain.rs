//! SASL PLAIN: a single message carrying the credentials.

use crate::error::AuthError;

use super::SaslMechanism;

/// The PLAIN mechanism. One-shot: the initial response is
/// `\0<username>\0<password>` and no per-frame wrapping applies.
pub struct PlainMechanism {
    username: String,
    password: String,
    started: bool,
}

impl PlainMechanism {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            started: false,
        }
    }
}

impl SaslMechanism for PlainMechanism {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn start(&mut self) -> Result<Vec<u8>, AuthError> {
        self.started = true;
        let mut token = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        token.push(0);
        token.extend_from_slice(self.username.as_bytes());
        token.push(0);
        token.extend_from_slice(self.password.as_bytes());
        Ok(token)
    }

    fn step(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
        // PLAIN has no challenges; answer anything with an empty token.
        Ok(Vec::new())
    }

    fn is_complete(&self) -> bool {
        self.started
    }

    fn dispose(&mut self) {
        self.password.clear();
    }
}
