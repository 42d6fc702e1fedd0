//! SASL DIGEST-MD5 (RFC 2831) client implementation.
//!
//! Challenge/response with cnonce and realm; the server's `rspauth` proof
//! is verified before the exchange is considered complete. Only
//! `qop=auth` is negotiated; integrity and confidentiality wrapping are
//! not offered by this client.

use std::collections::HashMap;

use rand::RngCore;

use crate::error::AuthError;

use super::SaslMechanism;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestState {
    Initial,
    Responded,
    Complete,
}

/// DIGEST-MD5 mechanism bound to a `service/host` digest URI.
pub struct DigestMd5Mechanism {
    username: String,
    password: String,
    service: String,
    host: String,
    state: DigestState,
    cnonce: Option<String>,
    nonce: Option<String>,
    realm: Option<String>,
}

impl DigestMd5Mechanism {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        service: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            service: service.into(),
            host: host.into(),
            state: DigestState::Initial,
            cnonce: None,
            nonce: None,
            realm: None,
        }
    }

    fn digest_uri(&self) -> String {
        format!("{}/{}", self.service, self.host)
    }

    fn cnonce(&mut self) -> String {
        if let Some(cnonce) = &self.cnonce {
            return cnonce.clone();
        }
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let cnonce = hex::encode(bytes);
        self.cnonce = Some(cnonce.clone());
        cnonce
    }

    /// `HEX(H(A1))` per RFC 2831 section 2.1.2.1.
    fn ha1(&self, realm: &str, nonce: &str, cnonce: &str) -> String {
        let inner = md5::compute(format!("{}:{}:{}", self.username, realm, self.password));
        let mut a1 = Vec::with_capacity(16 + nonce.len() + cnonce.len() + 2);
        a1.extend_from_slice(&inner.0);
        a1.push(b':');
        a1.extend_from_slice(nonce.as_bytes());
        a1.push(b':');
        a1.extend_from_slice(cnonce.as_bytes());
        hex::encode(md5::compute(a1).0)
    }

    /// The `response` (a2_prefix = "AUTHENTICATE") or `rspauth`
    /// (a2_prefix = "") digest value.
    fn compute_digest(&self, realm: &str, nonce: &str, cnonce: &str, a2_prefix: &str) -> String {
        let ha1 = self.ha1(realm, nonce, cnonce);
        let ha2 = hex::encode(md5::compute(format!("{}:{}", a2_prefix, self.digest_uri())).0);
        let kd = format!("{ha1}:{nonce}:00000001:{cnonce}:auth:{ha2}");
        hex::encode(md5::compute(kd).0)
    }

    fn respond_to_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
        let text = std::str::from_utf8(challenge)
            .map_err(|_| AuthError::BadChallenge("challenge is not UTF-8".to_string()))?;
        let fields = parse_challenge(text);

        let nonce = fields
            .get("nonce")
            .cloned()
            .ok_or_else(|| AuthError::BadChallenge("challenge carries no nonce".to_string()))?;
        let realm = fields.get("realm").cloned().unwrap_or_default();

        if let Some(qop) = fields.get("qop") {
            if !qop.split(',').any(|q| q.trim() == "auth") {
                return Err(AuthError::UnsupportedQop(qop.clone()));
            }
        }

        let cnonce = self.cnonce();
        let response = self.compute_digest(&realm, &nonce, &cnonce, "AUTHENTICATE");

        self.nonce = Some(nonce.clone());
        self.realm = Some(realm.clone());
        self.state = DigestState::Responded;

        let reply = format!(
            "charset=utf-8,username=\"{}\",realm=\"{}\",nonce=\"{}\",nc=00000001,cnonce=\"{}\",digest-uri=\"{}\",response={},qop=auth",
            self.username,
            realm,
            nonce,
            cnonce,
            self.digest_uri(),
            response,
        );
        Ok(reply.into_bytes())
    }

    fn verify_rspauth(&mut self, challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
        let text = std::str::from_utf8(challenge)
            .map_err(|_| AuthError::BadChallenge("rspauth is not UTF-8".to_string()))?;
        let fields = parse_challenge(text);
        let rspauth = fields
            .get("rspauth")
            .ok_or_else(|| AuthError::BadChallenge("expected rspauth from server".to_string()))?;

        let nonce = self.nonce.clone().unwrap_or_default();
        let realm = self.realm.clone().unwrap_or_default();
        let cnonce = self.cnonce.clone().unwrap_or_default();
        let expected = self.compute_digest(&realm, &nonce, &cnonce, "");
        if *rspauth != expected {
            return Err(AuthError::ServerProofMismatch);
        }
        self.state = DigestState::Complete;
        Ok(Vec::new())
    }
}

impl SaslMechanism for DigestMd5Mechanism {
    fn name(&self) -> &'static str {
        "DIGEST-MD5"
    }

    fn start(&mut self) -> Result<Vec<u8>, AuthError> {
        // The client sends no initial response; the server opens with a
        // challenge.
        Ok(Vec::new())
    }

    fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
        match self.state {
            DigestState::Initial => self.respond_to_challenge(challenge),
            DigestState::Responded => self.verify_rspauth(challenge),
            DigestState::Complete => Ok(Vec::new()),
        }
    }

    fn is_complete(&self) -> bool {
        self.state == DigestState::Complete
    }

    fn dispose(&mut self) {
        self.password.clear();
    }
}

/// Parse a comma-separated `key=value` challenge where values may be
/// quoted (and contain commas inside the quotes).
fn parse_challenge(text: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut rest = text;
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];

        let value;
        if let Some(stripped) = rest.strip_prefix('"') {
            match stripped.find('"') {
                Some(end) => {
                    value = stripped[..end].to_string();
                    rest = &stripped[end + 1..];
                }
                None => {
                    value = stripped.to_string();
                    rest = "";
                }
            }
        } else {
            match rest.find(',') {
                Some(end) => {
                    value = rest[..end].to_string();
                    rest = &rest[end..];
                }
                None => {
                    value = rest.to_string();
                    rest = "";
                }
            }
        }
        if !key.is_empty() {
            fields.insert(key, value);
        }
        rest = rest.trim_start_matches(',');
    }
    fields
}
