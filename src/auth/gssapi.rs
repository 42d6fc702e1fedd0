//! SASL GSSAPI (Kerberos) via the platform GSS library.
//!
//! Requires the `kerberos` cargo feature. The mechanism runs the context
//! establishment loop, then the RFC 4752 security-layer negotiation, and
//! wraps frames when integrity or confidentiality was selected.

use libgssapi::context::{ClientCtx, CtxFlags, SecurityContext};
use libgssapi::name::Name;
use libgssapi::oid::{GSS_MECH_KRB5, GSS_NT_HOSTBASED_SERVICE};

use crate::error::AuthError;

use super::{Qop, SaslMechanism};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GssapiState {
    Negotiating,
    SecurityLayer,
    Done,
}

/// GSSAPI mechanism targeting the `service@host` principal.
pub struct GssapiMechanism {
    ctx: ClientCtx,
    state: GssapiState,
    qop: Qop,
}

fn gss_err(err: libgssapi::error::Error) -> AuthError {
    AuthError::Mechanism(err.to_string())
}

fn client_ctx(service: &str, host: &str) -> Result<ClientCtx, AuthError> {
    let principal = format!("{service}@{host}");
    let name =
        Name::new(principal.as_bytes(), Some(&GSS_NT_HOSTBASED_SERVICE)).map_err(gss_err)?;
    let name = name.canonicalize(Some(&GSS_MECH_KRB5)).map_err(gss_err)?;
    Ok(ClientCtx::new(
        None,
        name,
        CtxFlags::GSS_C_MUTUAL_FLAG
            | CtxFlags::GSS_C_SEQUENCE_FLAG
            | CtxFlags::GSS_C_INTEG_FLAG
            | CtxFlags::GSS_C_CONF_FLAG,
        Some(&GSS_MECH_KRB5),
    ))
}

/// One-shot initial context token, as carried in an HTTP
/// `Authorization: Negotiate` header.
pub fn initial_token(service: &str, host: &str) -> Result<Vec<u8>, AuthError> {
    let mut ctx = client_ctx(service, host)?;
    let token = ctx.step(None, None).map_err(gss_err)?;
    match token {
        Some(token) if !token.is_empty() => Ok(token.to_vec()),
        _ => Err(AuthError::Mechanism(
            "GSSAPI init returned an empty token; is the service name configured?".to_string(),
        )),
    }
}

impl GssapiMechanism {
    pub fn new(service: &str, host: &str) -> Result<Self, AuthError> {
        Ok(Self {
            ctx: client_ctx(service, host)?,
            state: GssapiState::Negotiating,
            qop: Qop::Auth,
        })
    }

    fn negotiate(&mut self, challenge: Option<&[u8]>) -> Result<Vec<u8>, AuthError> {
        let token = self.ctx.step(challenge, None).map_err(gss_err)?;
        if self.ctx.is_complete() {
            self.state = GssapiState::SecurityLayer;
        }
        Ok(token.map(|t| t.to_vec()).unwrap_or_default())
    }

    /// RFC 4752: the server's wrapped token offers a security-layer
    /// bitmask (1 = none, 2 = integrity, 4 = confidentiality) and a
    /// maximum buffer size; the client answers with its choice.
    fn choose_security_layer(&mut self, challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
        let unwrapped = self.ctx.unwrap(challenge).map_err(gss_err)?;
        if unwrapped.len() < 4 {
            return Err(AuthError::BadChallenge(
                "security-layer token is shorter than 4 bytes".to_string(),
            ));
        }
        let offered = unwrapped[0];
        let (layer, qop) = if offered & 0x04 != 0 {
            (0x04, Qop::AuthConf)
        } else if offered & 0x02 != 0 {
            (0x02, Qop::AuthInt)
        } else if offered & 0x01 != 0 {
            (0x01, Qop::Auth)
        } else {
            return Err(AuthError::UnsupportedQop(format!(
                "server offered security-layer mask {offered:#04x}"
            )));
        };
        self.qop = qop;

        let reply = [layer, unwrapped[1], unwrapped[2], unwrapped[3]];
        let wrapped = self.ctx.wrap(false, &reply).map_err(gss_err)?;
        self.state = GssapiState::Done;
        Ok(wrapped.to_vec())
    }
}

impl SaslMechanism for GssapiMechanism {
    fn name(&self) -> &'static str {
        "GSSAPI"
    }

    fn start(&mut self) -> Result<Vec<u8>, AuthError> {
        self.negotiate(None)
    }

    fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
        match self.state {
            GssapiState::Negotiating => self.negotiate(Some(challenge)),
            GssapiState::SecurityLayer => self.choose_security_layer(challenge),
            GssapiState::Done => Ok(Vec::new()),
        }
    }

    fn is_complete(&self) -> bool {
        self.state == GssapiState::Done
    }

    fn qop(&self) -> Qop {
        self.qop
    }

    fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, AuthError> {
        match self.qop {
            Qop::Auth => Ok(data.to_vec()),
            Qop::AuthInt => Ok(self.ctx.wrap(false, data).map_err(gss_err)?.to_vec()),
            Qop::AuthConf => Ok(self.ctx.wrap(true, data).map_err(gss_err)?.to_vec()),
        }
    }

    fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, AuthError> {
        match self.qop {
            Qop::Auth => Ok(data.to_vec()),
            Qop::AuthInt | Qop::AuthConf => {
                Ok(self.ctx.unwrap(data).map_err(gss_err)?.to_vec())
            }
        }
    }
}
