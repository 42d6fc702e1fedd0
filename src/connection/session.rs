//! Session lifecycle: connect, hand out cursors, close.
//!
//! A session owns one transport and the RPC client bound to it. The
//! transport is not multiplexed, so the client lives behind a mutex and
//! at most one RPC is in flight per session.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::auth::{DigestMd5Mechanism, PlainMechanism};
use crate::error::{ConnectionError, HiveError, OperationError, TransportError};
use crate::query::Cursor;
use crate::rpc::messages::{CloseSessionReq, OpenSessionReq, SessionHandle, PROTOCOL_V6};
use crate::rpc::RpcClient;
use crate::transport::http::HttpAuth;
use crate::transport::{HttpTransport, SaslTransport, SocketTransport, Transport};

use super::params::{AuthScheme, ConnectConfiguration, TransportMode};

/// An open session against a HiveServer2-compatible engine.
pub struct Session {
    client: Arc<Mutex<RpcClient>>,
    handle: SessionHandle,
    config: Arc<ConnectConfiguration>,
    host: String,
    port: u16,
    auth: AuthScheme,
}

impl Session {
    /// Connect to the server and open a session.
    ///
    /// Resolves credential defaults, builds the transport for the
    /// configured `(transport_mode, auth)` pair, runs the SASL handshake
    /// where applicable, issues `OpenSession`, and switches to the
    /// configured database if one was set.
    pub async fn connect(
        host: &str,
        port: u16,
        auth: AuthScheme,
        config: ConnectConfiguration,
    ) -> Result<Self, HiveError> {
        let config = resolve_defaults(config)?;
        let transport = build_transport(host, port, auth, &config)?;
        Self::open_with_transport(transport, host, port, auth, config).await
    }

    /// The connect tail shared with tests: open the transport, open the
    /// session, run the `USE <database>` bootstrap.
    pub(crate) async fn open_with_transport(
        transport: Box<dyn Transport>,
        host: &str,
        port: u16,
        auth: AuthScheme,
        config: ConnectConfiguration,
    ) -> Result<Self, HiveError> {
        let mut client = RpcClient::new(transport, config.socket_timeout);
        client.open().await?;

        let response = client
            .open_session(&OpenSessionReq {
                client_protocol: PROTOCOL_V6,
                username: Some(config.username.clone()),
                password: Some(config.password.clone()),
                configuration: config.hive_configuration.clone(),
            })
            .await?;
        if !response.status.is_success() {
            return Err(OperationError::Failed(format!(
                "error opening the session: {}",
                response.status.describe()
            ))
            .into());
        }
        let handle = response.session_handle.ok_or_else(|| {
            TransportError::Protocol("OpenSession reply carried no session handle".to_string())
        })?;

        let session = Session {
            client: Arc::new(Mutex::new(client)),
            handle,
            config: Arc::new(config),
            host: host.to_string(),
            port,
            auth,
        };

        if !session.config.database.is_empty() {
            let ctx = CancellationToken::new();
            let mut cursor = session.cursor();
            let result = cursor
                .exec(&ctx, &format!("USE {}", session.config.database))
                .await;
            let _ = cursor.close().await;
            result?;
        }

        Ok(session)
    }

    /// Create a cursor on this session. Cursors are reusable across many
    /// statements; only one should execute at a time.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(
            Arc::clone(&self.client),
            self.handle.clone(),
            Arc::clone(&self.config),
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn auth(&self) -> AuthScheme {
        self.auth
    }

    /// Close the session, then the transport. An unclosed transport leaks
    /// the socket, so its error takes precedence when both fail.
    pub async fn close(self) -> Result<(), HiveError> {
        let mut client = self.client.lock().await;
        let session_result = client
            .close_session(&CloseSessionReq {
                session_handle: self.handle.clone(),
            })
            .await;
        let transport_result = client.close().await;

        transport_result?;
        let response = session_result?;
        if !response.status.is_success() {
            return Err(OperationError::Failed(format!(
                "error closing the session: {}",
                response.status.describe()
            ))
            .into());
        }
        Ok(())
    }
}

/// Fill in the username/password defaults the SASL layer needs.
fn resolve_defaults(
    mut config: ConnectConfiguration,
) -> Result<ConnectConfiguration, HiveError> {
    if config.username.is_empty() {
        let username = whoami::username().replace(' ', "");
        if username.is_empty() {
            return Err(ConnectionError::UsernameLookup.into());
        }
        config.username = username;
    }
    // The password may not matter, but it cannot be empty.
    if config.password.is_empty() {
        config.password = "x".to_string();
    }
    Ok(config)
}

/// The (transport mode, auth) construction matrix.
fn build_transport(
    host: &str,
    port: u16,
    auth: AuthScheme,
    config: &ConnectConfiguration,
) -> Result<Box<dyn Transport>, HiveError> {
    match (config.transport_mode, auth) {
        (TransportMode::Binary, _) => build_binary_transport(host, port, auth, config),
        (TransportMode::Http, AuthScheme::None) => Ok(Box::new(HttpTransport::new(
            host,
            port,
            &config.http_path,
            HttpAuth::Plain {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            config.tls.clone(),
            config.http_timeout,
            config.disable_keep_alives,
        ))),
        (TransportMode::Http, AuthScheme::Kerberos) => {
            #[cfg(not(feature = "kerberos"))]
            {
                Err(ConnectionError::KerberosDisabled.into())
            }
            #[cfg(feature = "kerberos")]
            {
                Ok(Box::new(HttpTransport::new(
                    host,
                    port,
                    &config.http_path,
                    HttpAuth::Negotiate {
                        service: config.service.clone(),
                    },
                    config.tls.clone(),
                    config.http_timeout,
                    config.disable_keep_alives,
                )))
            }
        }
        (mode, auth) => Err(ConnectionError::UnsupportedCombination {
            transport_mode: mode.to_string(),
            auth: auth.to_string(),
        }
        .into()),
    }
}

fn build_binary_transport(
    host: &str,
    port: u16,
    auth: AuthScheme,
    config: &ConnectConfiguration,
) -> Result<Box<dyn Transport>, HiveError> {
    let socket = SocketTransport::new(
        host,
        port,
        config.connect_timeout,
        config.tls.clone(),
        config.dial.clone(),
    );
    match auth {
        AuthScheme::NoSasl => Ok(Box::new(socket)),
        AuthScheme::None | AuthScheme::Ldap | AuthScheme::Custom => {
            Ok(Box::new(SaslTransport::new(
                Box::new(socket),
                Box::new(PlainMechanism::new(&config.username, &config.password)),
                config.max_frame_size,
            )))
        }
        AuthScheme::DigestMd5 => Ok(Box::new(SaslTransport::new(
            Box::new(socket),
            Box::new(DigestMd5Mechanism::new(
                &config.username,
                &config.password,
                &config.service,
                host,
            )),
            config.max_frame_size,
        ))),
        AuthScheme::Kerberos => {
            #[cfg(not(feature = "kerberos"))]
            {
                Err(ConnectionError::KerberosDisabled.into())
            }
            #[cfg(feature = "kerberos")]
            {
                let mechanism = crate::auth::GssapiMechanism::new(&config.service, host)
                    .map_err(TransportError::Sasl)?;
                Ok(Box::new(SaslTransport::new(
                    Box::new(socket),
                    Box::new(mechanism),
                    config.max_frame_size,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testkit;
    use crate::transport::testkit::ScriptedTransport;

    fn config() -> ConnectConfiguration {
        let mut config = ConnectConfiguration::new();
        config.username = "hive".to_string();
        config.password = "x".to_string();
        config
    }

    #[tokio::test]
    async fn test_connect_opens_session() {
        let transport = ScriptedTransport::new(vec![testkit::open_session_reply(1)]);
        let session = Session::open_with_transport(
            Box::new(transport),
            "localhost",
            10000,
            AuthScheme::None,
            config(),
        )
        .await
        .unwrap();
        assert_eq!(session.host(), "localhost");
        assert_eq!(session.port(), 10000);
        assert_eq!(session.auth(), AuthScheme::None);
        assert_eq!(session.handle, testkit::sample_session_handle());
    }

    #[tokio::test]
    async fn test_connect_rejected_open_session() {
        let transport = ScriptedTransport::new(vec![testkit::reply("OpenSession", 1, |w| {
            testkit::write_status_error(w, 8, "Too many open sessions");
            w.field_stop();
        })]);
        let err = Session::open_with_transport(
            Box::new(transport),
            "localhost",
            10000,
            AuthScheme::None,
            config(),
        )
        .await
        .err().unwrap();
        assert!(err.to_string().contains("error opening the session"));
    }

    #[tokio::test]
    async fn test_connect_with_database_issues_use() {
        let transport = ScriptedTransport::new(vec![
            testkit::open_session_reply(1),
            // USE statement: submit, one status poll, close the operation.
            testkit::execute_reply(2, false),
            testkit::operation_status_reply(3, 2),
            testkit::status_only_reply("CloseOperation", 4),
        ]);
        let log = transport.request_log();
        let mut cfg = config();
        cfg.database = "analytics".to_string();
        let session = Session::open_with_transport(
            Box::new(transport),
            "localhost",
            10000,
            AuthScheme::None,
            cfg,
        )
        .await
        .unwrap();

        let requests = log.lock().unwrap();
        // OpenSession + ExecuteStatement + GetOperationStatus + CloseOperation.
        assert_eq!(requests.len(), 4);
        let use_request = String::from_utf8_lossy(&requests[1]).into_owned();
        assert!(use_request.contains("USE analytics"));
        drop(requests);
        drop(session);
    }

    #[tokio::test]
    async fn test_close_session_flow() {
        let transport = ScriptedTransport::new(vec![
            testkit::open_session_reply(1),
            testkit::status_only_reply("CloseSession", 2),
        ]);
        let session = Session::open_with_transport(
            Box::new(transport),
            "localhost",
            10000,
            AuthScheme::None,
            config(),
        )
        .await
        .unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_surfaces_status_failure() {
        let transport = ScriptedTransport::new(vec![
            testkit::open_session_reply(1),
            testkit::reply("CloseSession", 2, |w| {
                testkit::write_status_error(w, 1, "session not found");
                w.field_stop();
            }),
        ]);
        let session = Session::open_with_transport(
            Box::new(transport),
            "localhost",
            10000,
            AuthScheme::None,
            config(),
        )
        .await
        .unwrap();
        let err = session.close().await.err().unwrap();
        assert!(err.to_string().contains("error closing the session"));
    }

    #[test]
    fn test_unsupported_combination() {
        let mut cfg = config();
        cfg.transport_mode = TransportMode::Http;
        let err = build_transport("localhost", 10001, AuthScheme::Ldap, &cfg)
            .err()
            .unwrap();
        assert!(err.to_string().contains("unsupported"));
        assert!(err.to_string().contains("LDAP"));
    }

    #[test]
    fn test_binary_matrix_builds() {
        let cfg = config();
        for auth in [
            AuthScheme::NoSasl,
            AuthScheme::None,
            AuthScheme::Ldap,
            AuthScheme::Custom,
            AuthScheme::DigestMd5,
        ] {
            assert!(build_transport("localhost", 10000, auth, &cfg).is_ok());
        }
    }

    #[test]
    fn test_resolve_defaults_fills_username_and_password() {
        let resolved = resolve_defaults(ConnectConfiguration::new()).unwrap();
        assert!(!resolved.username.is_empty());
        assert!(!resolved.username.contains(' '));
        assert_eq!(resolved.password, "x");
    }
}
