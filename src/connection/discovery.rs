//! Discovery support: turning registry entries into connect attempts.
//!
//! A coordination service (kept external to this crate) lists child nodes
//! of the form `key=value;key=value;…` where one pair is
//! `serverUri=host:port`. This module parses those entries and connects
//! to the discovered servers in random order until one accepts.

use rand::seq::SliceRandom;

use crate::error::{ConnectionError, HiveError};

use super::params::{AuthScheme, ConnectConfiguration};
use super::session::Session;

/// Parse registry child-node names into `(host, port)` pairs. Entries
/// that are malformed or lack a usable `serverUri` are skipped.
pub fn parse_server_entries(entries: &[String]) -> Vec<(String, u16)> {
    let mut servers = Vec::new();
    'entries: for entry in entries {
        let mut server = None;
        for param in entry.split(';') {
            let Some((key, value)) = param.split_once('=') else {
                // A parameter without '=' invalidates the whole entry.
                continue 'entries;
            };
            if key == "serverUri" {
                let Some((host, port)) = value.split_once(':') else {
                    continue 'entries;
                };
                let Ok(port) = port.parse::<u16>() else {
                    continue 'entries;
                };
                if host.is_empty() {
                    continue 'entries;
                }
                server = Some((host.to_string(), port));
            }
        }
        if let Some(server) = server {
            servers.push(server);
        }
    }
    servers
}

/// Try the given servers in random order until a connection succeeds.
pub async fn connect_any(
    mut servers: Vec<(String, u16)>,
    auth: AuthScheme,
    config: ConnectConfiguration,
) -> Result<Session, HiveError> {
    if servers.is_empty() {
        return Err(ConnectionError::NoServersRegistered {
            namespace: config.registry_namespace.clone(),
        }
        .into());
    }
    servers.shuffle(&mut rand::thread_rng());

    let attempted = servers.len();
    let mut last_error = String::new();
    for (host, port) in servers {
        match Session::connect(&host, port, auth, config.clone()).await {
            Ok(session) => return Ok(session),
            Err(err) => {
                tracing::debug!(host = %host, port, error = %err, "discovered server unavailable");
                last_error = err.to_string();
            }
        }
    }
    Err(ConnectionError::AllServersUnavailable {
        attempted,
        last_error,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entries(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_valid_entries() {
        let servers = parse_server_entries(&entries(&[
            "serverUri=hs2-a.example.com:10000;version=3.1.2;sequence=0000000041",
            "version=3.1.2;serverUri=hs2-b.example.com:10001;sequence=0000000042",
        ]));
        assert_eq!(
            servers,
            vec![
                ("hs2-a.example.com".to_string(), 10000),
                ("hs2-b.example.com".to_string(), 10001),
            ]
        );
    }

    #[test]
    fn test_parse_skips_malformed_entries() {
        let servers = parse_server_entries(&entries(&[
            "serverUri=hs2-a.example.com:10000;version=3.1.2",
            "garbage-without-equals",
            "serverUri=no-port-here;version=1",
            "serverUri=bad:notaport;version=1",
            "serverUri=:10000;version=1",
            "version=only-metadata",
        ]));
        assert_eq!(servers, vec![("hs2-a.example.com".to_string(), 10000)]);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_server_entries(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_connect_any_empty_list() {
        let err = connect_any(Vec::new(), AuthScheme::None, ConnectConfiguration::new())
            .await
            .err().unwrap();
        assert!(err.to_string().contains("no server is registered"));
        assert!(err.to_string().contains("hiveserver2"));
    }

    #[tokio::test]
    async fn test_connect_any_all_unavailable() {
        // Every dial attempt fails immediately through the hook; no real
        // network is touched.
        let mut config = ConnectConfiguration::new();
        config.username = "hive".to_string();
        config.dial = Some(Arc::new(|_, _| {
            Box::pin(async {
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))
            })
        }));
        let servers = vec![
            ("hs2-a.invalid".to_string(), 10000),
            ("hs2-b.invalid".to_string(), 10000),
        ];
        let err = connect_any(servers, AuthScheme::NoSasl, config)
            .await
            .err().unwrap();
        match err {
            HiveError::Connection(ConnectionError::AllServersUnavailable {
                attempted,
                last_error,
            }) => {
                assert_eq!(attempted, 2);
                assert!(last_error.contains("refused"));
            }
            other => panic!("expected AllServersUnavailable, got {other:?}"),
        }
    }
}
