//! Common utilities for hive2-rs integration tests.
//!
//! These tests require a running HiveServer2 instance. The quickest way
//! to get one is the Apache Hive Docker image:
//!
//! ```bash
//! docker run -d --name hive-test \
//!   -p 10000:10000 -p 10002:10002 \
//!   -e SERVICE_NAME=hiveserver2 \
//!   apache/hive:3.1.3
//! ```
//!
//! Wait for `docker logs hive-test` to report the Thrift port, then run:
//!
//! ```bash
//! cargo test --test integration_tests -- --ignored
//! ```
//!
//! Configuration comes from environment variables with defaults:
//!
//! | Variable        | Default     |
//! |-----------------|-------------|
//! | `HIVE_HOST`     | localhost   |
//! | `HIVE_PORT`     | 10000       |
//! | `HIVE_USER`     | hive        |
//! | `HIVE_PASSWORD` | hive        |
//! | `HIVE_AUTH`     | NONE        |

use std::env;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use hive2_rs::{AuthScheme, ConnectConfiguration, HiveError, Session};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_USER: &str = "hive";
pub const DEFAULT_PASSWORD: &str = "hive";

pub fn get_host() -> String {
    env::var("HIVE_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string())
}

pub fn get_port() -> u16 {
    env::var("HIVE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

pub fn get_user() -> String {
    env::var("HIVE_USER").unwrap_or_else(|_| DEFAULT_USER.to_string())
}

pub fn get_password() -> String {
    env::var("HIVE_PASSWORD").unwrap_or_else(|_| DEFAULT_PASSWORD.to_string())
}

pub fn get_auth() -> AuthScheme {
    match env::var("HIVE_AUTH").as_deref() {
        Ok("NOSASL") => AuthScheme::NoSasl,
        Ok("LDAP") => AuthScheme::Ldap,
        Ok("CUSTOM") => AuthScheme::Custom,
        Ok("KERBEROS") => AuthScheme::Kerberos,
        Ok("DIGEST-MD5") => AuthScheme::DigestMd5,
        _ => AuthScheme::None,
    }
}

/// Whether a server is listening at the configured host and port. Tests
/// call this first so they skip cleanly instead of failing in
/// environments without Hive.
pub fn is_hive_available() -> bool {
    let addr = format!("{}:{}", get_host(), get_port());
    let Ok(mut addrs) = addr.to_socket_addrs() else {
        return false;
    };
    let Some(addr) = addrs.next() else {
        return false;
    };
    TcpStream::connect_timeout(&addr, Duration::from_secs(1)).is_ok()
}

/// A default test configuration with a short poll interval so tests run
/// quickly.
pub fn test_configuration() -> ConnectConfiguration {
    let mut config = ConnectConfiguration::new();
    config.username = get_user();
    config.password = get_password();
    config.poll_interval = Duration::from_millis(100);
    config.connect_timeout = Some(Duration::from_secs(5));
    config
}

/// Open a session against the configured server.
pub async fn get_test_session() -> Result<Session, HiveError> {
    hive2_rs::connect(&get_host(), get_port(), get_auth(), test_configuration()).await
}

/// A unique table name per test run, so parallel runs do not collide.
pub fn unique_table_name(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    format!("{prefix}_{}_{nanos}", std::process::id())
}
