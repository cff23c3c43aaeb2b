//! # Connection Layer
//!
//! Connection configuration (auth modes, secret handling), the transport
//! trait seam the executors run against, the production `async-nats`
//! transport, and a stub transport for tests.

pub mod stub;
pub mod transport;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ExecutionError, ExecutionResult};

pub use stub::{StubEvent, StubTransport};
pub use transport::{MessageStream, NatsTransport, Transport, TransportFailure};

/// Authentication mode against the NATS cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    #[default]
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "NKEY")]
    Nkey,
    #[serde(rename = "USERPASS")]
    UserPass,
    #[serde(rename = "JWT")]
    Jwt,
}

/// Connection settings consumed from the configuration surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server URL, bare or `tls://`-prefixed
    #[serde(rename = "natsUrl")]
    pub url: String,

    /// Authentication mode
    #[serde(default)]
    pub authentication: AuthMode,

    /// Public NKEY (the seed lives in [`ConnectionSecrets`])
    #[serde(default)]
    pub nkey: String,

    /// Username for `USERPASS` authentication
    #[serde(default)]
    pub username: String,
}

/// Secret connection material.
///
/// Write-only to the editing surface; never echoed back once stored. The
/// `Debug` impl redacts every field.
#[derive(Clone, Default, Deserialize)]
pub struct ConnectionSecrets {
    /// Private NKEY seed used to sign the server nonce
    #[serde(rename = "nkeySeed", default)]
    pub nkey_seed: String,

    /// Password for `USERPASS` authentication
    #[serde(default)]
    pub password: String,

    /// Credentials blob (JWT + seed) for `JWT` authentication
    #[serde(default)]
    pub jwt: String,
}

impl fmt::Debug for ConnectionSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSecrets")
            .field("nkey_seed", &redact(&self.nkey_seed))
            .field("password", &redact(&self.password))
            .field("jwt", &redact(&self.jwt))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

/// Connects to the cluster with the configured authentication mode.
///
/// Connection and auth failures surface as `TransportError`.
pub async fn connect(
    config: &ConnectionConfig,
    secrets: &ConnectionSecrets,
) -> ExecutionResult<NatsTransport> {
    let options = match config.authentication {
        AuthMode::None => async_nats::ConnectOptions::new(),
        AuthMode::Nkey => async_nats::ConnectOptions::with_nkey(secrets.nkey_seed.clone()),
        AuthMode::UserPass => async_nats::ConnectOptions::with_user_and_password(
            config.username.clone(),
            secrets.password.clone(),
        ),
        AuthMode::Jwt => async_nats::ConnectOptions::with_credentials(&secrets.jwt)
            .map_err(|err| {
                ExecutionError::TransportError(format!("invalid credentials: {err}"))
            })?,
    };

    // Per-request timeouts are enforced by the executors.
    let client = options
        .request_timeout(None)
        .connect(config.url.as_str())
        .await
        .map_err(|err| ExecutionError::TransportError(err.to_string()))?;

    // Round-trip once so auth rejections surface here, not on first use.
    let transport = NatsTransport::new(client);
    transport
        .check()
        .await
        .map_err(|failure| ExecutionError::TransportError(failure.to_string()))?;
    Ok(transport)
}
