use crate::error::{SessionError, TransportError};
use crate::frame::{decode_lossy, encode_blank_line, encode_message, sanitize_payload};
use crate::status::ConnectionRole;
use crate::transport::LineConnection;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl Credential {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            nickname: None,
        }
    }

    pub fn register(nickname: impl Into<String>) -> Self {
        Self {
            token: None,
            nickname: Some(nickname.into()),
        }
    }

    /// Blank tokens count as absent, so they lead to registration.
    pub fn usable_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub nickname: String,
    /// Present only when the exchange registered a new account.
    pub issued_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountReply {
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    account_hash: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token rejected by server")]
    InvalidToken,
    #[error("malformed handshake response: {0}")]
    Protocol(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AuthError {
    pub fn into_session_error(self, role: ConnectionRole) -> SessionError {
        match self {
            AuthError::InvalidToken => SessionError::InvalidToken,
            AuthError::Protocol(reason) => SessionError::Protocol(reason),
            AuthError::Transport(err) => SessionError::from_transport(role, err),
        }
    }
}

/// Token exchange when the credential carries a token, registration exchange
/// otherwise. Never retries.
pub async fn authenticate<S>(
    conn: &mut LineConnection<S>,
    credential: &Credential,
    timeout: Duration,
) -> Result<Identity, AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match credential.usable_token() {
        Some(token) => authorise(conn, token, timeout).await,
        None => register(conn, credential.nickname.as_deref(), timeout).await,
    }
}

async fn authorise<S>(
    conn: &mut LineConnection<S>,
    token: &str,
    timeout: Duration,
) -> Result<Identity, AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.write_frame(&encode_message(token), timeout).await?;
    let response = conn.read_line(timeout).await?;
    let reply = parse_reply(&response)?;
    match reply.and_then(|reply| reply.nickname) {
        Some(nickname) => {
            info!(event = "auth_token_accepted", nickname = %nickname);
            Ok(Identity {
                nickname,
                issued_token: None,
            })
        }
        None => Err(AuthError::InvalidToken),
    }
}

async fn register<S>(
    conn: &mut LineConnection<S>,
    nickname: Option<&str>,
    timeout: Duration,
) -> Result<Identity, AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let requested = nickname.map(sanitize_payload).unwrap_or_default();
    if requested.trim().is_empty() {
        return Err(AuthError::Protocol(
            "a nickname is required to register without a token".to_string(),
        ));
    }

    conn.write_frame(&encode_blank_line(), timeout).await?;
    conn.write_frame(&encode_message(&requested), timeout).await?;

    let prompt = conn.read_line(timeout).await?;
    debug!(event = "register_prompt", prompt = %decode_lossy(&prompt));
    let issued = conn.read_line(timeout).await?;

    let reply = parse_reply(&issued)?
        .ok_or_else(|| AuthError::Protocol("registration returned null".to_string()))?;
    let (Some(nickname), Some(token)) = (reply.nickname, reply.account_hash) else {
        return Err(AuthError::Protocol(
            "registration reply lacks nickname or account_hash".to_string(),
        ));
    };
    info!(event = "auth_registered", nickname = %nickname);
    Ok(Identity {
        nickname,
        issued_token: Some(token),
    })
}

fn parse_reply(line: &[u8]) -> Result<Option<AccountReply>, AuthError> {
    serde_json::from_slice::<Option<AccountReply>>(line).map_err(|err| {
        AuthError::Protocol(format!("{err}: {}", decode_lossy(line)))
    })
}
