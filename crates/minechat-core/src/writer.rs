use crate::audit::{AuditEntry, AuditSink};
use crate::auth::{authenticate, Credential, Identity};
use crate::error::SessionError;
use crate::frame::{decode_lossy, encode_message, sanitize_payload};
use crate::pulse::{PulseKind, PulseSender};
use crate::scope::CancelToken;
use crate::status::{ConnectionRole, SessionState, StatusEvent, StatusSink};
use crate::transport::{Connector, Endpoint, LineConnection};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const ROLE: ConnectionRole = ConnectionRole::Write;

pub const INVALID_TOKEN_ALERT: &str = "Unknown token. Check it or register again.";

/// The send queue plus the message currently in flight. A message stays in
/// the slot until its frame has been flushed, so a generation torn down mid
/// write hands it to the next one.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::Receiver<String>,
    pending: Option<String>,
}

impl Outbox {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx, pending: None }
    }

    /// `None` once every producer is gone and nothing is pending.
    pub async fn next(&mut self) -> Option<String> {
        if let Some(message) = &self.pending {
            return Some(message.clone());
        }
        let message = self.rx.recv().await?;
        self.pending = Some(message.clone());
        Some(message)
    }

    pub fn confirm(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriterTimeouts {
    pub handshake: Duration,
    pub write: Duration,
}

impl Default for WriterTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(5),
            write: Duration::from_secs(2),
        }
    }
}

/// Write side of a generation: greets, authenticates, then drains the outbox.
pub struct WriterSession<'a, C> {
    pub connector: &'a C,
    pub endpoint: &'a Endpoint,
    pub timeouts: WriterTimeouts,
    pub audit: AuditSink,
    pub status: StatusSink,
    pub pulses: PulseSender,
}

impl<'a, C> WriterSession<'a, C>
where
    C: Connector,
{
    /// A registration issued during the handshake is written back into
    /// `credential`, so later generations authenticate with the token.
    pub async fn run(
        self,
        credential: &mut Credential,
        outbox: &mut Outbox,
        mut cancel: CancelToken,
    ) -> Result<(), SessionError> {
        self.status.session(ROLE, SessionState::Connecting).await;
        let opened = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            opened = LineConnection::open(self.connector, self.endpoint, ROLE) => opened,
        };
        let mut conn = opened.map_err(|err| SessionError::from_transport(ROLE, err))?;
        self.status.session(ROLE, SessionState::Established).await;

        let result = tokio::select! {
            _ = cancel.cancelled() => Ok(()),
            result = self.converse(&mut conn, credential, outbox) => result,
        };
        conn.close().await;
        result
    }

    async fn converse<S>(
        &self,
        conn: &mut LineConnection<S>,
        credential: &mut Credential,
        outbox: &mut Outbox,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let identity = match handshake(conn, credential, self.timeouts.handshake).await {
            Ok(identity) => identity,
            Err(SessionError::InvalidToken) => {
                warn!(event = "auth_invalid_token", endpoint = %self.endpoint);
                self.status
                    .emit(StatusEvent::Alert(INVALID_TOKEN_ALERT.to_string()))
                    .await;
                return Err(SessionError::InvalidToken);
            }
            Err(err) => return Err(err),
        };
        self.status.session(ROLE, SessionState::Authenticated).await;
        self.status
            .emit(StatusEvent::Nickname(identity.nickname.clone()))
            .await;
        if let Some(token) = identity.issued_token {
            credential.token = Some(token.clone());
            self.status
                .emit(StatusEvent::Registered {
                    nickname: identity.nickname,
                    token,
                })
                .await;
        }

        loop {
            let Some(message) = outbox.next().await else {
                info!(event = "send_queue_closed");
                return Err(SessionError::Stopped);
            };
            let message = sanitize_payload(&message);
            if message.trim().is_empty() {
                outbox.confirm();
                continue;
            }
            conn.write_frame(&encode_message(&message), self.timeouts.write)
                .await
                .map_err(|err| SessionError::from_transport(ROLE, err))?;
            outbox.confirm();
            debug!(event = "message_sent", bytes = message.len());
            self.pulses.beat(PulseKind::SendSucceeded);
            self.audit.record(AuditEntry::sent(message)).await;
        }
    }
}

/// Greeting line, then the token or registration exchange.
async fn handshake<S>(
    conn: &mut LineConnection<S>,
    credential: &Credential,
    timeout: Duration,
) -> Result<Identity, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = conn
        .read_line(timeout)
        .await
        .map_err(|err| SessionError::from_transport(ROLE, err))?;
    debug!(event = "server_greeting", text = %decode_lossy(&greeting));
    authenticate(conn, credential, timeout)
        .await
        .map_err(|err| err.into_session_error(ROLE))
}

/// Connects, authenticates, writes one message and closes. Returns the
/// identity the server confirmed, including any token issued on the way.
pub async fn send_once<C>(
    connector: &C,
    endpoint: &Endpoint,
    credential: &Credential,
    message: &str,
    timeouts: WriterTimeouts,
) -> Result<Identity, SessionError>
where
    C: Connector,
{
    let message = sanitize_payload(message);
    if message.trim().is_empty() {
        return Err(SessionError::Protocol("refusing to send an empty message".to_string()));
    }
    let mut conn = LineConnection::open(connector, endpoint, ROLE)
        .await
        .map_err(|err| SessionError::from_transport(ROLE, err))?;
    let result = async {
        let identity = handshake(&mut conn, credential, timeouts.handshake).await?;
        conn.write_frame(&encode_message(&message), timeouts.write)
            .await
            .map_err(|err| SessionError::from_transport(ROLE, err))?;
        Ok::<_, SessionError>(identity)
    }
    .await;
    conn.close().await;
    if let Ok(identity) = &result {
        info!(event = "message_sent_once", nickname = %identity.nickname, endpoint = %endpoint);
    }
    result
}
