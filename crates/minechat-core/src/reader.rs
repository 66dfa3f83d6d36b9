use crate::audit::{AuditEntry, AuditSink};
use crate::error::{SessionError, TransportError};
use crate::frame::decode_lossy;
use crate::pulse::{PulseKind, PulseSender};
use crate::scope::CancelToken;
use crate::status::{ConnectionRole, SessionState, StatusSink};
use crate::transport::{Connector, Endpoint, LineConnection};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const ROLE: ConnectionRole = ConnectionRole::Read;

/// Read side of a generation: forwards every inbound line to the display and
/// the audit log, and reports liveness to the watchdog.
pub struct ReaderSession<'a, C> {
    pub connector: &'a C,
    pub endpoint: &'a Endpoint,
    pub idle_timeout: Duration,
    pub messages: mpsc::Sender<String>,
    pub audit: AuditSink,
    pub status: StatusSink,
    pub pulses: PulseSender,
}

impl<'a, C> ReaderSession<'a, C>
where
    C: Connector,
{
    /// Runs until the connection fails or `cancel` fires. A cancelled reader
    /// closes its connection and returns `Ok`.
    pub async fn run(self, mut cancel: CancelToken) -> Result<(), SessionError> {
        self.status.session(ROLE, SessionState::Connecting).await;
        let opened = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            opened = LineConnection::open(self.connector, self.endpoint, ROLE) => opened,
        };
        let mut conn = opened.map_err(|err| SessionError::from_transport(ROLE, err))?;
        self.status.session(ROLE, SessionState::Established).await;

        let result = tokio::select! {
            _ = cancel.cancelled() => Ok(()),
            result = self.pump(&mut conn) => result,
        };
        conn.close().await;
        result
    }

    async fn pump<S>(&self, conn: &mut LineConnection<S>) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            match conn.read_line(self.idle_timeout).await {
                Ok(line) => {
                    let text = decode_lossy(&line).into_owned();
                    debug!(event = "message_received", bytes = line.len());
                    if self.messages.send(text.clone()).await.is_err() {
                        return Err(SessionError::Stopped);
                    }
                    self.audit.record(AuditEntry::received(text)).await;
                    self.pulses.beat(PulseKind::MessageReceived);
                }
                Err(TransportError::Timeout(_)) => self.pulses.beat(PulseKind::IdleTimeout),
                Err(TransportError::Frame(err)) => {
                    warn!(event = "inbound_line_skipped", endpoint = %conn.endpoint(), error = %err);
                }
                Err(err) => return Err(SessionError::from_transport(ROLE, err)),
            }
        }
    }
}
