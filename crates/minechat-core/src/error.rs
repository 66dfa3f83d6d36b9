use crate::frame::FrameError;
use crate::status::ConnectionRole;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("no complete line within {0:?}")]
    Timeout(Duration),
    #[error("connection closed by peer")]
    Closed,
    #[error("connection already released")]
    Released,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Failure of one unit of a session generation. Cloneable so the first failure
/// can be published to every sibling through the cancellation scope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },
    #[error("{role} connection lost: {reason}")]
    Disconnected {
        role: ConnectionRole,
        reason: String,
    },
    #[error("no liveness pulse within {0:?}")]
    ConnectionStale(Duration),
    #[error("token rejected by server")]
    InvalidToken,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("stopped")]
    Stopped,
}

impl SessionError {
    pub fn from_transport(role: ConnectionRole, err: TransportError) -> Self {
        match err {
            TransportError::Connect { endpoint, source } => SessionError::Connection {
                endpoint,
                reason: source.to_string(),
            },
            TransportError::Frame(frame) => SessionError::Protocol(frame.to_string()),
            other => SessionError::Disconnected {
                role,
                reason: other.to_string(),
            },
        }
    }

    /// Whether the supervisor may tear down and start a new generation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::Connection { .. }
                | SessionError::Disconnected { .. }
                | SessionError::ConnectionStale(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Connection { .. } => "connection_error",
            SessionError::Disconnected { .. } => "disconnected",
            SessionError::ConnectionStale(_) => "connection_stale",
            SessionError::InvalidToken => "invalid_token",
            SessionError::Protocol(_) => "protocol_error",
            SessionError::Stopped => "stopped",
        }
    }
}
