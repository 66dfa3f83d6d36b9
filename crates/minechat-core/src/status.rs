use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    Read,
    Write,
}

impl ConnectionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionRole::Read => "read",
            ConnectionRole::Write => "write",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initiated,
    Connecting,
    Established,
    Authenticated,
    Closed,
    Failed,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Initiated => "initiated",
            SessionState::Connecting => "connecting",
            SessionState::Established => "established",
            SessionState::Authenticated => "authenticated",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Recovering,
    Stopped,
}

impl SupervisorState {
    pub fn label(self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Recovering => "reconnecting",
            SupervisorState::Stopped => "stopped",
        }
    }
}

/// Everything the core tells the display collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Session {
        role: ConnectionRole,
        state: SessionState,
    },
    Supervisor(SupervisorState),
    Nickname(String),
    /// Issued by a registration exchange; the caller is expected to persist it.
    Registered { nickname: String, token: String },
    Reconnecting {
        generation: u64,
        delay: Duration,
        reason: String,
    },
    /// Terminal condition the user has to act on.
    Alert(String),
}

/// Sender half of the status queue. Observers going away is never an error for
/// the core, so sends ignore a closed receiver.
#[derive(Debug, Clone)]
pub struct StatusSink {
    tx: mpsc::Sender<StatusEvent>,
}

impl StatusSink {
    pub fn new(tx: mpsc::Sender<StatusEvent>) -> Self {
        Self { tx }
    }

    pub async fn emit(&self, event: StatusEvent) {
        let _ = self.tx.send(event).await;
    }

    pub async fn session(&self, role: ConnectionRole, state: SessionState) {
        self.emit(StatusEvent::Session { role, state }).await;
    }
}
