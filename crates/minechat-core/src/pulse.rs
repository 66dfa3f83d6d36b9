use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseKind {
    MessageReceived,
    SendSucceeded,
    IdleTimeout,
}

impl PulseKind {
    /// Idle timeouts only prove the socket has been quiet, not that it is alive.
    pub fn proves_activity(self) -> bool {
        !matches!(self, PulseKind::IdleTimeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PulseKind::MessageReceived => "message_received",
            PulseKind::SendSucceeded => "send_succeeded",
            PulseKind::IdleTimeout => "idle_timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub kind: PulseKind,
    pub at: DateTime<Utc>,
}

impl Pulse {
    pub fn now(kind: PulseKind) -> Self {
        Self {
            kind,
            at: Utc::now(),
        }
    }
}

/// Producer side of the watchdog queue. Pulses are ephemeral: if the queue is
/// full the watchdog already has fresher evidence, and if it is closed the
/// generation is ending.
#[derive(Debug, Clone)]
pub struct PulseSender {
    tx: mpsc::Sender<Pulse>,
}

impl PulseSender {
    pub fn new(tx: mpsc::Sender<Pulse>) -> Self {
        Self { tx }
    }

    pub fn beat(&self, kind: PulseKind) {
        let _ = self.tx.try_send(Pulse::now(kind));
    }
}

pub fn channel(capacity: usize) -> (PulseSender, mpsc::Receiver<Pulse>) {
    let (tx, rx) = mpsc::channel(capacity);
    (PulseSender::new(tx), rx)
}
