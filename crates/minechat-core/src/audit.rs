use chrono::{DateTime, Local};
use tokio::sync::mpsc;

pub const TIMESTAMP_FORMAT: &str = "[%d.%m.%y %H:%M]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Received,
    Sent,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub at: DateTime<Local>,
    pub kind: AuditKind,
    pub text: String,
}

impl AuditEntry {
    pub fn new(kind: AuditKind, text: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            kind,
            text: text.into(),
        }
    }

    pub fn received(text: impl Into<String>) -> Self {
        Self::new(AuditKind::Received, text)
    }

    pub fn sent(text: impl Into<String>) -> Self {
        Self::new(AuditKind::Sent, text)
    }

    pub fn event(text: impl Into<String>) -> Self {
        Self::new(AuditKind::Event, text)
    }

    /// One history-file line, without the trailing newline.
    pub fn render(&self) -> String {
        let stamp = self.at.format(TIMESTAMP_FORMAT);
        match self.kind {
            AuditKind::Sent => format!("{stamp} Message sent: {}", self.text),
            AuditKind::Received | AuditKind::Event => format!("{stamp} {}", self.text),
        }
    }
}

/// Producer side of the audit queue. Bounded, so a slow history writer throttles
/// the sessions instead of losing entries.
#[derive(Debug, Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditSink {
    pub fn new(tx: mpsc::Sender<AuditEntry>) -> Self {
        Self { tx }
    }

    pub async fn record(&self, entry: AuditEntry) {
        let _ = self.tx.send(entry).await;
    }
}
