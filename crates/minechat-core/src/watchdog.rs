use crate::error::SessionError;
use crate::pulse::Pulse;
use crate::scope::CancelToken;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Fails the generation when no activity pulse arrives for `stale_after`.
/// Idle-timeout pulses are observed but leave the deadline where it is.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    pub stale_after: Duration,
}

impl Watchdog {
    pub async fn run(
        self,
        mut pulses: mpsc::Receiver<Pulse>,
        mut cancel: CancelToken,
    ) -> Result<(), SessionError> {
        let mut deadline = Instant::now() + self.stale_after;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(event = "watchdog_stale", stale_after_ms = self.stale_after.as_millis() as u64);
                    return Err(SessionError::ConnectionStale(self.stale_after));
                }
                pulse = pulses.recv() => match pulse {
                    Some(pulse) if pulse.kind.proves_activity() => {
                        deadline = Instant::now() + self.stale_after;
                        debug!(event = "watchdog_pulse", kind = pulse.kind.as_str(), at = %pulse.at);
                    }
                    Some(pulse) => {
                        debug!(event = "watchdog_idle", kind = pulse.kind.as_str(), at = %pulse.at);
                    }
                    None => {
                        // Both sessions are gone; the scope already holds their outcome.
                        cancel.cancelled().await;
                        return Ok(());
                    }
                },
            }
        }
    }
}
