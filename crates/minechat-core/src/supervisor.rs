use crate::audit::{AuditEntry, AuditSink};
use crate::auth::Credential;
use crate::error::SessionError;
use crate::pulse;
use crate::reader::ReaderSession;
use crate::scope::CancelScope;
use crate::status::{ConnectionRole, SessionState, StatusEvent, StatusSink, SupervisorState};
use crate::transport::{Connector, Endpoint};
use crate::watchdog::Watchdog;
use crate::writer::{Outbox, WriterSession, WriterTimeouts};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const PULSE_CAPACITY: usize = 32;

pub const DEFAULT_HOST: &str = "minechat.dvmn.org";
pub const DEFAULT_READ_PORT: u16 = 5000;
pub const DEFAULT_WRITE_PORT: u16 = 5050;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// A generation that stayed up this long resets the delay to `initial`.
    pub reset_after: Duration,
}

impl BackoffPolicy {
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            reset_after: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub read_endpoint: Endpoint,
    pub write_endpoint: Endpoint,
    pub credential: Credential,
    pub read_idle_timeout: Duration,
    pub stale_after: Duration,
    pub writer: WriterTimeouts,
    pub backoff: BackoffPolicy,
    pub queue_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            read_endpoint: Endpoint::new(DEFAULT_HOST, DEFAULT_READ_PORT),
            write_endpoint: Endpoint::new(DEFAULT_HOST, DEFAULT_WRITE_PORT),
            credential: Credential::default(),
            read_idle_timeout: Duration::from_secs(1),
            stale_after: Duration::from_secs(30),
            writer: WriterTimeouts::default(),
            backoff: BackoffPolicy::default(),
            queue_capacity: 64,
        }
    }
}

/// The collaborator side of the supervisor's queues.
#[derive(Debug)]
pub struct ClientHandles {
    pub messages: mpsc::Receiver<String>,
    pub status: mpsc::Receiver<StatusEvent>,
    pub audit: mpsc::Receiver<AuditEntry>,
    pub send: mpsc::Sender<String>,
}

/// Runs session generations until a terminal failure or shutdown.
pub struct Supervisor<C> {
    config: SupervisorConfig,
    connector: C,
    messages: mpsc::Sender<String>,
    status: StatusSink,
    audit: AuditSink,
    outbox: Outbox,
    state: SupervisorState,
}

impl<C> Supervisor<C>
where
    C: Connector,
{
    pub fn new(config: SupervisorConfig, connector: C) -> (Self, ClientHandles) {
        let capacity = config.queue_capacity.max(1);
        let (messages_tx, messages_rx) = mpsc::channel(capacity);
        let (status_tx, status_rx) = mpsc::channel(capacity);
        let (audit_tx, audit_rx) = mpsc::channel(capacity);
        let (send_tx, send_rx) = mpsc::channel(capacity);
        let supervisor = Self {
            config,
            connector,
            messages: messages_tx,
            status: StatusSink::new(status_tx),
            audit: AuditSink::new(audit_tx),
            outbox: Outbox::new(send_rx),
            state: SupervisorState::Idle,
        };
        let handles = ClientHandles {
            messages: messages_rx,
            status: status_rx,
            audit: audit_rx,
            send: send_tx,
        };
        (supervisor, handles)
    }

    /// `Ok` when stopped by `shutdown` or by the collaborators going away;
    /// the terminal [`SessionError`] otherwise.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SessionError> {
        let mut delay = self.config.backoff.initial;
        let mut generation = 0u64;
        loop {
            generation += 1;
            self.transition(SupervisorState::Starting).await;
            let started = Instant::now();
            let outcome = self.run_generation(generation, &mut shutdown).await;
            let uptime = started.elapsed();

            if outcome == SessionError::Stopped {
                info!(event = "supervisor_stopped", generation);
                self.transition(SupervisorState::Stopped).await;
                return Ok(());
            }
            if !outcome.is_recoverable() {
                error!(
                    event = "supervisor_terminal_failure",
                    generation,
                    kind = outcome.kind(),
                    error = %outcome
                );
                self.transition(SupervisorState::Stopped).await;
                return Err(outcome);
            }

            if uptime >= self.config.backoff.reset_after {
                delay = self.config.backoff.initial;
            }
            warn!(
                event = "generation_failed",
                generation,
                kind = outcome.kind(),
                error = %outcome,
                uptime_ms = uptime.as_millis() as u64,
                retry_in_ms = delay.as_millis() as u64
            );
            self.transition(SupervisorState::Recovering).await;
            self.status
                .emit(StatusEvent::Reconnecting {
                    generation,
                    delay,
                    reason: outcome.to_string(),
                })
                .await;
            self.audit
                .record(AuditEntry::event(format!("Connection lost: {outcome}. Reconnecting.")))
                .await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut shutdown) => {
                    info!(event = "supervisor_stopped", generation);
                    self.transition(SupervisorState::Stopped).await;
                    return Ok(());
                }
            }
            delay = self.config.backoff.next(delay);
        }
    }

    /// One generation: reader, writer and watchdog polled together under one
    /// scope. Returns only after all of them have finished, so every
    /// connection of the generation is closed by then.
    async fn run_generation(
        &mut self,
        generation: u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionError {
        info!(event = "generation_started", generation);
        self.transition(SupervisorState::Running).await;
        let scope = CancelScope::new();
        let (pulses, pulse_rx) = pulse::channel(PULSE_CAPACITY);

        let reader = ReaderSession {
            connector: &self.connector,
            endpoint: &self.config.read_endpoint,
            idle_timeout: self.config.read_idle_timeout,
            messages: self.messages.clone(),
            audit: self.audit.clone(),
            status: self.status.clone(),
            pulses: pulses.clone(),
        };
        let writer = WriterSession {
            connector: &self.connector,
            endpoint: &self.config.write_endpoint,
            timeouts: self.config.writer,
            audit: self.audit.clone(),
            status: self.status.clone(),
            pulses,
        };
        let watchdog = Watchdog {
            stale_after: self.config.stale_after,
        };
        let credential = &mut self.config.credential;
        let outbox = &mut self.outbox;
        let status = &self.status;

        let read_unit = async {
            let result = reader.run(scope.token()).await;
            settle(&scope, status, Some(ConnectionRole::Read), result).await;
        };
        let write_unit = async {
            let result = writer.run(credential, outbox, scope.token()).await;
            settle(&scope, status, Some(ConnectionRole::Write), result).await;
        };
        let watch_unit = async {
            let result = watchdog.run(pulse_rx, scope.token()).await;
            settle(&scope, status, None, result).await;
        };
        let stop_unit = async {
            let mut cancel = scope.token();
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = shutdown_requested(shutdown) => {
                    scope.fail(SessionError::Stopped);
                }
            }
        };
        tokio::join!(read_unit, write_unit, watch_unit, stop_unit);

        scope.outcome().unwrap_or(SessionError::Stopped)
    }

    async fn transition(&mut self, next: SupervisorState) {
        debug!(event = "supervisor_state", from = self.state.label(), to = next.label());
        self.state = next;
        self.status.emit(StatusEvent::Supervisor(next)).await;
    }
}

async fn settle(
    scope: &CancelScope,
    status: &StatusSink,
    role: Option<ConnectionRole>,
    result: Result<(), SessionError>,
) {
    match result {
        Ok(()) => {
            if let Some(role) = role {
                status.session(role, SessionState::Closed).await;
            }
        }
        Err(err) => {
            let unit = role.map(ConnectionRole::as_str).unwrap_or("watchdog");
            if scope.fail(err.clone()) {
                debug!(event = "generation_first_failure", unit, kind = err.kind());
            }
            if let Some(role) = role {
                status.session(role, SessionState::Failed).await;
            }
        }
    }
}

/// Resolves once `true` is published. A dropped sender means nobody can ask
/// for shutdown any more, so that never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
