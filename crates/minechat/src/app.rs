use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use minechat_core::{ConnectionRole, SessionError, SessionState, StatusEvent, SupervisorState};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

pub const MAX_MESSAGES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Send(String),
    Quit,
}

/// Display state of the chat window. Everything here is fed by the core's
/// queues; nothing in it talks to the network.
pub struct App {
    pub messages: VecDeque<String>,
    pub input: String,
    pub nickname: Option<String>,
    pub read_state: SessionState,
    pub write_state: SessionState,
    pub supervisor: SupervisorState,
    pub status_note: Option<String>,
    pub alert: Option<String>,
    pub reconnects: u64,
    /// Lines scrolled up from the bottom of the message pane.
    pub scroll: usize,
    outcome: Option<Result<(), SessionError>>,
    quit: bool,
}

impl App {
    pub fn new(history: Vec<String>) -> Self {
        let mut app = Self {
            messages: VecDeque::with_capacity(MAX_MESSAGES),
            input: String::new(),
            nickname: None,
            read_state: SessionState::Initiated,
            write_state: SessionState::Initiated,
            supervisor: SupervisorState::Idle,
            status_note: None,
            alert: None,
            reconnects: 0,
            scroll: 0,
            outcome: None,
            quit: false,
        };
        for line in history {
            app.push_message(line);
        }
        app
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn supervisor_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<&Result<(), SessionError>> {
        self.outcome.as_ref()
    }

    pub fn push_message(&mut self, message: String) {
        if self.messages.len() == MAX_MESSAGES {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    pub fn apply_status(&mut self, event: StatusEvent) {
        match event {
            StatusEvent::Session { role, state } => match role {
                ConnectionRole::Read => self.read_state = state,
                ConnectionRole::Write => self.write_state = state,
            },
            StatusEvent::Supervisor(state) => {
                self.supervisor = state;
                if state == SupervisorState::Running {
                    self.status_note = None;
                }
            }
            StatusEvent::Nickname(nickname) => {
                self.status_note = Some(format!("Signed in as {nickname}"));
                self.nickname = Some(nickname);
            }
            StatusEvent::Registered { nickname, .. } => {
                self.status_note = Some(format!("Registered new account {nickname}"));
            }
            StatusEvent::Reconnecting { delay, reason, .. } => {
                self.reconnects += 1;
                self.status_note = Some(format!(
                    "Reconnecting in {}: {reason}",
                    format_delay(delay)
                ));
            }
            StatusEvent::Alert(text) => self.alert = Some(text),
        }
    }

    /// Records how the supervisor ended. A clean stop closes the window; a
    /// failure stays on screen until the user dismisses it.
    pub fn finish(&mut self, outcome: Result<(), SessionError>) {
        match &outcome {
            Ok(()) => self.quit = true,
            Err(err) => {
                if self.alert.is_none() {
                    self.alert = Some(format!("Chat stopped: {err}"));
                }
            }
        }
        self.outcome = Some(outcome);
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.kind == KeyEventKind::Release {
            return Action::None;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return Action::Quit;
        }
        if self.alert.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.alert = None;
                if self.supervisor_finished() {
                    self.quit = true;
                    return Action::Quit;
                }
            }
            return Action::None;
        }
        match key.code {
            KeyCode::Esc => {
                self.quit = true;
                Action::Quit
            }
            KeyCode::Enter => {
                let message = self.input.trim().to_string();
                self.input.clear();
                if message.is_empty() || self.supervisor_finished() {
                    return Action::None;
                }
                self.scroll = 0;
                Action::Send(message)
            }
            KeyCode::Backspace => {
                self.input.pop();
                Action::None
            }
            KeyCode::PageUp => {
                self.scroll = (self.scroll + 10).min(self.messages.len().saturating_sub(1));
                Action::None
            }
            KeyCode::PageDown => {
                self.scroll = self.scroll.saturating_sub(10);
                Action::None
            }
            KeyCode::Char(ch) => {
                self.input.push(ch);
                Action::None
            }
            _ => Action::None,
        }
    }

    /// Queues a message without waiting. While the writer is reconnecting the
    /// queue can fill up; the text goes back into the input box in that case.
    pub fn submit(&mut self, send: &mpsc::Sender<String>, message: String) {
        match send.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                self.input = message;
                self.status_note = Some("Send queue full, still reconnecting".to_string());
            }
            Err(TrySendError::Closed(_)) => {
                self.status_note = Some("Chat connection is closed".to_string());
            }
        }
    }

    pub fn connection_label(&self) -> String {
        format!(
            "read:{} write:{} [{}]",
            self.read_state.label(),
            self.write_state.label(),
            self.supervisor.label()
        )
    }
}

fn format_delay(delay: Duration) -> String {
    if delay.as_millis() < 1000 {
        format!("{}ms", delay.as_millis())
    } else {
        format!("{:.1}s", delay.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            app.handle_key(key(KeyCode::Char(ch)));
        }
    }

    #[test]
    fn enter_sends_trimmed_input() {
        let mut app = App::new(Vec::new());
        type_text(&mut app, "  hello ");
        assert_eq!(app.handle_key(key(KeyCode::Enter)), Action::Send("hello".to_string()));
        assert!(app.input.is_empty());

        type_text(&mut app, "   ");
        assert_eq!(app.handle_key(key(KeyCode::Enter)), Action::None);
    }

    #[test]
    fn status_events_update_header_state() {
        let mut app = App::new(vec!["[01.03.26 09:30] earlier".to_string()]);
        app.apply_status(StatusEvent::Session {
            role: ConnectionRole::Write,
            state: SessionState::Authenticated,
        });
        app.apply_status(StatusEvent::Nickname("Brave Tester".to_string()));
        app.apply_status(StatusEvent::Reconnecting {
            generation: 1,
            delay: Duration::from_millis(500),
            reason: "read connection lost".to_string(),
        });

        assert_eq!(app.messages.len(), 1);
        assert_eq!(app.nickname.as_deref(), Some("Brave Tester"));
        assert_eq!(app.reconnects, 1);
        assert_eq!(
            app.status_note.as_deref(),
            Some("Reconnecting in 500ms: read connection lost")
        );
        assert!(app.connection_label().starts_with("read:initiated write:authenticated"));
    }

    #[test]
    fn alert_blocks_input_until_dismissed() {
        let mut app = App::new(Vec::new());
        app.apply_status(StatusEvent::Alert("Unknown token".to_string()));
        app.finish(Err(SessionError::InvalidToken));
        assert!(!app.should_quit());

        type_text(&mut app, "ignored");
        assert!(app.input.is_empty());
        assert_eq!(app.handle_key(key(KeyCode::Enter)), Action::Quit);
        assert!(app.should_quit());
        assert_eq!(app.outcome(), Some(&Err(SessionError::InvalidToken)));
    }

    #[test]
    fn clean_stop_closes_window() {
        let mut app = App::new(Vec::new());
        app.finish(Ok(()));
        assert!(app.should_quit());
    }

    #[test]
    fn full_send_queue_keeps_the_message_in_the_input() {
        let (send, mut queued) = mpsc::channel(1);
        let mut app = App::new(Vec::new());
        app.submit(&send, "first".to_string());
        app.submit(&send, "second".to_string());

        assert_eq!(app.input, "second");
        assert_eq!(
            app.status_note.as_deref(),
            Some("Send queue full, still reconnecting")
        );
        assert_eq!(queued.try_recv().ok().as_deref(), Some("first"));
        assert!(queued.try_recv().is_err());
    }

    #[test]
    fn closed_send_queue_is_reported() {
        let (send, queued) = mpsc::channel::<String>(1);
        drop(queued);
        let mut app = App::new(Vec::new());
        app.submit(&send, "late".to_string());
        assert_eq!(app.status_note.as_deref(), Some("Chat connection is closed"));
        assert!(app.input.is_empty());
    }

    #[test]
    fn message_pane_is_bounded() {
        let mut app = App::new(Vec::new());
        for index in 0..MAX_MESSAGES + 5 {
            app.push_message(format!("line {index}"));
        }
        assert_eq!(app.messages.len(), MAX_MESSAGES);
        assert_eq!(app.messages.front().map(String::as_str), Some("line 5"));
    }
}
