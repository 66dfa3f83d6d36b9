use minechat_core::{SessionState, SupervisorState};
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(191, 219, 254))
    .add_modifier(Modifier::BOLD);
pub const BORDER_STYLE: Style = Style::new().fg(Color::Rgb(71, 85, 105));
pub const TEXT_STYLE: Style = Style::new().fg(Color::Rgb(226, 232, 240));
pub const MUTED_STYLE: Style = Style::new().fg(Color::Rgb(148, 163, 184));
pub const SENT_STYLE: Style = Style::new().fg(Color::Rgb(56, 189, 248));
pub const ALERT_STYLE: Style = Style::new()
    .fg(Color::Rgb(239, 68, 68))
    .add_modifier(Modifier::BOLD);

pub fn session_color(state: SessionState) -> Color {
    match state {
        SessionState::Authenticated | SessionState::Established => Color::Rgb(34, 197, 94),
        SessionState::Connecting | SessionState::Initiated => Color::Rgb(245, 158, 11),
        SessionState::Closed => Color::Rgb(148, 163, 184),
        SessionState::Failed => Color::Rgb(239, 68, 68),
    }
}

pub fn supervisor_color(state: SupervisorState) -> Color {
    match state {
        SupervisorState::Running => Color::Rgb(34, 197, 94),
        SupervisorState::Starting | SupervisorState::Idle => Color::Rgb(59, 130, 246),
        SupervisorState::Recovering => Color::Rgb(245, 158, 11),
        SupervisorState::Stopped => Color::Rgb(239, 68, 68),
    }
}
