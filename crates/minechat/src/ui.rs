use crate::app::App;
use crate::theme::{
    session_color, supervisor_color, ALERT_STYLE, BORDER_STYLE, HEADER_STYLE, MUTED_STYLE,
    SENT_STYLE, TEXT_STYLE,
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const SENT_MARKER: &str = "Message sent: ";

pub fn render(frame: &mut Frame, app: &App) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(frame.size());

    frame.render_widget(render_header(app), layout[0]);
    frame.render_widget(render_messages(app, layout[1]), layout[1]);
    frame.render_widget(render_input(app), layout[2]);
    if let Some(alert) = &app.alert {
        render_alert(frame, alert);
    }
}

fn render_header(app: &App) -> Paragraph<'static> {
    let nickname = app
        .nickname
        .clone()
        .unwrap_or_else(|| "not signed in".to_string());
    let mut spans = vec![
        Span::styled("minechat ", HEADER_STYLE),
        Span::styled(nickname, TEXT_STYLE),
        Span::raw("  "),
        Span::styled(
            format!("read:{}", app.read_state.label()),
            Style::new().fg(session_color(app.read_state)),
        ),
        Span::raw(" "),
        Span::styled(
            format!("write:{}", app.write_state.label()),
            Style::new().fg(session_color(app.write_state)),
        ),
        Span::raw(" "),
        Span::styled(
            format!("[{}]", app.supervisor.label()),
            Style::new().fg(supervisor_color(app.supervisor)),
        ),
    ];
    if app.reconnects > 0 {
        spans.push(Span::styled(
            format!("  reconnects:{}", app.reconnects),
            MUTED_STYLE,
        ));
    }
    if let Some(note) = &app.status_note {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(note.clone(), MUTED_STYLE));
    }
    Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(BORDER_STYLE),
    )
}

fn render_messages(app: &App, area: Rect) -> Paragraph<'static> {
    let visible = usize::from(area.height.saturating_sub(2)).max(1);
    let end = app.messages.len().saturating_sub(app.scroll);
    let start = end.saturating_sub(visible);
    let lines: Vec<Line<'static>> = app
        .messages
        .iter()
        .skip(start)
        .take(end - start)
        .map(|message| {
            let style = if message.contains(SENT_MARKER) {
                SENT_STYLE
            } else {
                TEXT_STYLE
            };
            Line::from(Span::styled(message.clone(), style))
        })
        .collect();
    let title = if app.scroll > 0 {
        format!("Messages (+{} below)", app.scroll)
    } else {
        "Messages".to_string()
    };
    Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(BORDER_STYLE)
                .title(Span::styled(title, HEADER_STYLE)),
        )
}

fn render_input(app: &App) -> Paragraph<'static> {
    Paragraph::new(Line::from(vec![
        Span::styled("> ", MUTED_STYLE),
        Span::styled(app.input.clone(), TEXT_STYLE),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(BORDER_STYLE)
            .title(Span::styled("Enter send · PgUp/PgDn scroll · Esc quit", MUTED_STYLE)),
    )
}

fn render_alert(frame: &mut Frame, alert: &str) {
    let area = centered_rect(60, 30, frame.size());
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(vec![
            Line::from(Span::styled(alert.to_string(), ALERT_STYLE)),
            Line::from(""),
            Line::from(Span::styled("Press Enter to dismiss", MUTED_STYLE)),
        ]))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(ALERT_STYLE)
                .title(Span::styled("Alert", ALERT_STYLE)),
        ),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}
