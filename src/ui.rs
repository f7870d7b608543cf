use chrono::Utc;
use ratatui::{
    layout::Constraint,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Row, Table},
    Frame,
};

use crate::model::{Session, SessionStatus};

/// Render the session status table.
///
/// Deliberately minimal: the engine is the product here, this table just
/// demonstrates the consumed-by interface (snapshot + dirty flag).
pub fn render(frame: &mut Frame, sessions: &[Session]) {
    let rows: Vec<Row> = if sessions.is_empty() {
        vec![Row::new(vec![Span::styled(
            "no sessions yet",
            Style::default().fg(Color::DarkGray),
        )])]
    } else {
        sessions.iter().map(session_row).collect()
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(12),
            Constraint::Min(30),
            Constraint::Length(8),
        ],
    )
    .header(
        Row::new(vec!["session", "status", "activity", "updated"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title("cmux"));

    frame.render_widget(table, frame.area());
}

fn session_row(session: &Session) -> Row<'static> {
    let status_style = Style::default().fg(status_color(session.status));
    Row::new(vec![
        Line::from(session.name.clone()),
        Line::from(Span::styled(session.status.to_string(), status_style)),
        Line::from(activity_line(session)),
        Line::from(format_elapsed(
            (Utc::now() - session.last_update).num_seconds(),
        )),
    ])
}

fn status_color(status: SessionStatus) -> Color {
    match status {
        SessionStatus::Idle => Color::DarkGray,
        SessionStatus::Thinking => Color::Cyan,
        SessionStatus::Tool => Color::Yellow,
        SessionStatus::Active => Color::Green,
        SessionStatus::NeedsInput => Color::Red,
    }
}

/// One line describing what the session is doing right now.
fn activity_line(session: &Session) -> String {
    if let Some(pending) = &session.pending_permission {
        return match pending.message.as_deref() {
            Some(msg) => msg.to_string(),
            None => format!("permission: {}", pending.tool_name),
        };
    }
    if let Some(tool) = &session.current_tool {
        return format!("{} {}", tool.name, tool.summary);
    }
    session
        .messages
        .last()
        .map(|m| {
            let mut text = m.text.replace('\n', " ");
            if text.chars().count() > 60 {
                text = text.chars().take(60).collect::<String>() + "...";
            }
            format!("{}: {}", m.role, text)
        })
        .unwrap_or_default()
}

fn format_elapsed(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs.max(0))
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}
