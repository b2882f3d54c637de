// src/ui/widgets/footer.rs

use crate::app::{App, AppState, Focus};
use ratatui::{
    prelude::*,
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::Paragraph,
};

fn key(label: &str) -> Span<'static> {
    Span::styled(label.to_string(), Style::new().bold().fg(Color::Yellow))
}

/// Renders the footer: the keys that apply to the focused area, or the last
/// status message when there is one.
pub fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = match (&app.state, app.focus) {
        (AppState::Disclaimer, _) => vec![key("Enter"), Span::raw(" accept, "), key("Q"), Span::raw(" quit")],
        (AppState::Console, Focus::Target | Focus::Templates) => vec![
            key("Enter"),
            Span::raw(" start scan, "),
            key("Tab"),
            Span::raw(" next field, "),
            key("Esc"),
            Span::raw(" browse scans"),
        ],
        (AppState::Console, Focus::Scans) => vec![
            key("↑↓"),
            Span::raw(" select, "),
            key("N"),
            Span::raw("ew scan, "),
            key("L"),
            Span::raw("ogs, "),
            key("Q"),
            Span::raw("uit"),
        ],
    };

    if let Some(message) = &app.status_message {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(message.clone(), Style::new().fg(Color::Cyan)));
    }

    let footer = Paragraph::new(Line::from(spans)).alignment(Alignment::Center);
    frame.render_widget(footer, area);
}
