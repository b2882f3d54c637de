// src/ui/widgets/input.rs
use crate::app::{App, AppState, Focus};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

/// Renders the target and template-filter fields.
pub fn render_inputs(frame: &mut Frame, app: &App, target_area: Rect, templates_area: Rect) {
    render_field(frame, app, "Target (domain, host or URL)", &app.target_input, Focus::Target, target_area);

    let title = if app.default_templates.is_empty() {
        "Templates (optional)".to_string()
    } else {
        format!("Templates (default: {})", app.default_templates.join(","))
    };
    render_field(frame, app, &title, &app.templates_input, Focus::Templates, templates_area);
}

fn render_field(frame: &mut Frame, app: &App, title: &str, value: &str, field: Focus, area: Rect) {
    let focused = app.focus == field && matches!(app.state, AppState::Console);
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title.to_string())
        .border_style(border_style);
    let paragraph = Paragraph::new(value.to_string())
        .block(block)
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(paragraph, area);

    if focused {
        frame.set_cursor_position((area.x + value.chars().count() as u16 + 1, area.y + 1));
    }
}
