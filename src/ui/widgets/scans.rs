// src/ui/widgets/scans.rs

use crate::app::{App, Focus, SPINNER_CHARS};
use crate::core::models::ScanStatus;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

/// Renders the list of scans, newest first, with a status marker per row.
///
/// In-progress scans get an animated spinner so the operator can see the
/// console is still polling.
pub fn render_scans(frame: &mut Frame, app: &mut App, area: Rect) {
    let border_style = if app.focus == Focus::Scans {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Scans (↑ ↓)")
        .border_style(border_style);

    if app.scans.is_empty() {
        let empty = Paragraph::new("No scans yet.")
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let spinner = SPINNER_CHARS[app.spinner_frame];
    let items: Vec<ListItem> = app
        .scans
        .iter()
        .map(|scan| {
            let (marker, style) = match scan.status {
                ScanStatus::InProgress => (spinner.to_string(), Style::default().fg(Color::Cyan)),
                ScanStatus::Completed => ("✓".to_string(), Style::default().fg(Color::Green)),
                ScanStatus::Failed => ("✗".to_string(), Style::default().fg(Color::Red)),
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{marker} "), style),
                Span::raw(scan.target.clone()),
                Span::styled(
                    format!("  {}", scan.started_at.with_timezone(&chrono::Local).format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut app.scan_list_state);
}
