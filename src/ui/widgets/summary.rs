// src/ui/widgets/summary.rs

use super::findings::severity_style;
use crate::app::App;
use crate::core::models::ScanStatus;
use chrono::Local;
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Paragraph, Wrap},
};

const SEVERITIES: [&str; 6] = ["critical", "high", "medium", "low", "info", "unknown"];

/// Renders the summary of the selected scan: lifecycle, counts per finding
/// type and the vulnerability breakdown by severity.
///
/// If the scan's pipeline run ended up as a dead letter, its error is shown
/// at the bottom.
pub fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("Summary");

    let Some(scan) = app.selected_scan() else {
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    };

    let status_style = match scan.status {
        ScanStatus::InProgress => Style::default().fg(Color::Cyan),
        ScanStatus::Completed => Style::default().fg(Color::Green),
        ScanStatus::Failed => Style::default().fg(Color::Red),
    };

    let mut lines = vec![
        Line::from(Span::styled(scan.target.clone(), Style::default().bold())),
        Line::from(vec![Span::raw("Status: "), Span::styled(scan.status.to_string(), status_style)]),
        Line::from(format!("Started: {}", scan.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"))),
    ];
    match scan.finished_at {
        Some(finished) => {
            let elapsed = (finished - scan.started_at).num_seconds().max(0);
            lines.push(Line::from(format!(
                "Finished: {} ({}m {}s)",
                finished.with_timezone(&Local).format("%H:%M:%S"),
                elapsed / 60,
                elapsed % 60
            )));
        }
        None => lines.push(Line::from("Finished: -")),
    }

    if let Some(results) = &app.selected_results {
        lines.push(Line::from(""));
        lines.push(Line::from("FINDINGS".bold()));
        lines.push(Line::from(format!("Subdomains: {}", results.subdomains.len())));
        lines.push(Line::from(format!("URLs: {}", results.urls.len())));
        lines.push(Line::from(format!("Open ports: {}", results.ports.len())));
        lines.push(Line::from(format!("Vulnerabilities: {}", results.vulnerabilities.len())));

        lines.push(Line::from(""));
        lines.push(Line::from("BY SEVERITY".bold()));
        for severity in SEVERITIES {
            let count = results.severity_count(severity);
            if count > 0 {
                lines.push(Line::from(vec![
                    Span::styled(format!("{severity}: "), severity_style(severity)),
                    Span::raw(count.to_string()),
                ]));
            }
        }
    }

    if let Some(letter) = app.selected_dead_letter() {
        lines.push(Line::from(""));
        lines.push(Line::from("ERROR".bold().red()));
        lines.push(Line::from(Span::styled(letter.error.clone(), Style::default().fg(Color::Red))));
    }

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}
