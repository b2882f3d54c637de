// src/ui/widgets/findings.rs

use crate::app::App;
use crate::core::models::ScanResults;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Wrap},
};

/// Color used for a nuclei severity label.
pub fn severity_style(severity: &str) -> Style {
    match severity.to_ascii_lowercase().as_str() {
        "critical" => Style::default().fg(Color::Magenta).bold(),
        "high" => Style::default().fg(Color::Red),
        "medium" => Style::default().fg(Color::Yellow),
        "low" => Style::default().fg(Color::Cyan),
        "info" => Style::default().fg(Color::Blue),
        _ => Style::default().fg(Color::DarkGray),
    }
}

/// Renders every finding recorded for the selected scan, grouped by kind.
///
/// Results are partial while the scan runs; sections fill in as stages
/// persist their output.
pub fn render_findings(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Findings (PgUp PgDn)");

    let Some(results) = &app.selected_results else {
        let hint = if app.selected_scan().is_some() {
            "Loading findings..."
        } else {
            "Start a scan to see its findings here."
        };
        frame.render_widget(
            Paragraph::new(hint).alignment(Alignment::Center).block(block),
            area,
        );
        return;
    };

    let paragraph = Paragraph::new(finding_lines(results))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.findings_scroll, 0));
    frame.render_widget(paragraph, area);
}

fn finding_lines(results: &ScanResults) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    section(&mut lines, "VULNERABILITIES", results.vulnerabilities.len());
    for vuln in &results.vulnerabilities {
        lines.push(Line::from(vec![
            Span::styled(format!("[{}] ", vuln.severity), severity_style(&vuln.severity)),
            Span::styled(vuln.template_id.clone(), Style::default().bold()),
            Span::raw(format!(" {}", vuln.matched_url)),
        ]));
        if !vuln.description.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("    {}", vuln.description),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }

    section(&mut lines, "OPEN PORTS", results.ports.len());
    for port in &results.ports {
        lines.push(Line::from(format!("  {}:{}", port.ip, port.port)));
    }

    section(&mut lines, "SUBDOMAINS", results.subdomains.len());
    lines.extend(results.subdomains.iter().map(|s| Line::from(format!("  {s}"))));

    section(&mut lines, "URLS", results.urls.len());
    lines.extend(results.urls.iter().map(|u| Line::from(format!("  {u}"))));

    lines
}

fn section(lines: &mut Vec<Line<'static>>, title: &str, count: usize) {
    if !lines.is_empty() {
        lines.push(Line::from(""));
    }
    lines.push(Line::from(vec![
        Span::styled(title.to_string(), Style::default().bold()),
        Span::styled(format!(" ({count})"), Style::default().fg(Color::DarkGray)),
    ]));
}
