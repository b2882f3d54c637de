// src/ui/layout.rs

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Defines the areas of the console.
///
/// Each `Rect` is the region one widget draws into, computed once per frame.
pub struct AppLayout {
    pub target_input: Rect,
    pub templates_input: Rect,
    pub scans: Rect,
    pub findings: Rect,
    pub summary: Rect,
    pub log_panel: Rect,
    pub footer: Rect,
}

/// Splits the frame into the input row, the content area and the footer.
///
/// The content area shows the scan list, the findings of the selected scan
/// and its summary side by side. When `show_logs` is set, the bottom third
/// of the content area is handed to the log panel.
pub fn create_layout(frame_size: Rect, show_logs: bool) -> AppLayout {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
        .split(frame_size);

    let input_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(main_chunks[0]);

    let (content_area, log_panel) = if show_logs {
        let split = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(main_chunks[1]);
        (split[0], split[1])
    } else {
        (main_chunks[1], Rect::default())
    };

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(50),
            Constraint::Percentage(25),
        ])
        .split(content_area);

    AppLayout {
        target_input: input_chunks[0],
        templates_input: input_chunks[1],
        scans: content_chunks[0],
        findings: content_chunks[1],
        summary: content_chunks[2],
        log_panel,
        footer: main_chunks[2],
    }
}
