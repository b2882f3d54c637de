// src/app.rs

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::{ListState, ScrollbarState};

use crate::config::split_list;
use crate::core::dispatch::DeadLetter;
use crate::core::models::{Scan, ScanId, ScanResults};

pub const SPINNER_CHARS: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Maximum number of log lines kept for the log panel.
pub const LOG_TAIL_LINES: usize = 200;

pub enum AppState {
    Disclaimer,
    Console,
}

/// Which part of the console receives key presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Target,
    Templates,
    Scans,
}

/// Work the event loop has to carry out on behalf of the console.
#[derive(Debug, PartialEq)]
pub enum Action {
    None,
    Quit,
    StartScan { target: String, templates: Vec<String> },
}

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub focus: Focus,
    pub target_input: String,
    pub templates_input: String,
    /// Used when the templates field is left empty.
    pub default_templates: Vec<String>,
    pub scans: Vec<Scan>,
    pub scan_list_state: ListState,
    pub selected_results: Option<ScanResults>,
    pub findings_scroll: u16,
    pub dead_letters: Vec<DeadLetter>,
    pub status_message: Option<String>,
    pub show_logs: bool,
    pub log_content: Vec<String>,
    pub log_horizontal_scroll: usize,
    pub log_horizontal_scroll_state: ScrollbarState,
    pub spinner_frame: usize,
    pending_selection: Option<ScanId>,
}

impl App {
    pub fn new(default_templates: Vec<String>) -> Self {
        Self {
            should_quit: false,
            state: AppState::Disclaimer,
            focus: Focus::Target,
            target_input: String::new(),
            templates_input: String::new(),
            default_templates,
            scans: Vec::new(),
            scan_list_state: ListState::default(),
            selected_results: None,
            findings_scroll: 0,
            dead_letters: Vec::new(),
            status_message: None,
            show_logs: false,
            log_content: Vec::new(),
            log_horizontal_scroll: 0,
            log_horizontal_scroll_state: ScrollbarState::default(),
            spinner_frame: 0,
            pending_selection: None,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return self.quit();
        }

        match self.state {
            AppState::Disclaimer => match key.code {
                KeyCode::Enter => {
                    self.state = AppState::Console;
                    Action::None
                }
                KeyCode::Char('q') | KeyCode::Esc => self.quit(),
                _ => Action::None,
            },
            AppState::Console => match self.focus {
                Focus::Target | Focus::Templates => self.handle_editing(key.code),
                Focus::Scans => self.handle_browsing(key.code),
            },
        }
    }

    fn handle_editing(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Tab => self.cycle_focus(),
            KeyCode::Esc => self.focus = Focus::Scans,
            KeyCode::Enter => return self.submit(),
            KeyCode::Backspace => {
                self.active_input().pop();
            }
            KeyCode::Char(c) => self.active_input().push(c),
            _ => {}
        }
        Action::None
    }

    fn handle_browsing(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Char('q') => return self.quit(),
            KeyCode::Tab => self.cycle_focus(),
            KeyCode::Char('n') => self.focus = Focus::Target,
            KeyCode::Up => self.select_previous(),
            KeyCode::Down => self.select_next(),
            KeyCode::PageUp => self.findings_scroll = self.findings_scroll.saturating_sub(5),
            KeyCode::PageDown => self.findings_scroll = self.findings_scroll.saturating_add(5),
            KeyCode::Char('l') => self.show_logs = !self.show_logs,
            KeyCode::Left => self.scroll_logs_left(),
            KeyCode::Right => self.scroll_logs_right(),
            _ => {}
        }
        Action::None
    }

    fn active_input(&mut self) -> &mut String {
        match self.focus {
            Focus::Templates => &mut self.templates_input,
            _ => &mut self.target_input,
        }
    }

    fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Target => Focus::Templates,
            Focus::Templates => Focus::Scans,
            Focus::Scans => Focus::Target,
        };
    }

    fn submit(&mut self) -> Action {
        let target = self.target_input.trim().to_string();
        if target.is_empty() {
            self.status_message = Some("Enter a domain, host or URL first.".to_string());
            return Action::None;
        }
        let mut templates = split_list(&self.templates_input);
        if templates.is_empty() {
            templates = self.default_templates.clone();
        }
        self.target_input.clear();
        Action::StartScan { target, templates }
    }

    /// Called once the service accepted a scan; it becomes the selection on
    /// the next refresh.
    pub fn on_scan_created(&mut self, id: ScanId) {
        self.pending_selection = Some(id);
        self.focus = Focus::Scans;
        self.status_message = Some(format!("Scan {id} queued."));
    }

    pub fn on_scan_rejected(&mut self, reason: String) {
        self.status_message = Some(reason);
    }

    /// Replaces the scan list, keeping the same scan selected when it is still present.
    pub fn set_scans(&mut self, scans: Vec<Scan>) {
        let keep = self.pending_selection.take().or_else(|| self.selected_scan_id());
        self.scans = scans;

        let index = keep
            .and_then(|id| self.scans.iter().position(|s| s.id == id))
            .or(if self.scans.is_empty() { None } else { Some(0) });
        if index != self.scan_list_state.selected() {
            self.findings_scroll = 0;
        }
        self.scan_list_state.select(index);
    }

    pub fn selected_scan(&self) -> Option<&Scan> {
        self.scan_list_state.selected().and_then(|i| self.scans.get(i))
    }

    pub fn selected_scan_id(&self) -> Option<ScanId> {
        self.selected_scan().map(|s| s.id)
    }

    /// Dead letter for the selected scan, if its pipeline run failed.
    pub fn selected_dead_letter(&self) -> Option<&DeadLetter> {
        let id = self.selected_scan_id()?;
        self.dead_letters.iter().rev().find(|d| d.job.scan_id == id)
    }

    fn select_next(&mut self) {
        if self.scans.is_empty() {
            return;
        }
        let next = match self.scan_list_state.selected() {
            Some(i) if i + 1 < self.scans.len() => i + 1,
            Some(i) => i,
            None => 0,
        };
        self.select(next);
    }

    fn select_previous(&mut self) {
        if self.scans.is_empty() {
            return;
        }
        let previous = self.scan_list_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.select(previous);
    }

    fn select(&mut self, index: usize) {
        if self.scan_list_state.selected() != Some(index) {
            self.selected_results = None;
            self.findings_scroll = 0;
        }
        self.scan_list_state.select(Some(index));
    }

    pub fn scroll_logs_left(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_sub(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn scroll_logs_right(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_add(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn on_tick(&mut self) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_CHARS.len();
    }

    pub fn quit(&mut self) -> Action {
        self.should_quit = true;
        Action::Quit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ScanStatus;

    fn press(app: &mut App, code: KeyCode) -> Action {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn console() -> App {
        let mut app = App::new(vec!["cves".into()]);
        press(&mut app, KeyCode::Enter);
        app
    }

    #[test]
    fn disclaimer_must_be_acknowledged() {
        let mut app = App::new(vec![]);
        type_text(&mut app, "example.com");
        assert!(app.target_input.is_empty());
        press(&mut app, KeyCode::Enter);
        assert!(matches!(app.state, AppState::Console));
    }

    #[test]
    fn submit_uses_typed_templates_or_defaults() {
        let mut app = console();
        type_text(&mut app, "example.com");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "exposures, misconfiguration");
        let action = press(&mut app, KeyCode::Enter);
        assert_eq!(
            action,
            Action::StartScan {
                target: "example.com".into(),
                templates: vec!["exposures".into(), "misconfiguration".into()],
            }
        );
        assert!(app.target_input.is_empty());

        let mut app = console();
        type_text(&mut app, "https://example.org");
        let action = press(&mut app, KeyCode::Enter);
        assert_eq!(
            action,
            Action::StartScan { target: "https://example.org".into(), templates: vec!["cves".into()] }
        );
    }

    #[test]
    fn empty_target_is_not_submitted() {
        let mut app = console();
        type_text(&mut app, "   ");
        assert_eq!(press(&mut app, KeyCode::Enter), Action::None);
        assert!(app.status_message.is_some());
    }

    #[test]
    fn q_only_quits_outside_text_fields() {
        let mut app = console();
        type_text(&mut app, "q");
        assert!(!app.should_quit);
        assert_eq!(app.target_input, "q");

        press(&mut app, KeyCode::Esc);
        assert_eq!(press(&mut app, KeyCode::Char('q')), Action::Quit);
        assert!(app.should_quit);
    }

    #[test]
    fn selection_follows_the_same_scan_across_refreshes() {
        let mut app = console();
        let older = Scan::new("older.example.com");
        let newer = Scan::new("newer.example.com");
        app.set_scans(vec![newer.clone(), older.clone()]);
        assert_eq!(app.selected_scan_id(), Some(newer.id));

        app.focus = Focus::Scans;
        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected_scan_id(), Some(older.id));
        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected_scan_id(), Some(older.id));

        let newest = Scan::new("newest.example.com");
        app.set_scans(vec![newest.clone(), newer, older.clone()]);
        assert_eq!(app.selected_scan_id(), Some(older.id));

        app.on_scan_created(newest.id);
        app.set_scans(app.scans.clone());
        assert_eq!(app.selected_scan_id(), Some(newest.id));
    }

    #[test]
    fn dead_letter_is_matched_to_the_selected_scan() {
        let mut app = console();
        let mut scan = Scan::new("example.com");
        scan.status = ScanStatus::Failed;
        app.set_scans(vec![scan.clone()]);
        app.dead_letters = vec![DeadLetter {
            job: crate::core::models::ScanJob {
                scan_id: scan.id,
                target: scan.target.clone(),
                template_filters: vec![],
            },
            error: "stage scan-ports failed".into(),
        }];
        assert_eq!(app.selected_dead_letter().unwrap().error, "stage scan-ports failed");
    }

    #[test]
    fn log_panel_toggles_and_scrolls() {
        let mut app = console();
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('l'));
        assert!(app.show_logs);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Left);
        assert_eq!(app.log_horizontal_scroll, 4);
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Left);
        assert_eq!(app.log_horizontal_scroll, 0);
    }
}
