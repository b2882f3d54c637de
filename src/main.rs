// src/main.rs

use color_eyre::eyre::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use std::io::{Stdout, stdout};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

mod app;
mod config;
mod core;
mod logging;
mod ui;

use crate::app::{Action, App, LOG_TAIL_LINES};
use crate::config::{Settings, StoreBackend};
use crate::core::dispatch::JobDispatcher;
use crate::core::pipeline::Pipeline;
use crate::core::service::ScanService;
use crate::core::store::{MemoryStore, ScanStore, SqliteStore};
use crate::core::tool::ProcessRunner;

const TICK_RATE: Duration = Duration::from_millis(100);
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::initialize_logging()?;

    let settings = Settings::from_env()?;
    info!(
        workers = settings.workers,
        queue_capacity = settings.queue_capacity,
        store = ?settings.store,
        stage_timeout = ?settings.stage_timeout,
        "Starting reconchain."
    );

    let store: Arc<dyn ScanStore> = match &settings.store {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite { url } => Arc::new(SqliteStore::open(url).await?),
    };
    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        Arc::new(ProcessRunner),
        settings.tools.clone(),
        settings.stage_timeout,
    ));
    let dispatcher = JobDispatcher::start(pipeline, settings.workers, settings.queue_capacity);
    let service = ScanService::new(store, dispatcher);

    // --- Setup ---
    stdout().execute(EnterAlternateScreen)?;
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let outcome = run(&mut terminal, &service, &settings).await;

    // --- Restore Terminal ---
    stdout().execute(LeaveAlternateScreen)?;
    disable_raw_mode()?;

    println!("Waiting for queued scans to finish, press Ctrl-C to abandon them...");
    tokio::select! {
        _ = service.shutdown() => {}
        _ = tokio::signal::ctrl_c() => warn!("Shutdown interrupted; unfinished scans stay in progress."),
    }
    outcome
}

/// The console loop: draw, handle one key press, refresh from the store.
async fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    service: &ScanService,
    settings: &Settings,
) -> Result<()> {
    let mut app = App::new(settings.default_templates.clone());
    let log_path = logging::log_file_path();
    let mut last_refresh: Option<Instant> = None;

    while !app.should_quit {
        if last_refresh.is_none_or(|at| at.elapsed() >= REFRESH_INTERVAL) {
            refresh(&mut app, service, &log_path).await;
            last_refresh = Some(Instant::now());
        }

        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if event::poll(TICK_RATE)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Action::StartScan { target, templates } = app.handle_key(key) {
                        match service.create_scan(&target, templates).await {
                            Ok(id) => {
                                app.on_scan_created(id);
                                last_refresh = None;
                            }
                            Err(e) => {
                                error!(target = %target, error = %e, "Scan was not started.");
                                app.on_scan_rejected(e.to_string());
                            }
                        }
                    }
                }
            }
        }

        app.on_tick();
    }
    Ok(())
}

/// Pulls the scan list, the selected scan's findings, dead letters and the
/// log tail into the app state.
async fn refresh(app: &mut App, service: &ScanService, log_path: &Path) {
    match service.list_scans().await {
        Ok(scans) => app.set_scans(scans),
        Err(e) => {
            error!(error = %e, "Could not list scans.");
            app.status_message = Some(format!("Store unavailable: {e}"));
        }
    }

    if let Some(id) = app.selected_scan_id() {
        match service.scan_results(id).await {
            Ok(results) => app.selected_results = results,
            Err(e) => warn!(scan_id = %id, error = %e, "Could not load findings."),
        }
    } else {
        app.selected_results = None;
    }

    app.dead_letters = service.dead_letters().await;

    if app.show_logs {
        app.log_content = logging::read_log_tail(log_path, LOG_TAIL_LINES).await;
    }
}
