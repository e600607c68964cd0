//! Task Grid - paged and virtualized task table.
//!
//! Features:
//! - Sort by any sortable column
//! - Search, status filter and start-date filter
//! - Paged or scrolled windowing with on-demand batch loading
//! - Inline cell editing
//! - Manual and periodic refresh from the source

mod app;
mod data;
mod ui;

use anyhow::Result;
use app::App;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use grid_core::GridConfig;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{fs::File, io, path::PathBuf, sync::Mutex, time::Duration};
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "task-grid";

fn log_path() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir)
        .join("task-grid.log")
}

/// Log to a file; the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let path = log_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let config = GridConfig::load(APP_NAME);
    tracing::info!(
        mode = ?config.window.mode,
        page_size = config.window.page_size,
        refresh = config.refresh.enabled,
        "starting"
    );

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run app
    let result = match App::new(config) {
        Ok(mut app) => run_app(&mut terminal, &mut app),
        Err(e) => Err(e),
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "exited with error");
    }
    result
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let mut last_height = 0;
    loop {
        let height = ui::body_height(terminal.size()?.height);
        if height != last_height {
            app.resize(height);
            last_height = height;
        }

        app.poll_batches();
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if app.can_quit() && key.code == KeyCode::Char('q') {
                    return Ok(());
                }
                app.handle_key(key);
            }
        }
    }
}
