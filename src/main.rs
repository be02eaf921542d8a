use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::{fs::File, io, path::Path, sync::Mutex};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod cli;

use app::memory_store::MemoryStore;
use app::storage::SqliteStore;
use app::sync::{self, StoreHandle};
use cli::{AppConfig, Cli, StoreLocation};

// Start the app.
// The terminal handling is based on:
// https://github.com/ratatui-org/ratatui/blob/main/examples/list.rs
pub fn main() -> Result<()> {
    let config = AppConfig::from_cli(Cli::parse());
    init_logging(&config.log_file)?;
    info!(user = %config.user_id, store = ?config.store, "starting");

    // The store connection is made once, here, and handed to the view
    let store = open_store(&config.store)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = app::ui::App::new(store, &config.user_id);
    let res = app::ui::run_app(&mut terminal, app, config.tick_rate);

    // Restore previous terminal state after exit
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("UI loop failed: {}", err);
        println!("{err:?}");
    }

    Ok(())
}

fn open_store(location: &StoreLocation) -> Result<StoreHandle> {
    let handle = match location {
        StoreLocation::Sqlite(path) => {
            let store = SqliteStore::open(path)
                .with_context(|| format!("Failed to open the task database at {}", path.display()))?;
            sync::spawn(store)
        }
        StoreLocation::Memory => sync::spawn(MemoryStore::new()),
    };
    Ok(handle)
}

fn init_logging(path: &Path) -> Result<()> {
    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("todo_sync=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
