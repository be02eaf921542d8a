// Command line flags and the configuration resolved from them
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Parser)]
#[command(name = "todo-sync", version, about = "Terminal to-do list backed by a live task store")]
pub struct Cli {
    /// SQLite file holding the tasks
    #[arg(long, env = "TODO_SYNC_DB", default_value = "database.db")]
    pub db: PathBuf,

    /// Keep tasks in memory only; nothing survives the session
    #[arg(long)]
    pub memory: bool,

    /// Identifier of the acting user, stamped on every created task
    #[arg(long, env = "TODO_SYNC_USER")]
    pub user: Option<String>,

    /// UI refresh interval in milliseconds
    #[arg(long, default_value_t = 250)]
    pub tick_ms: u64,

    /// Where log output goes; the terminal belongs to the UI
    #[arg(long, env = "TODO_SYNC_LOG", default_value = "todo-sync.log")]
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Sqlite(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreLocation,
    pub user_id: String,
    pub tick_rate: Duration,
    pub log_file: PathBuf,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> AppConfig {
        let store = if cli.memory {
            StoreLocation::Memory
        } else {
            StoreLocation::Sqlite(cli.db)
        };

        AppConfig {
            store,
            user_id: resolve_user(cli.user),
            tick_rate: Duration::from_millis(cli.tick_ms.max(1)),
            log_file: cli.log_file,
        }
    }
}

// Explicit flag, then the login name, then a placeholder
fn resolve_user(flag: Option<String>) -> String {
    let non_blank = |user: String| {
        let user = user.trim().to_string();
        (!user.is_empty()).then_some(user)
    };
    flag.and_then(non_blank)
        .or_else(|| env::var("USER").ok().and_then(non_blank))
        .unwrap_or_else(|| ANONYMOUS_USER.to_string())
}
