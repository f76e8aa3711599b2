//! File-only logging for the hook. Anything on stdout/stderr would land in the
//! user's terminal, so the hook never writes there.

use std::env;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

const DEBUG_ENV: &str = "AW_WATCHER_TERMINAL_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "aw-terminal-hook.log";

pub fn init() -> Option<WorkerGuard> {
    let dir = log_dir()?;
    fs_err::create_dir_all(&dir).ok()?;

    let filter = if debug_env_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let installed = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .is_ok();

    installed.then_some(guard)
}

fn debug_env_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn log_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| {
        dir.join("activitywatch")
            .join("aw-watcher-terminal")
            .join("logs")
    })
}
