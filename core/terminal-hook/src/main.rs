//! aw-terminal-hook: shell-side producer for aw-watcher-terminal.
//!
//! Shell hooks call this binary on every lifecycle transition. Each call
//! stamps the current time, formats one notification line and writes it into
//! the watcher's named pipe.
//!
//! ## Subcommands
//!
//! - `open` / `close`: shell session started or is exiting
//! - `exec`: a command line is about to run (bash/zsh `preexec`)
//! - `result`: the prompt is about to be drawn again (`precmd`)
//! - `init`: print the hook snippet for a shell
//!
//! The hook never fails the shell: a missing pipe or an absent watcher is
//! logged and the process still exits 0.

mod logging;
mod pipe;
mod shell;

use aw_watcher_terminal_protocol::{format_line, Notification, Payload};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aw-terminal-hook")]
#[command(about = "Reports terminal lifecycle notifications to aw-watcher-terminal")]
#[command(version)]
struct Cli {
    /// Named pipe to write to (defaults to $AW_WATCHER_TERMINAL_PIPE)
    #[arg(long, global = true, value_name = "PATH")]
    pipe_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionArgs {
    /// Shell process ID (defaults to the parent process)
    #[arg(long)]
    pid: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// A shell session started
    #[command(alias = "preopen")]
    Open(SessionArgs),

    /// A command is about to run
    #[command(alias = "preexec")]
    Exec {
        #[command(flatten)]
        session: SessionArgs,

        /// Full command line as typed
        #[arg(long, allow_hyphen_values = true)]
        command: String,

        /// Working directory (defaults to the current directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Shell name, e.g. bash or zsh
        #[arg(long)]
        shell: Option<String>,
    },

    /// The previous command finished
    #[command(alias = "precmd")]
    Result {
        #[command(flatten)]
        session: SessionArgs,

        /// Exit status of the previous command
        #[arg(long, allow_negative_numbers = true)]
        exit_code: Option<i32>,
    },

    /// A shell session is exiting
    #[command(alias = "preclose")]
    Close(SessionArgs),

    /// Print the hook snippet for a shell
    Init {
        #[arg(value_enum)]
        shell: shell::Shell,
    },
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let (session, payload) = match cli.command {
        Commands::Init { shell } => {
            print!("{}", shell::snippet(shell));
            return;
        }
        Commands::Open(session) => (session, Payload::Open),
        Commands::Close(session) => (session, Payload::Close),
        Commands::Result { session, exit_code } => (session, Payload::Result { exit_code }),
        Commands::Exec {
            session,
            command,
            path,
            shell,
        } => {
            let path = match path.or_else(|| std::env::current_dir().ok()) {
                Some(path) => path.to_string_lossy().into_owned(),
                None => {
                    tracing::warn!("Cannot determine working directory; skipping exec");
                    return;
                }
            };
            (
                session,
                Payload::Exec {
                    command: Some(command),
                    path,
                    shell,
                },
            )
        }
    };

    let notification = Notification {
        session_id: session.pid.unwrap_or_else(get_ppid).to_string(),
        timestamp: Utc::now(),
        payload,
    };

    let Some(pipe_path) = pipe::resolve_path(cli.pipe_path) else {
        tracing::warn!("Cannot determine pipe path");
        return;
    };

    let line = format_line(&notification);
    match pipe::send_line(&pipe_path, &line) {
        Ok(()) => tracing::debug!(
            kind = %notification.kind(),
            session_id = %notification.session_id,
            "Notification sent"
        ),
        Err(pipe::SendError::NoWatcher) => tracing::debug!(
            path = %pipe_path.display(),
            "No watcher listening; notification dropped"
        ),
        Err(err) => tracing::warn!(error = %err, "aw-terminal-hook failed"),
    }
}

fn get_ppid() -> u32 {
    // SAFETY: getppid() has no failure modes and always returns a valid PID.
    #[allow(unsafe_code)]
    let pid = unsafe { libc::getppid() };
    pid as u32
}
