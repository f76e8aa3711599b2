//! Pipe protocol types and validation for aw-watcher-terminal.
//!
//! This crate is shared by the watcher and the shell hook to prevent schema
//! drift. The watcher remains the authority on validation, but the hook reuses
//! the same types and formatter to produce lines the watcher will accept.
//!
//! ## Line format
//!
//! One notification per line, written in command-line style:
//!
//! ```text
//! open   --pid 4242 --time 2026-10-18T12:00:00.000000001Z
//! exec   --pid 4242 --time 2026-10-18T12:00:01Z --path /home/me --shell zsh --command 'ls -la'
//! result --pid 4242 --time 2026-10-18T12:00:03Z --exit-code 0
//! close  --pid 4242 --time 2026-10-18T12:05:00Z
//! ```
//!
//! The legacy hook names `preopen`, `preexec`, `precmd` and `preclose` are
//! accepted as aliases.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

mod line;

pub use line::{format_line, parse_line};

pub const MAX_LINE_BYTES: usize = 64 * 1024;
pub const PIPE_ENV: &str = "AW_WATCHER_TERMINAL_PIPE";
pub const PIPE_FILE_NAME: &str = "aw-watcher-terminal-fifo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Open,
    Exec,
    Result,
    Close,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Open => "open",
            NotificationKind::Exec => "exec",
            NotificationKind::Result => "result",
            NotificationKind::Close => "close",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "open" | "preopen" => Some(NotificationKind::Open),
            "exec" | "preexec" => Some(NotificationKind::Exec),
            "result" | "precmd" => Some(NotificationKind::Result),
            "close" | "preclose" => Some(NotificationKind::Close),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Open,
    Exec {
        command: Option<String>,
        path: String,
        shell: Option<String>,
    },
    /// `exit_code` is absent when the shell did not report one.
    Result {
        exit_code: Option<i32>,
    },
    Close,
}

/// A validated lifecycle notification from one shell process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self.payload {
            Payload::Open => NotificationKind::Open,
            Payload::Exec { .. } => NotificationKind::Exec,
            Payload::Result { .. } => NotificationKind::Result,
            Payload::Close => NotificationKind::Close,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub code: String,
    pub message: String,
}

impl ParseError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn is_unknown_kind(&self) -> bool {
        self.code == "unknown_kind"
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Default location of the named pipe, shared by the watcher and the hook.
pub fn default_pipe_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| {
        dir.join("activitywatch")
            .join("aw-watcher-terminal")
            .join(PIPE_FILE_NAME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_accept_legacy_aliases() {
        assert_eq!(
            NotificationKind::from_name("preexec"),
            Some(NotificationKind::Exec)
        );
        assert_eq!(
            NotificationKind::from_name("precmd"),
            Some(NotificationKind::Result)
        );
        assert_eq!(NotificationKind::from_name("resize"), None);
    }

    #[test]
    fn notification_reports_kind_from_payload() {
        let notification = Notification {
            session_id: "4242".to_string(),
            timestamp: Utc::now(),
            payload: Payload::Result { exit_code: Some(1) },
        };
        assert_eq!(notification.kind(), NotificationKind::Result);
        assert_eq!(notification.kind().to_string(), "result");
    }
}
