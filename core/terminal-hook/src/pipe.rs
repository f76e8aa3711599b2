//! Write side of the watcher's named pipe.

use aw_watcher_terminal_protocol::{default_pipe_path, PIPE_ENV};
use std::env;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SendError {
    /// The pipe is missing or nobody has it open for reading.
    #[error("No watcher is reading the pipe")]
    NoWatcher,

    #[error("Line is {0} bytes, over the atomic pipe write limit")]
    TooLong(usize),

    /// The watcher is not draining the pipe; nothing was written.
    #[error("Pipe is full")]
    Full,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Explicit flag first, then `$AW_WATCHER_TERMINAL_PIPE`, then the shared
/// default location.
pub fn resolve_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| {
            env::var_os(PIPE_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
        .or_else(default_pipe_path)
}

/// Writes `line` plus a newline in one `write` of at most `PIPE_BUF` bytes.
/// The kernel makes such writes atomic: the whole line lands in the pipe or
/// none of it does, so concurrent hooks never interleave or tear lines.
pub fn send_line(path: &Path, line: &str) -> Result<(), SendError> {
    let mut payload = Vec::with_capacity(line.len() + 1);
    payload.extend_from_slice(line.as_bytes());
    payload.push(b'\n');
    if payload.len() > libc::PIPE_BUF {
        return Err(SendError::TooLong(payload.len()));
    }

    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
    {
        Ok(file) => file,
        Err(err) if is_no_watcher(&err) => return Err(SendError::NoWatcher),
        Err(err) => return Err(SendError::Io(err)),
    };

    match file.write(&payload) {
        Ok(written) if written == payload.len() => Ok(()),
        Ok(written) => Err(SendError::Io(std::io::Error::new(
            ErrorKind::WriteZero,
            format!("short write of {} of {} bytes", written, payload.len()),
        ))),
        Err(err) if err.kind() == ErrorKind::WouldBlock => Err(SendError::Full),
        Err(err) => Err(SendError::Io(err)),
    }
}

fn is_no_watcher(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENXIO) | Some(libc::ENOENT))
}
