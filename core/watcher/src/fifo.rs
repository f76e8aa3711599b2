//! Named pipe the shell hooks write into.
//!
//! The read end is opened non-blocking so a poll never waits for a writer;
//! "no writer" and "nothing written yet" both read as an empty batch.

use fs_err as fs;
use std::ffi::CString;
use std::io::{ErrorKind, Read};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use aw_watcher_terminal_protocol::MAX_LINE_BYTES;

const READ_CHUNK_SIZE: usize = 4096;
const MAX_READ_BYTES_PER_POLL: usize = 1024 * 1024;
const PIPE_MODE: libc::mode_t = 0o600;

#[derive(Debug, thiserror::Error)]
pub enum FifoError {
    #[error("Pipe path has no parent: {0}")]
    NoParent(PathBuf),

    #[error("Failed to prepare pipe {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read pipe {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Removes whatever is at `path` and creates a fresh FIFO there.
pub fn setup_named_pipe(path: &Path) -> Result<(), FifoError> {
    let parent = path
        .parent()
        .ok_or_else(|| FifoError::NoParent(path.to_path_buf()))?;
    let setup_err = |source| FifoError::Setup {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(parent).map_err(setup_err)?;

    if fs::symlink_metadata(path).is_ok() {
        debug!(path = %path.display(), "Removing existing pipe");
        fs::remove_file(path).map_err(setup_err)?;
    }

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        setup_err(std::io::Error::new(
            ErrorKind::InvalidInput,
            "path contains a NUL byte",
        ))
    })?;
    // SAFETY: c_path is a valid NUL-terminated string that outlives the call.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), PIPE_MODE) };
    if rc != 0 {
        return Err(setup_err(std::io::Error::last_os_error()));
    }

    Ok(())
}

pub struct FifoReader {
    path: PathBuf,
    file: std::fs::File,
    pending: Vec<u8>,
    /// Set after an oversized line was dropped; bytes up to the next newline
    /// belong to it.
    discarding: bool,
}

impl FifoReader {
    pub fn open(path: &Path) -> Result<Self, FifoError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| FifoError::Setup {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            pending: Vec::new(),
            discarding: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns every complete line currently available. A trailing partial
    /// line is kept until its newline arrives.
    pub fn read_lines(&mut self) -> Result<Vec<String>, FifoError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut read_total = 0usize;

        while read_total < MAX_READ_BYTES_PER_POLL {
            match self.file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    read_total += n;
                    self.pending.extend_from_slice(&chunk[..n]);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(FifoError::Read {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }

        Ok(self.take_lines())
    }

    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(index) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(index + 1);
            let raw = std::mem::replace(&mut self.pending, rest);
            if self.discarding {
                debug!(bytes = index, "Skipped tail of oversized line");
                self.discarding = false;
                continue;
            }
            let line = String::from_utf8_lossy(&raw[..index]);
            let line = line.trim_end_matches('\r');
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }

        if self.discarding {
            self.pending.clear();
        } else if self.pending.len() > MAX_LINE_BYTES {
            warn!(
                bytes = self.pending.len(),
                "Discarding oversized partial line from pipe"
            );
            self.pending.clear();
            self.discarding = true;
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::FileTypeExt;

    fn is_fifo(path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|meta| meta.file_type().is_fifo())
            .unwrap_or(false)
    }

    fn writer(path: &Path) -> std::fs::File {
        std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .expect("open pipe for writing")
    }

    #[test]
    fn setup_replaces_existing_file_with_fifo() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("nested").join("pipe");
        fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        fs::write(&path, "stale").expect("write stale file");

        setup_named_pipe(&path).expect("setup pipe");
        assert!(is_fifo(&path));

        setup_named_pipe(&path).expect("setup pipe again");
        assert!(is_fifo(&path));
    }

    #[test]
    fn read_without_writer_returns_no_lines() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("pipe");
        setup_named_pipe(&path).expect("setup pipe");

        let mut reader = FifoReader::open(&path).expect("open reader");
        assert!(reader.read_lines().expect("read").is_empty());
    }

    #[test]
    fn partial_lines_wait_for_their_newline() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("pipe");
        setup_named_pipe(&path).expect("setup pipe");

        let mut reader = FifoReader::open(&path).expect("open reader");
        let mut writer = writer(&path);

        writer
            .write_all(b"open --pid 1 --time 2026-10-18T12:00:00Z\n\nclose --pid")
            .expect("write");
        let lines = reader.read_lines().expect("read");
        assert_eq!(lines, vec!["open --pid 1 --time 2026-10-18T12:00:00Z"]);

        writer
            .write_all(b" 1 --time 2026-10-18T12:00:01Z\r\n")
            .expect("write rest");
        drop(writer);
        let lines = reader.read_lines().expect("read");
        assert_eq!(lines, vec!["close --pid 1 --time 2026-10-18T12:00:01Z"]);

        assert!(reader.read_lines().expect("read after writer closed").is_empty());
    }

    #[test]
    fn oversized_line_is_dropped_up_to_its_newline() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("pipe");
        setup_named_pipe(&path).expect("setup pipe");

        let mut reader = FifoReader::open(&path).expect("open reader");
        let mut writer = writer(&path);

        // Two chunks so neither write fills the pipe buffer.
        let half = vec![b'x'; MAX_LINE_BYTES / 2 + 1];
        for _ in 0..2 {
            writer.write_all(&half).expect("write oversized head");
            assert!(reader.read_lines().expect("read head").is_empty());
        }

        writer
            .write_all(b"still the same line\nclose --pid 2 --time 2026-10-18T12:00:03Z\n")
            .expect("write tail");
        let lines = reader.read_lines().expect("read tail");
        assert_eq!(lines, vec!["close --pid 2 --time 2026-10-18T12:00:03Z"]);
    }
}
