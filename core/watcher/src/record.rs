use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::emitter::Event;

pub const UNKNOWN_EXIT_CODE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandData {
    pub command: Option<String>,
    pub path: String,
    pub shell: Option<String>,
    pub exit_code: String,
}

/// One command run in a terminal session, as stored in the commands bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub duration: Option<Duration>,
    pub data: CommandData,
}

impl ActivityRecord {
    pub fn started(
        timestamp: DateTime<Utc>,
        command: Option<String>,
        path: String,
        shell: Option<String>,
    ) -> Self {
        Self {
            id: None,
            timestamp,
            duration: None,
            data: CommandData {
                command,
                path,
                shell,
                exit_code: UNKNOWN_EXIT_CODE.to_string(),
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns the finalized copy of this record. A result stamped before the
    /// command started yields a zero duration; a result without an exit code
    /// keeps `"unknown"`.
    pub fn finished(&self, finished_at: DateTime<Utc>, exit_code: Option<i32>) -> Self {
        let elapsed = finished_at - self.timestamp;
        let mut record = self.clone();
        record.duration = Some(elapsed.max(Duration::zero()));
        if let Some(exit_code) = exit_code {
            record.data.exit_code = exit_code.to_string();
        }
        record
    }

    pub fn to_event(&self) -> Event {
        Event {
            id: self.id,
            timestamp: self.timestamp,
            duration: self.duration.map(duration_secs).unwrap_or(0.0),
            data: serde_json::json!({
                "command": self.data.command,
                "path": self.data.path,
                "shell": self.data.shell,
                "exit_code": self.data.exit_code,
            }),
        }
    }
}

fn duration_secs(duration: Duration) -> f64 {
    match duration.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => duration.num_seconds() as f64,
    }
}
