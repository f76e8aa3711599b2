//! Per-session state machine.
//!
//! ```text
//! (no entry) ──open/exec/result──▶ idle ──exec──▶ running
//!                                   ▲               │
//!                                   └────result─────┘
//! any state ──close──▶ entry removed (a running command stays "unknown")
//! ```
//!
//! Notifications must arrive in timestamp order per session; the delay queue
//! guarantees that within its window. A second `exec` while running abandons
//! the earlier command, and a `result` while idle is dropped.

use aw_watcher_terminal_protocol::{Notification, Payload};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::emitter::{EmitError, Emitter, Event};
use crate::record::ActivityRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: String,
    pub pending_command: Option<ActivityRecord>,
}

impl SessionState {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            pending_command: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, SessionState>,
}

impl SessionTable {
    pub fn ensure(&mut self, session_id: &str) -> &mut SessionState {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id = %session_id, "Session created");
                SessionState::new(session_id)
            })
    }

    pub fn remove(&mut self, session_id: &str) -> Option<SessionState> {
        self.sessions.remove(session_id)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut SessionState> {
        self.sessions.get_mut(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
impl SessionTable {
    pub fn get(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketIds {
    pub commands: String,
    pub activity: String,
}

pub struct SessionMachine<E> {
    sessions: SessionTable,
    emitter: E,
    buckets: BucketIds,
    pulsetime: Duration,
}

impl<E: Emitter> SessionMachine<E> {
    pub fn new(emitter: E, buckets: BucketIds, pulsetime: Duration) -> Self {
        Self {
            sessions: SessionTable::default(),
            emitter,
            buckets,
            pulsetime,
        }
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    #[cfg(test)]
    pub fn emitter(&self) -> &E {
        &self.emitter
    }

    pub fn handle(&mut self, notification: Notification) {
        let Notification {
            session_id,
            timestamp,
            payload,
        } = notification;

        match payload {
            Payload::Open => {
                debug!(session_id = %session_id, "open");
                self.sessions.ensure(&session_id);
            }
            Payload::Exec {
                command,
                path,
                shell,
            } => {
                debug!(session_id = %session_id, command = ?command, "exec");
                let record = ActivityRecord::started(timestamp, command, path, shell);
                self.on_exec(&session_id, record);
            }
            Payload::Result { exit_code } => {
                debug!(session_id = %session_id, exit_code = ?exit_code, "result");
                self.on_result(&session_id, timestamp, exit_code);
            }
            Payload::Close => {
                debug!(session_id = %session_id, "close");
                match self.sessions.remove(&session_id) {
                    Some(state) => {
                        if let Some(pending) = state.pending_command {
                            info!(
                                session_id = %session_id,
                                record_id = ?pending.id,
                                command = ?pending.data.command,
                                "Session closed with a command still running"
                            );
                        }
                    }
                    None => debug!(session_id = %session_id, "Close for unknown session"),
                }
            }
        }
    }

    fn on_exec(&mut self, session_id: &str, record: ActivityRecord) {
        self.sessions.ensure(session_id);

        let inserted = match self.insert(&record) {
            Ok(id) => record.with_id(id),
            Err(err) => {
                error!(
                    session_id = %session_id,
                    error = %err,
                    "Failed to send command event"
                );
                return;
            }
        };
        info!(
            session_id = %session_id,
            record_id = ?inserted.id,
            "Command event sent"
        );
        self.send_heartbeat(session_id, &inserted, inserted.timestamp);

        let state = self.sessions.ensure(session_id);
        if let Some(abandoned) = state.pending_command.replace(inserted) {
            debug!(
                session_id = %session_id,
                record_id = ?abandoned.id,
                command = ?abandoned.data.command,
                "Abandoned command without result"
            );
        }
    }

    fn on_result(
        &mut self,
        session_id: &str,
        finished_at: DateTime<Utc>,
        exit_code: Option<i32>,
    ) {
        let pending = match &self.sessions.ensure(session_id).pending_command {
            Some(pending) => pending.clone(),
            None => {
                debug!(session_id = %session_id, "Result without a pending command");
                return;
            }
        };

        if finished_at < pending.timestamp {
            warn!(
                session_id = %session_id,
                started_at = %pending.timestamp,
                finished_at = %finished_at,
                "Result stamped before its command; duration clamped to zero"
            );
        }

        let finished = pending.finished(finished_at, exit_code);
        if let Err(err) = self.insert(&finished) {
            error!(
                session_id = %session_id,
                record_id = ?finished.id,
                error = %err,
                "Failed to update command event"
            );
            return;
        }
        info!(
            session_id = %session_id,
            record_id = ?finished.id,
            exit_code = ?exit_code,
            "Command event updated"
        );
        self.send_heartbeat(session_id, &finished, finished_at);

        if let Some(state) = self.sessions.get_mut(session_id) {
            state.pending_command = None;
        }
    }

    fn insert(&self, record: &ActivityRecord) -> Result<i64, EmitError> {
        let stored = self
            .emitter
            .insert_event(&self.buckets.commands, &record.to_event())?;
        stored.id.ok_or(EmitError::MissingId)
    }

    fn send_heartbeat(&self, session_id: &str, record: &ActivityRecord, at: DateTime<Utc>) {
        let event = Event {
            id: None,
            timestamp: at,
            duration: 0.0,
            data: serde_json::json!({
                "path": record.data.path,
                "shell": record.data.shell,
            }),
        };
        let pulsetime = self.pulsetime.num_milliseconds() as f64 / 1000.0;
        if let Err(err) = self
            .emitter
            .heartbeat(&self.buckets.activity, &event, pulsetime)
        {
            warn!(
                session_id = %session_id,
                error = %err,
                "Failed to send activity heartbeat"
            );
        }
    }
}
