//! The polling worker: pipe lines in, ordered notifications out.
//!
//! One thread owns the delay queue and the session machine, so both the
//! ingest path and the drain path run without locks. Each tick reads whatever
//! the pipe holds, queues the parsed notifications and then releases every
//! notification that has aged past the window.

use aw_watcher_terminal_protocol::{parse_line, Notification};
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

use crate::delay_queue::DelayQueue;
use crate::emitter::Emitter;
use crate::fifo::FifoReader;
use crate::session::SessionMachine;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct Watcher<E, C> {
    queue: DelayQueue<Notification>,
    machine: SessionMachine<E>,
    clock: C,
    window: Duration,
}

impl<E: Emitter, C: Clock> Watcher<E, C> {
    pub fn new(machine: SessionMachine<E>, clock: C, window: Duration) -> Self {
        Self {
            queue: DelayQueue::new(),
            machine,
            clock,
            window,
        }
    }

    #[cfg(test)]
    pub fn machine(&self) -> &SessionMachine<E> {
        &self.machine
    }

    #[cfg(test)]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Parses one pipe line and queues it. Malformed lines are logged and
    /// dropped.
    pub fn ingest_line(&mut self, line: &str) {
        let notification = match parse_line(line) {
            Ok(notification) => notification,
            Err(err) if err.is_unknown_kind() => {
                error!(code = %err.code, message = %err.message, "Unknown notification kind");
                return;
            }
            Err(err) => {
                warn!(code = %err.code, message = %err.message, line = %line, "Rejected pipe line");
                return;
            }
        };

        debug!(
            kind = %notification.kind(),
            session_id = %notification.session_id,
            timestamp = %notification.timestamp,
            "Queued notification"
        );

        let timestamp = notification.timestamp;
        if let Err(err) = self.queue.add(timestamp, notification) {
            warn!(error = %err, "Dropping notification with duplicate timestamp");
        }
    }

    /// Hands every notification older than `now - window` to the session
    /// machine, oldest first.
    pub fn flush(&mut self) -> usize {
        let now = self.clock.now();
        let machine = &mut self.machine;
        let released = self.queue.drain(now, self.window, |notification| {
            machine.handle(notification)
        });
        if released > 0 {
            debug!(released, remaining = self.queue.len(), "Released notifications");
        }
        released
    }

    pub fn tick(&mut self, reader: &mut FifoReader) {
        match reader.read_lines() {
            Ok(lines) => {
                for line in lines {
                    self.ingest_line(&line);
                }
            }
            Err(err) => error!(error = %err, "Failed to read pipe"),
        }
        self.flush();
    }

    /// Polls until `stop` is set. Notifications still queued at shutdown are
    /// discarded.
    pub fn run(
        &mut self,
        reader: &mut FifoReader,
        poll_interval: std::time::Duration,
        stop: &AtomicBool,
    ) {
        info!(
            path = %reader.path().display(),
            window_ms = self.window.num_milliseconds(),
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Listening to pipe"
        );

        while !stop.load(Ordering::SeqCst) {
            self.tick(reader);
            thread::sleep(poll_interval);
        }

        if !self.queue.is_empty() {
            warn!(
                discarded = self.queue.len(),
                oldest = ?self.queue.oldest(),
                "Shutting down with unreleased notifications"
            );
        }
        info!(sessions = self.machine.sessions().len(), "Watcher stopped");
    }
}
