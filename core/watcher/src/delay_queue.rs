//! Timestamp-ordered holding area for notifications.
//!
//! Shell hooks run in the background, so their notifications can reach the
//! pipe slightly out of order. Entries are held until they are older than
//! `now - window` and then released oldest first. The window bounds how much
//! jitter is absorbed; an entry that arrives after a newer one was already
//! released is delivered late and is not re-sorted.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("an entry with timestamp {0} is already queued")]
    DuplicateTimestamp(DateTime<Utc>),
}

#[derive(Debug)]
pub struct DelayQueue<T> {
    entries: BTreeMap<DateTime<Utc>, T>,
}

impl<T> Default for DelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DelayQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Queues `item` under `timestamp`. A colliding timestamp keeps the entry
    /// already queued and rejects the new one.
    pub fn add(&mut self, timestamp: DateTime<Utc>, item: T) -> Result<(), QueueError> {
        if self.entries.contains_key(&timestamp) {
            return Err(QueueError::DuplicateTimestamp(timestamp));
        }
        self.entries.insert(timestamp, item);
        Ok(())
    }

    /// Releases, oldest first, every entry strictly older than `now - window`.
    /// Returns how many entries were handed to `consumer`.
    pub fn drain<F>(&mut self, now: DateTime<Utc>, window: Duration, mut consumer: F) -> usize
    where
        F: FnMut(T),
    {
        let cutoff = now - window;
        let mut released = 0;

        while let Some(entry) = self.entries.first_entry() {
            if *entry.key() >= cutoff {
                break;
            }
            consumer(entry.remove());
            released += 1;
        }

        released
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.entries.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T12:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn releases_out_of_order_arrivals_in_timestamp_order() {
        let t0 = base();
        let mut queue = DelayQueue::new();
        for offset_ms in [300, 100, 500, 0, 200, 400] {
            queue
                .add(t0 + Duration::milliseconds(offset_ms), offset_ms)
                .expect("unique timestamp");
        }

        let mut released = Vec::new();
        let count = queue.drain(t0 + Duration::seconds(10), Duration::seconds(5), |item| {
            released.push(item)
        });

        assert_eq!(count, 6);
        assert_eq!(released, vec![0, 100, 200, 300, 400, 500]);
        assert!(queue.is_empty());
    }

    #[test]
    fn never_releases_entries_inside_the_window() {
        let t0 = base();
        let mut queue = DelayQueue::new();
        queue.add(t0, "old").expect("add old");
        queue
            .add(t0 + Duration::seconds(3), "fresh")
            .expect("add fresh");

        let mut released = Vec::new();
        queue.drain(t0 + Duration::seconds(7), Duration::seconds(5), |item| {
            released.push(item)
        });

        assert_eq!(released, vec!["old"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.oldest(), Some(t0 + Duration::seconds(3)));
    }

    #[test]
    fn entry_exactly_at_the_cutoff_is_held() {
        let t0 = base();
        let mut queue = DelayQueue::new();
        queue.add(t0, ()).expect("add");

        let released = queue.drain(t0 + Duration::seconds(5), Duration::seconds(5), |_| {});
        assert_eq!(released, 0);

        let released = queue.drain(
            t0 + Duration::seconds(5) + Duration::nanoseconds(1),
            Duration::seconds(5),
            |_| {},
        );
        assert_eq!(released, 1);
    }

    #[test]
    fn late_arrival_is_ordered_against_still_queued_entries() {
        let t0 = base();
        let mut queue = DelayQueue::new();
        queue
            .add(t0 + Duration::seconds(2), "result")
            .expect("add result");

        let mut released = Vec::new();
        queue.drain(t0 + Duration::seconds(4), Duration::seconds(5), |item| {
            released.push(item)
        });
        assert!(released.is_empty());

        queue.add(t0, "exec").expect("add late exec");
        queue.drain(t0 + Duration::seconds(8), Duration::seconds(5), |item| {
            released.push(item)
        });
        assert_eq!(released, vec!["exec", "result"]);
    }

    #[test]
    fn duplicate_timestamp_keeps_the_first_entry() {
        let t0 = base();
        let mut queue = DelayQueue::new();
        queue.add(t0, "first").expect("add first");

        let err = queue.add(t0, "second").unwrap_err();
        assert_eq!(err, QueueError::DuplicateTimestamp(t0));

        let mut released = Vec::new();
        queue.drain(t0 + Duration::seconds(6), Duration::seconds(5), |item| {
            released.push(item)
        });
        assert_eq!(released, vec!["first"]);
    }

    #[test]
    fn drain_on_empty_queue_is_a_no_op() {
        let mut queue: DelayQueue<u8> = DelayQueue::new();
        assert_eq!(queue.drain(base(), Duration::seconds(5), |_| {}), 0);
        assert_eq!(queue.oldest(), None);
    }
}
