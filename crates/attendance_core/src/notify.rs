//! crates/attendance_core/src/notify.rs
//!
//! In-process fan-out of newly stored attendance records to live observers
//! (the teacher dashboard), keyed by session id.
//!
//! Storage adapters feed this channel from their insert path, so records reach
//! subscribers in insertion order. Delivery is best-effort: a subscriber that
//! falls behind is told how many records it missed and is expected to re-fetch
//! the full list rather than wait for a backfill.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::AttendanceRecord;

pub const DEFAULT_BUFFER: usize = 256;

/// One item delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Record(AttendanceRecord),
    /// The subscriber lagged and `n` records were dropped for it.
    Missed(u64),
}

#[derive(Clone)]
pub struct NotificationChannel {
    topics: Arc<DashMap<Uuid, broadcast::Sender<AttendanceRecord>>>,
    buffer: usize,
}

impl NotificationChannel {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// `buffer` is the per-session number of undelivered records kept for a slow
    /// subscriber before it starts missing them.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self, session_id: Uuid) -> Subscription {
        let receiver = self
            .topics
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe();
        debug!("New subscriber for session {}", session_id);
        Subscription {
            session_id,
            receiver,
            topics: self.topics.clone(),
        }
    }

    /// Delivers `record` to every current subscriber of its session and returns
    /// how many there were.
    pub fn publish(&self, record: &AttendanceRecord) -> usize {
        let delivered = match self.topics.get(&record.session_id) {
            Some(sender) => sender.send(record.clone()).unwrap_or(0),
            None => 0,
        };
        if delivered == 0 {
            // Nobody is listening any more; drop the topic.
            self.topics
                .remove_if(&record.session_id, |_, sender| sender.receiver_count() == 0);
        }
        delivered
    }

    /// Number of sessions that currently have a live topic.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self, session_id: Uuid) -> usize {
        self.topics
            .get(&session_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// A live feed of one session's new attendance records. Dropping it unsubscribes.
pub struct Subscription {
    session_id: Uuid,
    receiver: broadcast::Receiver<AttendanceRecord>,
    topics: Arc<DashMap<Uuid, broadcast::Sender<AttendanceRecord>>>,
}

impl Subscription {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Waits for the next notification. `None` once the channel is gone.
    pub async fn next(&mut self) -> Option<Notification> {
        match self.receiver.recv().await {
            Ok(record) => Some(Notification::Record(record)),
            Err(RecvError::Lagged(missed)) => {
                warn!(
                    "Subscriber of session {} lagged, {} records missed",
                    self.session_id, missed
                );
                Some(Notification::Missed(missed))
            }
            Err(RecvError::Closed) => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Our receiver is still counted here; the last one out removes the topic.
        self.topics
            .remove_if(&self.session_id, |_, sender| sender.receiver_count() <= 1);
    }
}
