// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! In-memory log fan-out for live workload streams.
//!
//! One topic per workload. Publish is non-blocking: each topic is a bounded
//! broadcast ring, and a subscriber that falls behind loses the oldest
//! entries only for itself. Durable history is the store's job; the broker
//! trades completeness for bounded-latency delivery.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;
use vulcan_core::WorkloadId;

/// Entries retained per topic before the slowest subscriber starts
/// losing the oldest.
const TOPIC_CAPACITY: usize = 256;

/// One published log entry.
///
/// `seq` is the worker-assigned position in the workload's log history, so
/// consumers can reconcile live entries against persisted lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: u64,
    pub line: String,
}

/// Topic state: a live sender, or `None` once closed.
///
/// Closed topics are kept until `delete` so that subscribers arriving
/// between close and delete observe a clean end-of-stream.
struct Topic {
    tx: Option<broadcast::Sender<LogEntry>>,
}

/// Per-workload log topics with multi-subscriber fan-out.
pub struct LogBroker {
    topics: Mutex<HashMap<WorkloadId, Topic>>,
    capacity: usize,
}

impl LogBroker {
    pub fn new() -> Self {
        Self::with_capacity(TOPIC_CAPACITY)
    }

    /// Custom per-topic ring capacity (tests).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Create the topic for a workload. Idempotent; an existing live topic
    /// is left untouched.
    pub fn create(&self, id: &WorkloadId) {
        let mut topics = self.topics.lock();
        topics.entry(id.clone()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(self.capacity);
            Topic { tx: Some(tx) }
        });
    }

    /// Publish one entry to a topic's live subscribers.
    ///
    /// Never blocks. Publishing to a missing or closed topic is a no-op.
    pub fn publish(&self, id: &WorkloadId, seq: u64, line: &str) {
        let topics = self.topics.lock();
        let Some(tx) = topics.get(id).and_then(|t| t.tx.as_ref()) else {
            debug!(workload_id = %id, "publish to missing or closed topic dropped");
            return;
        };
        // Err means no live subscribers; the entry stays in the ring for
        // subscribers that attach before it is overwritten, which is all
        // broadcast promises anyway.
        let _ = tx.send(LogEntry {
            seq,
            line: line.to_string(),
        });
    }

    /// Subscribe to a topic from this moment on.
    ///
    /// Historical entries are not replayed. Subscribing to a missing,
    /// closed, or deleted topic yields an immediately-ended subscription.
    pub fn subscribe(&self, id: &WorkloadId) -> LogSubscription {
        let topics = self.topics.lock();
        match topics.get(id).and_then(|t| t.tx.as_ref()) {
            Some(tx) => LogSubscription {
                rx: Some(tx.subscribe()),
            },
            None => LogSubscription { rx: None },
        }
    }

    /// Close a topic: no further publishes are accepted, and every
    /// subscriber drains its buffer before observing end-of-stream.
    pub fn close(&self, id: &WorkloadId) {
        let mut topics = self.topics.lock();
        if let Some(topic) = topics.get_mut(id) {
            topic.tx = None;
        }
    }

    /// Release topic state entirely.
    pub fn delete(&self, id: &WorkloadId) {
        let mut topics = self.topics.lock();
        topics.remove(id);
    }
}

impl Default for LogBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of one topic subscription.
///
/// Dropping the subscription unsubscribes.
pub struct LogSubscription {
    rx: Option<broadcast::Receiver<LogEntry>>,
}

impl LogSubscription {
    /// Next entry in publish order, or `None` once the topic is closed and
    /// the buffer drained.
    ///
    /// A subscriber that lagged behind the ring resumes silently at the
    /// oldest retained entry (drop-oldest).
    pub async fn recv(&mut self) -> Option<LogEntry> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(entry) => return Some(entry),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "log subscriber lagged, resuming at oldest retained");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
