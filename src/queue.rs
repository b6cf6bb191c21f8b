//! Bounded FIFO between a call source and the delivery worker.
//!
//! [`BoundedQueue`] is a cloneable handle around a bounded `crossbeam-channel`.
//! The producer pushes through [`RecordSink`]; the delivery worker pops, and
//! also re-queues failed records at the tail. Because the handle keeps both
//! channel ends alive, the channel never disconnects while a handle exists.
//!
//! A push never blocks indefinitely: the [`OverflowPolicy`] either drops the
//! record straight away or waits a bounded time for capacity. Incoming
//! presence events are always pushed without waiting.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{
    Receiver, SendTimeoutError, Sender, TrySendError, bounded, select,
};
use log::{debug, warn};
use thiserror::Error;

use crate::call_record::CallRecord;
use crate::rate_limited_warner::RateLimitedWarner;
use crate::shutdown::ShutdownSignal;
use crate::source::RecordSink;

/// Default number of records buffered per queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
/// Default wait for capacity before a record is dropped.
pub const DEFAULT_OVERFLOW_TIMEOUT: Duration = Duration::from_secs(5);

/// Determines how a push reacts when the queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the new record immediately.
    Drop,
    /// Wait up to the given duration for capacity, then drop.
    Timeout(Duration),
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        Self::Timeout(DEFAULT_OVERFLOW_TIMEOUT)
    }
}

/// Reasons a record could not be queued. The record is dropped in each case.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue stayed full for {0:?}")]
    TimedOut(Duration),
    #[error("queue is closed")]
    Closed,
}

/// Cloneable handle to a bounded record queue.
#[derive(Clone)]
pub struct BoundedQueue {
    tx: Sender<CallRecord>,
    rx: Receiver<CallRecord>,
    capacity: usize,
    policy: OverflowPolicy,
    warner: Arc<RateLimitedWarner>,
}

impl BoundedQueue {
    /// Create a queue holding at most `capacity` records (minimum one).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            policy,
            warner: Arc::new(RateLimitedWarner::default()),
        }
    }

    /// Replace the warner used for drop notifications.
    pub fn with_warner(mut self, warner: RateLimitedWarner) -> Self {
        self.warner = Arc::new(warner);
        self
    }

    /// Maximum number of buffered records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Behaviour applied when the queue is full.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Records currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no record is buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Queue a record according to the overflow policy.
    pub fn push(&self, record: CallRecord) -> Result<(), QueueError> {
        if record.call_type().is_incoming() {
            return self.try_push(record);
        }
        match self.policy {
            OverflowPolicy::Drop => self.try_push(record),
            OverflowPolicy::Timeout(wait) => match self.tx.send_timeout(record, wait) {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(record)) => {
                    self.note_drop(&record, "stayed full");
                    Err(QueueError::TimedOut(wait))
                }
                Err(SendTimeoutError::Disconnected(record)) => {
                    self.note_drop(&record, "closed");
                    Err(QueueError::Closed)
                }
            },
        }
    }

    /// Queue a record without waiting; a full queue drops it.
    pub fn try_push(&self, record: CallRecord) -> Result<(), QueueError> {
        match self.tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(record)) => {
                self.note_drop(&record, "full");
                Err(QueueError::Full)
            }
            Err(TrySendError::Disconnected(record)) => {
                self.note_drop(&record, "closed");
                Err(QueueError::Closed)
            }
        }
    }

    /// Block until a record arrives or shutdown fires.
    pub fn pop(&self, shutdown: &ShutdownSignal) -> Option<CallRecord> {
        if shutdown.is_triggered() {
            return None;
        }
        select! {
            recv(self.rx) -> record => record.ok(),
            recv(shutdown.receiver()) -> _ => None,
        }
    }

    /// Take the head record if one is waiting.
    pub fn try_pop(&self) -> Option<CallRecord> {
        self.rx.try_recv().ok()
    }

    /// Remove up to `max` records from the head without blocking.
    pub fn drain(&self, max: usize) -> Vec<CallRecord> {
        self.rx.try_iter().take(max).collect()
    }

    /// Emit any drop warnings still held back by the rate limiter.
    pub fn flush_warnings(&self) {
        self.warner.flush(|count| {
            warn!("BoundedQueue dropped {count} records in the last interval");
        });
    }

    fn note_drop(&self, record: &CallRecord, reason: &str) {
        debug!("BoundedQueue {reason}; dropping {record}");
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("BoundedQueue {reason}; dropped {count} records");
        });
    }
}

impl RecordSink for BoundedQueue {
    fn push(&self, record: CallRecord) -> Result<(), QueueError> {
        BoundedQueue::push(self, record)
    }
}

impl std::fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("policy", &self.policy)
            .finish()
    }
}
