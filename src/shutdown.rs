//! Process-wide cooperative shutdown signal.
//!
//! The signal is a `crossbeam-channel` whose only sender is dropped when
//! shutdown is requested. Every blocking loop either polls
//! [`ShutdownSignal::is_triggered`], sleeps through
//! [`ShutdownSignal::wait_timeout`], or selects on
//! [`ShutdownSignal::receiver`] alongside its own channel, so a trigger wakes
//! all of them at once.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use parking_lot::Mutex;

struct Inner {
    trigger: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

/// Cloneable, set-once cancellation token.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            inner: Arc::new(Inner {
                trigger: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    /// Request shutdown. Subsequent calls are no-ops.
    pub fn trigger(&self) {
        self.inner.trigger.lock().take();
    }

    /// Whether [`trigger`](Self::trigger) has been called on any clone.
    pub fn is_triggered(&self) -> bool {
        matches!(self.inner.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `timeout` unless shutdown fires first.
    ///
    /// Returns `true` when the wait ended because of shutdown.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) | Ok(()) => true,
        }
    }

    /// Receiver that becomes disconnected on shutdown, for use in `select!`.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.rx
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
