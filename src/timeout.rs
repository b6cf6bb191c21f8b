//! Exponential timeout decay shared by every network-facing loop.
//!
//! [`TimeoutController`] holds a whole-second delay that starts at the
//! configured base, grows by `decay` after every [`Backoff::sleep`] (truncated
//! to whole seconds) and is capped at `max`. A success calls
//! [`Backoff::reset`]. The current value doubles as the request timeout for
//! the delivery worker.
//!
//! Each loop owns its own controller; controllers are never shared.

use std::time::Duration;

use crate::shutdown::ShutdownSignal;

/// Default initial delay in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3;
/// Default growth factor applied after each failure.
pub const DEFAULT_TIMEOUT_DECAY: f64 = 1.5;
/// Default upper bound in seconds.
pub const DEFAULT_MAX_TIMEOUT_SECS: u64 = 300;
/// Shortest wait honoured for a server-directed delay such as `Retry-After: 0`.
pub const MIN_DIRECTED_DELAY: Duration = Duration::from_secs(1);

/// Parameters of the decay curve.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeoutPolicy {
    pub base: u64,
    pub max: u64,
    pub decay: f64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_TIMEOUT_SECS,
            max: DEFAULT_MAX_TIMEOUT_SECS,
            decay: DEFAULT_TIMEOUT_DECAY,
        }
    }
}

/// Retry pacing used by the delivery worker and the registration client.
pub trait Backoff: Send {
    /// Delay that the next [`sleep`](Self::sleep) will wait.
    fn current(&self) -> Duration;

    /// Wait for the current delay, then grow it.
    ///
    /// Returns `false` if shutdown interrupted the wait.
    fn sleep(&mut self, shutdown: &ShutdownSignal) -> bool;

    /// Wait for a server-directed delay without touching the decay state.
    fn sleep_for(&mut self, delay: Duration, shutdown: &ShutdownSignal) -> bool;

    /// Return to the base delay after a success.
    fn reset(&mut self);
}

/// Stateful whole-second exponential backoff.
#[derive(Clone, Debug)]
pub struct TimeoutController {
    policy: TimeoutPolicy,
    current: u64,
}

impl TimeoutController {
    /// Create a controller from `policy`.
    ///
    /// A `max` below `base` is raised to `base` so that
    /// `base <= current <= max` always holds.
    pub fn new(mut policy: TimeoutPolicy) -> Self {
        policy.max = policy.max.max(policy.base);
        Self {
            current: policy.base,
            policy,
        }
    }

    /// Decay parameters, with `max` already raised to at least `base`.
    pub fn policy(&self) -> &TimeoutPolicy {
        &self.policy
    }

    /// Current delay in whole seconds.
    pub fn current_secs(&self) -> u64 {
        self.current
    }

    /// Apply one decay step without sleeping and return the new delay.
    pub fn advance(&mut self) -> u64 {
        let grown = (self.current as f64 * self.policy.decay) as u64;
        self.current = grown.clamp(self.policy.base, self.policy.max);
        self.current
    }

    /// Server-directed delay clamped to `[MIN_DIRECTED_DELAY, max]`.
    fn directed_delay(&self, delay: Duration) -> Duration {
        let ceiling = Duration::from_secs(self.policy.max).max(MIN_DIRECTED_DELAY);
        delay.clamp(MIN_DIRECTED_DELAY, ceiling)
    }
}

impl Default for TimeoutController {
    fn default() -> Self {
        Self::new(TimeoutPolicy::default())
    }
}

impl Backoff for TimeoutController {
    fn current(&self) -> Duration {
        Duration::from_secs(self.current)
    }

    fn sleep(&mut self, shutdown: &ShutdownSignal) -> bool {
        let interrupted = shutdown.wait_timeout(self.current());
        self.advance();
        !interrupted
    }

    fn sleep_for(&mut self, delay: Duration, shutdown: &ShutdownSignal) -> bool {
        !shutdown.wait_timeout(self.directed_delay(delay))
    }

    fn reset(&mut self) {
        self.current = self.policy.base;
    }
}
