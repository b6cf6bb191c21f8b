//! Endpoint and tuning parameters for the delivery worker.

use std::fmt;
use std::time::Duration;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;
use crate::timeout::TimeoutPolicy;

/// Collection endpoint, relative to the configured domain.
pub const CDR_PATH: &str = "/api/v1/monitor/cdr/";
/// Device registration endpoint, relative to the configured domain.
pub const LINK_DEVICE_PATH: &str = "/api/v1/monitor/cdr/link-device/";

/// Default timeout for establishing connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Floor applied to per-request timeouts.
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
/// Longest response body quoted in a log line.
pub const BODY_LOG_LIMIT: usize = 512;

pub const DEFAULT_BATCH_THRESHOLD: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Join a domain and an absolute path without doubling the slash.
pub fn endpoint(domain: &str, path: &str) -> String {
    format!("{}{}", domain.trim_end_matches('/'), path)
}

/// When and how records are grouped into array posts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Queue depth above which the worker switches to batches.
    pub threshold: usize,
    /// Maximum records per batch.
    pub size: usize,
    /// Request timeout for a batch post.
    pub timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_BATCH_THRESHOLD,
            size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }
}

/// Everything the worker needs to talk to the collection API.
#[derive(Clone)]
pub struct DeliveryConfig {
    /// Full URL records are posted to.
    pub url: String,
    pub token: String,
    pub connect_timeout: Duration,
    /// Retry pacing; the current delay doubles as the request timeout.
    pub timeout: TimeoutPolicy,
    /// `None` disables batching.
    pub batch: Option<BatchConfig>,
    pub warn_interval: Duration,
}

impl DeliveryConfig {
    /// Configuration posting to `domain` with default tuning.
    pub fn for_domain(domain: &str, token: impl Into<String>) -> Self {
        Self {
            url: endpoint(domain, CDR_PATH),
            token: token.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: TimeoutPolicy::default(),
            batch: Some(BatchConfig::default()),
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}

impl fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .field("batch", &self.batch)
            .field("warn_interval", &self.warn_interval)
            .finish()
    }
}
