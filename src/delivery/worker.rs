//! Consumer loop posting queued records to the collection API.
//!
//! The worker pops one record at a time, or a batch when the queue backs up,
//! and posts it with a per-request timeout taken from its [`Backoff`]. Each
//! response is classified:
//!
//! | Status                 | Class            | Action                              |
//! |------------------------|------------------|-------------------------------------|
//! | 2xx                    | `Success`        | reset backoff                       |
//! | 401, 402, 403          | `Revoked`        | stop; [`DeliveryError::Revoked`]    |
//! | 404, 408, 5xx, network | `Retryable`      | re-queue at the tail, sleep         |
//! | 429                    | `RateLimited`    | re-queue, sleep `Retry-After` or decay |
//! | anything else          | `Permanent`      | log and drop                        |
//!
//! Incoming presence events are never re-queued: a late ringing event is
//! worthless.

use std::time::Duration;

use log::{debug, error, info, warn};
use thiserror::Error;
use ureq::Agent;

use crate::call_record::{CallRecord, serialise_batch, serialise_record};
use crate::queue::BoundedQueue;
use crate::rate_limited_warner::RateLimitedWarner;
use crate::shutdown::ShutdownSignal;
use crate::timeout::{Backoff, TimeoutController};

use super::agent::build_agent;
use super::config::{BODY_LOG_LIMIT, DeliveryConfig, MIN_REQUEST_TIMEOUT};

/// Classification of an HTTP status for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// The token is no longer accepted.
    Revoked,
    Retryable,
    /// Retryable, honouring `Retry-After` when present.
    RateLimited,
    Permanent,
}

/// Classify an HTTP status code.
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        401..=403 => ResponseClass::Revoked,
        429 => ResponseClass::RateLimited,
        404 | 408 | 500..=599 => ResponseClass::Retryable,
        _ => ResponseClass::Permanent,
    }
}

/// What happened to the records handed to one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the server.
    Delivered,
    /// Failed transiently; at least one record went back onto the queue.
    Requeued,
    /// Failed transiently; nothing could be re-queued.
    Discarded,
    /// Rejected permanently or unserialisable.
    Dropped,
}

/// Conditions that stop the worker.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("server rejected the device token (HTTP {status})")]
    Revoked { status: u16 },
    #[error("failed to initialise TLS: {0}")]
    Tls(#[from] native_tls::Error),
}

/// Result of a single POST.
enum Attempt {
    Response {
        status: u16,
        retry_after: Option<Duration>,
        body: String,
    },
    Transport(String),
}

impl Attempt {
    fn from_response(status: u16, response: ureq::Response) -> Self {
        let retry_after = response
            .header("Retry-After")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .into_string()
            .map(|body| body.chars().take(BODY_LOG_LIMIT).collect())
            .unwrap_or_default();
        Self::Response {
            status,
            retry_after,
            body,
        }
    }
}

/// Queue consumer posting records until shutdown or token revocation.
pub struct DeliveryWorker<B: Backoff = TimeoutController> {
    config: DeliveryConfig,
    agent: Agent,
    queue: BoundedQueue,
    backoff: B,
    shutdown: ShutdownSignal,
    warner: RateLimitedWarner,
}

impl DeliveryWorker<TimeoutController> {
    /// Build a worker with its own agent and a [`TimeoutController`] from `config`.
    pub fn new(
        config: DeliveryConfig,
        queue: BoundedQueue,
        shutdown: ShutdownSignal,
    ) -> Result<Self, DeliveryError> {
        let agent = build_agent(config.connect_timeout)?;
        let backoff = TimeoutController::new(config.timeout.clone());
        let warner = RateLimitedWarner::new(config.warn_interval);
        Ok(Self {
            config,
            agent,
            queue,
            backoff,
            shutdown,
            warner,
        })
    }
}

impl<B: Backoff> DeliveryWorker<B> {
    /// Swap the retry pacing, e.g. for a recording double in tests.
    pub fn with_backoff<N: Backoff>(self, backoff: N) -> DeliveryWorker<N> {
        DeliveryWorker {
            config: self.config,
            agent: self.agent,
            queue: self.queue,
            backoff,
            shutdown: self.shutdown,
            warner: self.warner,
        }
    }

    /// Retry pacing in use.
    pub fn backoff(&self) -> &B {
        &self.backoff
    }

    /// Endpoint, token and timeouts of this worker.
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Run until shutdown or until the token is revoked.
    pub fn run(&mut self) -> Result<(), DeliveryError> {
        info!("DeliveryWorker posting to {}", self.config.url);
        let result = loop {
            if self.shutdown.is_triggered() {
                break Ok(());
            }
            match self.poll_once() {
                Ok(Some(_)) => {}
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.queue.flush_warnings();
        self.warner.flush(|count| {
            warn!("DeliveryWorker dropped {count} records");
        });
        info!("DeliveryWorker stopped");
        result
    }

    /// Take the next record or batch off the queue and deliver it.
    ///
    /// Blocks until work arrives; returns `Ok(None)` on shutdown.
    pub fn poll_once(&mut self) -> Result<Option<Delivery>, DeliveryError> {
        if let Some(batch) = self.config.batch
            && self.queue.len() > batch.threshold
        {
            let records = self.queue.drain(batch.size);
            return self.deliver_batch(records).map(Some);
        }
        match self.queue.pop(&self.shutdown) {
            Some(record) => self.deliver_one(record).map(Some),
            None => Ok(None),
        }
    }

    /// POST a single record.
    pub fn deliver_one(&mut self, record: CallRecord) -> Result<Delivery, DeliveryError> {
        let payload = match serialise_record(&record) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("DeliveryWorker could not serialise {record}: {err}");
                self.note_drop();
                return Ok(Delivery::Dropped);
            }
        };
        let timeout = self.request_timeout();
        self.dispatch(&payload, vec![record], timeout)
    }

    /// POST records as one JSON array. Incoming events are discarded first.
    pub fn deliver_batch(&mut self, records: Vec<CallRecord>) -> Result<Delivery, DeliveryError> {
        let total = records.len();
        let records: Vec<CallRecord> = records
            .into_iter()
            .filter(|record| !record.call_type().is_incoming())
            .collect();
        if records.len() < total {
            debug!(
                "DeliveryWorker discarded {} incoming events from batch",
                total - records.len()
            );
        }
        if records.is_empty() {
            return Ok(Delivery::Discarded);
        }
        let payload = match serialise_batch(&records) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    "DeliveryWorker could not serialise batch of {}: {err}",
                    records.len()
                );
                self.note_drop();
                return Ok(Delivery::Dropped);
            }
        };
        let timeout = self
            .config
            .batch
            .map_or(MIN_REQUEST_TIMEOUT, |batch| batch.timeout)
            .max(self.request_timeout());
        self.dispatch(&payload, records, timeout)
    }

    fn request_timeout(&self) -> Duration {
        self.backoff.current().max(MIN_REQUEST_TIMEOUT)
    }

    fn post(&self, payload: &str, timeout: Duration) -> Attempt {
        let result = self
            .agent
            .post(&self.config.url)
            .timeout(timeout)
            .set("Authorization", &format!("Token {}", self.config.token))
            .set("Content-Type", "application/json")
            .send_string(payload);
        match result {
            Ok(response) => Attempt::from_response(response.status(), response),
            Err(ureq::Error::Status(status, response)) => Attempt::from_response(status, response),
            Err(ureq::Error::Transport(err)) => Attempt::Transport(err.to_string()),
        }
    }

    fn dispatch(
        &mut self,
        payload: &str,
        records: Vec<CallRecord>,
        timeout: Duration,
    ) -> Result<Delivery, DeliveryError> {
        let subject = describe(&records);
        let (status, retry_after, body) = match self.post(payload, timeout) {
            Attempt::Transport(err) => {
                warn!("DeliveryWorker request failed: {err}; {subject}");
                let outcome = self.requeue(records);
                self.backoff.sleep(&self.shutdown);
                return Ok(outcome);
            }
            Attempt::Response {
                status,
                retry_after,
                body,
            } => (status, retry_after, body),
        };

        match classify_status(status) {
            ResponseClass::Success => {
                debug!("DeliveryWorker delivered {subject} (HTTP {status})");
                self.backoff.reset();
                Ok(Delivery::Delivered)
            }
            ResponseClass::Revoked => {
                error!("DeliveryWorker token rejected (HTTP {status}): {body}");
                Err(DeliveryError::Revoked { status })
            }
            ResponseClass::Retryable => {
                warn!("DeliveryWorker server returned HTTP {status}: {body}; {subject}");
                let outcome = self.requeue(records);
                self.backoff.sleep(&self.shutdown);
                Ok(outcome)
            }
            ResponseClass::RateLimited => {
                warn!("DeliveryWorker rate limited (HTTP {status}): {body}; {subject}");
                let outcome = self.requeue(records);
                match retry_after {
                    Some(delay) => self.backoff.sleep_for(delay, &self.shutdown),
                    None => self.backoff.sleep(&self.shutdown),
                };
                Ok(outcome)
            }
            ResponseClass::Permanent => {
                warn!("DeliveryWorker dropping {subject} after HTTP {status}: {body}");
                self.note_drop();
                Ok(Delivery::Dropped)
            }
        }
    }

    /// Put retryable records back at the tail without blocking.
    fn requeue(&self, records: Vec<CallRecord>) -> Delivery {
        let mut requeued = false;
        for record in records {
            if record.call_type().is_incoming() {
                debug!("DeliveryWorker discarding undelivered {record}");
                continue;
            }
            requeued |= self.queue.try_push(record).is_ok();
        }
        if requeued {
            Delivery::Requeued
        } else {
            Delivery::Discarded
        }
    }

    fn note_drop(&self) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("DeliveryWorker dropped {count} records after permanent errors");
        });
    }
}

fn describe(records: &[CallRecord]) -> String {
    match records {
        [record] => format!("record {record}"),
        _ => format!("batch of {} records", records.len()),
    }
}
