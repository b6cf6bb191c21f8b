//! Delivery of call records to the remote collection API.
//!
//! [`DeliveryWorker`] is the queue consumer. It owns a pooled `ureq` agent
//! and a [`Backoff`](crate::timeout::Backoff) that paces retries and sets the
//! per-request timeout. The registration client shares the agent setup and
//! endpoint layout.

mod agent;
mod config;
mod registration;
mod worker;


pub use agent::build_agent;
pub use config::{
    BODY_LOG_LIMIT, BatchConfig, CDR_PATH, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_THRESHOLD,
    DEFAULT_BATCH_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DeliveryConfig, LINK_DEVICE_PATH,
    MIN_REQUEST_TIMEOUT, endpoint,
};
pub use registration::{Registration, RegistrationError, obtain_token, register_device};
pub use worker::{Delivery, DeliveryError, DeliveryWorker, ResponseClass, classify_status};
