//! Helpers shared by unit and integration tests.
//!
//! Compiled for the crate's own tests and, through the `test-util` feature,
//! for the integration tests under `tests/`.

pub mod http_server;

pub use http_server::{CapturedRequest, MockResponse, MockServer};
