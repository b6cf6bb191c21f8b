//! Relay of call-detail records from a phone switch to a collection API.
//!
//! A [`CallSource`] (the serial line reader, the HTTP poller or the mock
//! generator) produces [`CallRecord`]s into a [`BoundedQueue`]; a
//! [`DeliveryWorker`] drains the queue and posts each record as JSON,
//! retrying transient failures with a [`TimeoutController`]. [`Daemon`] wires
//! one of each together around a shared [`ShutdownSignal`].

pub mod call_record;
pub mod daemon;
pub mod decoder;
pub mod delivery;
pub mod logging;
pub mod mock_source;
pub mod poll_source;
pub mod queue;
pub mod rate_limited_warner;
pub mod serial_source;
pub mod settings;
pub mod shutdown;
pub mod source;
#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;
pub mod timeout;

pub use call_record::{Answered, CallRecord, CallType, CaptureZone, FieldError};
pub use daemon::{Daemon, DaemonError};
pub use decoder::{ColumnLayout, DecodeError, DeviceProfile, FixedWidthDecoder};
pub use delivery::{
    BatchConfig, Delivery, DeliveryConfig, DeliveryError, DeliveryWorker, Registration,
    RegistrationError,
};
pub use mock_source::MockSource;
pub use poll_source::{PollError, PollSource};
pub use queue::{BoundedQueue, OverflowPolicy, QueueError};
pub use serial_source::{LineConnector, SerialConnector, SerialLineSource, SerialState};
pub use settings::{Settings, SettingsError};
pub use shutdown::ShutdownSignal;
pub use source::{CallSource, RecordSink, SourceError, SourceRegistry};
pub use timeout::{Backoff, TimeoutController, TimeoutPolicy};
