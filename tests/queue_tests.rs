//! Overflow warnings emitted by the record queue.

use std::sync::Once;
use std::time::Duration;

use cdr_relay::rate_limited_warner::RateLimitedWarner;
use cdr_relay::{BoundedQueue, CallRecord, CallType, OverflowPolicy, QueueError, RecordSink};
use logtest::Logger;
use serial_test::serial;

/// `log::set_logger` succeeds only once per process, so install the capture
/// logger once and discard events left over from earlier tests.
fn start_logger() -> Logger {
    static START: Once = Once::new();
    START.call_once(|| {
        let _ = Logger::start();
    });
    let mut logger = Logger;
    while logger.pop().is_some() {}
    logger
}

fn drain_warnings(logger: &mut Logger) -> Vec<String> {
    let mut warnings = Vec::new();
    while let Some(record) = logger.pop() {
        if record.level() == log::Level::Warn {
            warnings.push(record.args().to_owned());
        }
    }
    warnings
}

#[test]
#[serial(logger)]
fn overflow_warnings_are_rate_limited() {
    let mut logger = start_logger();
    let queue = BoundedQueue::new(1, OverflowPolicy::Drop)
        .with_warner(RateLimitedWarner::new(Duration::from_secs(3600)));
    let sink: &dyn RecordSink = &queue;

    sink.push(CallRecord::new(CallType::Received)).expect("capacity");
    for _ in 0..5 {
        assert_eq!(
            sink.push(CallRecord::new(CallType::Outgoing)),
            Err(QueueError::Full)
        );
    }

    let warnings = drain_warnings(&mut logger);
    assert_eq!(warnings, ["BoundedQueue full; dropped 1 records"]);

    queue.flush_warnings();
    let warnings = drain_warnings(&mut logger);
    assert_eq!(
        warnings,
        ["BoundedQueue dropped 4 records in the last interval"]
    );
}

#[test]
#[serial(logger)]
fn flush_is_silent_without_drops() {
    let mut logger = start_logger();
    let queue = BoundedQueue::new(4, OverflowPolicy::Drop);
    queue
        .push(CallRecord::new(CallType::Received))
        .expect("capacity");
    queue.flush_warnings();
    assert!(drain_warnings(&mut logger).is_empty());
}
