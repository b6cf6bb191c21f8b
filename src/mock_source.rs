//! Synthetic call source for demos and end-to-end testing.
//!
//! Every interval the source emits a ringing [`CallType::Incoming`] event
//! followed by the completed call it turned into.

use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::call_record::{Answered, CallRecord, CallType};
use crate::settings::Settings;
use crate::shutdown::ShutdownSignal;
use crate::source::{CallSource, RecordSink, SourceError};

/// Default pause between generated calls.
pub const DEFAULT_MOCK_INTERVAL: Duration = Duration::from_secs(10);

pub struct MockSource {
    interval: Duration,
    extensions: Vec<String>,
    rng: StdRng,
}

impl MockSource {
    /// Source emitting one call per `interval` on a random extension.
    pub fn new(interval: Duration, extensions: Vec<String>) -> Self {
        Self::with_rng(interval, extensions, StdRng::from_entropy())
    }

    /// Deterministic source for tests.
    pub fn with_seed(interval: Duration, extensions: Vec<String>, seed: u64) -> Self {
        Self::with_rng(interval, extensions, StdRng::seed_from_u64(seed))
    }

    fn with_rng(interval: Duration, mut extensions: Vec<String>, rng: StdRng) -> Self {
        extensions.retain(|ext| !ext.trim().is_empty());
        if extensions.is_empty() {
            extensions.push("100".into());
        }
        Self {
            interval,
            extensions,
            rng,
        }
    }

    /// Generate one call: the ringing event, then the completed record.
    pub fn next_call(&mut self) -> [CallRecord; 2] {
        let ext = self
            .extensions
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default();
        let number = format!("0{}", self.rng.gen_range(100_000_000u64..1_000_000_000));
        let line = self.rng.gen_range(1..=4u32);
        let now = Utc::now();

        let mut ringing = CallRecord::with_date(CallType::Incoming, now);
        ringing.set_ext(&ext);
        ringing.set_number(&number);
        // Infallible for native integers.
        let _ = ringing.set_line(line);

        let call_type = if self.rng.gen_bool(0.5) {
            CallType::Received
        } else {
            CallType::Outgoing
        };
        let duration = if self.rng.gen_bool(0.2) {
            0
        } else {
            self.rng.gen_range(1..600u32)
        };
        let mut completed = CallRecord::with_date(call_type, now);
        completed.set_ext(&ext);
        completed.set_number(&number);
        let _ = completed.set_line(line);
        let _ = completed.set_ring(self.rng.gen_range(0..30u32));
        let _ = completed.set_duration(duration);
        completed.set_answered(Answered::classify(Some(duration), false));

        [ringing, completed]
    }
}

impl CallSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn entrypoint(&mut self, sink: &dyn RecordSink, shutdown: &ShutdownSignal) {
        info!("MockSource generating a call every {:?}", self.interval);
        while !shutdown.wait_timeout(self.interval) {
            for record in self.next_call() {
                if let Err(err) = sink.push(record) {
                    debug!("MockSource could not queue record: {err}");
                }
            }
        }
        info!("MockSource stopped");
    }
}

/// Build the mock source from resolved settings.
pub fn from_settings(settings: &Settings) -> Result<Box<dyn CallSource>, SourceError> {
    let mock = &settings.mock;
    if mock.interval.is_zero() {
        return Err(SourceError::InvalidSettings {
            plugin: "mock",
            message: "interval must be greater than zero".into(),
        });
    }
    Ok(Box::new(MockSource::new(
        mock.interval,
        mock.extensions.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueError;
    use parking_lot::Mutex;
    use std::thread;

    #[derive(Default)]
    struct Collect(Mutex<Vec<CallRecord>>);

    impl RecordSink for Collect {
        fn push(&self, record: CallRecord) -> Result<(), QueueError> {
            self.0.lock().push(record);
            Ok(())
        }
    }

    #[test]
    fn emits_ringing_then_completed_call() {
        let mut source =
            MockSource::with_seed(Duration::from_secs(1), vec!["201".into(), "202".into()], 7);
        for _ in 0..20 {
            let [ringing, completed] = source.next_call();
            assert_eq!(ringing.call_type(), CallType::Incoming);
            assert!(ringing.duration().is_none());
            assert!(matches!(
                completed.call_type(),
                CallType::Received | CallType::Outgoing
            ));
            assert_eq!(ringing.ext(), completed.ext());
            assert_eq!(ringing.number(), completed.number());
            let expected = Answered::classify(completed.duration(), false);
            assert_eq!(completed.answered(), Some(expected));
        }
    }

    #[test]
    fn same_seed_gives_same_calls() {
        let exts = vec!["201".to_owned()];
        let mut a = MockSource::with_seed(Duration::from_secs(1), exts.clone(), 42);
        let mut b = MockSource::with_seed(Duration::from_secs(1), exts, 42);
        let [_, first] = a.next_call();
        let [_, second] = b.next_call();
        assert_eq!(first.number(), second.number());
        assert_eq!(first.duration(), second.duration());
    }

    #[test]
    fn blank_extensions_fall_back_to_default() {
        let mut source = MockSource::with_seed(Duration::from_secs(1), vec![" ".into()], 1);
        let [ringing, _] = source.next_call();
        assert_eq!(ringing.ext(), Some("100"));
    }

    #[test]
    fn entrypoint_stops_on_shutdown() {
        let shutdown = ShutdownSignal::new();
        let sink = Collect::default();
        let mut source = MockSource::with_seed(Duration::from_millis(5), vec![], 3);
        thread::scope(|scope| {
            let handle = scope.spawn(|| source.entrypoint(&sink, &shutdown));
            while sink.0.lock().len() < 4 {
                thread::yield_now();
            }
            shutdown.trigger();
            handle.join().expect("mock source thread");
        });
        assert!(sink.0.lock().len() >= 4);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut settings = Settings::default();
        settings.mock.interval = Duration::ZERO;
        assert!(from_settings(&settings).is_err());
    }
}
