//! HTTP-polled call source.
//!
//! Some switches expose their CDR buffer over HTTP instead of a serial port.
//! [`PollSource`] fetches that buffer every interval. The body holds zero or
//! more newline-terminated lines in the same fixed-width layout the serial
//! port uses, and the switch clears its buffer once it has been read.
//! `204 No Content` means nothing was buffered.
//!
//! A failed fetch waits on the [`Backoff`] before retrying; a successful one
//! resets it and waits the regular interval.

use std::io::{self, Read};
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use ureq::Agent;

use crate::decoder::FixedWidthDecoder;
use crate::delivery::build_agent;
use crate::settings::Settings;
use crate::shutdown::ShutdownSignal;
use crate::source::{CallSource, RecordSink, SourceError};
use crate::timeout::{Backoff, TimeoutController, TimeoutPolicy};

/// Default pause between fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Default timeout of a single fetch.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);
/// Largest response body read per fetch.
pub const MAX_POLL_BODY: u64 = 1024 * 1024;

/// Why a fetch produced no lines.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("failed to read response body: {0}")]
    Body(#[from] io::Error),
}

/// Line counts of one successful fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Lines decoded and handed to the sink.
    pub records: usize,
    /// Non-blank lines that failed to decode.
    pub skipped: usize,
}

/// Call source fetching CDR lines from a switch's HTTP interface.
pub struct PollSource<B: Backoff = TimeoutController> {
    agent: Agent,
    url: String,
    interval: Duration,
    request_timeout: Duration,
    decoder: FixedWidthDecoder,
    backoff: B,
}

impl PollSource<TimeoutController> {
    /// Source fetching `url` every `interval`, retrying failures per `policy`.
    pub fn new(
        agent: Agent,
        url: impl Into<String>,
        interval: Duration,
        request_timeout: Duration,
        decoder: FixedWidthDecoder,
        policy: TimeoutPolicy,
    ) -> Self {
        Self {
            agent,
            url: url.into(),
            interval,
            request_timeout,
            decoder,
            backoff: TimeoutController::new(policy),
        }
    }
}

impl<B: Backoff> PollSource<B> {
    /// Swap the retry pacing.
    pub fn with_backoff<N: Backoff>(self, backoff: N) -> PollSource<N> {
        PollSource {
            agent: self.agent,
            url: self.url,
            interval: self.interval,
            request_timeout: self.request_timeout,
            decoder: self.decoder,
            backoff,
        }
    }

    /// Retry pacing in use.
    pub fn backoff(&self) -> &B {
        &self.backoff
    }

    /// URL fetched on every poll.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the buffer once and push every decoded line into `sink`.
    pub fn poll_once(&mut self, sink: &dyn RecordSink) -> Result<PollSummary, PollError> {
        let response = match self.agent.get(&self.url).timeout(self.request_timeout).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(PollError::Status {
                    url: self.url.clone(),
                    status,
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(PollError::Transport {
                    url: self.url.clone(),
                    message: transport.to_string(),
                });
            }
        };
        if response.status() == 204 {
            return Ok(PollSummary::default());
        }

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_POLL_BODY)
            .read_to_end(&mut body)?;

        let mut summary = PollSummary::default();
        for line in body.split(|byte| *byte == b'\n') {
            if FixedWidthDecoder::normalise(line).is_empty() {
                continue;
            }
            match self.decoder.decode(line) {
                Ok(record) => {
                    debug!("PollSource decoded {record}");
                    if let Err(err) = sink.push(record) {
                        debug!("PollSource could not queue record: {err}");
                    }
                    summary.records += 1;
                }
                Err(err) => {
                    warn!("PollSource skipped line: {err}");
                    summary.skipped += 1;
                }
            }
        }
        Ok(summary)
    }
}

impl<B: Backoff> CallSource for PollSource<B> {
    fn name(&self) -> &str {
        "poll"
    }

    fn entrypoint(&mut self, sink: &dyn RecordSink, shutdown: &ShutdownSignal) {
        info!("PollSource polling {} every {:?}", self.url, self.interval);
        while !shutdown.is_triggered() {
            match self.poll_once(sink) {
                Ok(summary) => {
                    self.backoff.reset();
                    if summary.records + summary.skipped > 0 {
                        debug!(
                            "PollSource fetched {} records, skipped {} lines",
                            summary.records, summary.skipped
                        );
                    }
                    if shutdown.wait_timeout(self.interval) {
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        "PollSource {err}; retrying in {}s",
                        self.backoff.current().as_secs()
                    );
                    if !self.backoff.sleep(shutdown) {
                        break;
                    }
                }
            }
        }
        info!("PollSource stopped");
    }
}

/// Build the polled source from resolved settings.
///
/// Lines are decoded with the `[serial]` device profile.
pub fn from_settings(settings: &Settings) -> Result<Box<dyn CallSource>, SourceError> {
    let poll = &settings.poll;
    let invalid = |message: String| SourceError::InvalidSettings {
        plugin: "poll",
        message,
    };
    let url = poll.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid(format!(
            "url {url:?} must start with http:// or https://"
        )));
    }
    if poll.interval.is_zero() {
        return Err(invalid("interval must be greater than zero".into()));
    }
    let agent = build_agent(settings.connect_timeout)
        .map_err(|err| invalid(format!("failed to set up TLS: {err}")))?;
    Ok(Box::new(PollSource::new(
        agent,
        url,
        poll.interval,
        poll.timeout,
        FixedWidthDecoder::new(settings.serial.profile.clone()),
        settings.timeout.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_record::{CallRecord, CallType, CaptureZone};
    use crate::decoder::DeviceProfile;
    use crate::queue::QueueError;
    use crate::test_utils::{MockResponse, MockServer};
    use parking_lot::Mutex;
    use rstest::rstest;

    #[derive(Default)]
    struct Collect {
        records: Mutex<Vec<CallRecord>>,
        stop_after: Option<(usize, ShutdownSignal)>,
    }

    impl RecordSink for Collect {
        fn push(&self, record: CallRecord) -> Result<(), QueueError> {
            let mut records = self.records.lock();
            records.push(record);
            if let Some((limit, shutdown)) = &self.stop_after
                && records.len() >= *limit
            {
                shutdown.trigger();
            }
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct CountingBackoff {
        sleeps: usize,
        resets: usize,
    }

    impl Backoff for CountingBackoff {
        fn current(&self) -> Duration {
            Duration::ZERO
        }

        fn sleep(&mut self, shutdown: &ShutdownSignal) -> bool {
            self.sleeps += 1;
            !shutdown.is_triggered()
        }

        fn sleep_for(&mut self, _delay: Duration, shutdown: &ShutdownSignal) -> bool {
            !shutdown.is_triggered()
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn cdr_line(ext: &str, code: &str) -> String {
        format!(
            "{:<16}{:>3}{:<6}{:>5}{:>8}{:<25}{:11}{:>2}\r\n",
            "01.03.2412:34:56", "1", ext, "00:05", "00:01:23", "030123456", "", code
        )
    }

    fn source(url: String) -> PollSource<CountingBackoff> {
        let profile = DeviceProfile::hipath().with_zone(CaptureZone::Fixed(
            chrono::FixedOffset::east_opt(0).expect("offset"),
        ));
        let agent = build_agent(Duration::from_secs(5)).expect("agent");
        PollSource::new(
            agent,
            url,
            Duration::from_millis(5),
            Duration::from_secs(5),
            FixedWidthDecoder::new(profile),
            TimeoutPolicy::default(),
        )
        .with_backoff(CountingBackoff::default())
    }

    #[test]
    fn decodes_every_line_of_the_body() {
        let body = format!("{}garbage\r\n\r\n{}", cdr_line("201", "1"), cdr_line("202", "2"));
        let server = MockServer::start(move |_| MockResponse::text(200, &body));
        let mut src = source(format!("{}/cdr", server.url()));
        let sink = Collect::default();

        let summary = src.poll_once(&sink).expect("fetched");

        assert_eq!(summary, PollSummary { records: 2, skipped: 1 });
        let request = server.next_request();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/cdr");
        let records = sink.records.lock();
        let kinds: Vec<_> = records.iter().map(CallRecord::call_type).collect();
        assert_eq!(kinds, [CallType::Received, CallType::Outgoing]);
    }

    #[test]
    fn no_content_yields_no_records() {
        let server = MockServer::sequence(vec![MockResponse::status(204)]);
        let mut src = source(server.url());
        let sink = Collect::default();

        assert_eq!(src.poll_once(&sink).expect("fetched"), PollSummary::default());
        assert!(sink.records.lock().is_empty());
    }

    #[rstest]
    #[case(404)]
    #[case(503)]
    fn error_status_is_reported(#[case] status: u16) {
        let server = MockServer::sequence(vec![MockResponse::status(status)]);
        let mut src = source(server.url());

        let err = src.poll_once(&Collect::default()).expect_err("error status");
        assert!(matches!(err, PollError::Status { status: s, .. } if s == status));
    }

    #[test]
    fn entrypoint_backs_off_then_resets_on_success() {
        let server = MockServer::sequence(vec![
            MockResponse::status(503),
            MockResponse::text(200, &cdr_line("201", "0")),
        ]);
        let mut src = source(server.url());
        let shutdown = ShutdownSignal::new();
        let sink = Collect {
            records: Mutex::default(),
            stop_after: Some((1, shutdown.clone())),
        };

        src.entrypoint(&sink, &shutdown);

        assert_eq!(sink.records.lock()[0].call_type(), CallType::Incoming);
        assert_eq!(src.backoff().sleeps, 1);
        assert_eq!(src.backoff().resets, 1);
        assert_eq!(src.name(), "poll");
    }

    #[rstest]
    #[case::missing_url(|s: &mut Settings| s.poll.url = String::new())]
    #[case::bare_host(|s: &mut Settings| s.poll.url = "pbx.local/cdr".into())]
    #[case::zero_interval(|s: &mut Settings| s.poll.interval = Duration::ZERO)]
    fn from_settings_rejects_unusable_values(#[case] breaks: fn(&mut Settings)) {
        let mut settings = Settings::default();
        settings.poll.url = "http://pbx.local/cdr".into();
        breaks(&mut settings);
        let err = from_settings(&settings).err().expect("invalid settings");
        assert!(matches!(err, SourceError::InvalidSettings { plugin: "poll", .. }));
    }

    #[test]
    fn from_settings_builds_a_poll_source() {
        let mut settings = Settings::default();
        settings.poll.url = " http://pbx.local/cdr ".into();
        let src = from_settings(&settings).expect("valid settings");
        assert_eq!(src.name(), "poll");
    }
}
