//! Serial lines flowing through the queue to the collection API.

use std::io::{self, BufReader, Cursor};
use std::thread;

use chrono::FixedOffset;
use cdr_relay::delivery::{CDR_PATH, DeliveryConfig};
use cdr_relay::test_utils::{MockResponse, MockServer};
use cdr_relay::timeout::TimeoutPolicy;
use cdr_relay::{
    BoundedQueue, CallSource, CaptureZone, DeliveryWorker, DeviceProfile, FixedWidthDecoder,
    LineConnector, OverflowPolicy, SerialLineSource, ShutdownSignal,
};
use rstest::rstest;

/// Connector replaying a fixed capture once, then refusing to reopen.
struct Capture(Option<Vec<u8>>);

impl LineConnector for Capture {
    type Reader = BufReader<Cursor<Vec<u8>>>;

    fn open(&mut self) -> io::Result<Self::Reader> {
        self.0
            .take()
            .map(|bytes| BufReader::new(Cursor::new(bytes)))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "capture replayed"))
    }

    fn describe(&self) -> String {
        "capture".into()
    }
}

fn line(ext: &str, duration: &str, code: &str) -> String {
    format!(
        "{:<16}{:>3}{:<6}{:>5}{:>8}{:<25}{:11}{:>2}\r\n",
        "01.03.2412:34:56", "1", ext, "00:05", duration, "030123456", "", code
    )
}

#[rstest]
fn decoded_lines_reach_the_server_in_order() {
    let server = MockServer::start(|_| MockResponse::status(201));
    let capture = [
        line("201", "00:01:00", "1"),
        "01.03.2412:34:56  1201\r\n".to_owned(),
        line("299", "00:00:30", "2"),
        line("202", "", "0"),
    ]
    .concat();

    let shutdown = ShutdownSignal::new();
    let queue = BoundedQueue::new(16, OverflowPolicy::Drop);
    let profile = DeviceProfile::hipath()
        .with_zone(CaptureZone::Fixed(FixedOffset::east_opt(0).expect("offset")))
        .with_voicemail_extensions(["299"]);
    let policy = TimeoutPolicy {
        base: 1,
        max: 1,
        decay: 1.5,
    };
    let mut source = SerialLineSource::new(
        Capture(Some(capture.into_bytes())),
        FixedWidthDecoder::new(profile),
        policy.clone(),
    );

    let mut config = DeliveryConfig::for_domain(&server.url(), "secret");
    config.timeout = policy;
    config.batch = None;
    let mut worker =
        DeliveryWorker::new(config, queue.clone(), shutdown.clone()).expect("worker");

    thread::scope(|scope| {
        let producer = {
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            scope.spawn(move || source.entrypoint(&queue, &shutdown))
        };
        let consumer = scope.spawn(|| worker.run());

        let received = server.next_request().json();
        let voicemail = server.next_request().json();
        let incoming = server.next_request();

        shutdown.trigger();
        producer.join().expect("producer thread");
        consumer
            .join()
            .expect("consumer thread")
            .expect("clean shutdown");

        assert_eq!(received["call_type"], "received");
        assert_eq!(received["duration"], 60);
        assert_eq!(received["answered"], 1);
        assert_eq!(voicemail["call_type"], "outgoing");
        assert_eq!(voicemail["answered"], 2);
        assert_eq!(incoming.path, CDR_PATH);
        let incoming = incoming.json();
        assert_eq!(incoming["call_type"], "incoming");
        assert!(incoming.get("duration").is_none());
    });
}
