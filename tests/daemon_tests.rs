//! End-to-end runs of the daemon with the mock call source.

use std::thread;
use std::time::Duration;

use cdr_relay::daemon::{read_token, store_token};
use cdr_relay::delivery::{CDR_PATH, LINK_DEVICE_PATH};
use cdr_relay::test_utils::{MockResponse, MockServer};
use cdr_relay::{Daemon, DaemonError, Settings, ShutdownSignal, SourceRegistry};
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn settings() -> Settings {
    let mut settings = Settings {
        plugin: "mock".into(),
        ..Settings::default()
    };
    settings.mock.interval = Duration::from_millis(10);
    settings.timeout.base = 1;
    settings
}

fn run_in_background(
    settings: Settings,
) -> (ShutdownSignal, thread::JoinHandle<Result<(), DaemonError>>) {
    settings
        .validate(&SourceRegistry::with_builtin())
        .expect("valid settings");
    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    let handle = thread::spawn(move || {
        Daemon::new(settings, SourceRegistry::with_builtin()).run(&signal)
    });
    (shutdown, handle)
}

#[rstest]
fn relays_generated_calls_until_shutdown(mut settings: Settings) {
    let server = MockServer::start(|_| MockResponse::status(201));
    settings.domain = server.url();
    settings.token = Some("secret".into());

    let (shutdown, handle) = run_in_background(settings);
    let first = server.next_request();
    let second = server.next_request();
    shutdown.trigger();
    handle
        .join()
        .expect("daemon thread")
        .expect("clean shutdown");

    assert_eq!(first.path, CDR_PATH);
    assert_eq!(first.header("authorization"), Some("Token secret"));
    assert_eq!(first.json()["call_type"], "incoming");
    assert!(matches!(
        second.json()["call_type"].as_str(),
        Some("received" | "outgoing")
    ));
}

#[rstest]
fn relays_lines_polled_from_the_switch(mut settings: Settings) {
    let line = format!(
        "{:<16}{:>3}{:<6}{:>5}{:>8}{:<25}{:11}{:>2}\r\n",
        "01.03.2412:34:56", "2", "205", "00:03", "00:00:40", "030999888", "", "2"
    );
    let server = MockServer::start(move |request| {
        if request.method == "GET" {
            MockResponse::text(200, &line)
        } else {
            MockResponse::status(201)
        }
    });
    settings.plugin = "poll".into();
    settings.domain = server.url();
    settings.token = Some("secret".into());
    settings.poll.url = format!("{}/cdr", server.url());
    settings.poll.interval = Duration::from_millis(10);

    let (shutdown, handle) = run_in_background(settings);
    let post = (0..50)
        .map(|_| server.next_request())
        .find(|request| request.method == "POST")
        .expect("a relayed record");
    shutdown.trigger();
    handle
        .join()
        .expect("daemon thread")
        .expect("clean shutdown");

    assert_eq!(post.path, CDR_PATH);
    let body = post.json();
    assert_eq!(body["call_type"], "outgoing");
    assert_eq!(body["ext"], "205");
    assert_eq!(body["duration"], 40);
}

#[rstest]
fn revoked_token_stops_the_daemon_and_deletes_the_file(mut settings: Settings) {
    let server = MockServer::start(|_| MockResponse::status(401));
    let dir = TempDir::new().expect("temp dir");
    let token_file = dir.path().join("token");
    store_token(&token_file, "stale").expect("stored");
    settings.domain = server.url();
    settings.token_file = Some(token_file.clone());

    let (_shutdown, handle) = run_in_background(settings);
    let err = handle
        .join()
        .expect("daemon thread")
        .expect_err("revoked token");

    assert!(err.is_revoked());
    assert_eq!(server.next_request().header("authorization"), Some("Token stale"));
    assert!(!token_file.exists());
}

#[rstest]
fn registers_and_persists_a_token(mut settings: Settings) {
    let server = MockServer::start(|request| {
        if request.path == LINK_DEVICE_PATH {
            MockResponse::json(201, r#"{"token":"fresh"}"#)
        } else {
            MockResponse::status(201)
        }
    });
    let dir = TempDir::new().expect("temp dir");
    let token_file = dir.path().join("token");
    settings.domain = server.url();
    settings.token_file = Some(token_file.clone());
    settings.device_id = Some("relay-7".into());
    settings.registration_key = Some("k3y".into());

    let (shutdown, handle) = run_in_background(settings);
    let link = server.next_request();
    let post = server.next_request();
    shutdown.trigger();
    handle
        .join()
        .expect("daemon thread")
        .expect("clean shutdown");

    assert_eq!(link.path, LINK_DEVICE_PATH);
    assert_eq!(link.json()["device_id"], "relay-7");
    assert_eq!(post.header("authorization"), Some("Token fresh"));
    assert_eq!(read_token(&token_file).expect("readable").as_deref(), Some("fresh"));
}

#[rstest]
fn shutdown_during_registration_is_clean(mut settings: Settings) {
    let server = MockServer::start(|_| MockResponse::status(204));
    settings.domain = server.url();
    settings.device_id = Some("relay-7".into());
    settings.registration_key = Some("k3y".into());

    let (shutdown, handle) = run_in_background(settings);
    server.next_request();
    shutdown.trigger();
    handle
        .join()
        .expect("daemon thread")
        .expect("clean shutdown");
}
