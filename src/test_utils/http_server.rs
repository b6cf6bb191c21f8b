//! Minimal HTTP/1.1 server answering from a routing closure.
//!
//! Every connection carries one request and is closed after the response, so
//! clients never reuse a socket the server has already dropped.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// A request as seen by the server.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body parsed as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

/// Canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    /// Empty response with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// JSON response with `status`.
    pub fn json(status: u16, body: &str) -> Self {
        Self::status(status)
            .with_header("Content-Type", "application/json")
            .with_body(body)
    }

    /// Plain-text response with `status`.
    pub fn text(status: u16, body: &str) -> Self {
        Self::status(status)
            .with_header("Content-Type", "text/plain")
            .with_body(body)
    }

    /// Add a response header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Server bound to an ephemeral localhost port.
pub struct MockServer {
    addr: SocketAddr,
    requests: mpsc::Receiver<CapturedRequest>,
}

impl MockServer {
    /// Answer every request with `route` until the test process exits.
    pub fn start<F>(route: F) -> Self
    where
        F: Fn(&CapturedRequest) -> MockResponse + Send + 'static,
    {
        Self::serve(None, move |request| route(request))
    }

    /// Answer one connection per response, in order, then stop listening.
    pub fn sequence(responses: Vec<MockResponse>) -> Self {
        let limit = responses.len();
        let mut responses = VecDeque::from(responses);
        Self::serve(Some(limit), move |_| {
            responses
                .pop_front()
                .unwrap_or_else(|| MockResponse::status(500))
        })
    }

    fn serve<F>(limit: Option<usize>, mut respond: F) -> Self
    where
        F: FnMut(&CapturedRequest) -> MockResponse + Send + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
        let addr = listener.local_addr().expect("listener has address");
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for stream in listener.incoming().take(limit.unwrap_or(usize::MAX)) {
                let Ok(mut stream) = stream else {
                    break;
                };
                let Some(request) = read_request(&mut stream) else {
                    continue;
                };
                write_response(&mut stream, &respond(&request));
                if tx.send(request).is_err() && limit.is_none() {
                    break;
                }
            }
        });
        Self { addr, requests: rx }
    }

    /// Socket address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL such as `http://127.0.0.1:41234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait for the next request the server answered.
    pub fn next_request(&self) -> CapturedRequest {
        self.requests
            .recv_timeout(Duration::from_secs(10))
            .expect("request within timeout")
    }
}

fn write_response(stream: &mut TcpStream, response: &MockResponse) {
    let mut head = format!(
        "HTTP/1.1 {} Mock\r\nConnection: close\r\nContent-Length: {}\r\n",
        response.status,
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(response.body.as_bytes());
}

fn read_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut reader = BufReader::new(stream.try_clone().ok()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_owned();
    let path = parts.next()?.to_owned();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase();
            let value = value.trim().to_owned();
            if key == "content-length" {
                content_length = value.parse().unwrap_or(0);
            }
            headers.push((key, value));
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;
    Some(CapturedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
