//! Serial-line call source.
//!
//! [`SerialLineSource`] keeps a device open, reads newline-terminated CDR
//! lines and feeds them through a [`FixedWidthDecoder`]. The connection moves
//! through `Closed → Opening → Open` and falls back to `Closed` on any read
//! error, after which the next step reopens it. Failed opens wait on a
//! [`TimeoutController`]; a successful open resets it.
//!
//! Read timeouts are not errors: the port timeout only exists so that the
//! loop can notice shutdown while the switch is idle. A partially received
//! line survives a timeout and is completed by the next read. Input that runs
//! past [`MAX_LINE_LEN`] without a newline is discarded.

mod port;


use std::io::{self, BufRead, Read};

use log::{debug, info, warn};

use crate::call_record::CallRecord;
use crate::decoder::{DecodeError, FixedWidthDecoder};
use crate::settings::Settings;
use crate::shutdown::ShutdownSignal;
use crate::source::{CallSource, RecordSink, SourceError};
use crate::timeout::{Backoff, TimeoutController, TimeoutPolicy};

pub use port::{
    DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT, LineConnector, SerialConnector, SerialPortConfig,
};

/// Longest line buffered while waiting for its terminator.
pub const MAX_LINE_LEN: usize = 4096;

/// Connection state exposed for observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerialState {
    Closed,
    Opening,
    Open,
}

/// What a single [`SerialLineSource::step`] did.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// The device was opened.
    Opened,
    /// Opening failed; the backoff delay has elapsed (or shutdown fired).
    OpenFailed,
    /// No complete line was available before the read timeout.
    Idle,
    /// A line was decoded and handed to the sink.
    Record,
    /// A line was read but produced no record.
    Skipped(Option<DecodeError>),
    /// The device failed or reached end of stream and was closed.
    Closed,
}

/// Call source reading a switch's CDR port.
pub struct SerialLineSource<C: LineConnector = SerialConnector> {
    connector: C,
    decoder: FixedWidthDecoder,
    backoff: TimeoutController,
    reader: Option<C::Reader>,
    state: SerialState,
    pending: Vec<u8>,
}

impl<C: LineConnector> SerialLineSource<C> {
    /// Create a closed source; the first [`step`](Self::step) opens the device.
    pub fn new(connector: C, decoder: FixedWidthDecoder, policy: TimeoutPolicy) -> Self {
        Self {
            connector,
            decoder,
            backoff: TimeoutController::new(policy),
            reader: None,
            state: SerialState::Closed,
            pending: Vec::new(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SerialState {
        self.state
    }

    /// Advance the state machine by one transition.
    pub fn step(&mut self, sink: &dyn RecordSink, shutdown: &ShutdownSignal) -> StepOutcome {
        match self.state {
            SerialState::Closed | SerialState::Opening => self.open(shutdown),
            SerialState::Open => self.read(sink),
        }
    }

    fn open(&mut self, shutdown: &ShutdownSignal) -> StepOutcome {
        self.state = SerialState::Opening;
        match self.connector.open() {
            Ok(reader) => {
                info!("SerialLineSource opened {}", self.connector.describe());
                self.backoff.reset();
                self.reader = Some(reader);
                self.state = SerialState::Open;
                StepOutcome::Opened
            }
            Err(err) => {
                self.state = SerialState::Closed;
                warn!(
                    "SerialLineSource failed to open {}: {err}; retrying in {}s",
                    self.connector.describe(),
                    self.backoff.current_secs()
                );
                self.backoff.sleep(shutdown);
                StepOutcome::OpenFailed
            }
        }
    }

    fn read(&mut self, sink: &dyn RecordSink) -> StepOutcome {
        let Some(reader) = self.reader.as_mut() else {
            self.state = SerialState::Closed;
            return StepOutcome::Closed;
        };
        let limit = (MAX_LINE_LEN + 1).saturating_sub(self.pending.len()) as u64;
        match reader.by_ref().take(limit).read_until(b'\n', &mut self.pending) {
            Ok(0) => {
                warn!(
                    "SerialLineSource reached end of stream on {}",
                    self.connector.describe()
                );
                self.close();
                StepOutcome::Closed
            }
            Ok(_) if self.pending.ends_with(b"\n") => {
                let line = std::mem::take(&mut self.pending);
                self.handle_line(&line, sink)
            }
            Ok(_) if self.pending.len() > MAX_LINE_LEN => {
                warn!(
                    "SerialLineSource discarding {} bytes without a line terminator on {}",
                    self.pending.len(),
                    self.connector.describe()
                );
                self.pending.clear();
                StepOutcome::Skipped(None)
            }
            Ok(_) => StepOutcome::Idle,
            Err(err) if is_idle(&err) => StepOutcome::Idle,
            Err(err) => {
                warn!(
                    "SerialLineSource read failed on {}: {err}",
                    self.connector.describe()
                );
                self.close();
                StepOutcome::Closed
            }
        }
    }

    fn handle_line(&mut self, line: &[u8], sink: &dyn RecordSink) -> StepOutcome {
        if FixedWidthDecoder::normalise(line).is_empty() {
            return StepOutcome::Skipped(None);
        }
        match self.decoder.decode(line) {
            Ok(record) => {
                self.emit(record, sink);
                StepOutcome::Record
            }
            Err(err) => {
                warn!("SerialLineSource skipped line: {err}");
                StepOutcome::Skipped(Some(err))
            }
        }
    }

    fn emit(&self, record: CallRecord, sink: &dyn RecordSink) {
        debug!("SerialLineSource decoded {record}");
        if let Err(err) = sink.push(record) {
            debug!("SerialLineSource could not queue record: {err}");
        }
    }

    fn close(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                "SerialLineSource discarding {} bytes of an unterminated line",
                self.pending.len()
            );
            self.pending.clear();
        }
        self.reader = None;
        self.state = SerialState::Closed;
    }
}

fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl<C: LineConnector> CallSource for SerialLineSource<C> {
    fn name(&self) -> &str {
        "serial"
    }

    fn entrypoint(&mut self, sink: &dyn RecordSink, shutdown: &ShutdownSignal) {
        info!("SerialLineSource monitoring {}", self.connector.describe());
        while !shutdown.is_triggered() {
            self.step(sink, shutdown);
        }
        self.close();
        info!("SerialLineSource stopped");
    }
}

/// Build the serial source from resolved settings.
pub fn from_settings(settings: &Settings) -> Result<Box<dyn CallSource>, SourceError> {
    let serial = &settings.serial;
    if serial.port.trim().is_empty() {
        return Err(SourceError::InvalidSettings {
            plugin: "serial",
            message: "port must not be empty".into(),
        });
    }
    let connector = SerialConnector::new(SerialPortConfig {
        path: serial.port.clone(),
        baud_rate: serial.baud_rate,
        read_timeout: serial.read_timeout,
    });
    let decoder = FixedWidthDecoder::new(serial.profile.clone());
    Ok(Box::new(SerialLineSource::new(
        connector,
        decoder,
        settings.timeout.clone(),
    )))
}
