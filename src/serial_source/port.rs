//! Connectors that open the line-oriented device a source reads from.

use std::io::{self, BufRead, BufReader};
use std::time::Duration;

/// Default baud rate of switch CDR ports.
pub const DEFAULT_BAUD_RATE: u32 = 9600;
/// Default read timeout; bounds how long a read can delay shutdown.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Opens a fresh line reader each time the source (re)connects.
pub trait LineConnector: Send {
    type Reader: BufRead + Send;

    fn open(&mut self) -> io::Result<Self::Reader>;

    /// Human-readable device description for logs.
    fn describe(&self) -> String;
}

/// Serial device settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerialPortConfig {
    pub path: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for SerialPortConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Connector for a physical serial port (8N1).
#[derive(Clone, Debug)]
pub struct SerialConnector {
    config: SerialPortConfig,
}

impl SerialConnector {
    /// Connector for the port described by `config`.
    pub fn new(config: SerialPortConfig) -> Self {
        Self { config }
    }

    /// Port parameters used on every open.
    pub fn config(&self) -> &SerialPortConfig {
        &self.config
    }
}

#[cfg(feature = "serial")]
impl LineConnector for SerialConnector {
    type Reader = BufReader<Box<dyn serialport::SerialPort>>;

    fn open(&mut self) -> io::Result<Self::Reader> {
        let port = serialport::new(&self.config.path, self.config.baud_rate)
            .timeout(self.config.read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()?;
        Ok(BufReader::new(port))
    }

    fn describe(&self) -> String {
        format!("{} at {} baud", self.config.path, self.config.baud_rate)
    }
}

#[cfg(not(feature = "serial"))]
impl LineConnector for SerialConnector {
    type Reader = BufReader<io::Empty>;

    fn open(&mut self) -> io::Result<Self::Reader> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "serial support was not compiled in",
        ))
    }

    fn describe(&self) -> String {
        format!("{} (serial support disabled)", self.config.path)
    }
}
