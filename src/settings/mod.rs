//! Runtime settings, resolved once at start-up.
//!
//! Values are layered: built-in defaults, then an optional INI file, then
//! `CDR_*` environment variables, then command-line flags. The resolved
//! [`Settings`] is validated once and never changes afterwards.
//!
//! INI layout:
//!
//! ```ini
//! [relay]
//! domain = https://cdr.example.com
//! token_file = /var/lib/cdr-relay/token
//! plugin = serial
//! timeout = 3
//! timeout_decay = 1.5
//! max_timeout = 300
//!
//! [serial]
//! port = /dev/ttyUSB0
//! baud_rate = 9600
//! timezone = +01:00
//! voicemail_extensions = 299, 298
//! call_type = 74:76
//!
//! [mock]
//! interval_ms = 10000
//!
//! [poll]
//! url = http://pbx.local/cdr
//! interval_ms = 30000
//! timeout_ms = 10000
//! ```
//!
//! Environment variables use the key in upper case: `CDR_DOMAIN`,
//! `CDR_SERIAL_PORT`, `CDR_MOCK_INTERVAL_MS`, `CDR_POLL_URL`.

mod file;


use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use log::warn;
use thiserror::Error;

use crate::call_record::CaptureZone;
use crate::decoder::{DeviceProfile, parse_range};
use crate::delivery::{BatchConfig, CDR_PATH, DEFAULT_CONNECT_TIMEOUT, DeliveryConfig, endpoint};
use crate::mock_source::DEFAULT_MOCK_INTERVAL;
use crate::poll_source::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use crate::queue::{DEFAULT_QUEUE_CAPACITY, OverflowPolicy};
use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;
use crate::serial_source::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};
use crate::source::SourceRegistry;
use crate::timeout::TimeoutPolicy;

pub use file::{encoding_for_label, load_ini};

/// Prefix shared by every settings environment variable.
pub const ENV_PREFIX: &str = "CDR_";
/// Source used when none is configured.
pub const DEFAULT_PLUGIN: &str = "serial";

/// Problems loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown encoding {0:?}")]
    UnknownEncoding(String),
    #[error("{path} is not valid {encoding}")]
    Decode { path: PathBuf, encoding: &'static str },
    #[error("{path} is invalid: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Relay,
    Serial,
    Mock,
    Poll,
}

impl Section {
    fn from_ini(name: Option<&str>) -> Option<Self> {
        match name.map(str::to_ascii_lowercase).as_deref() {
            None | Some("relay") => Some(Self::Relay),
            Some("serial") => Some(Self::Serial),
            Some("mock") => Some(Self::Mock),
            Some("poll") => Some(Self::Poll),
            Some(_) => None,
        }
    }
}

/// Settings of the serial source.
#[derive(Clone, Debug)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub profile: DeviceProfile,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            profile: DeviceProfile::hipath(),
        }
    }
}

/// Settings of the mock source.
#[derive(Clone, Debug)]
pub struct MockSettings {
    pub interval: Duration,
    pub extensions: Vec<String>,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MOCK_INTERVAL,
            extensions: vec!["100".into(), "101".into(), "102".into()],
        }
    }
}

/// Settings of the HTTP-polled source. Lines use the serial device profile.
#[derive(Clone, Debug)]
pub struct PollSettings {
    pub url: String,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Fully resolved daemon settings.
#[derive(Clone)]
pub struct Settings {
    /// Base URL of the collection API, e.g. `https://cdr.example.com`.
    pub domain: String,
    pub token: Option<String>,
    /// Where an issued token is persisted; deleted when revoked.
    pub token_file: Option<PathBuf>,
    pub device_id: Option<String>,
    pub registration_key: Option<String>,
    /// Name of the call source in the [`SourceRegistry`].
    pub plugin: String,
    pub timeout: TimeoutPolicy,
    pub connect_timeout: Duration,
    pub queue_size: usize,
    pub overflow: OverflowPolicy,
    /// Batching parameters; a size of zero disables batching.
    pub batch: BatchConfig,
    pub warn_interval: Duration,
    pub serial: SerialSettings,
    pub mock: MockSettings,
    pub poll: PollSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            domain: String::new(),
            token: None,
            token_file: None,
            device_id: None,
            registration_key: None,
            plugin: DEFAULT_PLUGIN.into(),
            timeout: TimeoutPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            queue_size: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::default(),
            batch: BatchConfig::default(),
            warn_interval: DEFAULT_WARN_INTERVAL,
            serial: SerialSettings::default(),
            mock: MockSettings::default(),
            poll: PollSettings::default(),
        }
    }
}

impl Settings {
    /// Defaults overlaid with the contents of an INI file.
    pub fn from_file(path: &Path, encoding: Option<&str>) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        settings.apply_ini(&load_ini(path, encoding)?)?;
        Ok(settings)
    }

    /// Overlay every recognised key of a parsed INI document.
    pub fn apply_ini(&mut self, ini: &Ini) -> Result<(), SettingsError> {
        for (name, props) in ini.iter() {
            let Some(section) = Section::from_ini(name) else {
                warn!("Settings ignoring unknown section [{}]", name.unwrap_or_default());
                continue;
            };
            for (key, value) in props.iter() {
                if !self.set(section, &key.to_ascii_lowercase(), value)? {
                    warn!("Settings ignoring unknown key {key:?} in {section:?} section");
                }
            }
        }
        Ok(())
    }

    /// Overlay `CDR_*` variables. Unrecognised variables are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), SettingsError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let (section, key) = if let Some(key) = rest.strip_prefix("SERIAL_") {
                (Section::Serial, key)
            } else if let Some(key) = rest.strip_prefix("MOCK_") {
                (Section::Mock, key)
            } else if let Some(key) = rest.strip_prefix("POLL_") {
                (Section::Poll, key)
            } else {
                (Section::Relay, rest)
            };
            self.set(section, &key.to_ascii_lowercase(), &value)?;
        }
        Ok(())
    }

    fn set(&mut self, section: Section, key: &str, value: &str) -> Result<bool, SettingsError> {
        let value = value.trim();
        match section {
            Section::Relay => self.set_relay(key, value),
            Section::Serial => self.set_serial(key, value),
            Section::Mock => self.set_mock(key, value),
            Section::Poll => self.set_poll(key, value),
        }
    }

    fn set_relay(&mut self, key: &str, value: &str) -> Result<bool, SettingsError> {
        match key {
            "domain" => self.domain = value.to_owned(),
            "token" => self.token = non_empty(value),
            "token_file" => self.token_file = non_empty(value).map(PathBuf::from),
            "device_id" => self.device_id = non_empty(value),
            "registration_key" => self.registration_key = non_empty(value),
            "plugin" => self.plugin = value.to_owned(),
            "timeout" => self.timeout.base = parse(key, value)?,
            "timeout_decay" => self.timeout.decay = parse(key, value)?,
            "max_timeout" => self.timeout.max = parse(key, value)?,
            "connect_timeout" => self.connect_timeout = Duration::from_secs(parse(key, value)?),
            "queue_size" => self.queue_size = parse(key, value)?,
            "overflow_timeout_ms" => {
                self.overflow = match parse::<u64>(key, value)? {
                    0 => OverflowPolicy::Drop,
                    ms => OverflowPolicy::Timeout(Duration::from_millis(ms)),
                }
            }
            "batch_threshold" => self.batch.threshold = parse(key, value)?,
            "batch_size" => self.batch.size = parse(key, value)?,
            "batch_timeout" => self.batch.timeout = Duration::from_secs(parse(key, value)?),
            "warn_interval" => self.warn_interval = Duration::from_secs(parse(key, value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn set_serial(&mut self, key: &str, value: &str) -> Result<bool, SettingsError> {
        let profile = &mut self.serial.profile;
        match key {
            "port" => self.serial.port = value.to_owned(),
            "baud_rate" => self.serial.baud_rate = parse(key, value)?,
            "read_timeout_ms" => {
                self.serial.read_timeout = Duration::from_millis(parse(key, value)?)
            }
            "encoding" => profile.encoding = encoding_for_label(value)?,
            "timezone" => profile.zone = parse::<CaptureZone>(key, value)?,
            "date_format" => profile.date_format = value.to_owned(),
            "voicemail_extensions" => {
                profile.voicemail_extensions = split_list(value).collect();
            }
            column => match profile.columns.column_mut(column) {
                Some(range) => {
                    *range = parse_range(value).ok_or_else(|| SettingsError::InvalidValue {
                        key: key.to_owned(),
                        value: value.to_owned(),
                        reason: "expected start:end with start < end".into(),
                    })?;
                }
                None => return Ok(false),
            },
        }
        Ok(true)
    }

    fn set_mock(&mut self, key: &str, value: &str) -> Result<bool, SettingsError> {
        match key {
            "interval_ms" => self.mock.interval = Duration::from_millis(parse(key, value)?),
            "extensions" => self.mock.extensions = split_list(value).collect(),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn set_poll(&mut self, key: &str, value: &str) -> Result<bool, SettingsError> {
        match key {
            "url" => self.poll.url = value.to_owned(),
            "interval_ms" => self.poll.interval = Duration::from_millis(parse(key, value)?),
            "timeout_ms" => self.poll.timeout = Duration::from_millis(parse(key, value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Check cross-field constraints and that `plugin` names a known source.
    pub fn validate(&self, registry: &SourceRegistry) -> Result<(), SettingsError> {
        let domain = self.domain.trim();
        if !(domain.starts_with("http://") || domain.starts_with("https://")) {
            return Err(SettingsError::Invalid(format!(
                "domain {domain:?} must start with http:// or https://"
            )));
        }
        if !(self.timeout.decay.is_finite() && self.timeout.decay > 1.0) {
            return Err(SettingsError::Invalid(format!(
                "timeout_decay must be greater than 1 (got {})",
                self.timeout.decay
            )));
        }
        if self.timeout.base == 0 {
            return Err(SettingsError::Invalid(
                "timeout must be at least 1 second".into(),
            ));
        }
        if self.timeout.base > self.timeout.max {
            return Err(SettingsError::Invalid(format!(
                "timeout ({}) must not exceed max_timeout ({})",
                self.timeout.base, self.timeout.max
            )));
        }
        if self.serial.read_timeout.is_zero() {
            return Err(SettingsError::Invalid(
                "read_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.queue_size == 0 {
            return Err(SettingsError::Invalid("queue_size must be at least 1".into()));
        }
        if !registry.contains(&self.plugin) {
            return Err(SettingsError::Invalid(format!(
                "unknown plugin {:?}; available plugins: {}",
                self.plugin,
                registry.names().collect::<Vec<_>>().join(", ")
            )));
        }
        let can_register = self.device_id.is_some() && self.registration_key.is_some();
        if self.token.is_none() && self.token_file.is_none() && !can_register {
            return Err(SettingsError::Invalid(
                "set token, token_file, or device_id and registration_key".into(),
            ));
        }
        Ok(())
    }

    /// Delivery worker configuration for `token`.
    pub fn delivery_config(&self, token: &str) -> DeliveryConfig {
        DeliveryConfig {
            url: endpoint(&self.domain, CDR_PATH),
            token: token.to_owned(),
            connect_timeout: self.connect_timeout,
            timeout: self.timeout.clone(),
            batch: (self.batch.size > 0).then_some(self.batch),
            warn_interval: self.warn_interval,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("domain", &self.domain)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_file", &self.token_file)
            .field("device_id", &self.device_id)
            .field("registration_key", &self.registration_key.as_ref().map(|_| "<redacted>"))
            .field("plugin", &self.plugin)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("queue_size", &self.queue_size)
            .field("overflow", &self.overflow)
            .field("batch", &self.batch)
            .field("warn_interval", &self.warn_interval)
            .field("serial", &self.serial)
            .field("mock", &self.mock)
            .field("poll", &self.poll)
            .finish()
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
}

fn parse<T>(key: &str, value: &str) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|err: T::Err| SettingsError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
        reason: err.to_string(),
    })
}
