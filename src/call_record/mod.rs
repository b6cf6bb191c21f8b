//! Call detail record representation.
//!
//! This module defines the [`CallRecord`] struct that captures one telephone
//! event produced by a call source, together with the typed values that go
//! into it. Records are mutated by their producer only; once pushed onto the
//! queue, ownership moves to the delivery worker.
//!
//! Text setters ignore blank input so that empty fixed-width columns never
//! turn into empty strings on the wire. Numeric setters accept either a native
//! integer or text in `HH:MM:SS`, `MM:SS` or plain-seconds form.

mod duration;
mod serialise;


use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, TimeZone, Utc};
use serde::Serialize;
use thiserror::Error;

pub use duration::parse_seconds;
pub use serialise::{serialise_batch, serialise_record};

/// Kind of telephone event a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    /// A call that is ringing right now. Carries no ring or duration.
    Incoming,
    Received,
    Outgoing,
    ReceivedOther,
    OutgoingOther,
    ReceivedForwarded,
    OutgoingForwarded,
    ReceivedConference,
    OutgoingConference,
    OutgoingViaForwarded,
    ReceivedTransferredInternal,
    OutgoingTransferredInternal,
    ReceivedTransferredExternal,
    OutgoingTransferredExternal,
}

impl CallType {
    /// Wire representation of the call type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Received => "received",
            Self::Outgoing => "outgoing",
            Self::ReceivedOther => "received_other",
            Self::OutgoingOther => "outgoing_other",
            Self::ReceivedForwarded => "received_forwarded",
            Self::OutgoingForwarded => "outgoing_forwarded",
            Self::ReceivedConference => "received_conference",
            Self::OutgoingConference => "outgoing_conference",
            Self::OutgoingViaForwarded => "outgoing_via_forwarded",
            Self::ReceivedTransferredInternal => "received_transferred_internal",
            Self::OutgoingTransferredInternal => "outgoing_transferred_internal",
            Self::ReceivedTransferredExternal => "received_transferred_external",
            Self::OutgoingTransferredExternal => "outgoing_transferred_external",
        }
    }

    /// Whether this is a ringing-presence event rather than a completed call.
    pub fn is_incoming(self) -> bool {
        self == Self::Incoming
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state answer flag of a completed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Answered {
    NotAnswered,
    Answered,
    Voicemail,
}

impl Answered {
    /// Derive the flag from the talk time and whether the extension that took
    /// the call is a voicemail box.
    pub fn classify(duration: Option<u32>, voicemail_extension: bool) -> Self {
        match duration {
            Some(secs) if secs > 0 && voicemail_extension => Self::Voicemail,
            Some(secs) if secs > 0 => Self::Answered,
            _ => Self::NotAnswered,
        }
    }

    /// Numeric code sent to the collection API.
    pub fn code(self) -> u8 {
        match self {
            Self::NotAnswered => 0,
            Self::Answered => 1,
            Self::Voicemail => 2,
        }
    }
}

/// Timezone in which a phone switch stamps its records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureZone {
    /// The host's local timezone.
    #[default]
    Local,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl CaptureZone {
    /// Convert a naive capture time into UTC.
    ///
    /// Local times that are skipped by a DST transition are rejected; times
    /// that occur twice resolve to the earlier instant.
    pub fn to_utc(&self, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Self::Local => Local
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Fixed(offset) => offset
                .from_local_datetime(naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl FromStr for CaptureZone {
    type Err = FieldError;

    /// Accepts `local`, `utc`, or an offset such as `+01:00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "local" => return Ok(Self::Local),
            "utc" | "z" => return Ok(Self::Fixed(Utc.fix())),
            _ => {}
        }
        parse_offset(trimmed)
            .map(Self::Fixed)
            .ok_or_else(|| FieldError::InvalidZone(trimmed.to_owned()))
    }
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Errors raised while assigning a field from producer-supplied text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("invalid {field} value {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("date {value:?} does not match format {format:?}")]
    InvalidDate { value: String, format: String },
    #[error("local time {0:?} does not exist in the capture timezone")]
    NonexistentTime(String),
    #[error("invalid timezone {0:?}; expected local, utc or an offset such as +01:00")]
    InvalidZone(String),
}

/// A numeric field value as supplied by a producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumericValue<'a> {
    Int(u32),
    Text(&'a str),
}

impl From<u32> for NumericValue<'_> {
    fn from(value: u32) -> Self {
        Self::Int(value)
    }
}

impl<'a> From<&'a str> for NumericValue<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for NumericValue<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value.as_str())
    }
}

/// One telephone event.
#[derive(Clone, Debug, PartialEq)]
pub struct CallRecord {
    call_type: CallType,
    date: DateTime<Utc>,
    number: Option<String>,
    line: Option<u32>,
    ext: Option<String>,
    ring: Option<u32>,
    duration: Option<u32>,
    answered: Option<Answered>,
    contact_name: Option<String>,
    ext_name: Option<String>,
}

impl CallRecord {
    /// Construct a record of `call_type` stamped with the current UTC time.
    pub fn new(call_type: CallType) -> Self {
        Self::with_date(call_type, Utc::now())
    }

    /// Construct a record with an explicit capture time.
    pub fn with_date(call_type: CallType, date: DateTime<Utc>) -> Self {
        Self {
            call_type,
            date,
            number: None,
            line: None,
            ext: None,
            ring: None,
            duration: None,
            answered: None,
            contact_name: None,
            ext_name: None,
        }
    }

    /// Kind of event, fixed at construction.
    pub fn call_type(&self) -> CallType {
        self.call_type
    }

    /// Capture time in UTC.
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// Remote party number.
    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    /// Trunk line the call used.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// Internal extension involved in the call.
    pub fn ext(&self) -> Option<&str> {
        self.ext.as_deref()
    }

    /// Ring time in seconds.
    pub fn ring(&self) -> Option<u32> {
        self.ring
    }

    /// Talk time in seconds.
    pub fn duration(&self) -> Option<u32> {
        self.duration
    }

    /// Answer flag, set for completed calls.
    pub fn answered(&self) -> Option<Answered> {
        self.answered
    }

    /// Directory name of the remote party.
    pub fn contact_name(&self) -> Option<&str> {
        self.contact_name.as_deref()
    }

    /// Directory name of the extension.
    pub fn ext_name(&self) -> Option<&str> {
        self.ext_name.as_deref()
    }

    /// Replace the capture time.
    pub fn set_date(&mut self, date: DateTime<Utc>) {
        self.date = date;
    }

    /// Set the remote number; blank input is ignored.
    pub fn set_number(&mut self, value: &str) {
        set_text(&mut self.number, value);
    }

    /// Set the extension; blank input is ignored.
    pub fn set_ext(&mut self, value: &str) {
        set_text(&mut self.ext, value);
    }

    /// Set the remote party's name; blank input is ignored.
    pub fn set_contact_name(&mut self, value: &str) {
        set_text(&mut self.contact_name, value);
    }

    /// Set the extension's name; blank input is ignored.
    pub fn set_ext_name(&mut self, value: &str) {
        set_text(&mut self.ext_name, value);
    }

    /// Record how the call ended.
    pub fn set_answered(&mut self, answered: Answered) {
        self.answered = Some(answered);
    }

    /// Set the trunk line number from an integer or numeric text.
    pub fn set_line<'a>(&mut self, value: impl Into<NumericValue<'a>>) -> Result<(), FieldError> {
        match value.into() {
            NumericValue::Int(line) => self.line = Some(line),
            NumericValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(());
                }
                let line = trimmed.parse().map_err(|_| FieldError::InvalidNumber {
                    field: "line",
                    value: trimmed.to_owned(),
                })?;
                self.line = Some(line);
            }
        }
        Ok(())
    }

    /// Set the ring time in seconds.
    pub fn set_ring<'a>(&mut self, value: impl Into<NumericValue<'a>>) -> Result<(), FieldError> {
        set_seconds(&mut self.ring, "ring", value.into())
    }

    /// Set the talk time in seconds.
    pub fn set_duration<'a>(
        &mut self,
        value: impl Into<NumericValue<'a>>,
    ) -> Result<(), FieldError> {
        set_seconds(&mut self.duration, "duration", value.into())
    }

    /// Parse a compact switch timestamp and store it as UTC.
    ///
    /// Blank input leaves the capture time untouched.
    pub fn parse_date(
        &mut self,
        value: &str,
        format: &str,
        zone: &CaptureZone,
    ) -> Result<(), FieldError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let naive = NaiveDateTime::parse_from_str(trimmed, format).map_err(|_| {
            FieldError::InvalidDate {
                value: trimmed.to_owned(),
                format: format.to_owned(),
            }
        })?;
        self.date = zone
            .to_utc(&naive)
            .ok_or_else(|| FieldError::NonexistentTime(trimmed.to_owned()))?;
        Ok(())
    }
}

fn set_text(slot: &mut Option<String>, value: &str) {
    let trimmed = value.trim();
    if !trimmed.is_empty() {
        *slot = Some(trimmed.to_owned());
    }
}

fn set_seconds(
    slot: &mut Option<u32>,
    field: &'static str,
    value: NumericValue<'_>,
) -> Result<(), FieldError> {
    match value {
        NumericValue::Int(secs) => *slot = Some(secs),
        NumericValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(());
            }
            let secs = parse_seconds(trimmed).ok_or_else(|| FieldError::InvalidNumber {
                field,
                value: trimmed.to_owned(),
            })?;
            *slot = Some(secs);
        }
    }
    Ok(())
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.call_type, self.date.format("%Y-%m-%dT%H:%M:%SZ"))?;
        if let Some(ext) = &self.ext {
            write!(f, " ext={ext}")?;
        }
        if let Some(number) = &self.number {
            write!(f, " number={number}")?;
        }
        if let Some(line) = self.line {
            write!(f, " line={line}")?;
        }
        Ok(())
    }
}
