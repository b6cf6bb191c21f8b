//! Fixed-width CDR line decoder.
//!
//! Phone switches print one call per line with every field at a constant byte
//! offset. [`FixedWidthDecoder`] slices a raw line according to a
//! [`DeviceProfile`] and builds a [`CallRecord`]. The decoder is stateless;
//! each line is decoded independently.
//!
//! Call-type codes:
//!
//! - `0`: a ringing call ([`CallType::Incoming`]); only number, extension and
//!   line are read.
//! - `1` and `2`: a completed received or outgoing call; every column is read
//!   and the answer flag is derived from the talk time.
//! - anything else is rejected with [`DecodeError::UnknownCallType`].

mod profile;


use std::ops::Range;

use thiserror::Error;

use crate::call_record::{Answered, CallRecord, CallType, FieldError};

pub use profile::{ColumnLayout, DeviceProfile, HIPATH_DATE_FORMAT, parse_range};

/// Reasons a line did not produce a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("line too short ({len} < {min} bytes): {line:?}")]
    TooShort { len: usize, min: usize, line: String },
    #[error("unknown call type {code:?} in line {line:?}")]
    UnknownCallType { code: String, line: String },
    #[error("invalid field in line {line:?}: {source}")]
    Field {
        line: String,
        #[source]
        source: FieldError,
    },
}

/// Stateless decoder for one switch profile.
#[derive(Clone, Debug, Default)]
pub struct FixedWidthDecoder {
    profile: DeviceProfile,
}

impl FixedWidthDecoder {
    /// Decoder for lines laid out as `profile` describes.
    pub fn new(profile: DeviceProfile) -> Self {
        Self { profile }
    }

    /// Profile used for every line.
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Strip leading control characters and trailing whitespace.
    pub fn normalise(raw: &[u8]) -> &[u8] {
        let start = raw.iter().position(|&b| b > 0x1f).unwrap_or(raw.len());
        raw[start..].trim_ascii_end()
    }

    /// Decode one raw line into a record.
    pub fn decode(&self, raw: &[u8]) -> Result<CallRecord, DecodeError> {
        let bytes = Self::normalise(raw);
        let min = self.profile.min_width();
        if bytes.len() < min {
            return Err(DecodeError::TooShort {
                len: bytes.len(),
                min,
                line: self.text(bytes),
            });
        }

        let columns = &self.profile.columns;
        let code = self.column(bytes, &columns.call_type);
        match code.parse::<u8>() {
            Ok(0) => self.decode_incoming(bytes),
            Ok(1) => self.decode_completed(bytes, CallType::Received),
            Ok(2) => self.decode_completed(bytes, CallType::Outgoing),
            _ => Err(DecodeError::UnknownCallType {
                code,
                line: self.text(bytes),
            }),
        }
    }

    fn decode_incoming(&self, bytes: &[u8]) -> Result<CallRecord, DecodeError> {
        let columns = &self.profile.columns;
        let mut record = CallRecord::new(CallType::Incoming);
        record.set_number(&self.column(bytes, &columns.number));
        record.set_ext(&self.column(bytes, &columns.ext));
        record
            .set_line(&self.column(bytes, &columns.line))
            .map_err(|source| self.field_error(bytes, source))?;
        Ok(record)
    }

    fn decode_completed(&self, bytes: &[u8], call_type: CallType) -> Result<CallRecord, DecodeError> {
        let columns = &self.profile.columns;
        let mut record = CallRecord::new(call_type);
        let fail = |source: FieldError| self.field_error(bytes, source);

        record
            .parse_date(
                &self.column(bytes, &columns.date),
                &self.profile.date_format,
                &self.profile.zone,
            )
            .map_err(fail)?;
        record
            .set_line(&self.column(bytes, &columns.line))
            .map_err(fail)?;
        record.set_ext(&self.column(bytes, &columns.ext));
        record
            .set_ring(&self.column(bytes, &columns.ring))
            .map_err(fail)?;
        record
            .set_duration(&self.column(bytes, &columns.duration))
            .map_err(fail)?;
        record.set_number(&self.column(bytes, &columns.number));

        let voicemail = self.profile.is_voicemail(record.ext());
        record.set_answered(Answered::classify(record.duration(), voicemail));
        Ok(record)
    }

    /// Decoded, trimmed text of one column. Columns past the end are empty.
    fn column(&self, bytes: &[u8], range: &Range<usize>) -> String {
        let end = range.end.min(bytes.len());
        let slice = bytes.get(range.start..end).unwrap_or_default();
        self.text(slice).trim().to_owned()
    }

    fn text(&self, bytes: &[u8]) -> String {
        let (text, _) = self.profile.encoding.decode_without_bom_handling(bytes);
        text.into_owned()
    }

    fn field_error(&self, bytes: &[u8], source: FieldError) -> DecodeError {
        DecodeError::Field {
            line: self.text(bytes),
            source,
        }
    }
}
