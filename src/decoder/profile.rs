//! Device profiles describing a switch's fixed-width CDR layout.

use std::collections::HashSet;
use std::ops::Range;

use encoding_rs::{Encoding, WINDOWS_1252};

use crate::call_record::CaptureZone;

/// Date and time layout of the Hipath capture column (`dd.mm.yyHH:MM:SS`).
pub const HIPATH_DATE_FORMAT: &str = "%d.%m.%y%H:%M:%S";

/// Byte ranges (half-open) of each column in a CDR line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnLayout {
    pub date: Range<usize>,
    pub line: Range<usize>,
    pub ext: Range<usize>,
    pub ring: Range<usize>,
    pub duration: Range<usize>,
    pub number: Range<usize>,
    pub call_type: Range<usize>,
}

impl ColumnLayout {
    /// Siemens Hipath layout.
    pub const HIPATH: Self = Self {
        date: 0..16,
        line: 16..19,
        ext: 19..25,
        ring: 25..30,
        duration: 30..38,
        number: 38..63,
        call_type: 74..76,
    };

    /// Shortest line that contains every column.
    pub fn min_width(&self) -> usize {
        [
            &self.date,
            &self.line,
            &self.ext,
            &self.ring,
            &self.duration,
            &self.number,
            &self.call_type,
        ]
        .iter()
        .map(|range| range.end)
        .max()
        .unwrap_or(0)
    }

    /// Mutable access to a column by its settings key.
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Range<usize>> {
        match name {
            "date" => Some(&mut self.date),
            "line" => Some(&mut self.line),
            "ext" => Some(&mut self.ext),
            "ring" => Some(&mut self.ring),
            "duration" => Some(&mut self.duration),
            "number" => Some(&mut self.number),
            "call_type" => Some(&mut self.call_type),
            _ => None,
        }
    }
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self::HIPATH
    }
}

/// Parse a `start:end` column override.
pub fn parse_range(text: &str) -> Option<Range<usize>> {
    let (start, end) = text.trim().split_once(':')?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = end.trim().parse().ok()?;
    (start < end).then_some(start..end)
}

/// Everything the decoder needs to know about one switch model.
#[derive(Clone, Debug)]
pub struct DeviceProfile {
    pub columns: ColumnLayout,
    pub date_format: String,
    pub encoding: &'static Encoding,
    pub zone: CaptureZone,
    pub voicemail_extensions: HashSet<String>,
}

impl DeviceProfile {
    /// Siemens Hipath defaults: local capture time, Windows-1252 text.
    pub fn hipath() -> Self {
        Self {
            columns: ColumnLayout::HIPATH,
            date_format: HIPATH_DATE_FORMAT.to_owned(),
            encoding: WINDOWS_1252,
            zone: CaptureZone::Local,
            voicemail_extensions: HashSet::new(),
        }
    }

    /// Interpret timestamps in `zone`.
    pub fn with_zone(mut self, zone: CaptureZone) -> Self {
        self.zone = zone;
        self
    }

    /// Replace the set of voicemail extensions.
    pub fn with_voicemail_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.voicemail_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the column layout.
    pub fn with_columns(mut self, columns: ColumnLayout) -> Self {
        self.columns = columns;
        self
    }

    /// Shortest line that covers every column.
    pub fn min_width(&self) -> usize {
        self.columns.min_width()
    }

    /// Whether `ext` is one of the voicemail extensions.
    pub fn is_voicemail(&self, ext: Option<&str>) -> bool {
        ext.is_some_and(|ext| self.voicemail_extensions.contains(ext))
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::hipath()
    }
}
