//! JSON payloads for the collection API.
//!
//! Only fields that have been set are emitted; there are no `null` values on
//! the wire. `date` is rendered as an ISO-8601 UTC timestamp.

use chrono::SecondsFormat;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use super::CallRecord;

impl CallRecord {
    /// Count the entries that [`Serialize`] will emit.
    fn count_fields(&self) -> usize {
        2 + usize::from(self.number.is_some())
            + usize::from(self.line.is_some())
            + usize::from(self.ext.is_some())
            + usize::from(self.ring.is_some())
            + usize::from(self.duration.is_some())
            + usize::from(self.answered.is_some())
            + usize::from(self.contact_name.is_some())
            + usize::from(self.ext_name.is_some())
    }
}

impl Serialize for CallRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.count_fields()))?;
        map.serialize_entry("call_type", &self.call_type)?;
        map.serialize_entry(
            "date",
            &self.date.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        if let Some(number) = &self.number {
            map.serialize_entry("number", number)?;
        }
        if let Some(line) = self.line {
            map.serialize_entry("line", &line)?;
        }
        if let Some(ext) = &self.ext {
            map.serialize_entry("ext", ext)?;
        }
        if let Some(ring) = self.ring {
            map.serialize_entry("ring", &ring)?;
        }
        if let Some(duration) = self.duration {
            map.serialize_entry("duration", &duration)?;
        }
        if let Some(answered) = self.answered {
            map.serialize_entry("answered", &answered.code())?;
        }
        if let Some(name) = &self.contact_name {
            map.serialize_entry("contact_name", name)?;
        }
        if let Some(name) = &self.ext_name {
            map.serialize_entry("ext_name", name)?;
        }
        map.end()
    }
}

/// Serialise a single record into a JSON object.
pub fn serialise_record(record: &CallRecord) -> serde_json::Result<String> {
    serde_json::to_string(record)
}

/// Serialise several records into a JSON array for batch submission.
pub fn serialise_batch(records: &[CallRecord]) -> serde_json::Result<String> {
    serde_json::to_string(records)
}
