//! The canonical indexed document and its field registry.
//!
//! Field names are a stable external contract: they appear verbatim in the
//! JSON wire format, in query requests, and in export field lists. The
//! accessor tables at the bottom of this module replace reflection-style
//! lookup with an explicit field-name match.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Keyword fields: exact-match, non-analyzed attributes eligible for term
/// filters and terms aggregations.
pub const KEYWORD_FIELDS: &[&str] = &[
    "jobId",
    "level",
    "logger",
    "thread",
    "source",
    "fileName",
    "hostname",
    "application",
    "environment",
];

/// Text fields: analyzed full-text attributes eligible for multi-match
/// search and highlighting.
pub const TEXT_FIELDS: &[&str] = &["message", "rawLine", "stackTrace"];

/// Fields a search may sort on.
pub const SORTABLE_FIELDS: &[&str] = &[
    "timestamp",
    "lineNumber",
    "level",
    "logger",
    "thread",
    "source",
    "hostname",
    "application",
    "indexedAt",
];

/// A heterogeneous scalar stored in entry metadata.
///
/// Metadata values keep the scalar type they were parsed with; objects and
/// arrays from structured sources are stored as their textual form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    /// Renders the value the way it appears in exports.
    pub fn render(&self) -> String {
        match self {
            MetaValue::Bool(b) => b.to_string(),
            MetaValue::Int(i) => i.to_string(),
            MetaValue::Float(f) => f.to_string(),
            MetaValue::Str(s) => s.clone(),
        }
    }
}

/// One structured row derived from one source line (or one multi-line
/// event, when continuation lines merged into it).
///
/// Timestamps are zone-less local datetimes with millisecond precision on
/// the wire (`yyyy-MM-ddTHH:mm:ss.SSS`). Inbound offsets are normalized to
/// the system zone at parse time, which loses the original zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Opaque unique identifier.
    pub id: String,

    /// Partition key: the ingestion job this entry belongs to.
    pub job_id: String,

    /// 1-based ordinal of the source line within the uploaded file.
    pub line_number: u64,

    /// Event time. Parser-inferred; falls back to ingestion wall-clock when
    /// the source carries no parseable timestamp.
    #[serde(with = "ts_millis")]
    pub timestamp: NaiveDateTime,

    /// Wall-clock time the entry was indexed.
    #[serde(with = "ts_millis")]
    pub indexed_at: NaiveDateTime,

    /// Normalized severity (TRACE, DEBUG, INFO, WARN, ERROR).
    pub level: String,

    /// True iff `level` is ERROR.
    pub has_error: bool,

    /// True iff `stack_trace` is non-empty.
    pub has_stack_trace: bool,

    pub message: String,

    pub raw_line: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stack_trace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub logger: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thread: Option<String>,

    /// Last dot-segment of `logger`, kept as its own keyword field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hostname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub application: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub environment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_name: Option<String>,

    /// Extra parsed attributes, not full-text indexed.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub metadata: BTreeMap<String, MetaValue>,

    /// User-applied labels. Filterable; no ingestion path populates them.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
}

impl LogEntry {
    /// Returns the value of a keyword field by its wire name, or `None`
    /// when the field is unset or not a keyword field.
    pub fn keyword_value(&self, field: &str) -> Option<&str> {
        match field {
            "jobId" => Some(self.job_id.as_str()),
            "level" => Some(self.level.as_str()),
            "logger" => self.logger.as_deref(),
            "thread" => self.thread.as_deref(),
            "source" => self.source.as_deref(),
            "fileName" => self.file_name.as_deref(),
            "hostname" => self.hostname.as_deref(),
            "application" => self.application.as_deref(),
            "environment" => self.environment.as_deref(),
            _ => None,
        }
    }

    /// Returns the value of a text field by its wire name.
    pub fn text_value(&self, field: &str) -> Option<&str> {
        match field {
            "message" => Some(self.message.as_str()),
            "rawLine" => Some(self.raw_line.as_str()),
            "stackTrace" => self.stack_trace.as_deref(),
            _ => None,
        }
    }

    /// Searchable value of a field: text fields first, keyword fallback.
    pub fn searchable_value(&self, field: &str) -> Option<&str> {
        self.text_value(field).or_else(|| self.keyword_value(field))
    }

    /// Renders any exportable field as a string; unset and unknown fields
    /// yield an empty string.
    pub fn render_field(&self, field: &str) -> String {
        match field {
            "id" => self.id.clone(),
            "jobId" => self.job_id.clone(),
            "lineNumber" => self.line_number.to_string(),
            "timestamp" => format_millis(&self.timestamp),
            "indexedAt" => format_millis(&self.indexed_at),
            "level" => self.level.clone(),
            "hasError" => self.has_error.to_string(),
            "hasStackTrace" => self.has_stack_trace.to_string(),
            "message" => self.message.clone(),
            "rawLine" => self.raw_line.clone(),
            "stackTrace" => self.stack_trace.clone().unwrap_or_default(),
            "logger" => self.logger.clone().unwrap_or_default(),
            "thread" => self.thread.clone().unwrap_or_default(),
            "source" => self.source.clone().unwrap_or_default(),
            "hostname" => self.hostname.clone().unwrap_or_default(),
            "application" => self.application.clone().unwrap_or_default(),
            "environment" => self.environment.clone().unwrap_or_default(),
            "fileName" => self.file_name.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// Formats a timestamp in the wire format (`yyyy-MM-ddTHH:mm:ss.SSS`).
pub fn format_millis(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

/// Serde adapter for the millisecond-precision local datetime wire format.
pub mod ts_millis {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_wire_timestamp(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid timestamp: '{raw}'"))
        })
    }

    /// Accepts the wire format with or without fractional seconds, and a
    /// space in place of the `T` separator.
    pub fn parse_wire_timestamp(raw: &str) -> Option<NaiveDateTime> {
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(ts);
            }
        }
        None
    }
}

/// Serde adapter for optional timestamps in the wire format.
pub mod ts_millis_opt {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => super::ts_millis::serialize(ts, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => super::ts_millis::parse_wire_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: '{raw}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_entry() -> LogEntry {
        LogEntry {
            id: "e-1".into(),
            job_id: "job-1".into(),
            line_number: 7,
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_milli_opt(10, 30, 45, 123)
                .unwrap(),
            indexed_at: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(10, 31, 0)
                .unwrap(),
            level: "ERROR".into(),
            has_error: true,
            has_stack_trace: false,
            message: "boom".into(),
            raw_line: "2024-01-15 10:30:45.123 ERROR boom".into(),
            stack_trace: None,
            logger: Some("com.example.Svc".into()),
            thread: Some("main".into()),
            source: Some("Svc".into()),
            hostname: None,
            application: None,
            environment: None,
            file_name: Some("app.log".into()),
            metadata: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn should_serialize_timestamps_with_millisecond_precision() {
        // given
        let entry = sample_entry();

        // when
        let json = serde_json::to_value(&entry).unwrap();

        // then
        assert_eq!(json["timestamp"], "2024-01-15T10:30:45.123");
        assert_eq!(json["indexedAt"], "2024-01-15T10:31:00.000");
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["lineNumber"], 7);
        assert!(json.get("stackTrace").is_none());
    }

    #[test]
    fn should_round_trip_through_json() {
        // given
        let entry = sample_entry();

        // when
        let json = serde_json::to_string(&entry).unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();

        // then
        assert_eq!(back, entry);
    }

    #[test]
    fn should_resolve_keyword_fields_by_wire_name() {
        let entry = sample_entry();

        assert_eq!(entry.keyword_value("level"), Some("ERROR"));
        assert_eq!(entry.keyword_value("logger"), Some("com.example.Svc"));
        assert_eq!(entry.keyword_value("hostname"), None);
        assert_eq!(entry.keyword_value("message"), None);
    }

    #[test]
    fn should_render_unknown_and_unset_fields_as_empty() {
        let entry = sample_entry();

        assert_eq!(entry.render_field("stackTrace"), "");
        assert_eq!(entry.render_field("no_such_field"), "");
        assert_eq!(entry.render_field("timestamp"), "2024-01-15T10:30:45.123");
        assert_eq!(entry.render_field("lineNumber"), "7");
    }

    #[test]
    fn should_preserve_metadata_scalar_types() {
        // given
        let mut entry = sample_entry();
        entry.metadata.insert("retries".into(), MetaValue::Int(3));
        entry.metadata.insert("ok".into(), MetaValue::Bool(false));
        entry
            .metadata
            .insert("ratio".into(), MetaValue::Float(0.5));

        // when
        let json = serde_json::to_value(&entry).unwrap();
        let back: LogEntry = serde_json::from_value(json.clone()).unwrap();

        // then
        assert_eq!(json["metadata"]["retries"], 3);
        assert_eq!(json["metadata"]["ok"], false);
        assert_eq!(back.metadata["retries"], MetaValue::Int(3));
        assert_eq!(back.metadata["ok"], MetaValue::Bool(false));
    }

    #[test]
    fn should_parse_wire_timestamps_without_millis() {
        let ts = ts_millis::parse_wire_timestamp("2024-01-15T00:00:00").unwrap();
        assert_eq!(ts.format("%H:%M:%S").to_string(), "00:00:00");

        let ts = ts_millis::parse_wire_timestamp("2024-01-15 10:30:45.123").unwrap();
        assert_eq!(format_millis(&ts), "2024-01-15T10:30:45.123");
    }
}
