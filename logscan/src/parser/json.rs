//! JSON / NDJSON log parser.
//!
//! One complete JSON object per line. Standard fields are resolved by
//! walking alias chains used by the common structured-logging schemas
//! (Logstash/ELK, Bunyan, Winston); everything else lands in metadata with
//! its scalar type preserved.

use logstore::{LogEntry, MetaValue};
use serde_json::Value;

use super::level::{is_error_level, normalize_level};
use super::timestamp;
use super::{base_entry, LogParser, ParseContext, ParseOutcome};

const TIMESTAMP_FIELDS: &[&str] = &[
    "timestamp", "time", "@timestamp", "datetime", "date", "ts", "log_time", "logTime",
];
const LEVEL_FIELDS: &[&str] = &[
    "level", "severity", "log_level", "logLevel", "loglevel", "levelname",
];
const MESSAGE_FIELDS: &[&str] = &[
    "message", "msg", "text", "log_message", "logMessage", "description",
];
const LOGGER_FIELDS: &[&str] = &["logger", "logger_name", "loggerName", "class", "category", "name"];
const THREAD_FIELDS: &[&str] = &["thread", "thread_name", "threadName", "thread_id", "threadId"];
const STACK_TRACE_FIELDS: &[&str] = &[
    "stack_trace", "stackTrace", "stack", "exception", "error_stack", "errorStack",
];
const HOSTNAME_FIELDS: &[&str] = &["hostname", "host", "server", "instance", "machine", "node"];
const APPLICATION_FIELDS: &[&str] = &[
    "application", "app", "service", "service_name", "serviceName", "app_name", "appName",
];
const ENVIRONMENT_FIELDS: &[&str] = &["environment", "env", "stage", "deployment"];

/// Parser for JSON object lines. Stateless: every line stands alone.
#[derive(Default)]
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        Self
    }
}

impl LogParser for JsonParser {
    fn can_parse(&self, file_name: &str, sample: &str) -> bool {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".json") || lower.ends_with(".ndjson") {
            return true;
        }
        looks_like_json(sample)
    }

    fn parse_line(&mut self, line: &str, line_number: u64, ctx: &mut ParseContext) -> ParseOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return ParseOutcome::Skipped {
                line_number,
                reason: "Empty line".to_string(),
            };
        }

        if !looks_like_json(trimmed) {
            return ParseOutcome::Failed {
                line_number,
                raw: line.to_string(),
                error: "Not valid JSON".to_string(),
            };
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(line = line_number, error = %err, "JSON parse failed");
                return ParseOutcome::Failed {
                    line_number,
                    raw: line.to_string(),
                    error: format!("JSON parse error: {}", err),
                };
            }
        };

        let mut entry = base_entry(ctx, line_number, line);
        entry.message = String::new();

        extract_timestamp(&value, &mut entry, ctx);
        let level_present = extract_level(&value, &mut entry);
        if let Some(message) = find_field_value(&value, MESSAGE_FIELDS) {
            entry.message = message;
        }
        extract_logger(&value, &mut entry);
        if let Some(thread) = find_field_value(&value, THREAD_FIELDS) {
            entry.thread = Some(thread);
        }
        if let Some(trace) = find_field_value(&value, STACK_TRACE_FIELDS) {
            if !trace.is_empty() {
                entry.stack_trace = Some(trace);
                entry.has_stack_trace = true;
                if !level_present {
                    // A stack trace with no explicit level reads as an error.
                    entry.has_error = true;
                }
            }
        }
        if let Some(hostname) = find_field_value(&value, HOSTNAME_FIELDS) {
            entry.hostname = Some(hostname);
        }
        if let Some(application) = find_field_value(&value, APPLICATION_FIELDS) {
            entry.application = Some(application);
        }
        if let Some(environment) = find_field_value(&value, ENVIRONMENT_FIELDS) {
            entry.environment = Some(environment);
        }

        extract_metadata(&value, &mut entry);

        ParseOutcome::Success(Box::new(entry))
    }

    fn flush_pending(&mut self, _ctx: &mut ParseContext) -> Vec<LogEntry> {
        Vec::new()
    }

    fn reset(&mut self) {}

    fn format(&self) -> &'static str {
        "JSON"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn supports_multi_line(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "JSON/NDJSON log parser with automatic schema detection"
    }
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

/// First present alias wins: textual values are taken as-is, other
/// non-null scalars and composites as their JSON text.
fn find_field_value(value: &Value, aliases: &[&str]) -> Option<String> {
    let object = value.as_object()?;
    for alias in aliases {
        match object.get(*alias) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Null) | None => continue,
            Some(other) => return Some(other.to_string()),
        }
    }
    None
}

fn extract_timestamp(value: &Value, entry: &mut LogEntry, ctx: &ParseContext) {
    let Some(object) = value.as_object() else {
        return;
    };
    for alias in TIMESTAMP_FIELDS {
        match object.get(*alias) {
            Some(Value::String(raw)) => {
                entry.timestamp = timestamp::parse_or_now(raw, ctx);
                return;
            }
            Some(Value::Number(number)) => {
                if let Some(ts) = number.as_i64().and_then(timestamp::epoch_to_local) {
                    entry.timestamp = ts;
                    return;
                }
            }
            _ => {}
        }
    }
}

/// Returns whether a level field was present.
fn extract_level(value: &Value, entry: &mut LogEntry) -> bool {
    match find_field_value(value, LEVEL_FIELDS) {
        Some(level) => {
            entry.level = normalize_level(Some(&level));
            entry.has_error = is_error_level(&entry.level);
            true
        }
        None => false,
    }
}

fn extract_logger(value: &Value, entry: &mut LogEntry) {
    if let Some(logger) = find_field_value(value, LOGGER_FIELDS) {
        if let Some(last) = logger.rsplit('.').next() {
            entry.source = Some(last.to_string());
        }
        entry.logger = Some(logger);
    }
}

fn is_standard_field(name: &str) -> bool {
    [
        TIMESTAMP_FIELDS,
        LEVEL_FIELDS,
        MESSAGE_FIELDS,
        LOGGER_FIELDS,
        THREAD_FIELDS,
        STACK_TRACE_FIELDS,
        HOSTNAME_FIELDS,
        APPLICATION_FIELDS,
        ENVIRONMENT_FIELDS,
    ]
    .iter()
    .any(|aliases| aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name)))
}

fn extract_metadata(value: &Value, entry: &mut LogEntry) {
    let Some(object) = value.as_object() else {
        return;
    };
    for (name, field) in object {
        if is_standard_field(name) {
            continue;
        }
        let meta = match field {
            Value::String(s) => MetaValue::Str(s.clone()),
            Value::Bool(b) => MetaValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MetaValue::Int(i)
                } else {
                    MetaValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::Object(_) | Value::Array(_) => MetaValue::Str(field.to_string()),
            Value::Null => continue,
        };
        entry.metadata.insert(name.clone(), meta);
    }
}
