//! CSV / TSV log parser.
//!
//! Detects the delimiter from the first non-empty line, maps header names
//! onto standard fields through alias sets, and coerces leftover cells into
//! typed metadata. Headerless files get generated `column_N` names with
//! positional defaults (timestamp, level, message).

use std::collections::HashMap;

use logstore::{LogEntry, MetaValue};

use super::level::{is_error_level, normalize_level};
use super::timestamp;
use super::{base_entry, LogParser, ParseContext, ParseOutcome};

const TIMESTAMP_COLUMNS: &[&str] = &[
    "timestamp", "time", "date", "datetime", "@timestamp", "log_time", "logtime", "created_at",
    "createdat", "ts",
];
const LEVEL_COLUMNS: &[&str] = &[
    "level", "severity", "log_level", "loglevel", "levelname", "priority", "log_severity",
];
const MESSAGE_COLUMNS: &[&str] = &[
    "message", "msg", "text", "log_message", "logmessage", "description", "content", "body", "log",
];
const LOGGER_COLUMNS: &[&str] = &[
    "logger", "logger_name", "loggername", "class", "classname", "category", "source",
    "component", "module",
];
const THREAD_COLUMNS: &[&str] = &["thread", "thread_name", "threadname", "thread_id", "threadid"];
const HOSTNAME_COLUMNS: &[&str] = &["hostname", "host", "server", "machine", "node", "instance"];
const APPLICATION_COLUMNS: &[&str] = &[
    "application", "app", "service", "service_name", "servicename", "app_name",
];
const ENVIRONMENT_COLUMNS: &[&str] = &["environment", "env", "stage", "deployment"];
const STACK_TRACE_COLUMNS: &[&str] = &[
    "stack_trace", "stacktrace", "exception", "error_stack", "traceback",
];

/// Column-to-field mapping resolved from the header row.
#[derive(Debug, Clone, Copy, Default)]
struct ColumnIndices {
    timestamp: Option<usize>,
    level: Option<usize>,
    message: Option<usize>,
    logger: Option<usize>,
    thread: Option<usize>,
    hostname: Option<usize>,
    application: Option<usize>,
    environment: Option<usize>,
    stack_trace: Option<usize>,
}

impl ColumnIndices {
    fn standard(&self) -> [Option<usize>; 9] {
        [
            self.timestamp,
            self.level,
            self.message,
            self.logger,
            self.thread,
            self.hostname,
            self.application,
            self.environment,
            self.stack_trace,
        ]
    }
}

/// Parser for delimiter-separated log files. Stateful: the delimiter and
/// header mapping are resolved on the first line and reused for the rest of
/// the file.
#[derive(Default)]
pub struct CsvParser {
    delimiter: Option<char>,
    headers: Vec<String>,
    indices: ColumnIndices,
    headers_processed: bool,
}

impl CsvParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn process_headers(&mut self, cells: &[String], ctx: &mut ParseContext) {
        self.headers = cells.iter().map(|c| c.trim().to_string()).collect();
        let mut columns = HashMap::new();

        for (idx, header) in self.headers.iter().enumerate() {
            let lower = header.to_lowercase();
            columns.insert(lower.clone(), idx);

            if TIMESTAMP_COLUMNS.contains(&lower.as_str()) {
                self.indices.timestamp = Some(idx);
            } else if LEVEL_COLUMNS.contains(&lower.as_str()) {
                self.indices.level = Some(idx);
            } else if MESSAGE_COLUMNS.contains(&lower.as_str()) {
                self.indices.message = Some(idx);
            } else if LOGGER_COLUMNS.contains(&lower.as_str()) {
                self.indices.logger = Some(idx);
            } else if THREAD_COLUMNS.contains(&lower.as_str()) {
                self.indices.thread = Some(idx);
            } else if HOSTNAME_COLUMNS.contains(&lower.as_str()) {
                self.indices.hostname = Some(idx);
            } else if APPLICATION_COLUMNS.contains(&lower.as_str()) {
                self.indices.application = Some(idx);
            } else if ENVIRONMENT_COLUMNS.contains(&lower.as_str()) {
                self.indices.environment = Some(idx);
            } else if STACK_TRACE_COLUMNS.contains(&lower.as_str()) {
                self.indices.stack_trace = Some(idx);
            }
        }

        ctx.csv_headers = Some(self.headers.clone());
        ctx.csv_columns = columns;
        ctx.csv_headers_processed = true;
        self.headers_processed = true;

        tracing::debug!(
            headers = ?self.headers,
            timestamp = ?self.indices.timestamp,
            level = ?self.indices.level,
            message = ?self.indices.message,
            "resolved CSV header mapping"
        );
    }

    fn generate_default_headers(&mut self, column_count: usize, ctx: &mut ParseContext) {
        self.headers = (0..column_count).map(|i| format!("column_{}", i)).collect();
        let columns: HashMap<String, usize> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();

        // Positional convention for headerless files.
        if column_count >= 1 {
            self.indices.timestamp = Some(0);
        }
        if column_count >= 2 {
            self.indices.level = Some(1);
        }
        if column_count >= 3 {
            self.indices.message = Some(2);
        }

        ctx.csv_headers = Some(self.headers.clone());
        ctx.csv_columns = columns;
        ctx.csv_headers_processed = true;
        self.headers_processed = true;
    }

    fn parse_data_row(
        &self,
        cells: &[String],
        line: &str,
        line_number: u64,
        ctx: &ParseContext,
    ) -> LogEntry {
        let mut entry = base_entry(ctx, line_number, line);

        entry.timestamp = match cell_at(cells, self.indices.timestamp) {
            Some(raw) => timestamp::parse_or_now(raw, ctx),
            None => timestamp::now(),
        };
        entry.level = normalize_level(cell_at(cells, self.indices.level));
        entry.has_error = is_error_level(&entry.level);
        entry.message = match cell_at(cells, self.indices.message) {
            Some(message) => message.to_string(),
            None => self.fallback_message(cells),
        };
        entry.logger = cell_at(cells, self.indices.logger).map(str::to_string);
        entry.thread = cell_at(cells, self.indices.thread).map(str::to_string);
        entry.hostname = cell_at(cells, self.indices.hostname).map(str::to_string);
        entry.application = cell_at(cells, self.indices.application).map(str::to_string);
        entry.environment = cell_at(cells, self.indices.environment).map(str::to_string);

        if let Some(logger) = entry.logger.clone() {
            if let Some(last) = logger.rsplit('.').next() {
                entry.source = Some(last.to_string());
            }
        }

        if let Some(trace) = cell_at(cells, self.indices.stack_trace) {
            entry.stack_trace = Some(trace.to_string());
            entry.has_stack_trace = true;
        }

        let standard = self.indices.standard();
        for (idx, cell) in cells.iter().enumerate() {
            if standard.contains(&Some(idx)) {
                continue;
            }
            let value = cell.trim();
            if value.is_empty() {
                continue;
            }
            let header = self
                .headers
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("column_{}", idx));
            entry.metadata.insert(header, coerce_value(value));
        }

        entry
    }

    /// With no message column, unmapped cells joined together stand in.
    fn fallback_message(&self, cells: &[String]) -> String {
        let skip = [
            self.indices.timestamp,
            self.indices.level,
            self.indices.logger,
            self.indices.thread,
        ];
        cells
            .iter()
            .enumerate()
            .filter(|(idx, _)| !skip.contains(&Some(*idx)))
            .map(|(_, cell)| cell.trim())
            .filter(|cell| !cell.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl LogParser for CsvParser {
    fn can_parse(&self, file_name: &str, sample: &str) -> bool {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".csv") || lower.ends_with(".tsv") {
            return true;
        }

        let trimmed = sample.trim();
        if trimmed.is_empty() || trimmed.starts_with('{') || trimmed.starts_with('[') {
            return false;
        }

        let first_line = trimmed.lines().next().unwrap_or_default();
        detect_delimiter(first_line).is_some()
    }

    fn parse_line(&mut self, line: &str, line_number: u64, ctx: &mut ParseContext) -> ParseOutcome {
        if line.trim().is_empty() {
            return ParseOutcome::Skipped {
                line_number,
                reason: "Empty line".to_string(),
            };
        }

        let delimiter = *self
            .delimiter
            .get_or_insert_with(|| detect_delimiter(line).unwrap_or(','));

        let cells = split_line(line, delimiter);
        if cells.is_empty() {
            return ParseOutcome::Failed {
                line_number,
                raw: line.to_string(),
                error: "Failed to parse CSV row".to_string(),
            };
        }

        if !self.headers_processed {
            if is_header_row(&cells) {
                self.process_headers(&cells, ctx);
                return ParseOutcome::Skipped {
                    line_number,
                    reason: "Header row".to_string(),
                };
            }
            self.generate_default_headers(cells.len(), ctx);
        }

        let entry = self.parse_data_row(&cells, line, line_number, ctx);
        ParseOutcome::Success(Box::new(entry))
    }

    fn flush_pending(&mut self, _ctx: &mut ParseContext) -> Vec<LogEntry> {
        Vec::new()
    }

    fn reset(&mut self) {
        self.delimiter = None;
        self.headers.clear();
        self.indices = ColumnIndices::default();
        self.headers_processed = false;
    }

    fn format(&self) -> &'static str {
        "CSV"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn supports_multi_line(&self) -> bool {
        false
    }

    fn description(&self) -> &'static str {
        "CSV/TSV parser with auto-detection of columns and delimiters"
    }
}

fn cell_at(cells: &[String], index: Option<usize>) -> Option<&str> {
    let cell = cells.get(index?)?.trim();
    if cell.is_empty() {
        None
    } else {
        Some(cell)
    }
}

/// Picks the most frequent unquoted candidate delimiter, requiring at
/// least one occurrence. Ties prefer tab, then comma, semicolon, pipe.
fn detect_delimiter(line: &str) -> Option<char> {
    let mut counts = [0usize; 4];
    let candidates = ['\t', ',', ';', '|'];
    let mut in_quotes = false;
    for ch in line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(pos) = candidates.iter().position(|c| *c == ch) {
                counts[pos] += 1;
            }
        }
    }

    let max = *counts.iter().max()?;
    if max < 1 {
        return None;
    }
    candidates
        .iter()
        .zip(counts.iter())
        .find(|(_, count)| **count == max)
        .map(|(ch, _)| *ch)
}

/// Quote-aware splitter; doubled quotes inside a quoted cell escape.
fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                current.push('"');
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
        } else if ch == delimiter && !in_quotes {
            cells.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    cells.push(current);
    cells
}

/// A first row is a header when any cell matches a known column alias, or
/// every cell is non-numeric.
fn is_header_row(cells: &[String]) -> bool {
    for cell in cells {
        let lower = cell.trim().to_lowercase();
        if TIMESTAMP_COLUMNS.contains(&lower.as_str())
            || LEVEL_COLUMNS.contains(&lower.as_str())
            || MESSAGE_COLUMNS.contains(&lower.as_str())
            || LOGGER_COLUMNS.contains(&lower.as_str())
        {
            return true;
        }
    }

    cells
        .iter()
        .filter(|cell| !cell.trim().is_empty())
        .all(|cell| cell.trim().parse::<f64>().is_err())
}

/// Coercion order: boolean, integer, float, string. Empty stays absent
/// (handled by the caller).
fn coerce_value(value: &str) -> MetaValue {
    if value.eq_ignore_ascii_case("true") {
        return MetaValue::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return MetaValue::Bool(false);
    }
    if let Ok(int) = value.parse::<i64>() {
        return MetaValue::Int(int);
    }
    if let Ok(float) = value.parse::<f64>() {
        return MetaValue::Float(float);
    }
    MetaValue::Str(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext {
        ParseContext::new("job-1", "data.csv", None)
    }

    fn expect_success(outcome: ParseOutcome) -> LogEntry {
        match outcome {
            ParseOutcome::Success(entry) => *entry,
            other => panic!("expected Success, got {:?}", other),
        }
    }

    #[test]
    fn should_parse_header_and_data_rows() {
        // given: the documented CSV ingest scenario
        let mut parser = CsvParser::new();
        let mut ctx = ctx();

        // when
        let header = parser.parse_line("timestamp,severity,msg", 1, &mut ctx);
        let data = parser.parse_line("2024-01-15 10:30:45,ERROR,crash", 2, &mut ctx);

        // then
        assert!(matches!(header, ParseOutcome::Skipped { .. }));
        let entry = expect_success(data);
        assert_eq!(entry.level, "ERROR");
        assert!(entry.has_error);
        assert_eq!(entry.message, "crash");
        assert_eq!(
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-01-15 10:30:45"
        );
    }

    #[test]
    fn should_detect_tab_delimiter() {
        let mut parser = CsvParser::new();
        let mut ctx = ctx();

        parser.parse_line("time\tlevel\tmessage", 1, &mut ctx);
        let entry = expect_success(parser.parse_line("2024-01-15 08:00:00\tWARN\tslow", 2, &mut ctx));

        assert_eq!(entry.level, "WARN");
        assert_eq!(entry.message, "slow");
    }

    #[test]
    fn should_honor_quoted_cells_with_embedded_delimiters() {
        let mut parser = CsvParser::new();
        let mut ctx = ctx();

        parser.parse_line("timestamp,level,message", 1, &mut ctx);
        let entry = expect_success(parser.parse_line(
            r#"2024-01-15 08:00:00,INFO,"hello, ""world"""#,
            2,
            &mut ctx,
        ));

        assert_eq!(entry.message, r#"hello, "world""#);
    }

    #[test]
    fn should_generate_positional_defaults_without_headers() {
        // given: first row is data, so column_N headers are generated
        let mut parser = CsvParser::new();
        let mut ctx = ctx();

        let entry = expect_success(parser.parse_line(
            "2024-01-15 08:00:00,ERROR,disk failure,42",
            1,
            &mut ctx,
        ));

        assert_eq!(entry.level, "ERROR");
        assert_eq!(entry.message, "disk failure");
        assert_eq!(entry.metadata.get("column_3"), Some(&MetaValue::Int(42)));
    }

    #[test]
    fn should_coerce_metadata_cell_types() {
        let mut parser = CsvParser::new();
        let mut ctx = ctx();

        parser.parse_line("timestamp,level,message,count,ratio,ok,note", 1, &mut ctx);
        let entry = expect_success(parser.parse_line(
            "2024-01-15 08:00:00,INFO,m,17,0.5,true,fine",
            2,
            &mut ctx,
        ));

        assert_eq!(entry.metadata.get("count"), Some(&MetaValue::Int(17)));
        assert_eq!(entry.metadata.get("ratio"), Some(&MetaValue::Float(0.5)));
        assert_eq!(entry.metadata.get("ok"), Some(&MetaValue::Bool(true)));
        assert_eq!(
            entry.metadata.get("note"),
            Some(&MetaValue::Str("fine".into()))
        );
    }

    #[test]
    fn should_drop_empty_cells_from_metadata() {
        let mut parser = CsvParser::new();
        let mut ctx = ctx();

        parser.parse_line("timestamp,level,message,extra", 1, &mut ctx);
        let entry = expect_success(parser.parse_line("2024-01-15 08:00:00,INFO,m,", 2, &mut ctx));

        assert!(!entry.metadata.contains_key("extra"));
    }

    #[test]
    fn should_map_stack_trace_column() {
        let mut parser = CsvParser::new();
        let mut ctx = ctx();

        parser.parse_line("timestamp,level,message,stacktrace", 1, &mut ctx);
        let entry = expect_success(parser.parse_line(
            "2024-01-15 08:00:00,ERROR,x,java.lang.Boom at a.B.c",
            2,
            &mut ctx,
        ));

        assert!(entry.has_stack_trace);
        assert_eq!(entry.stack_trace.as_deref(), Some("java.lang.Boom at a.B.c"));
    }

    #[test]
    fn should_treat_all_text_first_row_as_header() {
        let mut parser = CsvParser::new();
        let mut ctx = ctx();

        // No alias matches, but every cell is non-numeric.
        let outcome = parser.parse_line("alpha,beta,gamma", 1, &mut ctx);

        assert!(matches!(outcome, ParseOutcome::Skipped { .. }));
    }

    #[test]
    fn should_treat_numeric_first_row_as_data() {
        let mut parser = CsvParser::new();
        let mut ctx = ctx();

        let outcome = parser.parse_line("1705314645,INFO,started", 1, &mut ctx);

        let entry = expect_success(outcome);
        assert_eq!(entry.message, "started");
    }

    #[test]
    fn should_probe_by_extension_and_delimiter() {
        let parser = CsvParser::new();

        assert!(parser.can_parse("data.csv", ""));
        assert!(parser.can_parse("data.tsv", ""));
        assert!(parser.can_parse("data.log", "a,b,c\n1,2,3"));
        assert!(!parser.can_parse("data.log", r#"{"json": true}"#));
        assert!(!parser.can_parse("data.log", "no delimiters here"));
    }

    #[test]
    fn should_reset_between_files() {
        let mut parser = CsvParser::new();
        let mut ctx = ctx();
        parser.parse_line("timestamp,level,message", 1, &mut ctx);
        assert!(parser.headers_processed);

        parser.reset();

        assert!(!parser.headers_processed);
        assert!(parser.delimiter.is_none());
    }
}
