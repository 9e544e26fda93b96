//! Parser contract and shared parsing state.
//!
//! Each format parser implements [`LogParser`]: a side-effect-free probe
//! (`can_parse`), a stateful per-line `parse_line` returning a typed
//! [`ParseOutcome`], and an end-of-file `flush_pending` for multi-line
//! assembly. Parsers are stateful (stack-trace buffering, CSV headers), so
//! one fresh instance is confined to one ingestion worker per file and
//! `reset` must be called between files.

pub mod csv;
pub mod json;
pub mod level;
pub mod registry;
pub mod text;
pub mod timestamp;

use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::Local;
use logstore::LogEntry;
use uuid::Uuid;

pub use registry::ParserRegistry;

/// Tagged result of parsing a single line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A complete entry ready to store.
    Success(Box<LogEntry>),
    /// An entry was started; the parser retains it while awaiting
    /// continuation lines.
    Buffered { line_number: u64, raw: String },
    /// The line extended the parser's buffered entry.
    Continuation { line_number: u64, raw: String },
    /// Whitespace-only line, header row, or comment.
    Skipped { line_number: u64, reason: String },
    /// Malformed line, counted as a failure.
    Failed {
        line_number: u64,
        raw: String,
        error: String,
    },
}

/// Transient per-file parser state: configuration, the multi-line
/// accumulator, CSV header state, and progress counters.
#[derive(Debug, Default)]
pub struct ParseContext {
    pub job_id: String,
    pub file_name: String,
    /// Caller-supplied timestamp pattern (Java-style), tried first.
    pub timestamp_format: Option<String>,
    pub strict_mode: bool,
    pub max_line_length: usize,

    // Multi-line assembly.
    pub multi_line_buffer: String,
    pub multi_line_start: Option<u64>,
    pub in_multi_line: bool,
    pub multi_line_entries: u64,

    // CSV header state, mirrored by the CSV parser.
    pub csv_headers: Option<Vec<String>>,
    pub csv_columns: HashMap<String, usize>,
    pub csv_headers_processed: bool,

    // Per-file counters.
    pub processed_lines: u64,
    pub successful_lines: u64,
    pub failed_lines: u64,
    pub skipped_lines: u64,
}

impl ParseContext {
    pub fn new(
        job_id: impl Into<String>,
        file_name: impl Into<String>,
        timestamp_format: Option<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            file_name: file_name.into(),
            timestamp_format: timestamp_format.filter(|f| !f.is_empty()),
            max_line_length: 100_000,
            ..Self::default()
        }
    }

    pub fn start_multi_line(&mut self, line_number: u64, content: &str) {
        self.multi_line_buffer.clear();
        self.multi_line_buffer.push_str(content);
        self.multi_line_start = Some(line_number);
        self.in_multi_line = true;
    }

    pub fn append_multi_line(&mut self, content: &str) {
        if !self.in_multi_line {
            return;
        }
        if !self.multi_line_buffer.is_empty() {
            self.multi_line_buffer.push('\n');
        }
        self.multi_line_buffer.push_str(content);
    }

    /// Takes the accumulated multi-line content and clears the state.
    pub fn complete_multi_line(&mut self) -> String {
        let content = std::mem::take(&mut self.multi_line_buffer);
        self.multi_line_start = None;
        self.in_multi_line = false;
        self.multi_line_entries += 1;
        content
    }

    pub fn reset_multi_line(&mut self) {
        self.multi_line_buffer.clear();
        self.multi_line_start = None;
        self.in_multi_line = false;
    }

    pub fn record_success(&mut self) {
        self.processed_lines += 1;
        self.successful_lines += 1;
    }

    pub fn record_failure(&mut self) {
        self.processed_lines += 1;
        self.failed_lines += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped_lines += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.processed_lines == 0 {
            return 0.0;
        }
        (self.successful_lines as f64 * 100.0) / self.processed_lines as f64
    }

    /// Clears all mutable state; called between files.
    pub fn reset(&mut self) {
        self.reset_multi_line();
        self.multi_line_entries = 0;
        self.csv_headers = None;
        self.csv_columns.clear();
        self.csv_headers_processed = false;
        self.processed_lines = 0;
        self.successful_lines = 0;
        self.failed_lines = 0;
        self.skipped_lines = 0;
    }
}

/// Contract every format parser satisfies.
pub trait LogParser: Send + Sync {
    /// Probes whether this parser can handle a file, given its name and a
    /// content sample. Must never mutate parser state.
    fn can_parse(&self, file_name: &str, sample: &str) -> bool;

    /// Parses one line. Stateful: multi-line parsers may buffer the entry
    /// and emit it on a later call or at [`flush_pending`].
    ///
    /// [`flush_pending`]: LogParser::flush_pending
    fn parse_line(&mut self, line: &str, line_number: u64, ctx: &mut ParseContext) -> ParseOutcome;

    /// Emits any residual buffered entries. Called once at end of file.
    fn flush_pending(&mut self, ctx: &mut ParseContext) -> Vec<LogEntry>;

    /// Clears parser state. Must be called between files.
    fn reset(&mut self);

    fn format(&self) -> &'static str;

    fn priority(&self) -> i32;

    fn supports_multi_line(&self) -> bool;

    fn description(&self) -> &'static str;
}

/// Builds a minimally-populated entry for the given source line, with
/// identity and context fields set and INFO defaults.
pub(crate) fn base_entry(ctx: &ParseContext, line_number: u64, raw_line: &str) -> LogEntry {
    let now = Local::now().naive_local();
    LogEntry {
        id: Uuid::new_v4().to_string(),
        job_id: ctx.job_id.clone(),
        line_number,
        timestamp: now,
        indexed_at: now,
        level: "INFO".to_string(),
        has_error: false,
        has_stack_trace: false,
        message: raw_line.to_string(),
        raw_line: raw_line.to_string(),
        stack_trace: None,
        logger: None,
        thread: None,
        source: None,
        hostname: None,
        application: None,
        environment: None,
        file_name: if ctx.file_name.is_empty() {
            None
        } else {
            Some(ctx.file_name.clone())
        },
        metadata: BTreeMap::new(),
        tags: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_accumulate_and_complete_multi_line_content() {
        // given
        let mut ctx = ParseContext::new("job", "a.log", None);

        // when
        ctx.start_multi_line(3, "NullPointerException");
        ctx.append_multi_line("\tat com.example.Svc.run(Svc.java:12)");
        let content = ctx.complete_multi_line();

        // then
        assert_eq!(
            content,
            "NullPointerException\n\tat com.example.Svc.run(Svc.java:12)"
        );
        assert!(!ctx.in_multi_line);
        assert_eq!(ctx.multi_line_entries, 1);
    }

    #[test]
    fn should_ignore_appends_outside_multi_line_mode() {
        let mut ctx = ParseContext::new("job", "a.log", None);

        ctx.append_multi_line("stray");

        assert!(ctx.multi_line_buffer.is_empty());
    }

    #[test]
    fn should_track_counters_and_success_rate() {
        let mut ctx = ParseContext::new("job", "a.log", None);

        ctx.record_success();
        ctx.record_success();
        ctx.record_failure();
        ctx.record_skipped();

        assert_eq!(ctx.processed_lines, 3);
        assert_eq!(ctx.skipped_lines, 1);
        assert!((ctx.success_rate() - 66.666).abs() < 0.01);
    }

    #[test]
    fn should_clear_state_on_reset() {
        let mut ctx = ParseContext::new("job", "a.log", None);
        ctx.record_success();
        ctx.start_multi_line(1, "x");
        ctx.csv_headers_processed = true;

        ctx.reset();

        assert_eq!(ctx.processed_lines, 0);
        assert!(!ctx.in_multi_line);
        assert!(!ctx.csv_headers_processed);
    }

    #[test]
    fn should_drop_empty_timestamp_format() {
        let ctx = ParseContext::new("job", "a.log", Some(String::new()));
        assert!(ctx.timestamp_format.is_none());
    }
}
