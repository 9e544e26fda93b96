//! Parser registry and dispatch.
//!
//! Holds one prototype per format for probing plus a factory producing the
//! fresh, worker-confined instance a job actually parses with. Selection
//! tries the extension mapping first, verifies it against a content sample,
//! then falls back to a priority-ordered probe and finally the text parser.
//! The registry itself is never mutated mid-flight: configuration changes
//! rebuild it and swap the `Arc`.

use std::path::Path;

use super::csv::CsvParser;
use super::json::JsonParser;
use super::text::TextParser;
use super::LogParser;
use crate::error::{Error, Result};
use crate::reader::LineReader;

/// Lines sampled from the head of a file for content detection.
const SAMPLE_LINES: usize = 10;

/// Character cap on the content sample.
const MAX_SAMPLE_CHARS: usize = 4096;

type ParserFactory = Box<dyn Fn() -> Box<dyn LogParser> + Send + Sync>;

struct RegistryEntry {
    prototype: Box<dyn LogParser>,
    factory: ParserFactory,
}

/// Introspection record for one registered parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserInfo {
    pub format: &'static str,
    pub description: &'static str,
    pub priority: i32,
    pub multi_line: bool,
}

/// Priority-ordered parser registry.
pub struct ParserRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ParserRegistry {
    /// Registry with the built-in JSON (20), CSV (10), and text (0)
    /// parsers.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            entries: Vec::new(),
        };
        registry.register(Box::new(JsonParser::new()), Box::new(|| Box::new(JsonParser::new())));
        registry.register(Box::new(CsvParser::new()), Box::new(|| Box::new(CsvParser::new())));
        registry.register(Box::new(TextParser::new()), Box::new(|| Box::new(TextParser::new())));
        registry
    }

    /// Registers a parser, keeping entries sorted by priority descending.
    pub fn register(&mut self, prototype: Box<dyn LogParser>, factory: ParserFactory) {
        tracing::info!(
            format = prototype.format(),
            priority = prototype.priority(),
            "registering parser"
        );
        self.entries.push(RegistryEntry { prototype, factory });
        self.entries
            .sort_by(|a, b| b.prototype.priority().cmp(&a.prototype.priority()));
    }

    /// Removes the parser for a format (case-insensitive). Returns whether
    /// one was removed.
    pub fn unregister(&mut self, format: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !entry.prototype.format().eq_ignore_ascii_case(format));
        let removed = self.entries.len() < before;
        if removed {
            tracing::info!(format, "unregistered parser");
        }
        removed
    }

    /// Registered formats in priority order.
    pub fn formats(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.prototype.format()).collect()
    }

    /// Introspection for monitoring and the fields endpoint.
    pub fn parser_info(&self) -> Vec<ParserInfo> {
        self.entries
            .iter()
            .map(|e| ParserInfo {
                format: e.prototype.format(),
                description: e.prototype.description(),
                priority: e.prototype.priority(),
                multi_line: e.prototype.supports_multi_line(),
            })
            .collect()
    }

    /// A fresh parser instance for a format (case-insensitive).
    pub fn by_format(&self, format: &str) -> Option<Box<dyn LogParser>> {
        self.entries
            .iter()
            .find(|e| e.prototype.format().eq_ignore_ascii_case(format))
            .map(|e| (e.factory)())
    }

    /// Selects a fresh parser for a file.
    ///
    /// 1. The extension mapping, confirmed by `can_parse`.
    /// 2. Priority-ordered content probing.
    /// 3. The text parser as last resort.
    pub fn select(&self, file_name: &str, sample: &str) -> Result<Box<dyn LogParser>> {
        if let Some(format) = extension_format(file_name) {
            if let Some(entry) = self
                .entries
                .iter()
                .find(|e| e.prototype.format().eq_ignore_ascii_case(format))
            {
                if entry.prototype.can_parse(file_name, sample) {
                    tracing::debug!(file_name, format, "selected parser by extension");
                    return Ok((entry.factory)());
                }
            }
        }

        for entry in &self.entries {
            if entry.prototype.can_parse(file_name, sample) {
                tracing::debug!(
                    file_name,
                    format = entry.prototype.format(),
                    "selected parser by content detection"
                );
                return Ok((entry.factory)());
            }
        }

        if let Some(parser) = self.by_format("TEXT") {
            tracing::warn!(file_name, "no specific parser matched, falling back to TEXT");
            return Ok(parser);
        }

        Err(Error::Parse(format!(
            "no suitable parser found for file: {} (available: {})",
            file_name,
            self.formats().join(", ")
        )))
    }
}

/// Maps well-known extensions to a format name.
pub fn extension_format(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".json") || lower.ends_with(".ndjson") {
        Some("JSON")
    } else if lower.ends_with(".csv") || lower.ends_with(".tsv") {
        Some("CSV")
    } else if lower.ends_with(".log")
        || lower.ends_with(".txt")
        || lower.ends_with(".out")
        || lower.ends_with(".err")
    {
        Some("TEXT")
    } else {
        None
    }
}

/// Reads the content sample used for parser probing: at most
/// [`SAMPLE_LINES`] lines or [`MAX_SAMPLE_CHARS`] characters.
pub async fn sample_content(path: &Path) -> Result<String> {
    let reader = LineReader::default();
    let mut stream = reader.open(path, 1).await?;
    let mut sample = String::new();
    let mut lines = 0usize;

    while lines < SAMPLE_LINES && sample.len() < MAX_SAMPLE_CHARS {
        let Some((line, _)) = stream.next_line().await? else {
            break;
        };
        if !sample.is_empty() {
            sample.push('\n');
        }
        sample.push_str(&line);
        lines += 1;
    }

    if sample.len() > MAX_SAMPLE_CHARS {
        let mut cut = MAX_SAMPLE_CHARS;
        while !sample.is_char_boundary(cut) {
            cut -= 1;
        }
        sample.truncate(cut);
    }
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseContext, ParseOutcome};
    use logstore::LogEntry;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// A parser that never matches and records nothing; verifies registry
    /// ordering and registration.
    struct InertParser {
        format: &'static str,
        priority: i32,
    }

    impl LogParser for InertParser {
        fn can_parse(&self, _file_name: &str, _sample: &str) -> bool {
            false
        }

        fn parse_line(
            &mut self,
            _line: &str,
            line_number: u64,
            _ctx: &mut ParseContext,
        ) -> ParseOutcome {
            ParseOutcome::Skipped {
                line_number,
                reason: "inert".to_string(),
            }
        }

        fn flush_pending(&mut self, _ctx: &mut ParseContext) -> Vec<LogEntry> {
            Vec::new()
        }

        fn reset(&mut self) {}

        fn format(&self) -> &'static str {
            self.format
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn supports_multi_line(&self) -> bool {
            false
        }

        fn description(&self) -> &'static str {
            "inert test parser"
        }
    }

    #[test]
    fn should_order_parsers_by_priority_descending() {
        let registry = ParserRegistry::with_defaults();
        assert_eq!(registry.formats(), vec!["JSON", "CSV", "TEXT"]);
    }

    #[test]
    fn should_select_by_extension_with_content_confirmation() {
        let registry = ParserRegistry::with_defaults();

        let parser = registry
            .select("events.ndjson", r#"{"level":"INFO"}"#)
            .unwrap();
        assert_eq!(parser.format(), "JSON");

        let parser = registry.select("data.csv", "a,b,c").unwrap();
        assert_eq!(parser.format(), "CSV");

        let parser = registry
            .select("app.log", "2024-01-15 10:30:45 INFO ok")
            .unwrap();
        assert_eq!(parser.format(), "TEXT");
    }

    #[test]
    fn should_override_extension_when_content_disagrees() {
        // given: a .log file whose content is NDJSON
        let registry = ParserRegistry::with_defaults();

        // when: the TEXT probe rejects JSON content, priority scan wins
        let parser = registry
            .select("app.log", r#"{"level":"ERROR","message":"x"}"#)
            .unwrap();

        // then
        assert_eq!(parser.format(), "JSON");
    }

    #[test]
    fn should_fall_back_to_text_for_unknown_shapes() {
        let registry = ParserRegistry::with_defaults();

        let parser = registry.select("dump.bin", "random noise without structure").unwrap();
        assert_eq!(parser.format(), "TEXT");
    }

    #[test]
    fn should_look_up_by_format_case_insensitively() {
        let registry = ParserRegistry::with_defaults();

        assert!(registry.by_format("json").is_some());
        assert!(registry.by_format("Csv").is_some());
        assert!(registry.by_format("TEXT").is_some());
        assert!(registry.by_format("xml").is_none());
    }

    #[test]
    fn should_register_and_unregister_at_runtime() {
        let mut registry = ParserRegistry::with_defaults();

        registry.register(
            Box::new(InertParser {
                format: "INERT",
                priority: 30,
            }),
            Box::new(|| {
                Box::new(InertParser {
                    format: "INERT",
                    priority: 30,
                })
            }),
        );

        assert_eq!(registry.formats()[0], "INERT");
        assert!(registry.unregister("inert"));
        assert!(!registry.unregister("inert"));
        assert_eq!(registry.formats(), vec!["JSON", "CSV", "TEXT"]);
    }

    #[test]
    fn should_expose_parser_info() {
        let registry = ParserRegistry::with_defaults();
        let info = registry.parser_info();

        assert_eq!(info.len(), 3);
        assert_eq!(info[0].format, "JSON");
        assert_eq!(info[0].priority, 20);
        assert!(!info[0].multi_line);
        assert!(info[2].multi_line);
    }

    #[tokio::test]
    async fn should_sample_at_most_ten_lines() {
        let mut file = NamedTempFile::new().unwrap();
        for i in 0..20 {
            writeln!(file, "line {}", i).unwrap();
        }
        file.flush().unwrap();

        let sample = sample_content(file.path()).await.unwrap();

        assert_eq!(sample.lines().count(), 10);
        assert!(sample.starts_with("line 0"));
    }

    #[tokio::test]
    async fn should_cap_sample_size() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", "x".repeat(10_000)).unwrap();
        file.flush().unwrap();

        let sample = sample_content(file.path()).await.unwrap();

        assert!(sample.len() <= MAX_SAMPLE_CHARS);
    }
}
