//! Text log parser.
//!
//! Recognizes six line shapes, tried most specific first: Spring Boot,
//! Log4j/Logback, Apache/Nginx combined access, syslog, bare ISO timestamp,
//! and simple bracketed lines. Lines matching none of them become basic
//! INFO entries.
//!
//! Multi-line assembly retains the most recent entry inside the parser
//! until the next entry (or end of file) flushes it, so stack-trace
//! continuation lines always have an owner to attach to. Exception headers
//! and entries whose message mentions an exception open the trace buffer
//! eagerly; a stray `at ...` frame after any other entry opens it on
//! demand.

use lazy_static::lazy_static;
use logstore::{LogEntry, MetaValue};
use regex::{Captures, Regex};

use super::level::{is_error_level, normalize_level};
use super::timestamp;
use super::{base_entry, LogParser, ParseContext, ParseOutcome};

struct LinePattern {
    name: &'static str,
    regex: Regex,
    multi_line: bool,
}

lazy_static! {
    static ref PATTERNS: Vec<LinePattern> = vec![
        // 2024-01-15 10:30:45.123  INFO 1234 --- [main] c.e.Class : Message
        LinePattern {
            name: "SPRING_BOOT",
            regex: Regex::new(
                r"(?i)^(?P<timestamp>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d{1,6})?)\s+(?P<level>TRACE|DEBUG|INFO|WARN|ERROR)\s+(?P<pid>\d+)?\s*---\s+\[\s*(?P<thread>[^\]]+)\]\s+(?P<logger>[\w.$]+)\s*:\s+(?P<message>.*)$"
            )
            .expect("spring boot pattern"),
            multi_line: true,
        },
        // 2024-01-15 10:30:45.123 [main] ERROR com.example.Class - Message
        LinePattern {
            name: "LOG4J",
            regex: Regex::new(
                r"(?i)^(?P<timestamp>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d{1,6})?)\s+(?:\[(?P<thread>[^\]]+)\]\s+)?(?P<level>TRACE|DEBUG|INFO|WARN(?:ING)?|ERROR|FATAL|SEVERE)\s+(?:(?P<logger>[\w.$]+)\s+[-:]\s+)?(?P<message>.*)$"
            )
            .expect("log4j pattern"),
            multi_line: true,
        },
        // 192.168.1.1 - - [15/Jan/2024:10:30:45 +0000] "GET / HTTP/1.1" 200 1234
        LinePattern {
            name: "APACHE",
            regex: Regex::new(
                r#"(?i)^(?P<ip>[\d.]+|[\da-f:]+)\s+(?P<ident>\S+)\s+(?P<user>\S+)\s+\[(?P<timestamp>[^\]]+)\]\s+"(?P<request>[^"]*)"\s+(?P<status>\d{3})\s+(?P<bytes>\d+|-)(?:\s+"(?P<referer>[^"]*)"\s+"(?P<useragent>[^"]*)")?"#
            )
            .expect("apache pattern"),
            multi_line: false,
        },
        // Jan 15 10:30:45 hostname service[pid]: message
        LinePattern {
            name: "SYSLOG",
            regex: Regex::new(
                r"^(?P<timestamp>\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(?P<hostname>[\w.-]+)\s+(?P<service>[\w.-]+)(?:\[(?P<pid>\d+)\])?:?\s+(?P<message>.*)$"
            )
            .expect("syslog pattern"),
            multi_line: true,
        },
        // 2024-01-15T10:30:45.123Z INFO message
        LinePattern {
            name: "ISO",
            regex: Regex::new(
                r"(?i)^(?P<timestamp>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\s+(?P<level>TRACE|DEBUG|INFO|WARN(?:ING)?|ERROR|FATAL|SEVERE)?\s*(?P<message>.*)$"
            )
            .expect("iso pattern"),
            multi_line: true,
        },
        // [2024-01-15 10:30:45] INFO: Application started
        LinePattern {
            name: "SIMPLE",
            regex: Regex::new(
                r"(?i)^\[?(?P<timestamp>[^\]]+)\]?\s+(?P<level>TRACE|DEBUG|INFO|WARN(?:ING)?|ERROR|FATAL|SEVERE)\s*:?\s+(?P<message>.*)$"
            )
            .expect("simple pattern"),
            multi_line: true,
        },
    ];

    static ref STACK_TRACE_LINE: Regex =
        Regex::new(r"^(?:\s+at\s+|\s+\.{3}\s+\d+\s+more|Caused\s+by:|Suppressed:)")
            .expect("stack trace pattern");

    static ref EXCEPTION_LINE: Regex =
        Regex::new(r"^[\w.$]+(?:Exception|Error|Throwable)(?::\s+.*)?$")
            .expect("exception pattern");

    static ref KEY_VALUE: Regex =
        Regex::new(r#"([\w.]+)=(?:"([^"]*)"|'([^']*)'|([^\s,"']+))"#).expect("key=value pattern");

    static ref IP_LITERAL: Regex = Regex::new(
        r"\b(?:(?:\d{1,3}\.){3}\d{1,3}|(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4})\b"
    )
    .expect("ip pattern");

    static ref URL_LITERAL: Regex = Regex::new(r#"https?://[^\s"'<>]+"#).expect("url pattern");

    static ref REQUEST_ID: Regex = Regex::new(
        r"(?i)(?:request[_-]?id|correlation[_-]?id|trace[_-]?id|x-request-id)[=:\s]+([\w-]+)"
    )
    .expect("request id pattern");
}

/// Parser for plain-text log formats with multi-line stack trace assembly.
#[derive(Default)]
pub struct TextParser {
    /// Most recent entry, retained until the next one flushes it. Its
    /// accumulated stack-trace text lives in the [`ParseContext`] buffer
    /// while `ctx.in_multi_line` is set.
    buffered: Option<LogEntry>,
}

impl TextParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the retained entry, attaching any accumulated trace.
    fn take_buffered(&mut self, ctx: &mut ParseContext) -> Option<LogEntry> {
        let mut entry = self.buffered.take()?;
        if ctx.in_multi_line {
            let trace = ctx.complete_multi_line();
            if !trace.is_empty() {
                entry.stack_trace = Some(trace);
                entry.has_stack_trace = true;
            }
        }
        ctx.reset_multi_line();
        Some(entry)
    }

    /// Retains `entry` and returns the previously retained one (flushed as
    /// `Success`) or a `Buffered` marker when there was none.
    fn retain(
        &mut self,
        entry: LogEntry,
        line_number: u64,
        raw: &str,
        ctx: &mut ParseContext,
        open_trace_buffer: bool,
        trace_seed: &str,
    ) -> ParseOutcome {
        let previous = self.take_buffered(ctx);
        if open_trace_buffer {
            ctx.start_multi_line(line_number, trace_seed);
        }
        self.buffered = Some(entry);
        match previous {
            Some(previous) => ParseOutcome::Success(Box::new(previous)),
            None => ParseOutcome::Buffered {
                line_number,
                raw: raw.to_string(),
            },
        }
    }

    fn entry_from_captures(
        &self,
        pattern: &LinePattern,
        captures: &Captures<'_>,
        line: &str,
        line_number: u64,
        ctx: &ParseContext,
    ) -> LogEntry {
        let mut entry = base_entry(ctx, line_number, line);

        if let Some(raw_ts) = captures.name("timestamp") {
            entry.timestamp = timestamp::parse_or_now(raw_ts.as_str(), ctx);
        }

        match captures.name("level") {
            Some(level) => {
                entry.level = normalize_level(Some(level.as_str()));
                entry.has_error = is_error_level(&entry.level);
            }
            None => {
                // Apache lines carry no level; infer one from the status.
                if let Some(status) = captures.name("status") {
                    let code: u16 = status.as_str().parse().unwrap_or(0);
                    if code >= 500 {
                        entry.level = "ERROR".to_string();
                        entry.has_error = true;
                    } else if code >= 400 {
                        entry.level = "WARN".to_string();
                    } else {
                        entry.level = "INFO".to_string();
                    }
                }
            }
        }

        if let Some(thread) = captures.name("thread") {
            entry.thread = Some(thread.as_str().trim().to_string());
        }

        let logger = captures
            .name("logger")
            .or_else(|| captures.name("service"))
            .map(|m| m.as_str().to_string());
        if let Some(logger) = logger {
            if let Some(last) = logger.rsplit('.').next() {
                entry.source = Some(last.to_string());
            }
            entry.logger = Some(logger);
        }

        if let Some(hostname) = captures.name("hostname") {
            entry.hostname = Some(hostname.as_str().to_string());
        }

        let message = match captures.name("message") {
            Some(message) => message.as_str().to_string(),
            None => match captures.name("request") {
                Some(request) => match captures.name("status") {
                    Some(status) => format!("{} {}", request.as_str(), status.as_str()),
                    None => request.as_str().to_string(),
                },
                None => line.to_string(),
            },
        };
        entry.message = message.trim().to_string();

        extract_metadata(&mut entry, pattern.name, captures, line);

        entry
    }
}

impl LogParser for TextParser {
    fn can_parse(&self, file_name: &str, sample: &str) -> bool {
        let trimmed = sample.trim();
        if trimmed.is_empty() {
            let lower = file_name.to_lowercase();
            return lower.ends_with(".log")
                || lower.ends_with(".txt")
                || lower.ends_with(".out")
                || lower.ends_with(".err");
        }

        // Structured samples belong to the JSON parser.
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return false;
        }

        // Anything else is acceptable text; pattern hits just confirm it.
        true
    }

    fn parse_line(&mut self, line: &str, line_number: u64, ctx: &mut ParseContext) -> ParseOutcome {
        if line.trim().is_empty() {
            if let Some(entry) = self.take_buffered(ctx) {
                return ParseOutcome::Success(Box::new(entry));
            }
            return ParseOutcome::Skipped {
                line_number,
                reason: "Empty line".to_string(),
            };
        }

        let truncated;
        let line: &str = if line.len() > ctx.max_line_length
            && line.chars().count() > ctx.max_line_length
        {
            tracing::warn!(
                line = line_number,
                max = ctx.max_line_length,
                "line exceeds maximum length, truncating"
            );
            truncated = line.chars().take(ctx.max_line_length).collect::<String>();
            &truncated
        } else {
            line
        };

        if STACK_TRACE_LINE.is_match(line) {
            if self.buffered.is_some() {
                if ctx.in_multi_line {
                    ctx.append_multi_line(line);
                } else {
                    ctx.start_multi_line(line_number, line);
                }
                return ParseOutcome::Continuation {
                    line_number,
                    raw: line.to_string(),
                };
            }
            // Stack frame with no owning entry: keep it on its own.
            let mut entry = base_entry(ctx, line_number, line);
            entry.stack_trace = Some(line.to_string());
            entry.has_stack_trace = true;
            return ParseOutcome::Success(Box::new(entry));
        }

        if EXCEPTION_LINE.is_match(line.trim()) {
            let mut entry = base_entry(ctx, line_number, line);
            entry.level = "ERROR".to_string();
            entry.has_error = true;
            entry.has_stack_trace = true;
            return self.retain(entry, line_number, line, ctx, true, line);
        }

        for pattern in PATTERNS.iter() {
            if let Some(captures) = pattern.regex.captures(line) {
                let entry = self.entry_from_captures(pattern, &captures, line, line_number, ctx);
                let opens_trace =
                    pattern.multi_line && has_stack_trace_indicator(&entry.message);
                return self.retain(entry, line_number, line, ctx, opens_trace, "");
            }
        }

        // No pattern matched.
        if ctx.in_multi_line && self.buffered.is_some() {
            ctx.append_multi_line(line);
            return ParseOutcome::Continuation {
                line_number,
                raw: line.to_string(),
            };
        }

        let entry = base_entry(ctx, line_number, line);
        self.retain(entry, line_number, line, ctx, false, "")
    }

    fn flush_pending(&mut self, ctx: &mut ParseContext) -> Vec<LogEntry> {
        self.take_buffered(ctx).into_iter().collect()
    }

    fn reset(&mut self) {
        self.buffered = None;
    }

    fn format(&self) -> &'static str {
        "TEXT"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn supports_multi_line(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Text log parser supporting Spring Boot, Log4j/Logback, Apache, syslog, and bracketed formats"
    }
}

fn has_stack_trace_indicator(message: &str) -> bool {
    message.contains("Exception") || message.contains("Error") || message.contains("Throwable")
}

fn extract_metadata(entry: &mut LogEntry, pattern_name: &str, captures: &Captures<'_>, line: &str) {
    for kv in KEY_VALUE.captures_iter(line) {
        let key = kv.get(1).map(|m| m.as_str()).unwrap_or_default();
        let value = kv
            .get(2)
            .or_else(|| kv.get(3))
            .or_else(|| kv.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if !key.is_empty() {
            entry
                .metadata
                .insert(key.to_string(), MetaValue::Str(value.to_string()));
        }
    }

    if let Some(ip) = IP_LITERAL.find(line) {
        entry
            .metadata
            .insert("ip_address".to_string(), MetaValue::Str(ip.as_str().to_string()));
    }

    if let Some(url) = URL_LITERAL.find(line) {
        entry
            .metadata
            .insert("url".to_string(), MetaValue::Str(url.as_str().to_string()));
    }

    if let Some(id) = REQUEST_ID.captures(line).and_then(|c| c.get(1)) {
        entry
            .metadata
            .insert("request_id".to_string(), MetaValue::Str(id.as_str().to_string()));
    }

    if pattern_name == "APACHE" {
        if let Some(ip) = captures.name("ip") {
            entry
                .metadata
                .insert("client_ip".to_string(), MetaValue::Str(ip.as_str().to_string()));
        }
        if let Some(user) = captures.name("user") {
            if user.as_str() != "-" {
                entry
                    .metadata
                    .insert("user".to_string(), MetaValue::Str(user.as_str().to_string()));
            }
        }
        if let Some(status) = captures.name("status") {
            if let Ok(code) = status.as_str().parse::<i64>() {
                entry
                    .metadata
                    .insert("http_status".to_string(), MetaValue::Int(code));
            }
        }
        if let Some(bytes) = captures.name("bytes") {
            if bytes.as_str() != "-" {
                if let Ok(count) = bytes.as_str().parse::<i64>() {
                    entry.metadata.insert("bytes".to_string(), MetaValue::Int(count));
                }
            }
        }
        if let Some(referer) = captures.name("referer") {
            if referer.as_str() != "-" && !referer.as_str().is_empty() {
                entry.metadata.insert(
                    "referer".to_string(),
                    MetaValue::Str(referer.as_str().to_string()),
                );
            }
        }
        if let Some(agent) = captures.name("useragent") {
            if agent.as_str() != "-" && !agent.as_str().is_empty() {
                entry.metadata.insert(
                    "user_agent".to_string(),
                    MetaValue::Str(agent.as_str().to_string()),
                );
            }
        }
    }

    if pattern_name == "SYSLOG" {
        if let Some(pid) = captures.name("pid") {
            if let Ok(pid) = pid.as_str().parse::<i64>() {
                entry.metadata.insert("pid".to_string(), MetaValue::Int(pid));
            }
        }
    }
}
