//! Timestamp parsing.
//!
//! Every parser funnels raw timestamp text through the same attempt chain:
//! the caller-supplied pattern, ISO-8601 variants, epoch seconds or
//! milliseconds, then a list of common formats. Offsets and `Z` instants
//! are normalized to the system zone (the stored value is zone-less). On
//! total failure the entry falls back to the current wall-clock time rather
//! than failing.

use chrono::{DateTime, Datelike, Local, NaiveDateTime};

use super::ParseContext;

/// Formats attempted in order after the explicit and ISO attempts.
const COMMON_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.3f",
    "%Y-%m-%d %H:%M:%S,%3f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d/%b/%Y:%H:%M:%S",
    "%b %d, %Y %H:%M:%S",
];

/// Year-less formats (syslog style); the current year is injected.
const YEARLESS_FORMATS: &[&str] = &["%Y %b %d %H:%M:%S"];

/// Current wall-clock time as a zone-less local datetime.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Parses a timestamp through the attempt chain, or `None` when nothing
/// matched.
pub fn parse_timestamp(raw: &str, ctx: &ParseContext) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(pattern) = &ctx.timestamp_format {
        let chrono_pattern = java_to_chrono(pattern);
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, &chrono_pattern) {
            return Some(ts);
        }
    }

    // ISO-8601 with an offset or Z, normalized to the system zone.
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Local).naive_local());
    }

    // Epoch seconds or milliseconds.
    if raw.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(epoch) = raw.parse::<i64>() {
            return epoch_to_local(epoch);
        }
    }

    for format in COMMON_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }

    // Syslog timestamps carry no year; assume the current one.
    let with_year = format!("{} {}", Local::now().year(), raw);
    for format in YEARLESS_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(&with_year, format) {
            return Some(ts);
        }
    }

    // Apache access format with a trailing zone: 15/Jan/2024:10:30:45 +0000
    if raw.contains('/') && raw.contains(':') {
        if let Some(cleaned) = raw.split_whitespace().next() {
            if let Ok(ts) = NaiveDateTime::parse_from_str(cleaned, "%d/%b/%Y:%H:%M:%S") {
                return Some(ts);
            }
        }
    }

    None
}

/// Like [`parse_timestamp`], falling back to the current time.
pub fn parse_or_now(raw: &str, ctx: &ParseContext) -> NaiveDateTime {
    parse_timestamp(raw, ctx).unwrap_or_else(now)
}

/// Converts an epoch value to local time, treating values above 10^12 as
/// milliseconds and anything smaller as seconds.
pub fn epoch_to_local(epoch: i64) -> Option<NaiveDateTime> {
    let utc = if epoch > 1_000_000_000_000 {
        DateTime::from_timestamp_millis(epoch)?
    } else {
        DateTime::from_timestamp(epoch, 0)?
    };
    Some(utc.with_timezone(&Local).naive_local())
}

/// Translates the accepted Java-style pattern tokens (`yyyy-MM-dd
/// HH:mm:ss.SSS` and friends) into a chrono format string. Quoted literals
/// are unwrapped; unknown characters pass through.
pub fn java_to_chrono(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '\'' => {
                // Quoted literal run; '' is an escaped quote.
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\'' {
                        if i + 1 < chars.len() && chars[i + 1] == '\'' {
                            out.push('\'');
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    out.push(chars[i]);
                    i += 1;
                }
                i += 1;
            }
            'y' | 'M' | 'd' | 'H' | 'm' | 's' | 'S' | 'a' | 'E' => {
                let run_start = i;
                while i < chars.len() && chars[i] == ch {
                    i += 1;
                }
                let run = i - run_start;
                out.push_str(&translate_token(ch, run));
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

fn translate_token(token: char, run: usize) -> String {
    match (token, run) {
        ('y', 2) => "%y".to_string(),
        ('y', _) => "%Y".to_string(),
        ('M', 3) => "%b".to_string(),
        ('M', 4) => "%B".to_string(),
        ('M', _) => "%m".to_string(),
        ('d', _) => "%d".to_string(),
        ('H', _) => "%H".to_string(),
        ('m', _) => "%M".to_string(),
        ('s', _) => "%S".to_string(),
        ('S', 3) => "%3f".to_string(),
        ('S', 6) => "%6f".to_string(),
        ('S', _) => "%f".to_string(),
        ('a', _) => "%p".to_string(),
        ('E', _) => "%a".to_string(),
        _ => String::new(),
    }
}
