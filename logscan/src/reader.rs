//! Streaming line reader.
//!
//! Reads files line by line without ever holding the whole file in memory.
//! Detects a UTF-8 or UTF-16 byte order mark and decodes accordingly
//! (defaulting to UTF-8), truncates lines beyond the configured maximum
//! length, and supports the two passes the ingestion pipeline makes: a line
//! count for the progress denominator, then the real iteration.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tracing::warn;

use crate::error::{Error, Result};

/// Detected input encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

/// Summary of one reading pass.
#[derive(Debug, Clone, Default)]
pub struct ProcessingStats {
    /// Lines handed to the caller.
    pub total_lines: u64,
    /// Bytes consumed from the file.
    pub bytes_read: u64,
    pub elapsed_ms: u64,
    pub start_line: u64,
    /// Last line number seen, including skipped leading lines.
    pub end_line: u64,
}

impl ProcessingStats {
    pub fn lines_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        (self.total_lines as f64 * 1000.0) / self.elapsed_ms as f64
    }

    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        (self.bytes_read as f64 * 1000.0) / self.elapsed_ms as f64
    }
}

type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&Error) + Send + Sync>;

/// Configurable file reader producing `(line, 1-based index)` pairs.
pub struct LineReader {
    buffer_size: usize,
    max_line_length: usize,
    progress_interval: u64,
    on_progress: Option<ProgressFn>,
    on_error: Option<ErrorFn>,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new(8192, 100_000, 1000)
    }
}

impl LineReader {
    pub fn new(buffer_size: usize, max_line_length: usize, progress_interval: u64) -> Self {
        Self {
            buffer_size: buffer_size.max(1024),
            max_line_length,
            progress_interval: progress_interval.max(1),
            on_progress: None,
            on_error: None,
        }
    }

    /// Registers a `(current, total)` progress callback. Also enables the
    /// counting pass in [`process`](Self::process).
    pub fn with_progress(mut self, callback: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Registers a per-line error callback. With one present, handler
    /// failures are reported and reading continues; without, they
    /// propagate.
    pub fn with_error_handler(mut self, callback: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Counts the lines of a file (first pass).
    pub async fn count_lines(&self, path: &Path) -> Result<u64> {
        let mut stream = self.open(path, 1).await?;
        let mut count = 0u64;
        while stream.next_line().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Opens a streaming pass over the file, resuming at `start_line`
    /// (1-based; earlier lines are read but not emitted).
    pub async fn open(&self, path: &Path, start_line: u64) -> Result<LineStream> {
        let mut file = File::open(path)
            .await
            .map_err(|e| Error::Parse(format!("cannot open {}: {}", path.display(), e)))?;

        let mut bom = [0u8; 3];
        let bom_read = read_up_to(&mut file, &mut bom).await?;
        let (encoding, bom_len) = detect_bom(&bom[..bom_read]);
        file.seek(SeekFrom::Start(bom_len as u64))
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        let source = match encoding {
            Encoding::Utf8 => LineSource::Utf8(BufReader::with_capacity(self.buffer_size, file)),
            Encoding::Utf16Le | Encoding::Utf16Be => LineSource::Utf16 {
                file,
                little_endian: encoding == Encoding::Utf16Le,
                pending: Vec::new(),
                lines: VecDeque::new(),
                chunk_size: self.buffer_size,
                eof: false,
            },
        };

        Ok(LineStream {
            source,
            encoding,
            max_line_length: self.max_line_length,
            start_line: start_line.max(1),
            line_number: 0,
            emitted: 0,
            bytes_read: 0,
            started: Instant::now(),
        })
    }

    /// Processes a file line by line with a synchronous handler, reporting
    /// progress every `progress_interval` handled lines when a progress
    /// callback is registered.
    pub async fn process<F>(
        &self,
        path: &Path,
        start_line: u64,
        mut handler: F,
    ) -> Result<ProcessingStats>
    where
        F: FnMut(&str, u64) -> Result<()>,
    {
        let total = if self.on_progress.is_some() {
            self.count_lines(path).await?
        } else {
            0
        };

        let mut stream = self.open(path, start_line).await?;
        let mut handled = 0u64;
        while let Some((line, line_number)) = stream.next_line().await? {
            match handler(&line, line_number) {
                Ok(()) => {}
                Err(err) => match &self.on_error {
                    Some(on_error) => on_error(&err),
                    None => return Err(err),
                },
            }

            handled += 1;
            if handled % self.progress_interval == 0 {
                if let Some(on_progress) = &self.on_progress {
                    on_progress(line_number, total);
                }
            }
        }

        Ok(stream.finish())
    }
}

async fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file
            .read(&mut buf[filled..])
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn detect_bom(head: &[u8]) -> (Encoding, usize) {
    if head.len() >= 3 && head[..3] == [0xEF, 0xBB, 0xBF] {
        return (Encoding::Utf8, 3);
    }
    if head.len() >= 2 {
        if head[..2] == [0xFF, 0xFE] {
            return (Encoding::Utf16Le, 2);
        }
        if head[..2] == [0xFE, 0xFF] {
            return (Encoding::Utf16Be, 2);
        }
    }
    (Encoding::Utf8, 0)
}

enum LineSource {
    Utf8(BufReader<File>),
    Utf16 {
        file: File,
        little_endian: bool,
        pending: Vec<u8>,
        lines: VecDeque<String>,
        chunk_size: usize,
        eof: bool,
    },
}

/// One streaming pass over a file, yielding `(line, line_number)` pairs.
pub struct LineStream {
    source: LineSource,
    encoding: Encoding,
    max_line_length: usize,
    start_line: u64,
    line_number: u64,
    emitted: u64,
    bytes_read: u64,
    started: Instant,
}

impl LineStream {
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Yields the next line at or after the configured start line, or
    /// `None` at end of file. Lines longer than the maximum are truncated
    /// with a warning.
    pub async fn next_line(&mut self) -> Result<Option<(String, u64)>> {
        loop {
            let Some(mut line) = self.read_raw_line().await? else {
                return Ok(None);
            };
            self.line_number += 1;
            if self.line_number < self.start_line {
                continue;
            }

            if line.len() > self.max_line_length
                && line.chars().count() > self.max_line_length
            {
                warn!(
                    line = self.line_number,
                    length = line.chars().count(),
                    max = self.max_line_length,
                    "line exceeds maximum length, truncating"
                );
                line = line.chars().take(self.max_line_length).collect();
            }

            self.emitted += 1;
            return Ok(Some((line, self.line_number)));
        }
    }

    /// Consumes the stream and returns pass statistics.
    pub fn finish(self) -> ProcessingStats {
        ProcessingStats {
            total_lines: self.emitted,
            bytes_read: self.bytes_read,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            start_line: self.start_line,
            end_line: self.line_number,
        }
    }

    async fn read_raw_line(&mut self) -> Result<Option<String>> {
        match &mut self.source {
            LineSource::Utf8(reader) => {
                let mut buf = Vec::new();
                let n = reader
                    .read_until(b'\n', &mut buf)
                    .await
                    .map_err(|e| Error::Parse(e.to_string()))?;
                if n == 0 {
                    return Ok(None);
                }
                self.bytes_read += n as u64;
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
            }
            LineSource::Utf16 {
                file,
                little_endian,
                pending,
                lines,
                chunk_size,
                eof,
            } => {
                loop {
                    if let Some(line) = lines.pop_front() {
                        return Ok(Some(line));
                    }
                    if *eof {
                        // Trailing content without a final newline.
                        if pending.len() >= 2 {
                            let units = to_utf16_units(pending, *little_endian);
                            self.bytes_read += (units.len() * 2) as u64;
                            pending.clear();
                            return Ok(Some(decode_utf16_units(&units)));
                        }
                        return Ok(None);
                    }

                    let mut chunk = vec![0u8; *chunk_size];
                    let n = file
                        .read(&mut chunk)
                        .await
                        .map_err(|e| Error::Parse(e.to_string()))?;
                    if n == 0 {
                        *eof = true;
                        continue;
                    }
                    pending.extend_from_slice(&chunk[..n]);
                    self.bytes_read += drain_utf16_lines(pending, *little_endian, lines);
                }
            }
        }
    }
}

fn to_utf16_units(bytes: &[u8], little_endian: bool) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect()
}

fn decode_utf16_units(units: &[u16]) -> String {
    char::decode_utf16(units.iter().copied())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Moves complete lines out of the pending byte buffer, returning how many
/// bytes were consumed.
fn drain_utf16_lines(pending: &mut Vec<u8>, little_endian: bool, lines: &mut VecDeque<String>) -> u64 {
    let units = to_utf16_units(pending, little_endian);
    let mut line_start = 0usize;
    for (idx, &unit) in units.iter().enumerate() {
        if unit == 0x000A {
            let mut end = idx;
            if end > line_start && units[end - 1] == 0x000D {
                end -= 1;
            }
            lines.push_back(decode_utf16_units(&units[line_start..end]));
            line_start = idx + 1;
        }
    }
    let consumed = line_start * 2;
    pending.drain(..consumed);
    consumed as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn write_temp(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn should_emit_lines_with_one_based_numbers() {
        // given
        let file = write_temp(b"alpha\nbeta\ngamma\n");
        let reader = LineReader::default();

        // when
        let mut stream = reader.open(file.path(), 1).await.unwrap();
        let first = stream.next_line().await.unwrap().unwrap();
        let second = stream.next_line().await.unwrap().unwrap();
        let third = stream.next_line().await.unwrap().unwrap();

        // then
        assert_eq!(first, ("alpha".to_string(), 1));
        assert_eq!(second, ("beta".to_string(), 2));
        assert_eq!(third, ("gamma".to_string(), 3));
        assert!(stream.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_strip_carriage_returns_and_keep_final_unterminated_line() {
        let file = write_temp(b"one\r\ntwo");
        let reader = LineReader::default();

        let mut stream = reader.open(file.path(), 1).await.unwrap();
        assert_eq!(stream.next_line().await.unwrap().unwrap().0, "one");
        assert_eq!(stream.next_line().await.unwrap().unwrap().0, "two");
        assert!(stream.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_skip_utf8_bom() {
        let file = write_temp(b"\xEF\xBB\xBFfirst\nsecond\n");
        let reader = LineReader::default();

        let mut stream = reader.open(file.path(), 1).await.unwrap();
        assert_eq!(stream.encoding(), Encoding::Utf8);
        assert_eq!(stream.next_line().await.unwrap().unwrap().0, "first");
    }

    #[tokio::test]
    async fn should_decode_utf16_le_content() {
        // given: BOM + "hi\nok" in UTF-16LE
        let mut bytes = vec![0xFF, 0xFE];
        for ch in "hi\nok".encode_utf16() {
            bytes.extend_from_slice(&ch.to_le_bytes());
        }
        let file = write_temp(&bytes);
        let reader = LineReader::default();

        // when
        let mut stream = reader.open(file.path(), 1).await.unwrap();

        // then
        assert_eq!(stream.encoding(), Encoding::Utf16Le);
        assert_eq!(stream.next_line().await.unwrap().unwrap(), ("hi".into(), 1));
        assert_eq!(stream.next_line().await.unwrap().unwrap(), ("ok".into(), 2));
        assert!(stream.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_decode_utf16_be_content() {
        let mut bytes = vec![0xFE, 0xFF];
        for ch in "big endian".encode_utf16() {
            bytes.extend_from_slice(&ch.to_be_bytes());
        }
        let file = write_temp(&bytes);
        let reader = LineReader::default();

        let mut stream = reader.open(file.path(), 1).await.unwrap();
        assert_eq!(
            stream.next_line().await.unwrap().unwrap().0,
            "big endian"
        );
    }

    #[tokio::test]
    async fn should_truncate_only_past_the_limit() {
        // given: one line exactly at the limit, one a character over
        let exact = "a".repeat(50);
        let over = "b".repeat(51);
        let file = write_temp(format!("{exact}\n{over}\n").as_bytes());
        let reader = LineReader::new(1024, 50, 1000);

        // when
        let mut stream = reader.open(file.path(), 1).await.unwrap();
        let first = stream.next_line().await.unwrap().unwrap().0;
        let second = stream.next_line().await.unwrap().unwrap().0;

        // then
        assert_eq!(first.len(), 50);
        assert_eq!(second.len(), 50);
        assert_eq!(second, "b".repeat(50));
    }

    #[tokio::test]
    async fn should_count_lines() {
        let file = write_temp(b"1\n2\n3\n4\n");
        let reader = LineReader::default();

        assert_eq!(reader.count_lines(file.path()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn should_resume_from_start_line() {
        let file = write_temp(b"1\n2\n3\n4\n");
        let reader = LineReader::default();

        let mut stream = reader.open(file.path(), 3).await.unwrap();
        assert_eq!(stream.next_line().await.unwrap().unwrap(), ("3".into(), 3));
        assert_eq!(stream.next_line().await.unwrap().unwrap(), ("4".into(), 4));
    }

    #[tokio::test]
    async fn should_report_progress_at_the_configured_cadence() {
        // given: 10 lines, progress every 4
        let content = (1..=10).map(|i| format!("line {i}\n")).collect::<String>();
        let file = write_temp(content.as_bytes());
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = calls.clone();
        let reader = LineReader::new(1024, 100_000, 4)
            .with_progress(move |_current, total| {
                assert_eq!(total, 10);
                calls_clone.fetch_add(1, Ordering::SeqCst);
            });

        // when
        let stats = reader
            .process(file.path(), 1, |_line, _n| Ok(()))
            .await
            .unwrap();

        // then: fired at lines 4 and 8
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(stats.total_lines, 10);
        assert_eq!(stats.end_line, 10);
    }

    #[tokio::test]
    async fn should_propagate_handler_errors_without_error_callback() {
        let file = write_temp(b"ok\nbad\n");
        let reader = LineReader::default();

        let result = reader
            .process(file.path(), 1, |line, _n| {
                if line == "bad" {
                    Err(Error::Parse("bad line".into()))
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn should_continue_after_handler_errors_with_error_callback() {
        let file = write_temp(b"ok\nbad\nok\n");
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = seen.clone();
        let reader = LineReader::default()
            .with_error_handler(move |_err| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            });

        let stats = reader
            .process(file.path(), 1, |line, _n| {
                if line == "bad" {
                    Err(Error::Parse("bad line".into()))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(stats.total_lines, 3);
    }

    #[test]
    fn should_compute_throughput() {
        let stats = ProcessingStats {
            total_lines: 2000,
            bytes_read: 4000,
            elapsed_ms: 1000,
            start_line: 1,
            end_line: 2000,
        };
        assert_eq!(stats.lines_per_second(), 2000.0);
        assert_eq!(stats.bytes_per_second(), 4000.0);
    }
}
