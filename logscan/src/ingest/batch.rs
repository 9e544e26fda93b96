//! Batched entry writer.
//!
//! Accumulates parsed entries and flushes them as one bulk write when the
//! batch fills or the stream ends. A failed bulk write degrades to
//! per-entry writes so partial progress survives a poison entry, and every
//! flush is recorded in the aggregate statistics handed to the completion
//! callback.

use std::sync::Arc;
use std::time::Instant;

use logstore::{EntryStore, LogEntry};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Aggregate statistics across all flushes of one writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStatistics {
    pub total_entries: u64,
    pub saved_entries: u64,
    pub failed_entries: u64,
    pub batches_processed: u64,
    pub total_save_time_ms: u64,
    /// The most recent flush: (attempted, saved, elapsed ms).
    pub last_flush: Option<(u64, u64, u64)>,
}

impl BatchStatistics {
    pub fn success_rate(&self) -> f64 {
        if self.total_entries == 0 {
            return 0.0;
        }
        (self.saved_entries as f64 * 100.0) / self.total_entries as f64
    }

    pub fn average_save_time_ms(&self) -> f64 {
        if self.batches_processed == 0 {
            return 0.0;
        }
        self.total_save_time_ms as f64 / self.batches_processed as f64
    }

    fn record(&mut self, attempted: u64, saved: u64, elapsed_ms: u64) {
        self.total_entries += attempted;
        self.saved_entries += saved;
        self.failed_entries += attempted - saved;
        self.batches_processed += 1;
        self.total_save_time_ms += elapsed_ms;
        self.last_flush = Some((attempted, saved, elapsed_ms));
    }
}

type FlushCallback = Box<dyn Fn(&BatchStatistics) + Send + Sync>;

/// Accumulates entries and writes them in bulk.
pub struct BatchWriter {
    store: Arc<dyn EntryStore>,
    capacity: usize,
    continue_on_error: bool,
    buffer: Vec<LogEntry>,
    statistics: BatchStatistics,
    on_flush: Option<FlushCallback>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn EntryStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            continue_on_error: true,
            buffer: Vec::new(),
            statistics: BatchStatistics::default(),
            on_flush: None,
        }
    }

    /// When false, a failed bulk write aborts instead of degrading to
    /// per-entry writes.
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Callback fired after every flush with the statistics so far.
    pub fn on_flush(mut self, callback: impl Fn(&BatchStatistics) + Send + Sync + 'static) -> Self {
        self.on_flush = Some(Box::new(callback));
        self
    }

    /// Appends an entry, flushing when the batch is full.
    pub async fn add(&mut self, entry: LogEntry) -> Result<()> {
        self.buffer.push(entry);
        if self.buffer.len() >= self.capacity {
            self.flush().await?;
        }
        Ok(())
    }

    /// Writes out the pending batch. Returns the number of entries saved.
    pub async fn flush(&mut self) -> Result<u64> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let batch: Vec<LogEntry> = self.buffer.drain(..).collect();
        let attempted = batch.len() as u64;
        let started = Instant::now();

        let outcome = match self.store.bulk_index(batch.clone()).await {
            Ok(saved) => {
                debug!(attempted, saved, "flushed entry batch");
                Ok(saved)
            }
            Err(err) if self.continue_on_error => {
                warn!(attempted, error = %err, "bulk write failed, saving entries individually");
                Ok(self.save_individually(batch).await)
            }
            Err(err) => Err(Error::Storage(err.to_string())),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let saved = *outcome.as_ref().unwrap_or(&0);
        self.statistics.record(attempted, saved, elapsed_ms);

        if let Some(callback) = &self.on_flush {
            callback(&self.statistics);
        }

        outcome
    }

    async fn save_individually(&self, batch: Vec<LogEntry>) -> u64 {
        let total = batch.len();
        let mut saved = 0u64;
        for entry in batch {
            match self.store.index(entry).await {
                Ok(()) => saved += 1,
                Err(err) => debug!(error = %err, "entry save failed"),
            }
        }
        tracing::info!(saved, total, "individual save recovered entries");
        saved
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn statistics(&self) -> &BatchStatistics {
        &self.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use logstore::{MemoryStore, SearchOutcome, SearchPlan, StoreError, StoreResult};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    fn entry(line: u64) -> LogEntry {
        LogEntry {
            id: format!("e-{line}"),
            job_id: "job-1".to_string(),
            line_number: line,
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            indexed_at: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(10, 0, 1)
                .unwrap(),
            level: "INFO".to_string(),
            has_error: false,
            has_stack_trace: false,
            message: "m".to_string(),
            raw_line: "m".to_string(),
            stack_trace: None,
            logger: None,
            thread: None,
            source: None,
            hostname: None,
            application: None,
            environment: None,
            file_name: None,
            metadata: Default::default(),
            tags: Vec::new(),
        }
    }

    /// Store whose bulk path can be made to fail while the per-entry path
    /// keeps working, with an optional poison entry that always fails.
    struct FlakyStore {
        inner: MemoryStore,
        fail_bulk: AtomicBool,
        poison_line: Option<u64>,
        bulk_attempts: AtomicU64,
    }

    impl FlakyStore {
        fn new(fail_bulk: bool, poison_line: Option<u64>) -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_bulk: AtomicBool::new(fail_bulk),
                poison_line,
                bulk_attempts: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl EntryStore for FlakyStore {
        async fn bulk_index(&self, entries: Vec<LogEntry>) -> StoreResult<u64> {
            self.bulk_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_bulk.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("bulk rejected".into()));
            }
            self.inner.bulk_index(entries).await
        }

        async fn index(&self, entry: LogEntry) -> StoreResult<()> {
            if self.poison_line == Some(entry.line_number) {
                return Err(StoreError::Backend("poison entry".into()));
            }
            self.inner.index(entry).await
        }

        async fn search(&self, plan: &SearchPlan) -> StoreResult<SearchOutcome> {
            self.inner.search(plan).await
        }

        async fn delete_job(&self, job_id: &str) -> StoreResult<u64> {
            self.inner.delete_job(job_id).await
        }
    }

    #[tokio::test]
    async fn should_flush_automatically_at_capacity() {
        // given
        let store = Arc::new(MemoryStore::new());
        let mut writer = BatchWriter::new(store.clone(), 3);

        // when
        for line in 1..=7 {
            writer.add(entry(line)).await.unwrap();
        }

        // then: two full batches flushed, one entry still pending
        assert_eq!(writer.pending(), 1);
        assert_eq!(store.partition_len("job-1").await, 6);
        assert_eq!(writer.statistics().batches_processed, 2);

        writer.flush().await.unwrap();
        assert_eq!(store.partition_len("job-1").await, 7);
    }

    #[tokio::test]
    async fn should_recover_partial_progress_on_bulk_failure() {
        // given: bulk writes fail, entry at line 2 is poison
        let store = Arc::new(FlakyStore::new(true, Some(2)));
        let mut writer = BatchWriter::new(store.clone(), 100);
        for line in 1..=3 {
            writer.add(entry(line)).await.unwrap();
        }

        // when
        let saved = writer.flush().await.unwrap();

        // then: two of three survive through the per-entry fallback
        assert_eq!(saved, 2);
        let stats = writer.statistics();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.saved_entries, 2);
        assert_eq!(stats.failed_entries, 1);
        assert_eq!(stats.last_flush.map(|(a, s, _)| (a, s)), Some((3, 2)));
    }

    #[tokio::test]
    async fn should_surface_bulk_failure_when_not_continuing() {
        let store = Arc::new(FlakyStore::new(true, None));
        let mut writer = BatchWriter::new(store, 100).continue_on_error(false);
        writer.add(entry(1)).await.unwrap();

        let result = writer.flush().await;

        assert!(matches!(result, Err(Error::Storage(_))));
        assert!(writer.is_empty());
    }

    #[tokio::test]
    async fn should_fire_callback_after_each_flush() {
        let store = Arc::new(MemoryStore::new());
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = calls.clone();
        let mut writer = BatchWriter::new(store, 2).on_flush(move |stats| {
            assert!(stats.batches_processed >= 1);
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        for line in 1..=4 {
            writer.add(entry(line)).await.unwrap();
        }
        writer.flush().await.unwrap();

        // Two automatic flushes; the final explicit flush was empty.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn should_report_success_rate_and_average_time() {
        let store = Arc::new(MemoryStore::new());
        let mut writer = BatchWriter::new(store, 10);
        for line in 1..=5 {
            writer.add(entry(line)).await.unwrap();
        }
        writer.flush().await.unwrap();

        let stats = writer.statistics();
        assert_eq!(stats.success_rate(), 100.0);
        assert_eq!(stats.batches_processed, 1);
    }

    #[tokio::test]
    async fn should_ignore_empty_flush() {
        let store = Arc::new(MemoryStore::new());
        let mut writer = BatchWriter::new(store, 10);

        assert_eq!(writer.flush().await.unwrap(), 0);
        assert_eq!(writer.statistics().batches_processed, 0);
    }
}
