//! Ingestion worker pool and per-job pipeline.
//!
//! `submit` persists a QUEUED status and enqueues the job on a bounded
//! channel, returning the job id immediately; a fixed set of workers drains
//! the channel and drives each job through the full pipeline: parser
//! selection, line counting, streaming parse, batched writes, and the
//! final statistics pass. Parsing stays sequential within a job because
//! parsers are stateful; concurrency comes from running jobs in parallel.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use logstore::{AggregationRequest, EntryStore, Page, SearchPlan};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::batch::BatchWriter;
use super::job::{JobState, JobStatus, JobTracker};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::parser::registry::{sample_content, ParserRegistry};
use crate::parser::{ParseContext, ParseOutcome};
use crate::reader::LineReader;

/// An accepted upload handed to the pipeline.
#[derive(Debug)]
pub struct SubmitJob {
    /// Spooled temp file; deleted when the job finishes, whatever the
    /// outcome.
    pub file_path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    pub timestamp_format: Option<String>,
}

/// Terminal counters and level distribution of a completed job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: String,
    pub total_lines: u64,
    pub processed_lines: u64,
    pub successful_lines: u64,
    pub failed_lines: u64,
    pub error_count: u64,
    pub level_counts: BTreeMap<String, u64>,
}

struct JobTask {
    job_id: String,
    submit: SubmitJob,
}

/// Bounded ingestion worker pool.
pub struct IngestPipeline {
    tx: mpsc::Sender<JobTask>,
    tracker: Arc<JobTracker>,
    config: Arc<AppConfig>,
}

impl IngestPipeline {
    /// Spawns the worker pool and returns the submission handle.
    pub fn start(
        store: Arc<dyn EntryStore>,
        tracker: Arc<JobTracker>,
        registry: Arc<ParserRegistry>,
        config: Arc<AppConfig>,
    ) -> Arc<Self> {
        let pool = &config.processing.pool;
        let (tx, rx) = mpsc::channel::<JobTask>(pool.max_size.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..pool.core_size.max(1) {
            let rx = rx.clone();
            let store = store.clone();
            let tracker = tracker.clone();
            let registry = registry.clone();
            let config = config.clone();
            tokio::spawn(async move {
                worker_loop(worker_id, rx, store, tracker, registry, config).await;
            });
        }

        Arc::new(Self {
            tx,
            tracker,
            config,
        })
    }

    /// Accepts a job: persists the initial status and enqueues the task.
    /// Rejects when the submission queue is full.
    pub async fn submit(&self, submit: SubmitJob) -> Result<String> {
        if submit.file_size > self.config.file.max_size {
            return Err(Error::FileTooLarge {
                max: self.config.file.max_size,
                actual: submit.file_size,
            });
        }

        let job_id = Uuid::new_v4().to_string();
        let status = JobStatus::queued(
            &job_id,
            &submit.file_name,
            submit.file_size,
            submit.timestamp_format.clone(),
        );
        self.tracker.insert(status).await;

        let task = JobTask {
            job_id: job_id.clone(),
            submit,
        };
        match self.tx.try_send(task) {
            Ok(()) => {
                info!(%job_id, "job accepted for processing");
                Ok(job_id)
            }
            Err(mpsc::error::TrySendError::Full(task)) => {
                self.tracker.remove(&job_id).await;
                let _ = tokio::fs::remove_file(&task.submit.file_path).await;
                Err(Error::InvalidInput(
                    "ingestion capacity exhausted, retry later".to_string(),
                ))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.tracker.remove(&job_id).await;
                Err(Error::Internal("ingestion workers are not running".to_string()))
            }
        }
    }

    pub async fn get_status(&self, job_id: &str) -> Result<JobStatus> {
        self.tracker.get(job_id).await
    }

    /// Terminal counters and level distribution. Errors while the job is
    /// still running.
    pub async fn get_result(&self, job_id: &str) -> Result<JobResult> {
        let status = self.tracker.get(job_id).await?;
        if status.status != JobState::Completed {
            return Err(Error::JobNotCompleted(format!(
                "job {} is {}",
                job_id, status.status
            )));
        }
        Ok(JobResult {
            job_id: status.job_id,
            total_lines: status.total_lines,
            processed_lines: status.processed_lines,
            successful_lines: status.successful_lines,
            failed_lines: status.failed_lines,
            error_count: status.error_count.unwrap_or(0),
            level_counts: status.level_counts,
        })
    }

    pub fn tracker(&self) -> Arc<JobTracker> {
        self.tracker.clone()
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<JobTask>>>,
    store: Arc<dyn EntryStore>,
    tracker: Arc<JobTracker>,
    registry: Arc<ParserRegistry>,
    config: Arc<AppConfig>,
) {
    debug!(worker_id, "ingestion worker started");
    loop {
        let task = { rx.lock().await.recv().await };
        let Some(task) = task else {
            debug!(worker_id, "ingestion worker stopping");
            break;
        };

        let job_id = task.job_id.clone();
        let file_path = task.submit.file_path.clone();
        let started = Instant::now();

        match run_job(task, &store, &tracker, &registry, &config).await {
            Ok(()) => {
                info!(
                    %job_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
            }
            Err(err) => {
                error!(%job_id, error = %err, "job failed");
                let message = err.to_string();
                let result = tracker
                    .transition(&job_id, JobState::Failed, |status| {
                        status.message = format!("Processing failed: {}", message);
                        status.error = Some(message.clone());
                    })
                    .await;
                if let Err(transition_err) = result {
                    warn!(%job_id, error = %transition_err, "could not record job failure");
                }
            }
        }

        // The temp file is gone regardless of outcome.
        if let Err(err) = tokio::fs::remove_file(&file_path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(%job_id, error = %err, "failed to delete temp file");
            }
        }
    }
}

async fn run_job(
    task: JobTask,
    store: &Arc<dyn EntryStore>,
    tracker: &Arc<JobTracker>,
    registry: &Arc<ParserRegistry>,
    config: &Arc<AppConfig>,
) -> Result<()> {
    let JobTask { job_id, submit } = task;
    let started = Instant::now();

    tracker
        .transition(&job_id, JobState::Processing, |status| {
            status.message = "Starting file processing".to_string();
        })
        .await?;

    info!(%job_id, file = %submit.file_name, "processing log file");

    let sample = sample_content(&submit.file_path).await?;
    let mut parser = registry.select(&submit.file_name, &sample)?;
    parser.reset();

    let mut ctx = ParseContext::new(&job_id, &submit.file_name, submit.timestamp_format.clone());
    ctx.max_line_length = config.processing.max_line_length;

    let reader = LineReader::new(
        config.processing.buffer_size,
        config.processing.max_line_length,
        config.processing.progress_interval,
    );

    // First pass: the progress denominator.
    let total_lines = reader.count_lines(&submit.file_path).await?;
    tracker
        .update(&job_id, |status| {
            status.total_lines = total_lines;
            status.progress = 5;
            status.message = format!("Counted {} lines", total_lines);
        })
        .await?;

    let mut writer = BatchWriter::new(store.clone(), config.processing.batch_size)
        .on_flush(|stats| {
            debug!(
                saved = stats.saved_entries,
                failed = stats.failed_entries,
                batches = stats.batches_processed,
                "batch flushed"
            );
        });

    // Second pass: parse and write.
    let mut stream = reader.open(&submit.file_path, 1).await?;
    while let Some((line, line_number)) = stream.next_line().await? {
        match parser.parse_line(&line, line_number, &mut ctx) {
            ParseOutcome::Success(entry) => {
                ctx.record_success();
                writer.add(*entry).await?;
            }
            ParseOutcome::Failed { error, .. } => {
                ctx.record_failure();
                debug!(%job_id, line = line_number, error = %error, "line failed to parse");
            }
            ParseOutcome::Skipped { .. } => ctx.record_skipped(),
            ParseOutcome::Buffered { .. } | ParseOutcome::Continuation { .. } => {}
        }

        if line_number % config.processing.progress_interval == 0 && total_lines > 0 {
            let progress = (5 + (line_number * 90) / total_lines).min(95) as u8;
            let processed = ctx.processed_lines;
            let successful = ctx.successful_lines;
            let failed = ctx.failed_lines;
            tracker
                .update(&job_id, move |status| {
                    status.progress = progress;
                    status.message = format!("Processed {}/{} lines", line_number, total_lines);
                    status.processed_lines = processed;
                    status.successful_lines = successful;
                    status.failed_lines = failed;
                })
                .await?;
        }
    }

    // End of stream: flush the parser, then the writer.
    for entry in parser.flush_pending(&mut ctx) {
        ctx.record_success();
        writer.add(entry).await?;
    }
    writer.flush().await?;

    tracker
        .update(&job_id, |status| {
            status.progress = 95;
            status.message = "Finalizing analysis".to_string();
        })
        .await?;

    // Statistics pass over the stored partition.
    let (level_counts, error_count) = job_statistics(store, &job_id).await?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let lines_per_second = if elapsed_ms > 0 {
        (total_lines as f64 * 1000.0) / elapsed_ms as f64
    } else {
        0.0
    };

    let processed = ctx.processed_lines;
    let successful = ctx.successful_lines;
    let failed = ctx.failed_lines;
    tracker
        .transition(&job_id, JobState::Completed, move |status| {
            status.progress = 100;
            status.message = "Processing completed successfully".to_string();
            status.total_lines = total_lines;
            status.processed_lines = processed;
            status.successful_lines = successful;
            status.failed_lines = failed;
            status.processing_time_ms = Some(elapsed_ms);
            status.lines_per_second = Some(lines_per_second);
            status.level_counts = level_counts;
            status.error_count = Some(error_count);
        })
        .await?;

    Ok(())
}

/// Level distribution and error count for a job, via a store aggregation.
async fn job_statistics(
    store: &Arc<dyn EntryStore>,
    job_id: &str,
) -> Result<(BTreeMap<String, u64>, u64)> {
    let mut plan = SearchPlan::for_job(job_id);
    plan.page = Page { number: 0, size: 1 };
    plan.aggregations = AggregationRequest {
        summary: true,
        ..AggregationRequest::default()
    };

    let outcome = store.search(&plan).await?;
    let aggregations = outcome.aggregations.unwrap_or_default();
    Ok((aggregations.level_counts, aggregations.error_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logstore::MemoryStore;
    use std::io::Write;
    use std::time::Duration;

    fn test_config() -> Arc<AppConfig> {
        let mut config = AppConfig::default();
        config.processing.batch_size = 2;
        config.processing.progress_interval = 1;
        Arc::new(config)
    }

    fn start_pipeline(store: Arc<MemoryStore>) -> Arc<IngestPipeline> {
        IngestPipeline::start(
            store,
            Arc::new(JobTracker::new()),
            Arc::new(ParserRegistry::with_defaults()),
            test_config(),
        )
    }

    fn spool(content: &str) -> PathBuf {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        let (_file, path) = file.keep().unwrap();
        path
    }

    async fn await_terminal(pipeline: &IngestPipeline, job_id: &str) -> JobStatus {
        for _ in 0..200 {
            let status = pipeline.get_status(job_id).await.unwrap();
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not reach a terminal state", job_id);
    }

    fn submit_for(path: PathBuf, file_name: &str) -> SubmitJob {
        let file_size = std::fs::metadata(&path).unwrap().len();
        SubmitJob {
            file_path: path,
            file_name: file_name.to_string(),
            file_size,
            timestamp_format: None,
        }
    }

    #[tokio::test]
    async fn should_ingest_a_text_file_to_completion() {
        // given
        let store = Arc::new(MemoryStore::new());
        let pipeline = start_pipeline(store.clone());
        let path = spool(concat!(
            "2024-01-15 10:30:45.123 [main] ERROR com.example.Svc - boom\n",
            "\tat com.example.Svc.run(Svc.java:12)\n",
            "2024-01-15 10:30:46.000 [main] INFO com.example.Svc - ok\n",
        ));

        // when
        let job_id = pipeline.submit(submit_for(path.clone(), "app.log")).await.unwrap();
        let status = await_terminal(&pipeline, &job_id).await;

        // then
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.total_lines, 3);
        assert_eq!(status.successful_lines, 2);
        assert_eq!(status.failed_lines, 0);
        assert_eq!(
            status.processed_lines,
            status.successful_lines + status.failed_lines
        );
        assert_eq!(status.level_counts.get("ERROR"), Some(&1));
        assert_eq!(status.level_counts.get("INFO"), Some(&1));
        assert_eq!(status.error_count, Some(1));
        assert_eq!(store.partition_len(&job_id).await, 2);

        // The temp file is cleaned up.
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn should_complete_empty_files_with_zero_lines() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = start_pipeline(store);
        let path = spool("");

        let job_id = pipeline.submit(submit_for(path, "empty.log")).await.unwrap();
        let status = await_terminal(&pipeline, &job_id).await;

        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.total_lines, 0);
        assert_eq!(status.processed_lines, 0);
    }

    #[tokio::test]
    async fn should_skip_blank_only_files_without_failures() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = start_pipeline(store);
        let path = spool("\n\n\n");

        let job_id = pipeline.submit(submit_for(path, "blank.log")).await.unwrap();
        let status = await_terminal(&pipeline, &job_id).await;

        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.total_lines, 3);
        assert_eq!(status.successful_lines, 0);
        assert_eq!(status.failed_lines, 0);
    }

    #[tokio::test]
    async fn should_count_malformed_json_lines_as_failures() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = start_pipeline(store);
        let path = spool("{\"level\":\"INFO\",\"message\":\"ok\"}\n{broken\n");

        let job_id = pipeline
            .submit(submit_for(path, "events.ndjson"))
            .await
            .unwrap();
        let status = await_terminal(&pipeline, &job_id).await;

        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.successful_lines, 1);
        assert_eq!(status.failed_lines, 1);
    }

    #[tokio::test]
    async fn should_fail_jobs_whose_file_vanished() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = start_pipeline(store);

        let job_id = pipeline
            .submit(SubmitJob {
                file_path: PathBuf::from("/nonexistent/gone.log"),
                file_name: "gone.log".to_string(),
                file_size: 10,
                timestamp_format: None,
            })
            .await
            .unwrap();
        let status = await_terminal(&pipeline, &job_id).await;

        assert_eq!(status.status, JobState::Failed);
        assert!(status.error.is_some());
        assert!(status.completed_at.is_some());
    }

    #[tokio::test]
    async fn should_reject_oversized_files_at_submission() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = start_pipeline(store);

        let result = pipeline
            .submit(SubmitJob {
                file_path: PathBuf::from("/tmp/huge.log"),
                file_name: "huge.log".to_string(),
                file_size: 100 * 1024 * 1024,
                timestamp_format: None,
            })
            .await;

        assert!(matches!(result, Err(Error::FileTooLarge { .. })));
    }

    #[tokio::test]
    async fn should_expose_result_only_after_completion() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = start_pipeline(store);
        let path = spool("2024-01-15 10:30:45 INFO ready\n");

        let job_id = pipeline.submit(submit_for(path, "app.log")).await.unwrap();
        await_terminal(&pipeline, &job_id).await;

        let result = pipeline.get_result(&job_id).await.unwrap();
        assert_eq!(result.total_lines, 1);
        assert_eq!(result.successful_lines, 1);
        assert_eq!(result.level_counts.get("INFO"), Some(&1));

        assert!(matches!(
            pipeline.get_result("missing").await,
            Err(Error::NotFound(_))
        ));
    }
}
