//! Query execution and summarization.
//!
//! Runs compiled plans against the store, hydrates result pages with
//! pagination metadata and optional summaries/highlights, and assembles the
//! per-job views: summary, level distribution, timeline, field values, and
//! context windows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use logstore::{EntryStore, HistogramInterval, LogEntry};
use serde_json::Value;
use tracing::debug;

use super::builder;
use super::request::LogQueryRequest;
use super::response::{
    FilterSummary, JobSummary, LogQueryResponse, PaginationInfo, TimelineData,
};
use crate::error::{Error, Result};
use crate::ingest::JobTracker;
use logstore::FieldCount;

/// Levels offered by the fields endpoint.
const KNOWN_LEVELS: &[&str] = &["ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

/// Query executor over the store and the job tracker.
pub struct QueryService {
    store: Arc<dyn EntryStore>,
    tracker: Arc<JobTracker>,
}

impl QueryService {
    pub fn new(store: Arc<dyn EntryStore>, tracker: Arc<JobTracker>) -> Self {
        Self { store, tracker }
    }

    /// Structured search over one job's entries.
    pub async fn search(&self, request: &LogQueryRequest) -> Result<LogQueryResponse> {
        let started = Instant::now();
        self.verify_job_exists(&request.job_id).await?;

        let plan = builder::build_search_plan(request)?;
        let outcome = self.store.search(&plan).await?;

        debug!(
            job_id = %request.job_id,
            total = outcome.total,
            page = request.page,
            "search completed"
        );

        let logs = outcome
            .hits
            .iter()
            .map(|entry| {
                project_entry(
                    entry,
                    request.include_fields.as_deref(),
                    request.exclude_fields.as_deref(),
                )
            })
            .collect();

        let summary = outcome.aggregations.as_ref().map(|aggs| FilterSummary {
            total_matched: outcome.total,
            level_counts: aggs.level_counts.clone(),
            earliest_log: aggs.min_timestamp,
            latest_log: aggs.max_timestamp,
            error_count: aggs.error_count,
            stack_trace_count: aggs.stacktrace_count,
        });

        let highlights = if outcome.highlights.is_empty() {
            None
        } else {
            Some(outcome.highlights)
        };

        Ok(LogQueryResponse {
            logs,
            pagination: PaginationInfo::of(
                request.page as u64,
                request.size as u64,
                outcome.total,
            ),
            summary,
            query_time_ms: started.elapsed().as_millis() as u64,
            highlights,
        })
    }

    /// Typed hits for internal consumers (export); no projection applied.
    pub(crate) async fn search_entries(
        &self,
        request: &LogQueryRequest,
    ) -> Result<(Vec<LogEntry>, u64)> {
        self.verify_job_exists(&request.job_id).await?;
        let plan = builder::build_search_plan(request)?;
        let outcome = self.store.search(&plan).await?;
        Ok((outcome.hits, outcome.total))
    }

    /// Count of entries matching the request's filters.
    pub async fn count(&self, request: &LogQueryRequest) -> Result<u64> {
        self.verify_job_exists(&request.job_id).await?;
        let plan = builder::build_count_plan(request)?;
        Ok(self.store.search(&plan).await?.total)
    }

    /// Job metadata composed with whole-job aggregations.
    pub async fn job_summary(&self, job_id: &str) -> Result<JobSummary> {
        let status = self.tracker.get(job_id).await?;

        let plan = builder::build_aggregation_plan(job_id);
        let outcome = self.store.search(&plan).await?;
        let aggs = outcome.aggregations.unwrap_or_default();

        let warning_count = aggs.level_counts.get("WARN").copied().unwrap_or(0);
        let time_span_seconds = match (aggs.min_timestamp, aggs.max_timestamp) {
            (Some(min), Some(max)) => Some((max - min).num_seconds()),
            _ => None,
        };

        Ok(JobSummary {
            job_id: job_id.to_string(),
            file_name: status.file_name,
            file_size: status.file_size,
            status: status.status.to_string(),
            total_lines: status.total_lines,
            successful_lines: status.successful_lines,
            failed_lines: status.failed_lines,
            total_entries: outcome.total,
            processing_time_ms: status.processing_time_ms,
            lines_per_second: status.lines_per_second,
            started_at: Some(status.started_at),
            completed_at: status.completed_at,
            level_counts: aggs.level_counts,
            error_count: aggs.error_count,
            warning_count,
            stack_trace_count: aggs.stacktrace_count,
            earliest_timestamp: aggs.min_timestamp,
            latest_timestamp: aggs.max_timestamp,
            time_span_seconds,
            top_loggers: aggs.top_loggers,
            top_threads: aggs.top_threads,
            top_sources: aggs.top_sources,
            unique_logger_count: aggs.unique_loggers,
            unique_thread_count: aggs.unique_threads,
        })
    }

    /// Per-level entry counts for one job.
    pub async fn level_distribution(&self, job_id: &str) -> Result<std::collections::BTreeMap<String, u64>> {
        self.verify_job_exists(job_id).await?;
        let plan = builder::build_aggregation_plan(job_id);
        let outcome = self.store.search(&plan).await?;
        Ok(outcome
            .aggregations
            .map(|aggs| aggs.level_counts)
            .unwrap_or_default())
    }

    /// Date histogram with per-bucket error/warning counts.
    pub async fn timeline(&self, job_id: &str, interval: &str) -> Result<TimelineData> {
        self.verify_job_exists(job_id).await?;

        let interval = HistogramInterval::parse(interval);
        let plan = builder::build_timeline_plan(job_id, interval);
        let outcome = self.store.search(&plan).await?;
        let buckets = outcome
            .aggregations
            .map(|aggs| aggs.timeline)
            .unwrap_or_default();

        Ok(TimelineData {
            job_id: job_id.to_string(),
            interval: interval.as_str().to_string(),
            start_time: buckets.first().map(|b| b.timestamp),
            end_time: buckets.last().map(|b| b.timestamp),
            total_count: outcome.total,
            buckets,
        })
    }

    /// Distinct values of one keyword field, most frequent first.
    pub async fn unique_field_values(
        &self,
        job_id: &str,
        field: &str,
        limit: usize,
    ) -> Result<Vec<FieldCount>> {
        self.verify_job_exists(job_id).await?;
        let plan = builder::build_unique_values_plan(job_id, field, limit)?;
        let outcome = self.store.search(&plan).await?;
        Ok(outcome
            .aggregations
            .map(|aggs| aggs.unique_values)
            .unwrap_or_default())
    }

    /// Common filterable fields with their observed values.
    pub async fn available_fields(&self, job_id: &str) -> Result<HashMap<String, Vec<String>>> {
        self.verify_job_exists(job_id).await?;

        let mut fields = HashMap::new();
        fields.insert(
            "levels".to_string(),
            KNOWN_LEVELS.iter().map(|l| l.to_string()).collect(),
        );
        for (key, field) in [
            ("loggers", "logger"),
            ("threads", "thread"),
            ("sources", "source"),
            ("hostnames", "hostname"),
            ("applications", "application"),
        ] {
            let values = self
                .unique_field_values(job_id, field, 100)
                .await?
                .into_iter()
                .map(|fc| fc.value)
                .collect();
            fields.insert(key.to_string(), values);
        }
        Ok(fields)
    }

    /// Neighboring lines around one line number, ordered ascending. A line
    /// beyond the end of the job yields an empty page.
    pub async fn context_lines(
        &self,
        job_id: &str,
        line_number: u64,
        before: u64,
        after: u64,
    ) -> Result<LogQueryResponse> {
        let mut request = LogQueryRequest::for_job(job_id);
        request.min_line_number = Some(line_number.saturating_sub(before).max(1));
        request.max_line_number = Some(line_number + after);
        request.sort_by = "lineNumber".to_string();
        request.sort_direction = "asc".to_string();
        request.size = (before + after + 1).clamp(1, builder::MAX_PAGE_SIZE as u64) as i64;
        request.include_summary = false;

        self.search(&request).await
    }

    /// Lightweight store round-trip for readiness probes.
    pub async fn store_probe(&self, plan: &logstore::SearchPlan) -> Result<()> {
        self.store.search(plan).await?;
        Ok(())
    }

    async fn verify_job_exists(&self, job_id: &str) -> Result<()> {
        if self.tracker.exists(job_id).await {
            Ok(())
        } else {
            Err(Error::job_not_found(job_id))
        }
    }
}

/// Serializes an entry, applying include/exclude field projection.
fn project_entry(
    entry: &LogEntry,
    include: Option<&[String]>,
    exclude: Option<&[String]>,
) -> Value {
    let mut value = serde_json::to_value(entry).unwrap_or(Value::Null);

    if let Value::Object(map) = &mut value {
        if let Some(include) = include.filter(|fields| !fields.is_empty()) {
            map.retain(|key, _| include.iter().any(|field| field == key));
        }
        if let Some(exclude) = exclude {
            map.retain(|key, _| !exclude.iter().any(|field| field == key));
        }
    }

    value
}
