//! Query response shapes: result pages, summaries, and timelines.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use logstore::entry::ts_millis_opt;
use logstore::{FieldCount, HistogramBucket};
use serde::Serialize;
use serde_json::Value;

/// Pagination metadata for a result page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub current_page: u64,
    pub page_size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
    pub first_element: u64,
    pub last_element: u64,
}

impl PaginationInfo {
    pub fn of(page: u64, size: u64, total_elements: u64) -> Self {
        let size = size.max(1);
        let total_pages = total_elements.div_ceil(size);
        let first_element = page * size;
        let last_element = (first_element + size - 1).min(total_elements.saturating_sub(1));

        Self {
            current_page: page,
            page_size: size,
            total_elements,
            total_pages,
            has_next: page + 1 < total_pages,
            has_previous: page > 0,
            first_element,
            last_element,
        }
    }
}

/// Aggregation-derived view over a query's matching set.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSummary {
    pub total_matched: u64,
    pub level_counts: BTreeMap<String, u64>,
    #[serde(with = "ts_millis_opt", skip_serializing_if = "Option::is_none")]
    pub earliest_log: Option<NaiveDateTime>,
    #[serde(with = "ts_millis_opt", skip_serializing_if = "Option::is_none")]
    pub latest_log: Option<NaiveDateTime>,
    pub error_count: u64,
    pub stack_trace_count: u64,
}

/// One page of search results.
///
/// Entries are serialized documents so that field projection
/// (`includeFields`/`excludeFields`) can drop attributes without a
/// parallel schema.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQueryResponse {
    pub logs: Vec<Value>,
    pub pagination: PaginationInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<FilterSummary>,
    pub query_time_ms: u64,
    /// entry id -> field -> highlighted fragments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights: Option<HashMap<String, HashMap<String, Vec<String>>>>,
}

/// Full per-job report: job metadata plus store aggregations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub status: String,

    pub total_lines: u64,
    pub successful_lines: u64,
    pub failed_lines: u64,
    pub total_entries: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_per_second: Option<f64>,
    #[serde(with = "ts_millis_opt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<NaiveDateTime>,
    #[serde(with = "ts_millis_opt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDateTime>,

    pub level_counts: BTreeMap<String, u64>,
    pub error_count: u64,
    pub warning_count: u64,
    pub stack_trace_count: u64,

    #[serde(with = "ts_millis_opt", skip_serializing_if = "Option::is_none")]
    pub earliest_timestamp: Option<NaiveDateTime>,
    #[serde(with = "ts_millis_opt", skip_serializing_if = "Option::is_none")]
    pub latest_timestamp: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_span_seconds: Option<i64>,

    pub top_loggers: Vec<FieldCount>,
    pub top_threads: Vec<FieldCount>,
    pub top_sources: Vec<FieldCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_logger_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_thread_count: Option<u64>,
}

/// Date-histogram view of a job for charting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineData {
    pub job_id: String,
    pub interval: String,
    #[serde(with = "ts_millis_opt", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(with = "ts_millis_opt", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveDateTime>,
    pub total_count: u64,
    pub buckets: Vec<HistogramBucket>,
}
