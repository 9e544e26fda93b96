//! The declarative search request.
//!
//! All filters combine with AND semantics; values within one list filter
//! (levels, tags) are OR. Field names in `searchFields`, `sortBy`, and the
//! projection lists use the document wire names.

use chrono::NaiveDateTime;
use logstore::entry::ts_millis_opt;
use serde::{Deserialize, Serialize};

/// Default full-text search targets.
pub const DEFAULT_SEARCH_FIELDS: &[&str] = &["message", "rawLine", "stackTrace"];

/// Request for a structured log search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogQueryRequest {
    /// Required; scopes the query to one ingestion job.
    pub job_id: String,

    /// Full-text query across `search_fields`.
    pub search_text: Option<String>,
    pub search_fields: Option<Vec<String>>,

    /// Levels to include (OR within).
    pub levels: Option<Vec<String>>,

    // Exact-match filters; `*` and `?` switch to wildcard matching.
    pub file_name: Option<String>,
    pub logger: Option<String>,
    pub thread: Option<String>,
    pub source: Option<String>,
    pub hostname: Option<String>,
    pub application: Option<String>,
    pub environment: Option<String>,

    pub has_error: Option<bool>,
    pub has_stack_trace: Option<bool>,

    /// Tags to match (OR within).
    pub tags: Option<Vec<String>>,

    #[serde(with = "ts_millis_opt")]
    pub start_date: Option<NaiveDateTime>,
    #[serde(with = "ts_millis_opt")]
    pub end_date: Option<NaiveDateTime>,

    pub min_line_number: Option<u64>,
    pub max_line_number: Option<u64>,

    pub sort_by: String,
    pub sort_direction: String,

    /// 0-based page number.
    pub page: i64,
    /// Page size, 1..=1000.
    pub size: i64,

    pub include_fields: Option<Vec<String>>,
    pub exclude_fields: Option<Vec<String>>,

    pub include_summary: bool,
    pub highlight_matches: bool,
}

impl Default for LogQueryRequest {
    fn default() -> Self {
        Self {
            job_id: String::new(),
            search_text: None,
            search_fields: None,
            levels: None,
            file_name: None,
            logger: None,
            thread: None,
            source: None,
            hostname: None,
            application: None,
            environment: None,
            has_error: None,
            has_stack_trace: None,
            tags: None,
            start_date: None,
            end_date: None,
            min_line_number: None,
            max_line_number: None,
            sort_by: "timestamp".to_string(),
            sort_direction: "desc".to_string(),
            page: 0,
            size: 50,
            include_fields: None,
            exclude_fields: None,
            include_summary: true,
            highlight_matches: false,
        }
    }
}

impl LogQueryRequest {
    /// A bare request for everything in one job.
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Self::default()
        }
    }

    pub fn effective_search_fields(&self) -> Vec<String> {
        match &self.search_fields {
            Some(fields) if !fields.is_empty() => fields.clone(),
            _ => DEFAULT_SEARCH_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// `asc` or `desc`; anything else reads as `desc`.
    pub fn effective_sort_direction(&self) -> &str {
        if self.sort_direction.eq_ignore_ascii_case("asc") {
            "asc"
        } else {
            "desc"
        }
    }

    pub fn has_filters(&self) -> bool {
        self.search_text.is_some()
            || self.levels.as_ref().map(|l| !l.is_empty()).unwrap_or(false)
            || self.file_name.is_some()
            || self.logger.is_some()
            || self.thread.is_some()
            || self.source.is_some()
            || self.hostname.is_some()
            || self.application.is_some()
            || self.environment.is_some()
            || self.has_error.is_some()
            || self.has_stack_trace.is_some()
            || self.tags.as_ref().map(|t| !t.is_empty()).unwrap_or(false)
            || self.start_date.is_some()
            || self.end_date.is_some()
            || self.min_line_number.is_some()
            || self.max_line_number.is_some()
    }
}
