//! Compiled search plans.
//!
//! A [`SearchPlan`] is the backend-neutral form of a query: a mandatory job
//! partition, an AND-composed filter set, an optional full-text clause, and
//! the sort/page/highlight/aggregation instructions. The query compiler in
//! the service crate produces plans; stores execute them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single filter node. All filters on a plan compose with AND semantics;
/// variants that carry multiple values (`Terms`, `Tags`) are OR within.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Exact match on a keyword field.
    Term { field: String, value: String },
    /// Exact match against any of the given values.
    Terms { field: String, values: Vec<String> },
    /// Glob match (`*` any run, `?` one char) on a keyword field.
    Wildcard { field: String, pattern: String },
    HasError(bool),
    HasStackTrace(bool),
    /// Entry carries at least one of the given tags.
    Tags(Vec<String>),
    /// Inclusive range on `timestamp`; open ends are `None`.
    TimeRange {
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
    /// Inclusive range on `lineNumber`; open ends are `None`.
    LineRange { min: Option<u64>, max: Option<u64> },
}

/// Full-text clause: every query token must match in at least one of the
/// searched fields (operator AND), with AUTO fuzziness per token length
/// (0 edits up to 2 chars, 1 edit for 3-5, 2 edits from 6).
#[derive(Debug, Clone, PartialEq)]
pub struct FullTextQuery {
    pub query: String,
    pub fields: Vec<String>,
}

impl FullTextQuery {
    /// Maximum edit distance allowed for a token, per the AUTO rule.
    pub fn auto_fuzziness(token: &str) -> u32 {
        match token.chars().count() {
            0..=2 => 0,
            3..=5 => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: "timestamp".to_string(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 0-based page number.
    pub number: u64,
    pub size: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self { number: 0, size: 50 }
    }
}

impl Page {
    pub fn offset(&self) -> u64 {
        self.number * self.size
    }
}

/// Highlighting instructions for the full-text clause.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightSpec {
    pub fields: Vec<String>,
    pub pre_tag: String,
    pub post_tag: String,
    pub fragment_size: usize,
    pub max_fragments: usize,
}

impl Default for HighlightSpec {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            pre_tag: "<em class=\"highlight\">".to_string(),
            post_tag: "</em>".to_string(),
            fragment_size: 150,
            max_fragments: 3,
        }
    }
}

/// Date histogram bucket width.
///
/// Whole calendar units (minute, hour, day, week, month) bucket on calendar
/// boundaries; the multiples (1s, 5m, 15m, 30m) are fixed spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistogramInterval {
    Second,
    Minute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    Hour,
    Day,
    Week,
    Month,
}

impl HistogramInterval {
    /// Parses the wire form (`1s`, `1m`, `5m`, `15m`, `30m`, `1h`, `1d`,
    /// `1w`, `1M`). Unknown values fall back to one hour.
    pub fn parse(value: &str) -> Self {
        match value {
            "1s" => Self::Second,
            "1m" => Self::Minute,
            "5m" => Self::FiveMinutes,
            "15m" => Self::FifteenMinutes,
            "30m" => Self::ThirtyMinutes,
            "1h" => Self::Hour,
            "1d" => Self::Day,
            "1w" => Self::Week,
            "1M" => Self::Month,
            _ => Self::Hour,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Second => "1s",
            Self::Minute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::Hour => "1h",
            Self::Day => "1d",
            Self::Week => "1w",
            Self::Month => "1M",
        }
    }

    /// Fixed span in seconds. Weeks and months bucket on calendar
    /// boundaries instead and return `None`.
    pub fn fixed_seconds(&self) -> Option<i64> {
        match self {
            Self::Second => Some(1),
            Self::Minute => Some(60),
            Self::FiveMinutes => Some(5 * 60),
            Self::FifteenMinutes => Some(15 * 60),
            Self::ThirtyMinutes => Some(30 * 60),
            Self::Hour => Some(3600),
            Self::Day => Some(86_400),
            Self::Week | Self::Month => None,
        }
    }
}

/// Terms aggregation over one keyword field, top-N by document count.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueValuesSpec {
    pub field: String,
    pub limit: usize,
}

/// The aggregation set a plan asks the store to compute over the full
/// matched set (not just the returned page).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationRequest {
    /// Level distribution, error/stack-trace counts, min/max timestamp.
    pub summary: bool,
    /// Top loggers/threads/sources/hostnames and logger/thread cardinality.
    pub extended: bool,
    /// Date histogram on `timestamp` with error/warn sub-counts per bucket.
    pub timeline: Option<HistogramInterval>,
    /// Distinct values of one keyword field.
    pub unique_values: Option<UniqueValuesSpec>,
}

impl AggregationRequest {
    pub fn is_empty(&self) -> bool {
        !self.summary
            && !self.extended
            && self.timeline.is_none()
            && self.unique_values.is_none()
    }
}

/// A compiled query ready for execution by an [`EntryStore`].
///
/// [`EntryStore`]: crate::store::EntryStore
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    /// Mandatory partition: every query is scoped to one job.
    pub job_id: String,
    pub filters: Vec<Filter>,
    pub full_text: Option<FullTextQuery>,
    pub sort: Sort,
    pub page: Page,
    pub highlight: Option<HighlightSpec>,
    pub aggregations: AggregationRequest,
}

impl SearchPlan {
    /// A bare plan matching every entry of a job, default sort and paging.
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            filters: Vec::new(),
            full_text: None,
            sort: Sort::default(),
            page: Page::default(),
            highlight: None,
            aggregations: AggregationRequest::default(),
        }
    }
}
