//! The [`EntryStore`] contract and the result types stores produce.
//!
//! The service depends on exactly two capabilities: bulk write of documents
//! carrying a partition key, and filtered search with aggregations. Any
//! engine providing an inverted index, date histograms, and terms
//! aggregations can sit behind this trait; [`MemoryStore`] is the built-in
//! implementation.
//!
//! [`MemoryStore`]: crate::memory::MemoryStore

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::entry::LogEntry;
use crate::error::StoreResult;
use crate::plan::SearchPlan;

/// One value of a terms aggregation with its document count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCount {
    pub value: String,
    pub count: u64,
}

/// One bucket of a timeline date histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBucket {
    #[serde(with = "crate::entry::ts_millis")]
    pub timestamp: NaiveDateTime,
    pub count: u64,
    pub error_count: u64,
    pub warning_count: u64,
}

/// Aggregation output computed over a plan's full matched set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationResults {
    pub level_counts: BTreeMap<String, u64>,
    pub error_count: u64,
    pub stacktrace_count: u64,
    pub min_timestamp: Option<NaiveDateTime>,
    pub max_timestamp: Option<NaiveDateTime>,
    pub top_loggers: Vec<FieldCount>,
    pub top_threads: Vec<FieldCount>,
    pub top_sources: Vec<FieldCount>,
    pub top_hostnames: Vec<FieldCount>,
    pub unique_loggers: Option<u64>,
    pub unique_threads: Option<u64>,
    pub timeline: Vec<HistogramBucket>,
    pub unique_values: Vec<FieldCount>,
}

/// The outcome of executing a [`SearchPlan`].
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// The requested page of matching entries, in plan sort order.
    pub hits: Vec<LogEntry>,
    /// Total matched count across all pages.
    pub total: u64,
    /// Present when the plan requested aggregations.
    pub aggregations: Option<AggregationResults>,
    /// entry id -> field -> highlighted fragments, for hits on this page.
    pub highlights: HashMap<String, HashMap<String, Vec<String>>>,
}

/// Contract between the ingestion/query layers and the backing store.
///
/// Implementations must be shareable across tasks (`Send + Sync`); the
/// service holds one behind an `Arc<dyn EntryStore>`.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Writes a batch of entries. The write is all-or-nothing per call;
    /// callers that need partial progress fall back to [`index`] per entry.
    ///
    /// Returns the number of entries written.
    ///
    /// [`index`]: EntryStore::index
    async fn bulk_index(&self, entries: Vec<LogEntry>) -> StoreResult<u64>;

    /// Writes a single entry.
    async fn index(&self, entry: LogEntry) -> StoreResult<()>;

    /// Executes a compiled search plan.
    async fn search(&self, plan: &SearchPlan) -> StoreResult<SearchOutcome>;

    /// Removes every entry of a job partition, returning how many were
    /// deleted.
    async fn delete_job(&self, job_id: &str) -> StoreResult<u64>;
}
