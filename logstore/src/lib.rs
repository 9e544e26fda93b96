//! # logstore
//!
//! Document store layer for parsed log entries.
//!
//! This crate defines the canonical [`LogEntry`] document, the compiled
//! [`SearchPlan`] executed against a store, and the [`EntryStore`] contract
//! every backend must satisfy: bulk write of documents keyed by a job
//! partition, plus filtered search with aggregations. [`MemoryStore`] is the
//! in-process implementation used by the service and its tests.

pub mod entry;
pub mod error;
pub mod memory;
pub mod plan;
pub mod store;

pub use entry::{LogEntry, MetaValue, KEYWORD_FIELDS, SORTABLE_FIELDS, TEXT_FIELDS};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use plan::{
    AggregationRequest, Filter, FullTextQuery, HighlightSpec, HistogramInterval, Page, SearchPlan,
    Sort, UniqueValuesSpec,
};
pub use store::{AggregationResults, EntryStore, FieldCount, HistogramBucket, SearchOutcome};
