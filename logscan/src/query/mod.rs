//! Query layer: declarative search requests compiled into store plans,
//! executed and summarized, with CSV/JSON/NDJSON export rendering.

pub mod builder;
pub mod export;
pub mod request;
pub mod response;
pub mod service;

pub use export::{ExportFormat, ExportRequest};
pub use request::LogQueryRequest;
pub use response::{FilterSummary, JobSummary, LogQueryResponse, PaginationInfo, TimelineData};
pub use service::QueryService;
