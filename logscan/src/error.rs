//! Error types for the ingestion and query layers.
//!
//! Failures are grouped into flat kinds; the HTTP layer maps each kind to a
//! status code. Per-line parse failures never surface here -- they are
//! counted against the job and processing continues.

use logstore::StoreError;

/// Error type for service operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid caller input: bad query parameters, unsupported fields,
    /// invalid file types, exhausted ingestion capacity.
    InvalidInput(String),

    /// An uploaded file exceeded the configured size cap.
    FileTooLarge { max: u64, actual: u64 },

    /// A referenced job does not exist (or its status expired).
    NotFound(String),

    /// The job exists but has not reached a terminal state yet.
    JobNotCompleted(String),

    /// A whole-file parse failure (unreadable input, no parser).
    Parse(String),

    /// The backing store failed.
    Storage(String),

    /// Unexpected internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl Error {
    pub fn job_not_found(job_id: &str) -> Self {
        Error::NotFound(format!("job not found: {}", job_id))
    }

    pub fn invalid_sort_field(field: &str) -> Self {
        Error::InvalidInput(format!("invalid sort field: '{}'", field))
    }

    pub fn invalid_date_range() -> Self {
        Error::InvalidInput("startDate must be before endDate".to_string())
    }

    pub fn unsupported_field(field: &str) -> Self {
        Error::InvalidInput(format!(
            "field '{}' does not support unique value aggregation",
            field
        ))
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::FileTooLarge { max, actual } => write!(
                f,
                "File too large: {} bytes exceeds the {} byte limit",
                actual, max
            ),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::JobNotCompleted(msg) => write!(f, "Job not completed: {}", msg),
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Backend(msg) => Error::Storage(msg),
            StoreError::InvalidPlan(msg) => Error::Internal(msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, Error>;
