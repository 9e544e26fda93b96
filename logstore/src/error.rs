//! Error types for store operations.

/// Error type for store operations.
///
/// Backends map their failure modes onto these two kinds: [`Backend`] for
/// anything that went wrong talking to or inside the engine, and
/// [`InvalidPlan`] for plans the engine cannot execute.
///
/// [`Backend`]: StoreError::Backend
/// [`InvalidPlan`]: StoreError::InvalidPlan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing engine failed (I/O, unavailable, write rejected).
    Backend(String),

    /// The compiled plan references something the store cannot execute,
    /// such as an unknown field in a terms aggregation.
    InvalidPlan(String),
}

impl std::error::Error for StoreError {}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "store backend error: {}", msg),
            StoreError::InvalidPlan(msg) => write!(f, "invalid search plan: {}", msg),
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
