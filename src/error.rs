use thiserror::Error;

/// Closed error taxonomy for the SmartFS image builder.
///
/// Every fallible operation in `codec`, `mtd`, and `fs` returns one of
/// these variants. Nothing here is recoverable by the library itself;
/// callers are expected to abort the in-flight build.
#[derive(Debug, Error)]
pub enum SmartFsError {
    #[error("structural decode error: {0}")]
    Decode(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("capacity error: {0}")]
    Capacity(String),

    #[error("domain error: {0}")]
    Domain(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, SmartFsError>;
