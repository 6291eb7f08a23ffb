//! Central error types for depflow.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic
//! `Display` and `From` implementations.
//!
//! Note the split mandated by the analysis contract: recoverable conditions
//! on the public API surface are `DepflowError`s; invariant violations inside
//! the analysis (querying an instruction the function does not own, asking
//! for a call summary that was never recorded) are programming errors and
//! panic instead.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum DepflowError {
    /// Invalid argument provided to a public API function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience type alias for Results using DepflowError.
pub type Result<T> = std::result::Result<T, DepflowError>;
