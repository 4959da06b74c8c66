//! Structured error types for the Banksia workspace.

use thiserror::Error;

/// Unified error type for all Banksia operations.
#[derive(Debug, Error)]
pub enum BanksiaError {
    /// Invalid input (negative values, dimension mismatches, unmatched names).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the Banksia workspace.
pub type Result<T> = std::result::Result<T, BanksiaError>;
