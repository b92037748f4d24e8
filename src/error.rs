//! Error types for the transaction pipeline.
//!
//! Every failure the core can produce is a [`PipelineError`]. I/O boundaries
//! (file loading, configuration, the CLI) wrap these with `anyhow` context.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while transforming, aggregating or serving transaction data.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A column required by the operation is not in the record set.
    #[error("Missing required column: '{0}'")]
    Schema(String),

    /// A series container was built from data of the wrong shape.
    #[error("Invalid series data: {0}")]
    Validation(String),

    /// Request parameters were missing or malformed.
    #[error("Invalid input: {0}")]
    Input(String),

    /// A cell could not be read as its column's canonical type.
    #[error("Row {row}, column '{column}': {reason}")]
    InvalidCell {
        /// Zero-based row index.
        row: usize,
        /// Column name.
        column: String,
        /// What was wrong with the value.
        reason: String,
    },
}

impl PipelineError {
    pub fn schema(column: impl Into<String>) -> Self {
        Self::Schema(column.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn invalid_cell(row: usize, column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCell {
            row,
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the caller rather than by the data.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}
