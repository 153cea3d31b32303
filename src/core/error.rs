//! Error types for the hash matcher
//!
//! Every failure the matching pipeline can surface is a variant of
//! [`MatchError`], so callers can decide per kind whether to retry or abort.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the hash matcher
#[derive(Error, Debug)]
pub enum MatchError {
    /// No reference shard files were found at the corpus location
    #[error("No reference shard files (*.{extension}) found in {}", directory.display())]
    CorpusEmpty { directory: PathBuf, extension: String },

    /// A reference shard exists but could not be opened or read
    #[error("Failed to read reference shard '{}': {message}", path.display())]
    CorpusUnreadable { path: PathBuf, message: String },

    /// The record source is missing one or more required columns
    #[error("Report is missing required column(s): {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    /// No consumer attached to the output channel in time
    #[error("Result sink unavailable: {0}")]
    SinkUnavailable(String),

    /// The report could not be located or a row could not be parsed
    #[error("Report error: {0}")]
    Report(String),

    /// Shutdown was requested before the index was complete
    #[error("Operation cancelled")]
    Cancelled,

    /// General I/O error
    #[error("IO error: {0}")]
    Io(String),
}

impl MatchError {
    /// Whether the run may be retried with an already-built index.
    ///
    /// Only a missing consumer qualifies: the reference data is still valid,
    /// the reader simply never showed up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchError::SinkUnavailable(_))
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MatchError>;

impl From<std::io::Error> for MatchError {
    fn from(err: std::io::Error) -> Self {
        MatchError::Io(err.to_string())
    }
}

impl From<csv::Error> for MatchError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(io) => MatchError::Io(io.to_string()),
            _ => MatchError::Report(err.to_string()),
        }
    }
}
