//! Error types for the stream synchronizer.

use thiserror::Error;

/// Result type for synchronizer operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by feeds, the API client and the synchronizer.
///
/// None of these are fatal to the process: the view keeps its last merged
/// state and the next scheduled poll retries.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration error (missing base URL, bad scope string)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure (connection refused, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the API
    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    /// Response body did not match the expected envelope
    #[error("Parse error: {0}")]
    Parse(String),

    /// Push channel closed
    #[error("Push channel disconnected: {0}")]
    Disconnected(String),

    /// Input rejected before any request was made
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The synchronizer task has shut down
    #[error("Synchronizer is no longer running")]
    Closed,
}

impl SyncError {
    /// Whether the failure came from the transport or the server rather than
    /// from local input.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Server { .. } | SyncError::Disconnected(_)
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Parse(e.to_string())
        } else {
            SyncError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Parse(e.to_string())
    }
}
