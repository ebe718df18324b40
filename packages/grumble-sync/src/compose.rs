//! Post composition: the input draft and the create call.

use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::http::ApiClient;

/// Longest message the server accepts.
pub const MAX_MESSAGE_LEN: usize = 42;

/// Something that can create a post on the server.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &str) -> Result<()>;
}

#[async_trait]
impl Publisher for ApiClient {
    async fn publish(&self, message: &str) -> Result<()> {
        self.post_message(message).await
    }
}

/// Text typed into the compose box.
///
/// The draft survives a failed submit untouched and is cleared only once the
/// server accepted it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    text: String,
}

impl Draft {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Check the draft against the server's rules without sending it.
    pub fn validate(&self) -> Result<&str> {
        validate_message(&self.text)
    }
}

/// Reject empty or over-long text before it reaches the network.
///
/// Posts and comments share the same limit.
pub fn validate_message(text: &str) -> Result<&str> {
    if text.trim().is_empty() {
        return Err(SyncError::Validation("text cannot be empty".into()));
    }
    let len = text.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(SyncError::Validation(format!(
            "text is {} characters, max allowed is {}",
            len, MAX_MESSAGE_LEN
        )));
    }
    Ok(text)
}
