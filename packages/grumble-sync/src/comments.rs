//! Comment threads under a single post.
//!
//! Same watermark pattern as the stream, minus push: fetch comments newer
//! than the last `last_updated`, append them, and refresh after posting.

use tracing::{debug, info, warn};

use crate::compose::validate_message;
use crate::display::CommentSurface;
use crate::error::Result;
use crate::http::ApiClient;
use crate::types::PostId;
use crate::view::CommentThread;

/// Keeps one [`CommentThread`] in step with the comments API.
pub struct CommentSync {
    client: ApiClient,
    thread: CommentThread,
}

impl CommentSync {
    pub fn new(client: ApiClient, message_id: impl Into<PostId>) -> Self {
        Self {
            client,
            thread: CommentThread::new(message_id.into()),
        }
    }

    pub fn thread(&self) -> &CommentThread {
        &self.thread
    }

    /// Fetch and append comments newer than the thread's watermark.
    pub async fn refresh<S>(&mut self, surface: &mut S) -> Result<usize>
    where
        S: CommentSurface + ?Sized,
    {
        let batch = self
            .client
            .get_comments(self.thread.message_id(), self.thread.watermark())
            .await?;
        let appended = self.thread.merge(surface, batch);

        debug!(
            message_id = %self.thread.message_id(),
            appended,
            watermark = %self.thread.watermark(),
            "Comments refreshed"
        );
        Ok(appended)
    }

    /// Post a comment, then refresh the thread.
    pub async fn post<S>(&mut self, surface: &mut S, content: &str) -> Result<()>
    where
        S: CommentSurface + ?Sized,
    {
        validate_message(content)?;

        self.client
            .post_comment(self.thread.message_id(), content)
            .await?;
        info!(message_id = %self.thread.message_id(), "Comment posted");

        if let Err(e) = self.refresh(surface).await {
            warn!(error = %e, message_id = %self.thread.message_id(), "Refresh after comment failed");
        }
        Ok(())
    }
}
