//! Polling feed over the messages API.

use async_trait::async_trait;

use crate::error::Result;
use crate::http::ApiClient;
use crate::types::{FeedBatch, Scope, Watermark};

/// Fetches posts newer than a watermark for one fixed scope.
///
/// Failures are not fatal; callers simply retry on the next tick.
#[async_trait]
pub trait PollFeed: Send + Sync {
    /// The stream this feed reads.
    fn scope(&self) -> &Scope;

    /// Fetch everything after `watermark` (everything up to now when unset).
    async fn fetch(&self, watermark: &Watermark) -> Result<FeedBatch>;
}

/// [`PollFeed`] backed by `GET /api/get-messages/...`.
#[derive(Clone)]
pub struct HttpPollFeed {
    client: ApiClient,
    scope: Scope,
}

impl HttpPollFeed {
    pub fn new(client: ApiClient, scope: Scope) -> Self {
        Self { client, scope }
    }
}

#[async_trait]
impl PollFeed for HttpPollFeed {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    async fn fetch(&self, watermark: &Watermark) -> Result<FeedBatch> {
        self.client.get_messages(&self.scope, watermark).await
    }
}
