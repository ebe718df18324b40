//! Testing utilities including mock implementations.
//!
//! These are useful for exercising the synchronizer and the merge rules
//! without a Grumblr server.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::compose::Publisher;
use crate::display::{CommentSurface, DisplaySurface};
use crate::error::{Result, SyncError};
use crate::feed::poll::PollFeed;
use crate::feed::push::{PushEvent, PushFeed, PushSubscription};
use crate::types::{FeedBatch, Post, PostId, Scope, Watermark};

/// One call received by a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOp {
    Prepend(PostId),
    Replace(PostId),
    ShowPlaceholder,
    ClearPlaceholder,
    TotalChanged(i64),
}

#[derive(Debug, Default)]
struct SurfaceState {
    /// Topmost first.
    entries: Vec<(PostId, String)>,
    placeholder: bool,
    total: i64,
    ops: Vec<SurfaceOp>,
}

/// An in-memory surface that behaves like the page list and records every
/// call for assertions.
///
/// Clones share state, so a test can keep one handle while the synchronizer
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SurfaceState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Ids as shown, topmost first. Duplicated entries would appear twice.
    pub fn ids(&self) -> Vec<String> {
        self.with_state(|s| s.entries.iter().map(|(id, _)| id.to_string()).collect())
    }

    pub fn content(&self, id: &PostId) -> Option<String> {
        self.with_state(|s| {
            s.entries
                .iter()
                .find(|(entry, _)| entry == id)
                .map(|(_, html)| html.clone())
        })
    }

    pub fn placeholder(&self) -> bool {
        self.with_state(|s| s.placeholder)
    }

    pub fn total(&self) -> i64 {
        self.with_state(|s| s.total)
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.with_state(|s| s.ops.clone())
    }

    pub fn count_ops(&self, pred: impl Fn(&SurfaceOp) -> bool) -> usize {
        self.with_state(|s| s.ops.iter().filter(|op| pred(op)).count())
    }
}

impl DisplaySurface for RecordingSurface {
    fn prepend(&mut self, post: &Post) {
        self.with_state(|s| {
            s.entries
                .insert(0, (post.id.clone(), post.rendered_content.clone()));
            s.ops.push(SurfaceOp::Prepend(post.id.clone()));
        })
    }

    fn replace_content(&mut self, id: &PostId, rendered_content: &str) {
        self.with_state(|s| {
            for (entry, html) in s.entries.iter_mut() {
                if entry == id {
                    *html = rendered_content.to_string();
                }
            }
            s.ops.push(SurfaceOp::Replace(id.clone()));
        })
    }

    fn show_placeholder(&mut self) {
        self.with_state(|s| {
            s.placeholder = true;
            s.ops.push(SurfaceOp::ShowPlaceholder);
        })
    }

    fn clear_placeholder(&mut self) {
        self.with_state(|s| {
            s.placeholder = false;
            s.ops.push(SurfaceOp::ClearPlaceholder);
        })
    }

    fn total_changed(&mut self, delta: i64) {
        self.with_state(|s| {
            s.total += delta;
            s.ops.push(SurfaceOp::TotalChanged(delta));
        })
    }
}

/// An in-memory comment list.
#[derive(Debug, Clone, Default)]
pub struct RecordingComments {
    comments: Vec<String>,
    clears: usize,
}

impl RecordingComments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with comments the server rendered into the page.
    pub fn with_existing(comments: Vec<&str>) -> Self {
        Self {
            comments: comments.into_iter().map(String::from).collect(),
            clears: 0,
        }
    }

    pub fn comments(&self) -> Vec<&str> {
        self.comments.iter().map(String::as_str).collect()
    }

    pub fn clears(&self) -> usize {
        self.clears
    }
}

impl CommentSurface for RecordingComments {
    fn clear(&mut self) {
        self.comments.clear();
        self.clears += 1;
    }

    fn append(&mut self, rendered_content: &str) {
        self.comments.push(rendered_content.to_string());
    }
}

/// A poll feed that replays queued responses and records requested
/// watermarks.
///
/// Once the queue is drained every fetch returns an empty batch that keeps
/// the requested watermark.
#[derive(Clone)]
pub struct MockPollFeed {
    scope: Scope,
    responses: Arc<Mutex<VecDeque<Result<FeedBatch>>>>,
    requests: Arc<Mutex<Vec<Watermark>>>,
}

impl MockPollFeed {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a successful batch.
    pub fn with_batch(self, batch: FeedBatch) -> Self {
        self.push(Ok(batch));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: SyncError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, response: Result<FeedBatch>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Watermarks passed to `fetch`, in call order.
    pub fn requests(&self) -> Vec<Watermark> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl PollFeed for MockPollFeed {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    async fn fetch(&self, watermark: &Watermark) -> Result<FeedBatch> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(watermark.clone());

        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| Ok(FeedBatch::new(Vec::new(), watermark.clone())))
    }
}

/// A push feed driven by the test through an mpsc sender.
///
/// Each `subscribe` hands out the next queued receiver; with none left it
/// fails with `Disconnected`.
#[derive(Clone, Default)]
pub struct MockPushFeed {
    receivers: Arc<Mutex<VecDeque<mpsc::Receiver<PushEvent>>>>,
    subscriptions: Arc<Mutex<usize>>,
    connect_delay: Duration,
}

impl MockPushFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every handshake take this long, like an unresponsive host.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Prepare one subscription and return the sender that feeds it.
    pub fn channel(&self) -> mpsc::Sender<PushEvent> {
        let (tx, rx) = mpsc::channel(64);
        self.receivers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(rx);
        tx
    }

    /// Number of successful `subscribe` calls.
    pub fn subscriptions(&self) -> usize {
        *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PushFeed for MockPushFeed {
    async fn subscribe(&self, _scope: &Scope) -> Result<PushSubscription> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        let rx = self
            .receivers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| SyncError::Disconnected("no mock channel prepared".into()))?;
        *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(PushSubscription::from_receiver(rx))
    }
}

/// A publisher that records messages and can be told to fail.
#[derive(Clone, Default)]
pub struct MockPublisher {
    published: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<VecDeque<SyncError>>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `publish` call fail with `error`.
    pub fn fail_next(&self, error: SyncError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, message: &str) -> Result<()> {
        if let Some(error) = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Err(error);
        }
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
        Ok(())
    }
}
