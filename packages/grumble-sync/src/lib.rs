//! Grumblr stream synchronization
//!
//! Keeps a locally rendered list of posts consistent with the server while
//! two sources update it: periodic polling of posts newer than a watermark,
//! and an optional WebSocket push channel. Both converge on one idempotent
//! merge routine, so a post is never rendered twice and the watermark never
//! moves backwards.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use grumble_sync::{Draft, StreamSynchronizer, SyncConfig};
//!
//! let config = SyncConfig::from_env()?;
//! let mut sync = StreamSynchronizer::new(
//!     surface,
//!     Arc::new(config.poll_feed()?),
//!     Arc::new(config.api_client()?),
//! )
//! .with_options(config.sync_options());
//! if let Some(push) = config.push_feed()? {
//!     sync = sync.with_push(Arc::new(push));
//! }
//!
//! let (handle, task) = sync.spawn();
//! handle.submit(&mut Draft::new("first!")).await?;
//! handle.shutdown();
//! task.await?;
//! ```
//!
//! # Comments
//!
//! ```rust,ignore
//! let mut comments = CommentSync::new(config.api_client()?, 42);
//! comments.refresh(&mut surface).await?;
//! comments.post(&mut surface, "agreed").await?;
//! ```

pub mod comments;
pub mod compose;
pub mod config;
pub mod csrf;
pub mod display;
pub mod error;
pub mod feed;
pub mod http;
pub mod sync;
pub mod testing;
pub mod types;
pub mod view;

pub use comments::CommentSync;
pub use compose::{validate_message, Draft, Publisher, MAX_MESSAGE_LEN};
pub use config::SyncConfig;
pub use csrf::CsrfToken;
pub use display::{container_markup, CommentSurface, DisplaySurface, PLACEHOLDER_TEXT};
pub use error::{Result, SyncError};
pub use feed::{HttpPollFeed, PollFeed, PushEvent, PushFeed, PushSubscription, WsPushFeed};
pub use http::ApiClient;
pub use sync::{
    PushOutcome, ReconnectPolicy, StreamSynchronizer, SyncCommand, SyncHandle, SyncOptions,
};
pub use types::{CommentBatch, FeedBatch, Post, PostEvent, PostId, Scope, Watermark};
pub use view::{CommentThread, MergeOutcome, StreamView, ViewState};
