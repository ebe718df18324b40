//! Feed adapters that deliver server state to the merge engine.
//!
//! - [`poll::PollFeed`]: batches of posts newer than a watermark
//! - [`push::PushFeed`]: individual post updates as they happen

pub mod poll;
pub mod push;

pub use poll::{HttpPollFeed, PollFeed};
pub use push::{PushEvent, PushFeed, PushSubscription, WsPushFeed};
