//! Client-side projection of a stream and the merge rules that keep it
//! consistent with the server.
//!
//! # Key Properties
//!
//! - **Unique ids**: a post already shown is updated in place, never added twice
//! - **Monotonic watermark**: merging a poll batch never moves the cursor back
//! - **One-way state**: `Empty -> Populated`, undone only by [`StreamView::reset`]
//! - **Single writer**: only the merge methods mutate the view
//!
//! ```text
//! PollFeed ──► merge_batch ──┐
//!                            ├──► StreamView ──► DisplaySurface
//! PushFeed ──► merge_event ──┘
//! ```

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::display::{CommentSurface, DisplaySurface};
use crate::types::{CommentBatch, FeedBatch, Post, PostEvent, PostId, Watermark};

/// Whether a view has ever rendered a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Empty,
    Populated,
}

/// What a single merge did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Posts prepended as new entries.
    pub inserted: usize,
    /// Posts whose content was replaced in place.
    pub updated: usize,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0
    }
}

/// The set of posts currently displayed for one stream.
#[derive(Debug, Clone, Default)]
pub struct StreamView {
    state: ViewState,
    watermark: Watermark,
    /// Insertion order is oldest first; the last entry is the top of the page.
    posts: IndexMap<PostId, Post>,
    placeholder_shown: bool,
}

impl StreamView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.state == ViewState::Empty
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    pub fn placeholder_shown(&self) -> bool {
        self.placeholder_shown
    }

    /// Number of posts displayed.
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.posts.contains_key(id)
    }

    pub fn get(&self, id: &PostId) -> Option<&Post> {
        self.posts.get(id)
    }

    /// Posts in display order, topmost first.
    pub fn visible(&self) -> impl Iterator<Item = &Post> + '_ {
        self.posts.values().rev()
    }

    /// Ids in display order, topmost first.
    pub fn displayed_ids(&self) -> impl Iterator<Item = &PostId> + '_ {
        self.posts.keys().rev()
    }

    /// Merge a poll result.
    ///
    /// Each post is prepended in the order received, so the last post of the
    /// batch ends up on top. The watermark advances even when the batch is
    /// empty.
    pub fn merge_batch<S>(&mut self, surface: &mut S, batch: FeedBatch) -> MergeOutcome
    where
        S: DisplaySurface + ?Sized,
    {
        let FeedBatch { posts, watermark } = batch;
        let mut outcome = MergeOutcome::default();

        if posts.is_empty() && self.is_empty() {
            if !self.placeholder_shown {
                surface.show_placeholder();
                self.placeholder_shown = true;
            }
        } else if !posts.is_empty() {
            self.populate(surface);
            for post in posts {
                if self.posts.contains_key(&post.id) {
                    // A cursor edge (clock skew, retried request) re-delivered
                    // a post we already show.
                    warn!(id = %post.id, "poll batch re-delivered a displayed post, updating in place");
                    self.replace(surface, &post.id, post.rendered_content);
                    outcome.updated += 1;
                } else {
                    self.prepend(surface, post);
                    outcome.inserted += 1;
                }
            }
        }

        if self.watermark.advance(watermark.clone()) {
            debug!(watermark = %self.watermark, "stream watermark advanced");
        } else if !watermark.is_unset() && watermark < self.watermark {
            warn!(
                current = %self.watermark,
                received = %watermark,
                "ignoring watermark older than the current cursor"
            );
        }

        outcome
    }

    /// Merge one pushed update. Does not touch the watermark.
    pub fn merge_event<S>(&mut self, surface: &mut S, event: PostEvent) -> MergeOutcome
    where
        S: DisplaySurface + ?Sized,
    {
        self.populate(surface);

        if self.posts.contains_key(&event.id) {
            self.replace(surface, &event.id, event.rendered_content);
            MergeOutcome {
                inserted: 0,
                updated: 1,
            }
        } else {
            self.prepend(surface, event.into());
            MergeOutcome {
                inserted: 1,
                updated: 0,
            }
        }
    }

    /// Forget everything and return to the freshly created state.
    ///
    /// The surface is not touched; callers reset it alongside.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn populate<S: DisplaySurface + ?Sized>(&mut self, surface: &mut S) {
        if self.state == ViewState::Empty {
            if self.placeholder_shown {
                surface.clear_placeholder();
                self.placeholder_shown = false;
            }
            self.state = ViewState::Populated;
        }
    }

    fn prepend<S: DisplaySurface + ?Sized>(&mut self, surface: &mut S, post: Post) {
        surface.prepend(&post);
        self.posts.insert(post.id.clone(), post);
    }

    fn replace<S: DisplaySurface + ?Sized>(
        &mut self,
        surface: &mut S,
        id: &PostId,
        rendered_content: String,
    ) {
        if let Some(existing) = self.posts.get_mut(id) {
            surface.replace_content(id, &rendered_content);
            existing.rendered_content = rendered_content;
        }
    }
}

/// The comment list under one post.
///
/// Comments are appended oldest first. The very first fetch (no watermark
/// yet) clears whatever the server pre-rendered into the list so it is not
/// shown twice.
#[derive(Debug, Clone)]
pub struct CommentThread {
    message_id: PostId,
    watermark: Watermark,
    count: usize,
}

impl CommentThread {
    pub fn new(message_id: PostId) -> Self {
        Self {
            message_id,
            watermark: Watermark::unset(),
            count: 0,
        }
    }

    pub fn message_id(&self) -> &PostId {
        &self.message_id
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Comments appended since the thread was last cleared.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Merge a comment fetch, returning how many comments were appended.
    pub fn merge<S>(&mut self, surface: &mut S, batch: CommentBatch) -> usize
    where
        S: CommentSurface + ?Sized,
    {
        if self.watermark.is_unset() {
            surface.clear();
            self.count = 0;
        }
        self.watermark.advance(batch.watermark);

        let appended = batch.comments.len();
        for comment in &batch.comments {
            surface.append(comment);
        }
        self.count += appended;
        appended
    }
}
