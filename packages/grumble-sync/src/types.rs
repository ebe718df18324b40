//! Wire and domain types shared by the feeds and the merge engine.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SyncError;

/// Server-assigned post identifier.
///
/// The API emits integers today but the client treats ids as opaque, so both
/// JSON numbers and strings are accepted and normalized to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for PostId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<i32> for PostId {
    fn from(id: i32) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for PostId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for PostId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Str(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(n) => PostId::from(n),
            RawId::Str(s) => PostId(s),
        })
    }
}

/// One grumble as delivered by the messages API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(default)]
    pub author: Option<String>,
    /// Server-rendered markup; never parsed client-side.
    #[serde(rename = "html")]
    pub rendered_content: String,
}

impl Post {
    pub fn new(id: impl Into<PostId>, rendered_content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: None,
            rendered_content: rendered_content.into(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// A single update pushed over the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEvent {
    pub id: PostId,
    pub author: String,
    #[serde(rename = "html")]
    pub rendered_content: String,
}

impl PostEvent {
    pub fn new(
        id: impl Into<PostId>,
        author: impl Into<String>,
        rendered_content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            rendered_content: rendered_content.into(),
        }
    }
}

impl From<PostEvent> for Post {
    fn from(event: PostEvent) -> Self {
        Post {
            id: event.id,
            author: Some(event.author),
            rendered_content: event.rendered_content,
        }
    }
}

/// Which logical stream a view shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Global,
    /// Posts from users the current user follows.
    Following,
    /// Posts by a single user.
    Profile { username: String },
}

impl Scope {
    pub fn profile(username: impl Into<String>) -> Self {
        Scope::Profile {
            username: username.into(),
        }
    }

    /// Path segment used by the messages API.
    pub fn path_segment(&self) -> String {
        match self {
            Scope::Global => "global".to_string(),
            Scope::Following => "follower".to_string(),
            Scope::Profile { username } => {
                format!("profile/{}", urlencoding::encode(username))
            }
        }
    }

    /// Whether a pushed event belongs in this view.
    ///
    /// The push channel is global; profile views keep only their owner's posts.
    pub fn admits(&self, event: &PostEvent) -> bool {
        match self {
            Scope::Profile { username } => event.author == *username,
            Scope::Global | Scope::Following => true,
        }
    }

    /// Whether this scope can be kept live from the push channel.
    ///
    /// Filtering the global channel down to followed users would need the
    /// follow list, which the client does not have.
    pub fn supports_push(&self) -> bool {
        !matches!(self, Scope::Following)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Following => f.write_str("following"),
            Scope::Profile { username } => write!(f, "profile:{}", username),
        }
    }
}

impl FromStr for Scope {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(username) = s.strip_prefix("profile:") {
            if username.is_empty() {
                return Err(SyncError::Config("profile scope needs a username".into()));
            }
            return Ok(Scope::profile(username));
        }

        match s.to_ascii_lowercase().as_str() {
            "global" => Ok(Scope::Global),
            "following" | "follower" => Ok(Scope::Following),
            other => Err(SyncError::Config(format!("unknown scope: {}", other))),
        }
    }
}

/// Last-updated cursor handed out by the server.
///
/// Unset means "everything up to now". The server sends ISO-8601 timestamps;
/// those are compared as instants, anything else falls back to string order.
/// Equality follows the same rule, so two spellings of one instant are equal.
#[derive(Debug, Clone, Default)]
pub struct Watermark(Option<String>);

impl Watermark {
    pub fn unset() -> Self {
        Self(None)
    }

    /// Build from a raw server value. An empty string means unset.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.trim().is_empty() {
            Self(None)
        } else {
            Self(Some(raw))
        }
    }

    pub fn is_unset(&self) -> bool {
        self.0.is_none()
    }

    /// Raw value, or `""` when unset.
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }

    fn instant(&self) -> Option<DateTime<FixedOffset>> {
        self.0
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    }

    /// Move to `next` unless that would go backwards. Returns whether the
    /// cursor changed.
    pub fn advance(&mut self, next: Watermark) -> bool {
        if next.is_unset() || *self == next {
            return false;
        }
        if self.is_unset() || next.cmp_cursor(self) == Ordering::Greater {
            *self = next;
            return true;
        }
        false
    }

    fn cmp_cursor(&self, other: &Watermark) -> Ordering {
        match (self.instant(), other.instant()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.as_str().cmp(other.as_str()),
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for Watermark {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl Eq for Watermark {}

impl PartialOrd for Watermark {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(match (self.is_unset(), other.is_unset()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.cmp_cursor(other),
        })
    }
}

/// A poll result: posts newer than the requested watermark, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedBatch {
    pub posts: Vec<Post>,
    pub watermark: Watermark,
}

impl FeedBatch {
    pub fn new(posts: Vec<Post>, watermark: Watermark) -> Self {
        Self { posts, watermark }
    }
}

/// `GET /api/get-messages/...` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesEnvelope {
    pub messages: Vec<Post>,
    #[serde(default)]
    pub last_updated: String,
}

impl From<MessagesEnvelope> for FeedBatch {
    fn from(envelope: MessagesEnvelope) -> Self {
        FeedBatch {
            posts: envelope.messages,
            watermark: Watermark::new(envelope.last_updated),
        }
    }
}

/// Comment fragments newer than the requested watermark, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentBatch {
    pub comments: Vec<String>,
    pub watermark: Watermark,
}

/// `GET /api/get-comments/...` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentsEnvelope {
    pub comments: Vec<String>,
    #[serde(default)]
    pub last_updated: String,
}

impl From<CommentsEnvelope> for CommentBatch {
    fn from(envelope: CommentsEnvelope) -> Self {
        CommentBatch {
            comments: envelope.comments,
            watermark: Watermark::new(envelope.last_updated),
        }
    }
}
