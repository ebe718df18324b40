//! Rendering collaborators.
//!
//! The merge engine never touches markup itself. It tells a surface what
//! changed and the surface decides how to show it.

use crate::types::{Post, PostId};

/// Where a stream view is rendered.
///
/// Calls arrive in merge order from a single task, so implementations need
/// no internal locking.
pub trait DisplaySurface: Send {
    /// Insert a post above everything currently shown.
    fn prepend(&mut self, post: &Post);

    /// Swap the markup of an already shown post, keeping its position.
    fn replace_content(&mut self, id: &PostId, rendered_content: &str);

    /// Show the "no posts yet" notice.
    fn show_placeholder(&mut self);

    /// Remove the "no posts yet" notice.
    fn clear_placeholder(&mut self);

    /// The user's own post count changed (a create succeeded).
    fn total_changed(&mut self, _delta: i64) {}
}

impl<S: DisplaySurface + ?Sized> DisplaySurface for Box<S> {
    fn prepend(&mut self, post: &Post) {
        (**self).prepend(post)
    }

    fn replace_content(&mut self, id: &PostId, rendered_content: &str) {
        (**self).replace_content(id, rendered_content)
    }

    fn show_placeholder(&mut self) {
        (**self).show_placeholder()
    }

    fn clear_placeholder(&mut self) {
        (**self).clear_placeholder()
    }

    fn total_changed(&mut self, delta: i64) {
        (**self).total_changed(delta)
    }
}

/// Where a comment thread is rendered.
pub trait CommentSurface: Send {
    /// Drop every comment currently shown.
    fn clear(&mut self);

    /// Add a comment fragment at the bottom of the thread.
    fn append(&mut self, rendered_content: &str);
}

/// Placeholder text shown while a stream has never had a post.
pub const PLACEHOLDER_TEXT: &str = "No message has been posted yet.";

/// Wrap a server fragment in a container that carries its id.
pub fn container_markup(post: &Post) -> String {
    format!(
        "<div class=\"grumble\" data-message-id=\"{}\">{}</div>",
        escape_attribute(post.id.as_str()),
        post.rendered_content
    )
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
