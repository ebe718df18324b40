//! Terminal rendering of streams and comment threads.

use colored::Colorize;
use grumble_sync::{
    container_markup, CommentSurface, DisplaySurface, Post, PostId, PLACEHOLDER_TEXT,
};
use scraper::Html;

/// Collapse a server fragment to one line of plain text.
pub fn fragment_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text = fragment.root_element().text().collect::<String>();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Prints stream changes as they are merged.
///
/// Output is append-only, so a "prepend" is simply the next line printed.
#[derive(Debug, Default)]
pub struct TerminalSurface {
    posted: i64,
    html: bool,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit the identifying HTML container of each post, one per line.
    pub fn html() -> Self {
        Self {
            html: true,
            ..Self::default()
        }
    }
}

impl DisplaySurface for TerminalSurface {
    fn prepend(&mut self, post: &Post) {
        if self.html {
            println!("{}", container_markup(post));
            return;
        }
        let author = post.author.as_deref().unwrap_or("someone");
        println!(
            "{} {} {}",
            format!("#{}", post.id).dimmed(),
            format!("{}:", author).bright_blue().bold(),
            fragment_text(&post.rendered_content)
        );
    }

    fn replace_content(&mut self, id: &PostId, rendered_content: &str) {
        if self.html {
            println!("{}", container_markup(&Post::new(id.clone(), rendered_content)));
            return;
        }
        println!(
            "{} {} {}",
            format!("#{}", id).dimmed(),
            "edited:".yellow(),
            fragment_text(rendered_content)
        );
    }

    fn show_placeholder(&mut self) {
        println!("{}", PLACEHOLDER_TEXT.dimmed());
    }

    fn clear_placeholder(&mut self) {}

    fn total_changed(&mut self, delta: i64) {
        self.posted += delta;
        println!(
            "{}",
            format!("Posted {} this session", self.posted).bright_green()
        );
    }
}

/// Prints comments under a post.
#[derive(Debug, Default)]
pub struct TerminalComments;

impl CommentSurface for TerminalComments {
    fn clear(&mut self) {}

    fn append(&mut self, rendered_content: &str) {
        println!("  {} {}", "↳".dimmed(), fragment_text(rendered_content));
    }
}
