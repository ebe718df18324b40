//! Terminal client for a Grumblr site.
//!
//! Settings come from `GRUMBLR_*` environment variables (or `.env`); flags
//! override them.

mod terminal;

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use grumble_sync::{CommentSync, Draft, StreamSynchronizer, SyncConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use terminal::{TerminalComments, TerminalSurface};

#[derive(Parser)]
#[command(name = "grumble")]
#[command(about = "Follow and post to a Grumblr stream from the terminal")]
struct Cli {
    /// Site root, e.g. https://grumblr.example.com
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// global, following or profile:<username>
    #[arg(long, global = true)]
    scope: Option<String>,

    /// Cookie header carrying sessionid and csrftoken
    #[arg(long, global = true)]
    cookie: Option<String>,

    /// Seconds between polls
    #[arg(long, global = true)]
    poll_interval: Option<u64>,

    /// Poll only, never open the push channel
    #[arg(long, global = true)]
    no_push: bool,

    /// Re-open a dropped push channel with backoff
    #[arg(long, global = true)]
    reconnect: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the stream live; each line typed on stdin is posted
    Watch {
        /// Print each post as its HTML container instead of plain text
        #[arg(long)]
        html: bool,
    },

    /// Create a post and print the refreshed stream
    Post { message: String },

    /// Print the comments on a post
    Comments { id: String },

    /// Comment on a post
    Comment { id: String, content: String },
}

impl Cli {
    fn config(&self) -> Result<SyncConfig> {
        let _ = dotenvy::dotenv();

        let mut overrides = HashMap::new();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                overrides.insert(key.to_string(), value);
            }
        };
        set("GRUMBLR_BASE_URL", self.base_url.clone());
        set("GRUMBLR_SCOPE", self.scope.clone());
        set("GRUMBLR_COOKIE", self.cookie.clone());
        set(
            "GRUMBLR_POLL_INTERVAL_SECS",
            self.poll_interval.map(|s| s.to_string()),
        );
        set("GRUMBLR_PUSH", self.no_push.then(|| "false".to_string()));
        set("GRUMBLR_RECONNECT", self.reconnect.then(|| "true".to_string()));

        SyncConfig::from_lookup(|key| overrides.get(key).cloned().or_else(|| env::var(key).ok()))
            .context("Invalid Grumblr configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,grumble_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    tracing::debug!(base_url = %config.base_url, scope = %config.scope, "Loaded configuration");

    match cli.command {
        Commands::Watch { html } => watch(&config, html).await,
        Commands::Post { message } => post(&config, message).await,
        Commands::Comments { id } => comments(&config, id).await,
        Commands::Comment { id, content } => comment(&config, id, content).await,
    }
}

fn synchronizer(
    config: &SyncConfig,
    surface: TerminalSurface,
) -> Result<StreamSynchronizer<TerminalSurface>> {
    let client = config.api_client().context("Failed to build API client")?;
    let mut sync = StreamSynchronizer::new(
        surface,
        Arc::new(config.poll_feed()?),
        Arc::new(client),
    )
    .with_options(config.sync_options());

    if let Some(push) = config.push_feed()? {
        sync = sync.with_push(Arc::new(push));
    }
    Ok(sync)
}

async fn watch(config: &SyncConfig, html: bool) -> Result<()> {
    println!(
        "{} {} {}",
        "Watching".bright_green().bold(),
        config.scope.to_string().bold(),
        format!("on {}", config.base_url).dimmed()
    );
    println!("{}", "   Type a line to post it, Ctrl+C to stop".dimmed());

    let surface = if html {
        TerminalSurface::html()
    } else {
        TerminalSurface::new()
    };
    let (handle, task) = synchronizer(config, surface)?.spawn();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let mut draft = Draft::new(line);
                if draft.is_empty() {
                    continue;
                }
                if let Err(e) = handle.submit(&mut draft).await {
                    let label = if e.is_remote() {
                        "Server did not take it:"
                    } else {
                        "Not posted:"
                    };
                    println!("{} {}", label.red().bold(), e);
                    println!("{} {}", "Draft kept:".dimmed(), draft.text());
                }
            }
        }
    }

    handle.shutdown();
    task.await.context("Synchronizer task panicked")?;
    println!("{}", "Stopped".bright_blue());
    Ok(())
}

async fn post(config: &SyncConfig, message: String) -> Result<()> {
    let mut sync = synchronizer(config, TerminalSurface::new())?;
    sync.refresh().await.context("Failed to load stream")?;

    let mut draft = Draft::new(message);
    sync.create_post(&mut draft)
        .await
        .context("Failed to create post")?;
    Ok(())
}

async fn comments(config: &SyncConfig, id: String) -> Result<()> {
    let mut thread = CommentSync::new(config.api_client()?, id.as_str());
    let count = thread
        .refresh(&mut TerminalComments)
        .await
        .with_context(|| format!("Failed to load comments for #{}", id))?;
    if count == 0 {
        println!("{}", "No comments yet.".dimmed());
    }
    Ok(())
}

async fn comment(config: &SyncConfig, id: String, content: String) -> Result<()> {
    let mut thread = CommentSync::new(config.api_client()?, id.as_str());
    let mut surface = TerminalComments;
    thread
        .refresh(&mut surface)
        .await
        .with_context(|| format!("Failed to load comments for #{}", id))?;
    thread
        .post(&mut surface, &content)
        .await
        .with_context(|| format!("Failed to comment on #{}", id))?;
    Ok(())
}
