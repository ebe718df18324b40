//! The stream synchronizer: one task that owns a view and feeds it from the
//! poll timer, the push channel and UI commands.
//!
//! # Architecture
//!
//! ```text
//! SyncHandle ── Submit/Refresh ──┐
//!                                │
//! interval tick ── refresh() ────┼──► run() loop ──► StreamView ──► DisplaySurface
//!                                │     (single writer)
//! PushSubscription ── next() ────┘
//! ```
//!
//! Every merge happens inside the `run` loop, so the view never sees
//! concurrent writers. Results may still arrive out of causal order (a push
//! for a post newer than the last poll); merges are idempotent per id, which
//! makes that harmless.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compose::{Draft, Publisher};
use crate::display::DisplaySurface;
use crate::error::{Result, SyncError};
use crate::feed::{PollFeed, PushEvent, PushFeed, PushSubscription};
use crate::types::Scope;
use crate::view::{MergeOutcome, StreamView};

/// A push handshake in flight.
type Connecting = BoxFuture<'static, Result<PushSubscription>>;

/// Used to send replies back to a [`SyncHandle`].
pub type Responder<T> = oneshot::Sender<T>;

/// Default time between scheduled polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Capacity of the command channel behind a [`SyncHandle`].
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// How the synchronizer re-opens a dropped push channel.
///
/// Disabled by default: a disconnect is logged and the view keeps up through
/// polling alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: None,
        }
    }

    /// Doubling delays starting at one second, capped at `max_delay`.
    pub fn exponential(max_delay: Duration) -> Self {
        Self {
            enabled: true,
            max_delay,
            ..Self::disabled()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Delay before reconnect attempt `attempt` (0-based), or `None` when no
    /// further attempt should be made.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Runtime knobs for a synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect: ReconnectPolicy::disabled(),
        }
    }
}

/// Requests handled by the `run` loop.
#[derive(Debug)]
pub enum SyncCommand {
    /// Create a post, then refresh.
    Submit {
        message: String,
        resp: Responder<Result<()>>,
    },
    /// Poll now instead of waiting for the timer.
    Refresh { resp: Responder<Result<MergeOutcome>> },
}

/// What happened to one push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Merged(MergeOutcome),
    /// The event belongs to another user's profile.
    Filtered,
    Disconnected(String),
}

/// Keeps one [`StreamView`] in step with the server.
pub struct StreamSynchronizer<S: DisplaySurface> {
    view: StreamView,
    surface: S,
    poll: Arc<dyn PollFeed>,
    push: Option<Arc<dyn PushFeed>>,
    publisher: Arc<dyn Publisher>,
    options: SyncOptions,
}

impl<S: DisplaySurface> StreamSynchronizer<S> {
    pub fn new(surface: S, poll: Arc<dyn PollFeed>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            view: StreamView::new(),
            surface,
            poll,
            push: None,
            publisher,
            options: SyncOptions::default(),
        }
    }

    /// Also keep the view live from a push channel.
    ///
    /// Ignored for scopes that cannot be filtered client-side.
    pub fn with_push(mut self, push: Arc<dyn PushFeed>) -> Self {
        if self.scope().supports_push() {
            self.push = Some(push);
        } else {
            info!(scope = %self.scope(), "Push channel not used for this scope; polling only");
        }
        self
    }

    /// A zero poll interval falls back to [`DEFAULT_POLL_INTERVAL`].
    pub fn with_options(mut self, mut options: SyncOptions) -> Self {
        if options.poll_interval.is_zero() {
            warn!("Poll interval must be positive, using the default");
            options.poll_interval = DEFAULT_POLL_INTERVAL;
        }
        self.options = options;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn scope(&self) -> &Scope {
        self.poll.scope()
    }

    pub fn view(&self) -> &StreamView {
        &self.view
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn has_push(&self) -> bool {
        self.push.is_some()
    }

    /// Poll once and merge the result.
    pub async fn refresh(&mut self) -> Result<MergeOutcome> {
        let poll = Arc::clone(&self.poll);
        let batch = poll.fetch(self.view.watermark()).await?;
        let outcome = self.view.merge_batch(&mut self.surface, batch);

        debug!(
            scope = %self.scope(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            watermark = %self.view.watermark(),
            "Stream refreshed"
        );
        Ok(outcome)
    }

    /// Publish the draft, then refresh and clear it.
    ///
    /// On any failure the draft and the view are left exactly as they were.
    pub async fn create_post(&mut self, draft: &mut Draft) -> Result<()> {
        let message = draft.validate()?.to_string();

        self.publisher.publish(&message).await.map_err(|e| {
            warn!(error = %e, "Creating post failed");
            e
        })?;
        info!(scope = %self.scope(), "Post created");

        self.surface.total_changed(1);
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Refresh after post failed, next tick will retry");
        }
        draft.clear();
        Ok(())
    }

    /// Merge one push event, applying the scope filter.
    pub fn apply_push(&mut self, event: PushEvent) -> PushOutcome {
        match event {
            PushEvent::Post(event) => {
                if !self.scope().admits(&event) {
                    debug!(id = %event.id, author = %event.author, "Dropping push event outside profile");
                    return PushOutcome::Filtered;
                }
                PushOutcome::Merged(self.view.merge_event(&mut self.surface, event))
            }
            PushEvent::Disconnected(reason) => {
                warn!(reason = %reason, scope = %self.scope(), "Push channel lost");
                PushOutcome::Disconnected(reason)
            }
        }
    }

    /// Start a push handshake without borrowing `self`, so the run loop can
    /// keep polling while it is pending.
    fn connect_push(&self) -> Option<Connecting> {
        let push = Arc::clone(self.push.as_ref()?);
        let scope = self.scope().clone();
        Some(Box::pin(async move { push.subscribe(&scope).await }))
    }

    async fn refresh_logged(&mut self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, scope = %self.scope(), "Stream poll failed, retrying on next tick");
        }
    }

    async fn handle_command(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::Submit { message, resp } => {
                let mut draft = Draft::new(message);
                let result = self.create_post(&mut draft).await;
                let _ = resp.send(result);
            }
            SyncCommand::Refresh { resp } => {
                let result = self.refresh().await;
                let _ = resp.send(result);
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self) -> (SyncHandle, JoinHandle<Self>)
    where
        S: 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let handle = SyncHandle {
            commands: commands_tx,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(self.run(commands_rx, shutdown));
        (handle, task)
    }

    /// Drive the view until `shutdown` fires or every command sender is gone.
    ///
    /// Polls immediately on start and then every `poll_interval`. Returns the
    /// synchronizer so its final state can be inspected.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SyncCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        info!(
            scope = %self.scope(),
            poll_interval_ms = self.options.poll_interval.as_millis() as u64,
            push = self.push.is_some(),
            "Stream synchronizer started"
        );

        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let policy = self.options.reconnect;
        let mut reconnect_attempt: u32 = 0;
        let mut reconnect_at: Option<Instant> = None;
        let mut resubscribing = false;

        let mut subscription: Option<PushSubscription> = None;
        let mut connecting = self.connect_push();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                Some(event) = next_push(&mut subscription) => {
                    if let PushOutcome::Disconnected(_) = self.apply_push(event) {
                        subscription = None;
                        reconnect_attempt = 0;
                        reconnect_at = next_attempt(&policy, &mut reconnect_attempt);
                        if reconnect_at.is_none() {
                            info!("Push reconnect disabled, continuing with polling only");
                        }
                    }
                }

                result = wait_connected(&mut connecting) => {
                    connecting = None;
                    match result {
                        Ok(connected) => {
                            subscription = Some(connected);
                            reconnect_attempt = 0;
                            if resubscribing {
                                resubscribing = false;
                                info!("Push channel re-established");
                                // Catch up on anything missed while disconnected.
                                self.refresh_logged().await;
                            }
                        }
                        Err(e) => {
                            reconnect_at = next_attempt(&policy, &mut reconnect_attempt);
                            match reconnect_at {
                                Some(_) => warn!(error = %e, attempt = reconnect_attempt, "Push channel unavailable, will retry"),
                                None => warn!(error = %e, "Push channel unavailable, polling only"),
                            }
                        }
                    }
                }

                _ = ticker.tick() => self.refresh_logged().await,

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All sync handles dropped");
                        break;
                    }
                },

                _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    reconnect_at = None;
                    resubscribing = true;
                    connecting = self.connect_push();
                }
            }
        }

        if let Some(mut subscription) = subscription.take() {
            subscription.close();
        }
        info!(scope = %self.scope(), posts = self.view.len(), "Stream synchronizer stopped");
        self
    }
}

async fn wait_connected(connecting: &mut Option<Connecting>) -> Result<PushSubscription> {
    match connecting {
        Some(handshake) => handshake.await,
        None => std::future::pending().await,
    }
}

/// Schedule the next reconnect attempt, if the policy allows one.
fn next_attempt(policy: &ReconnectPolicy, attempt: &mut u32) -> Option<Instant> {
    let delay = policy.delay_for(*attempt)?;
    *attempt += 1;
    Some(Instant::now() + delay)
}

async fn next_push(subscription: &mut Option<PushSubscription>) -> Option<PushEvent> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running synchronizer.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<SyncCommand>,
    shutdown: CancellationToken,
}

impl SyncHandle {
    /// Submit the draft. Cleared on success, untouched on failure.
    pub async fn submit(&self, draft: &mut Draft) -> Result<()> {
        draft.validate()?;
        let (resp, rx) = oneshot::channel();
        self.commands
            .send(SyncCommand::Submit {
                message: draft.text().to_string(),
                resp,
            })
            .await
            .map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)??;
        draft.clear();
        Ok(())
    }

    /// Poll now and wait for the merge.
    pub async fn refresh(&self) -> Result<MergeOutcome> {
        let (resp, rx) = oneshot::channel();
        self.commands
            .send(SyncCommand::Refresh { resp })
            .await
            .map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)?
    }

    /// Stop the loop: cancels the timer and closes the push channel.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPollFeed, MockPublisher, MockPushFeed, RecordingSurface, SurfaceOp};
    use crate::types::{FeedBatch, Post, PostEvent, PostId, Watermark};

    fn batch(ids: &[i64], watermark: &str) -> FeedBatch {
        FeedBatch::new(
            ids.iter().map(|id| Post::new(*id, format!("<p>{}</p>", id))).collect(),
            Watermark::new(watermark),
        )
    }

    fn synchronizer(
        poll: &MockPollFeed,
        publisher: &MockPublisher,
        surface: &RecordingSurface,
    ) -> StreamSynchronizer<RecordingSurface> {
        StreamSynchronizer::new(
            surface.clone(),
            Arc::new(poll.clone()),
            Arc::new(publisher.clone()),
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::exponential(Duration::from_secs(5));
        assert_eq!(policy.delay_for(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_for(40), Some(Duration::from_secs(5)));

        let limited = policy.with_max_attempts(2);
        assert_eq!(limited.delay_for(2), None);
        assert_eq!(ReconnectPolicy::disabled().delay_for(0), None);
    }

    #[tokio::test]
    async fn test_refresh_passes_current_watermark() {
        let poll = MockPollFeed::new(Scope::Global)
            .with_batch(batch(&[1, 2], "t1"))
            .with_batch(batch(&[3], "t2"));
        let surface = RecordingSurface::new();
        let mut sync = synchronizer(&poll, &MockPublisher::new(), &surface);

        sync.refresh().await.unwrap();
        sync.refresh().await.unwrap();

        assert_eq!(poll.requests(), vec![Watermark::unset(), Watermark::new("t1")]);
        assert_eq!(surface.ids(), vec!["3", "2", "1"]);
        assert_eq!(sync.view().watermark().as_str(), "t2");
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_view_untouched() {
        let poll = MockPollFeed::new(Scope::Global)
            .with_batch(batch(&[1], "t1"))
            .with_error(SyncError::Server {
                status: 500,
                body: "boom".into(),
            });
        let surface = RecordingSurface::new();
        let mut sync = synchronizer(&poll, &MockPublisher::new(), &surface);

        sync.refresh().await.unwrap();
        let ops_before = surface.ops();
        let result = sync.refresh().await;

        assert!(matches!(result, Err(SyncError::Server { status: 500, .. })));
        assert_eq!(surface.ops(), ops_before);
        assert_eq!(sync.view().watermark().as_str(), "t1");
    }

    #[tokio::test]
    async fn test_create_post_refreshes_and_clears_draft() {
        let poll = MockPollFeed::new(Scope::Global).with_batch(batch(&[10], "t1"));
        let publisher = MockPublisher::new();
        let surface = RecordingSurface::new();
        let mut sync = synchronizer(&poll, &publisher, &surface);

        let mut draft = Draft::new("hello world");
        sync.create_post(&mut draft).await.unwrap();

        assert_eq!(publisher.published(), vec!["hello world"]);
        assert_eq!(poll.requests().len(), 1);
        assert_eq!(surface.ids(), vec!["10"]);
        assert_eq!(surface.total(), 1);
        assert!(draft.is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_preserves_draft_and_view() {
        let poll = MockPollFeed::new(Scope::Global);
        let publisher = MockPublisher::new();
        publisher.fail_next(SyncError::Network("connection refused".into()));
        let surface = RecordingSurface::new();
        let mut sync = synchronizer(&poll, &publisher, &surface);

        let mut draft = Draft::new("keep me");
        let result = sync.create_post(&mut draft).await;

        assert!(matches!(result, Err(SyncError::Network(_))));
        assert_eq!(draft.text(), "keep me");
        assert!(poll.requests().is_empty());
        assert!(surface.ops().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_draft_never_reaches_publisher() {
        let poll = MockPollFeed::new(Scope::Global);
        let publisher = MockPublisher::new();
        let surface = RecordingSurface::new();
        let mut sync = synchronizer(&poll, &publisher, &surface);

        let mut draft = Draft::new("");
        assert!(matches!(
            sync.create_post(&mut draft).await,
            Err(SyncError::Validation(_))
        ));
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_profile_scope_filters_other_authors() {
        let poll = MockPollFeed::new(Scope::profile("sam"));
        let surface = RecordingSurface::new();
        let mut sync = synchronizer(&poll, &MockPublisher::new(), &surface);

        let outcome = sync.apply_push(PushEvent::Post(PostEvent::new(1, "ann", "<p/>")));
        assert_eq!(outcome, PushOutcome::Filtered);
        assert!(sync.view().is_empty());
        assert!(surface.ops().is_empty());

        let outcome = sync.apply_push(PushEvent::Post(PostEvent::new(2, "sam", "<p/>")));
        assert_eq!(
            outcome,
            PushOutcome::Merged(MergeOutcome {
                inserted: 1,
                updated: 0
            })
        );
    }

    #[tokio::test]
    async fn test_push_edit_updates_existing_post() {
        let poll = MockPollFeed::new(Scope::Global).with_batch(batch(&[5], "t1"));
        let surface = RecordingSurface::new();
        let mut sync = synchronizer(&poll, &MockPublisher::new(), &surface);
        sync.refresh().await.unwrap();

        sync.apply_push(PushEvent::Post(PostEvent::new(5, "sam", "edited")));

        assert_eq!(sync.view().len(), 1);
        assert_eq!(surface.content(&PostId::from(5)).as_deref(), Some("edited"));
        assert_eq!(surface.count_ops(|op| matches!(op, SurfaceOp::Prepend(_))), 1);
    }

    #[test]
    fn test_following_scope_ignores_push() {
        let poll = MockPollFeed::new(Scope::Following);
        let sync = synchronizer(&poll, &MockPublisher::new(), &RecordingSurface::new())
            .with_push(Arc::new(MockPushFeed::new()));
        assert!(!sync.has_push());
    }

    #[tokio::test]
    async fn test_run_loop_merges_push_and_poll() {
        let poll = MockPollFeed::new(Scope::Global).with_batch(batch(&[1], "t1"));
        let push = MockPushFeed::new();
        let push_tx = push.channel();
        push_tx
            .send(PushEvent::Post(PostEvent::new(2, "sam", "<p>2</p>")))
            .await
            .unwrap();

        let surface = RecordingSurface::new();
        let sync = synchronizer(&poll, &MockPublisher::new(), &surface)
            .with_push(Arc::new(push.clone()));
        let (handle, task) = sync.spawn();

        handle.refresh().await.unwrap();
        handle.shutdown();
        let sync = task.await.unwrap();

        assert_eq!(push.subscriptions(), 1);
        assert_eq!(sync.view().len(), 2);
        assert!(sync.view().contains(&PostId::from(1)));
        assert!(sync.view().contains(&PostId::from(2)));
        assert_eq!(sync.view().watermark().as_str(), "t1");
    }

    /// Send but not Sync, like a surface holding a `Cell`.
    #[derive(Default)]
    struct CountingSurface {
        prepends: std::cell::Cell<usize>,
    }

    impl DisplaySurface for CountingSurface {
        fn prepend(&mut self, _post: &Post) {
            self.prepends.set(self.prepends.get() + 1);
        }
        fn replace_content(&mut self, _id: &PostId, _rendered_content: &str) {}
        fn show_placeholder(&mut self) {}
        fn clear_placeholder(&mut self) {}
    }

    #[tokio::test]
    async fn test_spawns_with_unsync_surface() {
        let poll = MockPollFeed::new(Scope::Global).with_batch(batch(&[1, 2], "t1"));
        let push = MockPushFeed::new();
        let _tx = push.channel();
        let sync = StreamSynchronizer::new(
            CountingSurface::default(),
            Arc::new(poll),
            Arc::new(MockPublisher::new()),
        )
        .with_push(Arc::new(push));

        let (handle, task) = sync.spawn();
        handle.refresh().await.unwrap();
        handle.shutdown();
        let sync = task.await.unwrap();

        assert_eq!(sync.surface().prepends.get(), 2);
    }

    #[tokio::test]
    async fn test_slow_push_handshake_does_not_delay_polling() {
        let poll = MockPollFeed::new(Scope::Global).with_batch(batch(&[1], "t1"));
        let push = MockPushFeed::new().with_connect_delay(Duration::from_secs(30));
        let _tx = push.channel();
        let surface = RecordingSurface::new();
        let (handle, task) = synchronizer(&poll, &MockPublisher::new(), &surface)
            .with_push(Arc::new(push.clone()))
            .spawn();

        let refreshed = tokio::time::timeout(Duration::from_secs(2), handle.refresh()).await;
        assert!(refreshed.is_ok());
        assert!(!poll.requests().is_empty());
        assert_eq!(surface.ids(), vec!["1"]);

        let mut draft = Draft::new("while connecting");
        let submitted = tokio::time::timeout(Duration::from_secs(2), handle.submit(&mut draft)).await;
        assert!(matches!(submitted, Ok(Ok(()))));

        handle.shutdown();
        task.await.unwrap();
        assert_eq!(push.subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_zero_poll_interval_uses_default() {
        let poll = MockPollFeed::new(Scope::Global);
        let surface = RecordingSurface::new();
        let sync = synchronizer(&poll, &MockPublisher::new(), &surface).with_options(SyncOptions {
            poll_interval: Duration::ZERO,
            reconnect: ReconnectPolicy::disabled(),
        });
        assert_eq!(sync.options().poll_interval, DEFAULT_POLL_INTERVAL);

        let (handle, task) = sync.spawn();
        handle.refresh().await.unwrap();
        handle.shutdown();
        assert!(task.await.is_ok());
    }

    #[tokio::test]
    async fn test_handle_submit_clears_draft() {
        let poll = MockPollFeed::new(Scope::Global);
        let publisher = MockPublisher::new();
        let surface = RecordingSurface::new();
        let (handle, task) = synchronizer(&poll, &publisher, &surface).spawn();

        let mut draft = Draft::new("from the handle");
        handle.submit(&mut draft).await.unwrap();
        assert!(draft.is_empty());

        publisher.fail_next(SyncError::Server {
            status: 400,
            body: "Invalid message data.".into(),
        });
        let mut draft = Draft::new("rejected");
        assert!(handle.submit(&mut draft).await.is_err());
        assert_eq!(draft.text(), "rejected");

        drop(handle);
        task.await.unwrap();
        assert_eq!(publisher.published(), vec!["from the handle"]);
    }

    #[tokio::test]
    async fn test_disconnect_without_reconnect_keeps_polling() {
        let poll = MockPollFeed::new(Scope::Global);
        let push = MockPushFeed::new();
        drop(push.channel());
        let _spare = push.channel();

        let surface = RecordingSurface::new();
        let (handle, task) = synchronizer(&poll, &MockPublisher::new(), &surface)
            .with_push(Arc::new(push.clone()))
            .spawn();

        handle.refresh().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.refresh().await.unwrap();
        handle.shutdown();
        task.await.unwrap();

        assert_eq!(push.subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_resubscribes_and_catches_up() {
        let poll = MockPollFeed::new(Scope::Global);
        let push = MockPushFeed::new();
        drop(push.channel());
        let second = push.channel();

        let surface = RecordingSurface::new();
        let options = SyncOptions {
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect: ReconnectPolicy::exponential(Duration::from_millis(50))
                .with_initial_delay(Duration::from_millis(1)),
        };
        let (handle, task) = synchronizer(&poll, &MockPublisher::new(), &surface)
            .with_push(Arc::new(push.clone()))
            .with_options(options)
            .spawn();

        for _ in 0..200 {
            if push.subscriptions() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(push.subscriptions(), 2);

        second
            .send(PushEvent::Post(PostEvent::new(4, "sam", "<p>4</p>")))
            .await
            .unwrap();
        handle.refresh().await.unwrap();
        handle.shutdown();
        let sync = task.await.unwrap();

        assert!(sync.view().contains(&PostId::from(4)));
        // initial tick, catch-up after reconnect, explicit refresh
        assert!(poll.requests().len() >= 3);
    }
}
