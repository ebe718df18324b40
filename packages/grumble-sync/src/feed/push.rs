//! Live post channel over WebSocket.
//!
//! The server broadcasts every saved post as a JSON text frame
//! `{"id", "author", "html"}`. There is no acknowledgement and no
//! back-pressure; a background task owns the socket and forwards decoded
//! events through a bounded channel.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, COOKIE};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::http::ApiClient;
use crate::types::{PostEvent, Scope};

type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the channel between the reader task and the subscriber.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One item delivered by a push subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A post was created or edited.
    Post(PostEvent),
    /// The channel is gone. Always the last item of a subscription.
    Disconnected(String),
}

/// Opens live subscriptions.
#[async_trait]
pub trait PushFeed: Send + Sync {
    async fn subscribe(&self, scope: &Scope) -> Result<PushSubscription>;
}

/// A live stream of [`PushEvent`]s.
///
/// Ends with exactly one `Disconnected`, after which `next` returns `None`.
/// Dropping the subscription closes the underlying connection.
pub struct PushSubscription {
    event_rx: mpsc::Receiver<PushEvent>,
    close_tx: Option<oneshot::Sender<()>>,
    finished: bool,
}

impl PushSubscription {
    /// Wrap a receiver fed by some other producer.
    pub fn from_receiver(event_rx: mpsc::Receiver<PushEvent>) -> Self {
        Self {
            event_rx,
            close_tx: None,
            finished: false,
        }
    }

    fn with_close(event_rx: mpsc::Receiver<PushEvent>, close_tx: oneshot::Sender<()>) -> Self {
        Self {
            event_rx,
            close_tx: Some(close_tx),
            finished: false,
        }
    }

    /// Wait for the next event.
    pub async fn next(&mut self) -> Option<PushEvent> {
        if self.finished {
            return None;
        }
        match self.event_rx.recv().await {
            Some(PushEvent::Disconnected(reason)) => {
                self.finished = true;
                Some(PushEvent::Disconnected(reason))
            }
            Some(event) => Some(event),
            None => {
                self.finished = true;
                Some(PushEvent::Disconnected("push channel closed".into()))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Ask the producer to stop. Pending events are discarded.
    pub fn close(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
        self.finished = true;
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// [`PushFeed`] over the site's WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsPushFeed {
    url: String,
    cookies: Option<String>,
}

impl WsPushFeed {
    /// Connect to an explicit `ws://` or `wss://` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cookies: None,
        }
    }

    /// Derive the channel URL and session cookies from an API client.
    pub fn from_client(client: &ApiClient) -> Result<Self> {
        let mut feed = Self::new(client.stream_url()?);
        feed.cookies = client.cookies().map(str::to_string);
        Ok(feed)
    }

    pub fn with_cookies(mut self, cookie_header: impl Into<String>) -> Self {
        self.cookies = Some(cookie_header.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushFeed for WsPushFeed {
    async fn subscribe(&self, scope: &Scope) -> Result<PushSubscription> {
        if !scope.supports_push() {
            return Err(SyncError::Config(format!(
                "scope '{}' cannot be kept live from the push channel",
                scope
            )));
        }

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SyncError::Config(format!("Invalid push URL '{}': {}", self.url, e)))?;
        if let Some(cookies) = &self.cookies {
            let value = HeaderValue::from_str(cookies)
                .map_err(|e| SyncError::Config(format!("Invalid cookie header: {}", e)))?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (ws_stream, _response) = connect_async(request).await.map_err(|e| {
            warn!(error = %e, url = %self.url, "Push channel connection failed");
            SyncError::Network(e.to_string())
        })?;
        info!(url = %self.url, scope = %scope, "Push channel connected");

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();
        tokio::spawn(ws_reader_loop(ws_stream, event_tx, close_rx));

        Ok(PushSubscription::with_close(event_rx, close_tx))
    }
}

/// Decode one text frame into a post event.
pub fn parse_event(text: &str) -> Result<PostEvent> {
    Ok(serde_json::from_str(text)?)
}

/// Forward a decoded frame. Returns `true` when the subscriber is gone.
async fn forward(text: &str, event_tx: &mpsc::Sender<PushEvent>) -> bool {
    match parse_event(text) {
        Ok(event) => event_tx.send(PushEvent::Post(event)).await.is_err(),
        Err(e) => {
            warn!(error = %e, "Skipping undecodable push frame");
            false
        }
    }
}

/// Background task that owns the socket until it closes or the subscriber
/// asks it to stop.
async fn ws_reader_loop(
    mut ws_stream: WebSocketStream,
    event_tx: mpsc::Sender<PushEvent>,
    mut close_rx: oneshot::Receiver<()>,
) {
    loop {
        let frame = tokio::select! {
            biased;

            _ = &mut close_rx => {
                let _ = ws_stream.close(None).await;
                debug!("Push channel closed by subscriber");
                return;
            }

            msg = ws_stream.next() => msg,
        };

        let reason = match frame {
            Some(Ok(Message::Text(text))) => {
                if forward(&text, &event_tx).await {
                    return;
                }
                continue;
            }
            Some(Ok(Message::Binary(data))) => {
                match std::str::from_utf8(&data) {
                    Ok(text) => {
                        if forward(text, &event_tx).await {
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "Skipping non UTF-8 push frame"),
                }
                continue;
            }
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws_stream.send(Message::Pong(payload)).await;
                continue;
            }
            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
            Some(Ok(Message::Close(frame))) => match frame {
                Some(f) => format!("server closed connection: {} ({})", f.reason, u16::from(f.code)),
                None => "server closed connection".to_string(),
            },
            Some(Err(e)) => format!("WebSocket error: {}", e),
            None => "WebSocket stream ended".to_string(),
        };

        warn!(reason = %reason, "Push channel disconnected");
        let _ = event_tx.send(PushEvent::Disconnected(reason)).await;
        return;
    }
}
