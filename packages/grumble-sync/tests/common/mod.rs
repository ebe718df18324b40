// Common test utilities: an in-process fake of the Grumblr API.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;
use tokio::sync::broadcast;

/// Frame that makes every open push socket close itself.
const CLOSE_SIGNAL: &str = "__close__";

/// Author the fake assigns to posts created through the API.
pub const SESSION_USER: &str = "tester";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub csrf: Option<String>,
    pub referer: Option<String>,
    pub cookie: Option<String>,
    pub form: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct StoredPost {
    id: i64,
    author: String,
    html: String,
    updated: String,
}

#[derive(Debug, Clone)]
struct StoredComment {
    html: String,
    updated: String,
}

#[derive(Default)]
struct ServerState {
    clock: u32,
    next_id: i64,
    posts: Vec<StoredPost>,
    comments: HashMap<i64, Vec<StoredComment>>,
    requests: Vec<RecordedRequest>,
    overrides: Vec<(StatusCode, String)>,
}

impl ServerState {
    fn tick(&mut self) -> String {
        self.clock += 1;
        format!(
            "2017-10-19T21:{:02}:{:02}+00:00",
            self.clock / 60,
            self.clock % 60
        )
    }
}

/// Handle to a running fake server. Clones share state.
#[derive(Clone)]
pub struct FakeGrumblr {
    state: Arc<Mutex<ServerState>>,
    push_tx: broadcast::Sender<String>,
    pub addr: SocketAddr,
}

impl FakeGrumblr {
    /// Bind to an ephemeral port and start serving.
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (push_tx, _) = broadcast::channel(64);
        let server = Self {
            state: Arc::new(Mutex::new(ServerState::default())),
            push_tx,
            addr: listener.local_addr().unwrap(),
        };

        let app = Router::new()
            .route("/api/get-messages/*rest", get(get_messages))
            .route("/api/post-message/", post(post_message))
            .route("/api/get-comments/*rest", get(get_comments))
            .route("/api/post-comment/:id/", post(post_comment))
            .route("/api/get-messages-stream/", get(stream))
            .with_state(server.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        server
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    /// Store a post without broadcasting it.
    pub fn add_post(&self, author: &str, html: &str) -> i64 {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        let updated = state.tick();
        state.posts.push(StoredPost {
            id,
            author: author.to_string(),
            html: html.to_string(),
            updated,
        });
        id
    }

    pub fn add_comment(&self, message_id: i64, html: &str) {
        let mut state = self.lock();
        let updated = state.tick();
        state
            .comments
            .entry(message_id)
            .or_default()
            .push(StoredComment {
                html: html.to_string(),
                updated,
            });
    }

    /// Broadcast a raw frame to every push socket.
    pub fn push_raw(&self, frame: &str) {
        let _ = self.push_tx.send(frame.to_string());
    }

    pub fn push_post(&self, id: i64, author: &str, html: &str) {
        self.push_raw(&json!({ "id": id, "author": author, "html": html }).to_string());
    }

    /// Close every open push socket.
    pub fn close_push(&self) {
        self.push_raw(CLOSE_SIGNAL);
    }

    /// Answer the next API request with this status and body.
    pub fn respond_next(&self, status: u16, body: &str) {
        self.lock()
            .overrides
            .push((StatusCode::from_u16(status).unwrap(), body.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with(prefix))
            .collect()
    }

    fn record(
        &self,
        method: &str,
        uri: &Uri,
        headers: &HeaderMap,
        form: HashMap<String, String>,
    ) -> Option<Response> {
        let header_value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            csrf: header_value("x-csrftoken"),
            referer: header_value(header::REFERER.as_str()),
            cookie: header_value(header::COOKIE.as_str()),
            form,
        });
        if state.overrides.is_empty() {
            None
        } else {
            let (status, body) = state.overrides.remove(0);
            Some((status, body).into_response())
        }
    }
}

fn split_rest(rest: &str) -> Vec<String> {
    rest.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn get_messages(
    State(server): State<FakeGrumblr>,
    Path(rest): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Some(response) = server.record("GET", &uri, &headers, HashMap::new()) {
        return response;
    }

    let segments = split_rest(&rest);
    let (author, watermark) = match segments.first().map(String::as_str) {
        Some("profile") => (segments.get(1).cloned(), segments.get(2).cloned()),
        Some(_) => (None, segments.get(1).cloned()),
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    let state = server.lock();
    let messages: Vec<_> = state
        .posts
        .iter()
        .filter(|p| author.as_ref().map_or(true, |a| &p.author == a))
        .filter(|p| watermark.as_ref().map_or(true, |w| p.updated.as_str() > w.as_str()))
        .map(|p| json!({ "id": p.id, "author": p.author, "html": p.html }))
        .collect();
    let last_updated = state
        .posts
        .iter()
        .map(|p| p.updated.clone())
        .max()
        .unwrap_or_default();

    Json(json!({ "messages": messages, "last_updated": last_updated })).into_response()
}

async fn post_message(
    State(server): State<FakeGrumblr>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let message = form.get("message").cloned().unwrap_or_default();
    if let Some(response) = server.record("POST", &uri, &headers, form) {
        return response;
    }
    if message.is_empty() || message.chars().count() > 42 {
        return (StatusCode::BAD_REQUEST, "Invalid message data.").into_response();
    }

    let html = format!("<p>{}</p>", message);
    let id = server.add_post(SESSION_USER, &html);
    server.push_post(id, SESSION_USER, &html);
    StatusCode::OK.into_response()
}

async fn get_comments(
    State(server): State<FakeGrumblr>,
    Path(rest): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Some(response) = server.record("GET", &uri, &headers, HashMap::new()) {
        return response;
    }

    let segments = split_rest(&rest);
    let Some(id) = segments.first().and_then(|s| s.parse::<i64>().ok()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let watermark = segments.get(1).cloned();

    let state = server.lock();
    let all = state.comments.get(&id).cloned().unwrap_or_default();
    let comments: Vec<_> = all
        .iter()
        .filter(|c| watermark.as_ref().map_or(true, |w| c.updated.as_str() > w.as_str()))
        .map(|c| c.html.clone())
        .collect();
    let last_updated = all.iter().map(|c| c.updated.clone()).max().unwrap_or_default();

    Json(json!({ "comments": comments, "last_updated": last_updated })).into_response()
}

async fn post_comment(
    State(server): State<FakeGrumblr>,
    Path(id): Path<i64>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let content = form.get("content").cloned().unwrap_or_default();
    if let Some(response) = server.record("POST", &uri, &headers, form) {
        return response;
    }
    server.add_comment(id, &format!("<p>{}</p>", content));
    StatusCode::OK.into_response()
}

async fn stream(
    State(server): State<FakeGrumblr>,
    uri: Uri,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    server.lock().requests.push(RecordedRequest {
        method: "GET".into(),
        path: uri.path().to_string(),
        csrf: None,
        referer: None,
        cookie: headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        form: HashMap::new(),
    });
    // Subscribe before the handshake completes so no broadcast is missed.
    let rx = server.push_tx.subscribe();
    ws.on_upgrade(move |socket| forward_push(socket, rx))
}

async fn forward_push(mut socket: WebSocket, mut rx: broadcast::Receiver<String>) {
    while let Ok(frame) = rx.recv().await {
        if frame == CLOSE_SIGNAL {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        if socket.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }
}
