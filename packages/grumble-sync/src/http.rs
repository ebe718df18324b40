//! Grumblr REST API client.
//!
//! A thin wrapper over `reqwest` that knows the endpoint layout, forwards the
//! session cookies and attaches the CSRF header to mutating requests.

use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::{debug, warn};
use url::Url;

use crate::csrf::{is_safe_method, CsrfToken, CSRF_HEADER};
use crate::error::{Result, SyncError};
use crate::types::{
    CommentBatch, CommentsEnvelope, FeedBatch, MessagesEnvelope, PostId, Scope, Watermark,
};

/// WebSocket path of the live post channel.
pub const STREAM_PATH: &str = "/api/get-messages-stream/";

/// Grumblr API client.
#[derive(Clone)]
pub struct ApiClient {
    http_client: Client,
    base_url: String,
    cookies: Option<String>,
    csrf: Option<CsrfToken>,
}

impl ApiClient {
    /// Create a client for the site at `base_url` (`http` or `https`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| SyncError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(SyncError::Config(format!(
                    "Unsupported base URL scheme '{}'; expected http(s)",
                    other
                )))
            }
        }

        Ok(Self {
            http_client: Client::new(),
            base_url,
            cookies: None,
            csrf: None,
        })
    }

    /// Send these cookies with every request. A `csrftoken` cookie among them
    /// becomes the CSRF token unless one was set explicitly.
    pub fn with_cookies(mut self, cookie_header: impl Into<String>) -> Self {
        let cookie_header = cookie_header.into();
        if self.csrf.is_none() {
            self.csrf = CsrfToken::from_cookie_header(&cookie_header);
        }
        self.cookies = Some(cookie_header).filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_csrf_token(mut self, token: CsrfToken) -> Self {
        self.csrf = Some(token);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cookies(&self) -> Option<&str> {
        self.cookies.as_deref()
    }

    pub fn csrf_token(&self) -> Option<&CsrfToken> {
        self.csrf.as_ref()
    }

    /// `ws://` or `wss://` URL of the live post channel.
    pub fn stream_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SyncError::Config(format!("Invalid base URL: {}", e)))?;
        let ws_scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(ws_scheme)
            .map_err(|_| SyncError::Config("Failed to set WebSocket URL scheme".into()))?;
        url.set_path(&format!(
            "{}{}",
            url.path().trim_end_matches('/'),
            STREAM_PATH
        ));
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.to_string())
    }

    /// Fetch posts in `scope` newer than `watermark`.
    pub async fn get_messages(&self, scope: &Scope, watermark: &Watermark) -> Result<FeedBatch> {
        let path = with_watermark(
            format!("/api/get-messages/{}/", scope.path_segment()),
            watermark,
        );
        let response = self.send(self.request(Method::GET, &path)).await?;
        let envelope: MessagesEnvelope = response.json().await.map_err(|e| {
            warn!(error = %e, scope = %scope, "Malformed messages envelope");
            SyncError::from(e)
        })?;

        debug!(
            scope = %scope,
            count = envelope.messages.len(),
            last_updated = %envelope.last_updated,
            "Fetched messages"
        );
        Ok(envelope.into())
    }

    /// Create a post as the session user.
    pub async fn post_message(&self, message: &str) -> Result<()> {
        let request = self
            .request(Method::POST, "/api/post-message/")
            .form(&[("message", message)]);
        self.send(request).await?;
        Ok(())
    }

    /// Fetch comments on `message_id` newer than `watermark`.
    pub async fn get_comments(
        &self,
        message_id: &PostId,
        watermark: &Watermark,
    ) -> Result<CommentBatch> {
        let path = with_watermark(
            format!(
                "/api/get-comments/{}/",
                urlencoding::encode(message_id.as_str())
            ),
            watermark,
        );
        let response = self.send(self.request(Method::GET, &path)).await?;
        let envelope: CommentsEnvelope = response.json().await?;

        debug!(
            message_id = %message_id,
            count = envelope.comments.len(),
            "Fetched comments"
        );
        Ok(envelope.into())
    }

    /// Comment on `message_id` as the session user.
    pub async fn post_comment(&self, message_id: &PostId, content: &str) -> Result<()> {
        let path = format!(
            "/api/post-comment/{}/",
            urlencoding::encode(message_id.as_str())
        );
        let request = self
            .request(Method::POST, &path)
            .form(&[("content", content)]);
        self.send(request).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let unsafe_method = !is_safe_method(&method);
        let mut request = self
            .http_client
            .request(method, format!("{}{}", self.base_url, path));

        if let Some(cookies) = &self.cookies {
            request = request.header(header::COOKIE, cookies.as_str());
        }

        if unsafe_method {
            if let Some(token) = &self.csrf {
                match HeaderValue::from_str(token.as_str()) {
                    Ok(value) => request = request.header(CSRF_HEADER, value),
                    Err(e) => warn!(error = %e, "CSRF token is not a valid header value"),
                }
            }
            // Django checks the referer on HTTPS posts.
            request = request.header(header::REFERER, format!("{}/", self.base_url));
        }

        request
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "Grumblr request failed");
            SyncError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Grumblr API error");
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

fn with_watermark(mut path: String, watermark: &Watermark) -> String {
    if !watermark.is_unset() {
        path.push_str(&urlencoding::encode(watermark.as_str()));
        path.push('/');
    }
    path
}
