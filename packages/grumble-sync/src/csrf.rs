//! CSRF token handling for mutating API calls.
//!
//! The server issues a `csrftoken` cookie and expects it echoed back in an
//! `X-CSRFToken` header on every request that is not a safe method.

use reqwest::Method;

/// Header the server reads the token from.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Cookie the server stores the token in.
pub const CSRF_COOKIE: &str = "csrftoken";

/// A CSRF token taken from the session cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Extract the token from a `Cookie` header value such as
    /// `"sessionid=abc; csrftoken=xyz"`. Returns `None` when absent or empty.
    pub fn from_cookie_header(cookies: &str) -> Option<Self> {
        cookies
            .split(';')
            .map(str::trim)
            .find_map(|pair| pair.strip_prefix(CSRF_COOKIE)?.strip_prefix('='))
            .map(|raw| {
                urlencoding::decode(raw)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| raw.to_string())
            })
            .filter(|token| !token.is_empty())
            .map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Methods that never need the token.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}
