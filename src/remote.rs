//! Failures of remote embedding and completion calls.
//!
//! Every HTTP-backed call in the crate maps its failure onto [`RemoteError`]
//! so callers can tell a bad credential from a transient service problem.

use reqwest::StatusCode;

/// Failure of a remote API call.
#[derive(Debug)]
pub enum RemoteError {
    /// Missing, invalid, or revoked credential (HTTP 401/403).
    Unauthorized(String),
    /// Quota or rate limit hit (HTTP 429).
    RateLimited(String),
    /// Any other non-success status.
    Service { status: u16, body: String },
    /// Connection, timeout, or body read failure.
    Network(String),
}

impl RemoteError {
    /// Classify a non-success HTTP response.
    pub fn from_status(service: &str, status: StatusCode, body: String) -> Self {
        let detail = format!("{} returned {}: {}", service, status, body.trim());
        match status.as_u16() {
            401 | 403 => RemoteError::Unauthorized(detail),
            429 => RemoteError::RateLimited(detail),
            code => RemoteError::Service {
                status: code,
                body: detail,
            },
        }
    }

    /// Missing credential, detected before any request is sent.
    pub fn missing_key(service: &str) -> Self {
        RemoteError::Unauthorized(format!(
            "{} requires an API key (pass --api-key or set OPENAI_API_KEY)",
            service
        ))
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::RateLimited(_) | RemoteError::Network(_) => true,
            RemoteError::Service { status, .. } => *status >= 500,
            RemoteError::Unauthorized(_) => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_))
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Unauthorized(d) => write!(f, "authentication failed: {}", d),
            RemoteError::RateLimited(d) => write!(f, "rate limited: {}", d),
            RemoteError::Service { body, .. } => write!(f, "remote service error: {}", body),
            RemoteError::Network(d) => write!(f, "network error: {}", d),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let e = RemoteError::from_status("OpenAI", StatusCode::UNAUTHORIZED, "bad key".into());
        assert!(e.is_unauthorized());
        assert!(!e.is_transient());

        let e = RemoteError::from_status("OpenAI", StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(e, RemoteError::RateLimited(_)));
        assert!(e.is_transient());

        let e = RemoteError::from_status("OpenAI", StatusCode::BAD_GATEWAY, String::new());
        assert!(e.is_transient());

        let e = RemoteError::from_status("OpenAI", StatusCode::BAD_REQUEST, "too long".into());
        assert!(!e.is_transient());
        assert!(e.to_string().contains("too long"));
    }

    #[test]
    fn missing_key_is_unauthorized() {
        let e = RemoteError::missing_key("OpenAI embeddings");
        assert!(e.is_unauthorized());
        assert!(e.to_string().contains("OPENAI_API_KEY"));
    }
}
