//! Remote service clients: sign-in and search.

pub mod clerk;
pub mod graphql;

use crate::response::RawResponse;
use crate::session::{Credentials, Session};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};
use reqwest::{Response, StatusCode};

/// Error from a remote service call.
#[derive(Debug)]
pub enum ClientError {
    /// HTTP request failed.
    Http(reqwest::Error),
    /// Timeout.
    Timeout,
    /// Rate limited (HTTP 429).
    RateLimited,
    /// Non-success HTTP status other than 429.
    Status { status: u16, body: String },
    /// Invalid response.
    InvalidResponse(String),
    /// Sign-in completed without a bearer token.
    MissingToken,
    /// Every authentication attempt failed.
    AuthenticationExhausted { attempts: u32 },
    /// Other error.
    Other(String),
}

impl ClientError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Http(e) => write!(f, "HTTP error: {}", e),
            ClientError::Timeout => write!(f, "Request timed out"),
            ClientError::RateLimited => write!(f, "Rate limited"),
            ClientError::Status { status, body } => write!(f, "HTTP {}: {}", status, body),
            ClientError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            ClientError::MissingToken => {
                write!(f, "Missing last_active_token JWT in sign-in response")
            }
            ClientError::AuthenticationExhausted { attempts } => {
                write!(f, "Authentication failed after {} attempts", attempts)
            }
            ClientError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Http(e)
        }
    }
}

/// Performs the sign-in handshake and produces a fresh session.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Sign in with `credentials`. Each call builds a new session from scratch.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ClientError>;
}

/// Issues a search for a single key against an authenticated session.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Look up `key` and return the server's reply.
    async fn search(&self, key: &str, session: &Session) -> Result<RawResponse, ClientError>;
}

/// Map 429 and other non-success statuses to errors, passing 2xx through.
pub(crate) async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ClientError::RateLimited);
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response)
}

/// Origin and Referer headers the web application would send.
pub(crate) fn browser_headers(origin: &str, referer: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(ORIGIN, value);
    }
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert(REFERER, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status() {
        assert_eq!(ClientError::RateLimited.status(), Some(429));
        assert_eq!(
            ClientError::Status {
                status: 503,
                body: String::new()
            }
            .status(),
            Some(503)
        );
        assert_eq!(ClientError::Timeout.status(), None);
        assert_eq!(ClientError::MissingToken.status(), None);
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 500: boom");
        assert_eq!(
            ClientError::AuthenticationExhausted { attempts: 3 }.to_string(),
            "Authentication failed after 3 attempts"
        );
    }

    #[test]
    fn test_browser_headers() {
        let headers = browser_headers("https://app.spur.us", "https://app.spur.us/search?q=1.1.1.1");
        assert_eq!(headers.get(ORIGIN).unwrap(), "https://app.spur.us");
        assert_eq!(
            headers.get(REFERER).unwrap(),
            "https://app.spur.us/search?q=1.1.1.1"
        );
    }
}
