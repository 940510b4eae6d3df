//! Credentials and authenticated session state.

use crate::client::ClientError;
use crate::config::ServiceConfig;
use reqwest::cookie::Jar;
use reqwest::{Client, Url};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Cookie carrying the bearer token.
pub const SESSION_COOKIE: &str = "__session";

/// Cookie carrying the `<session_id>:<organization_id>` active context.
pub const ACTIVE_CONTEXT_COOKIE: &str = "clerk_active_context";

/// Account credentials, collected once per run and held only in memory.
#[derive(Clone)]
pub struct Credentials {
    identifier: String,
    secret: Zeroizing<String>,
}

impl Credentials {
    /// Create credentials from an account identifier (email) and password.
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    /// Account identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Account password.
    pub fn secret(&self) -> &str {
        self.secret.as_str()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Tokens extracted from a completed sign-in.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionTokens {
    /// Bearer token (JWT). Always present.
    pub bearer: String,
    /// `<session_id>:<organization_id>`, only when both halves were found.
    pub active_context: Option<String>,
}

impl SessionTokens {
    /// Combine a bearer token with optional session and organization ids.
    pub fn new(bearer: impl Into<String>, session_id: Option<&str>, organization_id: Option<&str>) -> Self {
        let active_context = match (session_id, organization_id) {
            (Some(session), Some(org)) => Some(format!("{}:{}", session, org)),
            _ => None,
        };

        Self {
            bearer: bearer.into(),
            active_context,
        }
    }
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("bearer", &"[REDACTED]")
            .field("active_context", &self.active_context)
            .finish()
    }
}

/// HTTP client plus the cookie jar it reads from.
///
/// A new transport is built for every sign-in so that cookies left behind by
/// an earlier, possibly failed, handshake never leak into the next one.
pub struct Transport {
    client: Client,
    jar: Arc<Jar>,
}

impl Transport {
    /// Build a fresh client with an empty cookie jar.
    pub fn new(service: &ServiceConfig) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(service.timeout())
            .user_agent(service.user_agent.clone())
            .build()?;

        Ok(Self { client, jar })
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn set_cookie(&self, name: &str, value: &str, url: &Url) {
        self.jar
            .add_cookie_str(&format!("{}={}; Path=/", name, value), url);
    }
}

/// An authenticated session: a transport with the session cookies installed.
///
/// Only [`Session::establish`] creates one, and it always installs the bearer
/// token, so a `Session` value is never partially authenticated.
pub struct Session {
    transport: Transport,
    tokens: SessionTokens,
}

impl Session {
    /// Install `tokens` into the transport's cookie jar, scoped to the
    /// application host, and wrap both into a session.
    pub fn establish(transport: Transport, tokens: SessionTokens, app_url: &Url) -> Self {
        transport.set_cookie(SESSION_COOKIE, &tokens.bearer, app_url);
        if let Some(ref context) = tokens.active_context {
            transport.set_cookie(ACTIVE_CONTEXT_COOKIE, context, app_url);
        }

        Self { transport, tokens }
    }

    /// Client to issue authenticated requests with.
    pub fn client(&self) -> &Client {
        self.transport.client()
    }

    /// Tokens this session was established with.
    pub fn tokens(&self) -> &SessionTokens {
        &self.tokens
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("tokens", &self.tokens).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;

    fn cookie_header(session: &Session, url: &Url) -> Option<String> {
        session
            .transport
            .jar
            .cookies(url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    #[test]
    fn test_active_context_requires_both_ids() {
        let tokens = SessionTokens::new("jwt", Some("sess_1"), Some("org_1"));
        assert_eq!(tokens.active_context.as_deref(), Some("sess_1:org_1"));

        let tokens = SessionTokens::new("jwt", Some("sess_1"), None);
        assert!(tokens.active_context.is_none());

        let tokens = SessionTokens::new("jwt", None, Some("org_1"));
        assert!(tokens.active_context.is_none());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials = Credentials::new("analyst@example.com", "hunter2");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("analyst@example.com"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(credentials.secret(), "hunter2");
    }

    #[test]
    fn test_tokens_debug_redacts_bearer() {
        let tokens = SessionTokens::new("eyJhbGciOi.secret", None, None);
        assert!(!format!("{:?}", tokens).contains("eyJhbGciOi"));
    }

    #[test]
    fn test_establish_installs_cookies_on_app_host() {
        let app_url = Url::parse("https://app.spur.us").unwrap();
        let transport = Transport::new(&ServiceConfig::default()).unwrap();
        let tokens = SessionTokens::new("jwt-value", Some("sess_1"), Some("org_1"));

        let session = Session::establish(transport, tokens, &app_url);

        let header = cookie_header(&session, &Url::parse("https://app.spur.us/api/graphql").unwrap())
            .expect("cookies for app host");
        assert!(header.contains("__session=jwt-value"));
        assert!(header.contains("clerk_active_context=sess_1:org_1"));

        let other = cookie_header(&session, &Url::parse("https://clerk.spur.us/v1/client").unwrap());
        assert!(other.is_none());
    }

    #[test]
    fn test_establish_bearer_only() {
        let app_url = Url::parse("https://app.spur.us").unwrap();
        let transport = Transport::new(&ServiceConfig::default()).unwrap();

        let session = Session::establish(transport, SessionTokens::new("jwt-value", None, None), &app_url);

        let header = cookie_header(&session, &app_url).unwrap();
        assert!(header.contains("__session=jwt-value"));
        assert!(!header.contains("clerk_active_context"));
        assert!(session.tokens().active_context.is_none());
    }

    #[test]
    fn test_new_transport_starts_empty() {
        let app_url = Url::parse("https://app.spur.us").unwrap();
        let first = Transport::new(&ServiceConfig::default()).unwrap();
        first.set_cookie(SESSION_COOKIE, "stale", &app_url);

        let second = Transport::new(&ServiceConfig::default()).unwrap();
        assert!(second.jar.cookies(&app_url).is_none());
    }
}
