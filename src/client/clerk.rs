//! Two-step password sign-in against the Clerk frontend API.
//!
//! 1. `POST /v1/client/sign_ins` with the identifier starts a sign-in attempt.
//! 2. `POST /v1/client/sign_ins/{id}/attempt_first_factor` with the password
//!    completes it and returns the session token.
//!
//! Both calls run on the same fresh [`Transport`] so the client cookie set by
//! the first response is presented on the second.

use super::{browser_headers, check_status, Authenticator, ClientError};
use crate::config::ServiceConfig;
use crate::session::{Credentials, Session, SessionTokens, Transport};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

/// Sign-in response to the first step.
#[derive(Debug, Deserialize)]
struct SignInStarted {
    response: SignInAttempt,
}

#[derive(Debug, Deserialize)]
struct SignInAttempt {
    id: String,
}

/// Extract session tokens from the password step's response.
///
/// The bearer token is taken from `response.last_active_token` or, failing
/// that, from the first client session. The session id and organization id
/// are optional and only combined into an active context when both exist;
/// an id of any other shape is ignored.
pub fn extract_tokens(payload: &Value) -> Result<SessionTokens, ClientError> {
    if !payload.is_object() {
        return Err(ClientError::InvalidResponse(
            "Unexpected sign-in response: expected a JSON object".to_string(),
        ));
    }
    for section in ["response", "client"] {
        if let Some(value) = payload.get(section) {
            if !(value.is_object() || value.is_null()) {
                return Err(ClientError::InvalidResponse(format!(
                    "Unexpected sign-in response: `{}` is not an object",
                    section
                )));
            }
        }
    }

    let jwt = string_at(payload, "/response/last_active_token/jwt")
        .or_else(|| string_at(payload, "/client/sessions/0/last_active_token/jwt"))
        .ok_or(ClientError::MissingToken)?;

    let session_id = string_at(payload, "/response/created_session_id")
        .or_else(|| string_at(payload, "/client/sessions/0/id"));

    let organization_id = string_at(
        payload,
        "/response/user_data/organization_memberships/0/organization/id",
    )
    .or_else(|| string_at(payload, "/client/sessions/0/last_active_organization_id"));

    Ok(SessionTokens::new(jwt, session_id, organization_id))
}

/// Non-empty string at a JSON pointer.
fn string_at<'a>(payload: &'a Value, pointer: &str) -> Option<&'a str> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

/// Password authenticator for the service's Clerk instance.
pub struct ClerkAuthenticator {
    service: ServiceConfig,
}

impl ClerkAuthenticator {
    /// Create a new authenticator.
    pub fn new(service: ServiceConfig) -> Self {
        Self { service }
    }

    fn version_query(&self) -> String {
        format!(
            "__clerk_api_version={}&_clerk_js_version={}",
            self.service.clerk_api_version, self.service.clerk_js_version
        )
    }

    fn sign_in_url(&self) -> String {
        format!(
            "{}/v1/client/sign_ins?{}",
            self.service.auth_base_trimmed(),
            self.version_query()
        )
    }

    fn first_factor_url(&self, sign_in_id: &str) -> String {
        format!(
            "{}/v1/client/sign_ins/{}/attempt_first_factor?{}",
            self.service.auth_base_trimmed(),
            sign_in_id,
            self.version_query()
        )
    }

    fn form_post(&self, client: &Client, url: String) -> RequestBuilder {
        let app_base = self.service.app_base_trimmed();
        client
            .post(url)
            .headers(browser_headers(app_base, app_base))
    }

    fn sign_in_request(&self, client: &Client, identifier: &str) -> RequestBuilder {
        self.form_post(client, self.sign_in_url())
            .form(&[("identifier", identifier)])
    }

    fn first_factor_request(&self, client: &Client, sign_in_id: &str, password: &str) -> RequestBuilder {
        self.form_post(client, self.first_factor_url(sign_in_id))
            .form(&[("strategy", "password"), ("password", password)])
    }

    /// Step one: returns the sign-in attempt id.
    async fn start_sign_in(&self, client: &Client, identifier: &str) -> Result<String, ClientError> {
        let response = self.sign_in_request(client, identifier).send().await?;
        let response = check_status(response).await?;

        let started: SignInStarted = response.json().await.map_err(|e| {
            ClientError::InvalidResponse(format!("Failed to parse sign-in response: {}", e))
        })?;

        Ok(started.response.id)
    }

    /// Step two: returns the raw payload carrying the session token.
    async fn submit_password(
        &self,
        client: &Client,
        sign_in_id: &str,
        password: &str,
    ) -> Result<Value, ClientError> {
        let response = self
            .first_factor_request(client, sign_in_id, password)
            .send()
            .await?;
        let response = check_status(response).await?;

        response.json().await.map_err(|e| {
            ClientError::InvalidResponse(format!("Failed to parse first factor response: {}", e))
        })
    }
}

#[async_trait]
impl Authenticator for ClerkAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ClientError> {
        let app_url = self
            .service
            .app_url()
            .map_err(|e| ClientError::Other(e.to_string()))?;
        let transport = Transport::new(&self.service)?;

        debug!(identifier = %credentials.identifier(), "Starting sign-in");
        let sign_in_id = self
            .start_sign_in(transport.client(), credentials.identifier())
            .await?;

        debug!(sign_in_id = %sign_in_id, "Submitting password factor");
        let payload = self
            .submit_password(transport.client(), &sign_in_id, credentials.secret())
            .await?;

        let tokens = match extract_tokens(&payload) {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(error = %e, "Sign-in response did not contain a usable session");
                return Err(e);
            }
        };

        info!(
            active_context = tokens.active_context.is_some(),
            "Signed in"
        );

        Ok(Session::establish(transport, tokens, &app_url))
    }
}
