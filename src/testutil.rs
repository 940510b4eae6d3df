//! In-memory fakes for exercising the lookup pipeline without a network.

use crate::client::{Authenticator, ClientError, SearchBackend};
use crate::config::ServiceConfig;
use crate::response::RawResponse;
use crate::session::{Credentials, Session, SessionTokens, Transport};
use crate::sleeper::Sleeper;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sleeper that records requested pauses and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pause requested so far, in order.
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

/// Build a session without any network traffic.
pub fn test_session(bearer: &str) -> Session {
    let transport = Transport::new(&ServiceConfig::default()).unwrap();
    let app_url = Url::parse("https://app.spur.us").unwrap();
    Session::establish(
        transport,
        SessionTokens::new(bearer, Some("sess_test"), Some("org_test")),
        &app_url,
    )
}

/// Authenticator that replays scripted results, then succeeds.
///
/// The session issued by call `n` carries bearer `jwt-n`.
#[derive(Clone, Default)]
pub struct ScriptedAuthenticator {
    script: Arc<Mutex<VecDeque<Result<(), ClientError>>>>,
    calls: Arc<Mutex<u32>>,
}

impl ScriptedAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: Result<(), ClientError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Authenticator for ScriptedAuthenticator {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Session, ClientError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };

        let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        next.map(|()| test_session(&format!("jwt-{}", call)))
    }
}

/// Search backend that replays scripted bodies or errors, then answers every
/// key with a datacenter IP context.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<VecDeque<Result<Value, ClientError>>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: Result<Value, ClientError>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Keys searched, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Bearer token of the session each search ran under.
    pub fn bearers(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, bearer)| bearer.clone())
            .collect()
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    async fn search(&self, key: &str, session: &Session) -> Result<RawResponse, ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push((key.to_string(), session.tokens().bearer.clone()));

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ip_body(key)));
        next.map(RawResponse::from_body)
    }
}

/// A successful IPContext body for `ip`.
pub fn ip_body(ip: &str) -> Value {
    json!({
        "data": {
            "search": {
                "__typename": "IPContext",
                "ip": ip,
                "location": { "country": "US" },
                "as": { "number": 15169, "organization": "Google LLC" },
                "risks": ["TUNNEL"],
                "infrastructure": "DATACENTER"
            }
        }
    })
}

/// An expired-session error body.
pub fn unauthenticated_body() -> Value {
    json!({
        "errors": [
            { "message": "Unauthenticated", "extensions": { "code": "UNAUTHENTICATED" } }
        ],
        "data": null
    })
}
