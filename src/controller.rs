//! Retry and re-authentication around the search backend.
//!
//! Each key is looked up by a small state machine. [`RetryState::transition`]
//! is pure: it takes the classified [`Outcome`] of one query and decides the
//! next [`Step`]. [`LookupController`] performs the steps: it sleeps, signs in
//! again, or returns a record.
//!
//! ```text
//! Querying ── success ───────────────▶ Finish
//!     │ ───── unauthenticated (once) ─▶ Reauthenticate ─▶ Querying
//!     │ ───── unauthenticated (again)─▶ Abort
//!     │ ───── 429 ───────────────────▶ Cooldown ───────▶ Querying
//!     │ ───── other HTTP status ─────▶ Abort
//!     └────── transient failure ─────▶ Backoff ────────▶ Querying
//! ```
//!
//! 429s and transient failures use up an attempt; when none remain the step
//! is `Exhausted`. A re-authentication does not use up an attempt, so a fresh
//! session is always tried at least once.

use crate::client::{Authenticator, ClientError, SearchBackend};
use crate::config::RetryConfig;
use crate::normalize::{normalize, ResultRecord};
use crate::response::RawResponse;
use crate::session::{Credentials, Session};
use crate::sleeper::Sleeper;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Retry limits and delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Query attempts per key.
    pub max_attempts: u32,
    /// Sign-in attempts per (re-)authentication.
    pub max_auth_attempts: u32,
    /// First backoff delay; doubled after every transient failure.
    pub initial_backoff: Duration,
    /// Fixed pause after HTTP 429.
    pub rate_limit_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            max_auth_attempts: config.max_auth_attempts,
            initial_backoff: Duration::from_secs(config.initial_backoff_seconds),
            rate_limit_cooldown: Duration::from_secs(config.rate_limit_cooldown_seconds),
        }
    }
}

/// Classified result of one query attempt.
#[derive(Debug)]
pub enum Outcome {
    /// The server answered and accepted the session.
    Success(RawResponse),
    /// The server answered with an `UNAUTHENTICATED` error.
    Unauthenticated,
    /// HTTP 429.
    RateLimited,
    /// Any other non-success HTTP status.
    Rejected(ClientError),
    /// Network, timeout or parse failure.
    Transient(ClientError),
}

impl Outcome {
    /// Classify a search call's result.
    pub fn classify(result: Result<RawResponse, ClientError>) -> Self {
        match result {
            Ok(response) if response.is_unauthenticated() => Outcome::Unauthenticated,
            Ok(response) => Outcome::Success(response),
            Err(ClientError::RateLimited) => Outcome::RateLimited,
            Err(e @ ClientError::Status { .. }) => Outcome::Rejected(e),
            Err(e) => Outcome::Transient(e),
        }
    }
}

/// What the controller does next.
#[derive(Debug)]
pub enum Step {
    /// Normalize this response and return.
    Finish(RawResponse),
    /// Sign in again, pause, then query again.
    Reauthenticate { pause: Duration },
    /// Rate limited: pause, then query again.
    Cooldown(Duration),
    /// Transient failure: pause, then query again.
    Backoff { delay: Duration, cause: ClientError },
    /// Give up on this key.
    Abort(AbortReason),
    /// Attempts used up.
    Exhausted(ClientError),
}

/// Why a key was given up on before its attempts ran out.
#[derive(Debug)]
pub enum AbortReason {
    /// Still unauthenticated after re-authenticating once.
    StillUnauthenticated,
    /// The server rejected the query with a non-429 status.
    Rejected(ClientError),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::StillUnauthenticated => write!(f, "still unauthenticated after re-authentication"),
            AbortReason::Rejected(e) => write!(f, "{}", e),
        }
    }
}

/// Per-key retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Attempts used up so far.
    pub attempts: u32,
    /// Delay the next backoff will use.
    pub delay: Duration,
    /// Whether this key already triggered a re-authentication.
    pub reauthenticated: bool,
}

impl RetryState {
    /// Fresh state for a new key.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts: 0,
            delay: policy.initial_backoff,
            reauthenticated: false,
        }
    }

    /// Decide the next step for `outcome`.
    pub fn transition(self, outcome: Outcome, policy: &RetryPolicy) -> (Self, Step) {
        let mut next = self;

        match outcome {
            Outcome::Success(response) => (next, Step::Finish(response)),
            Outcome::Unauthenticated if self.reauthenticated => {
                (next, Step::Abort(AbortReason::StillUnauthenticated))
            }
            Outcome::Unauthenticated => {
                next.reauthenticated = true;
                (next, Step::Reauthenticate { pause: self.delay })
            }
            Outcome::Rejected(e) => (next, Step::Abort(AbortReason::Rejected(e))),
            Outcome::RateLimited => {
                next.attempts += 1;
                if next.attempts >= policy.max_attempts {
                    (next, Step::Exhausted(ClientError::RateLimited))
                } else {
                    (next, Step::Cooldown(policy.rate_limit_cooldown))
                }
            }
            Outcome::Transient(cause) => {
                next.attempts += 1;
                if next.attempts >= policy.max_attempts {
                    (next, Step::Exhausted(cause))
                } else {
                    next.delay = self.delay.saturating_mul(2);
                    (
                        next,
                        Step::Backoff {
                            delay: self.delay,
                            cause,
                        },
                    )
                }
            }
        }
    }
}

/// Counters reported in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupStats {
    /// Re-authentications triggered by an expired session.
    pub reauthentications: u32,
    /// Cooldowns taken after HTTP 429, during sign-in or search.
    pub rate_limit_pauses: u32,
}

/// Sign in with bounded retries.
///
/// A 429 waits out the fixed cooldown; any other failure backs off
/// exponentially. No pause follows the final failed attempt.
async fn establish_session(
    authenticator: &dyn Authenticator,
    credentials: &Credentials,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    stats: &mut LookupStats,
) -> Result<Session, ClientError> {
    let mut delay = policy.initial_backoff;

    for attempt in 1..=policy.max_auth_attempts {
        info!(attempt, "Authenticating");

        let err = match authenticator.authenticate(credentials).await {
            Ok(session) => {
                info!(attempt, "Authentication successful");
                return Ok(session);
            }
            Err(e) => e,
        };

        let last = attempt == policy.max_auth_attempts;
        match err {
            ClientError::RateLimited => {
                warn!(attempt, "Rate limited during authentication");
                if !last {
                    stats.rate_limit_pauses += 1;
                    sleeper.sleep(policy.rate_limit_cooldown).await;
                }
            }
            other => {
                warn!(attempt, error = %other, "Authentication attempt failed");
                if !last {
                    sleeper.sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }

    error!(
        attempts = policy.max_auth_attempts,
        "Failed to authenticate after multiple attempts"
    );
    Err(ClientError::AuthenticationExhausted {
        attempts: policy.max_auth_attempts,
    })
}

/// Owns the current session and looks keys up one at a time.
pub struct LookupController {
    authenticator: Box<dyn Authenticator>,
    backend: Box<dyn SearchBackend>,
    sleeper: Arc<dyn Sleeper>,
    credentials: Credentials,
    policy: RetryPolicy,
    session: Session,
    stats: LookupStats,
}

impl LookupController {
    /// Sign in and return a controller holding the new session.
    ///
    /// Fails when authentication is exhausted; no query can run without a
    /// session.
    pub async fn connect(
        authenticator: Box<dyn Authenticator>,
        backend: Box<dyn SearchBackend>,
        sleeper: Arc<dyn Sleeper>,
        credentials: Credentials,
        policy: RetryPolicy,
    ) -> Result<Self, ClientError> {
        let mut stats = LookupStats::default();
        let session = establish_session(
            authenticator.as_ref(),
            &credentials,
            sleeper.as_ref(),
            &policy,
            &mut stats,
        )
        .await?;

        Ok(Self {
            authenticator,
            backend,
            sleeper,
            credentials,
            policy,
            session,
            stats,
        })
    }

    /// Look up `key`, retrying and re-authenticating as needed.
    ///
    /// Always returns a record; lookups that cannot complete yield
    /// [`ResultRecord::unavailable`].
    pub async fn robust_query(&mut self, key: &str) -> ResultRecord {
        let mut state = RetryState::new(&self.policy);

        loop {
            debug!(ip = %key, attempt = state.attempts + 1, "Querying");
            let result = self.backend.search(key, &self.session).await;
            let (next, step) = state.transition(Outcome::classify(result), &self.policy);
            state = next;

            match step {
                Step::Finish(response) => return normalize(key, &response),
                Step::Reauthenticate { pause } => {
                    warn!(ip = %key, attempt = state.attempts + 1, "Session expired, re-authenticating");
                    self.stats.reauthentications += 1;

                    match establish_session(
                        self.authenticator.as_ref(),
                        &self.credentials,
                        self.sleeper.as_ref(),
                        &self.policy,
                        &mut self.stats,
                    )
                    .await
                    {
                        Ok(session) => {
                            self.session = session;
                            self.sleeper.sleep(pause).await;
                        }
                        Err(e) => {
                            error!(ip = %key, error = %e, "Re-authentication failed, skipping");
                            break;
                        }
                    }
                }
                Step::Cooldown(pause) => {
                    warn!(ip = %key, seconds = pause.as_secs(), "Rate limited, pausing");
                    self.stats.rate_limit_pauses += 1;
                    self.sleeper.sleep(pause).await;
                }
                Step::Backoff { delay, cause } => {
                    warn!(ip = %key, error = %cause, seconds = delay.as_secs(), "Query failed, backing off");
                    self.sleeper.sleep(delay).await;
                }
                Step::Abort(reason) => {
                    error!(ip = %key, reason = %reason, "Giving up on IP");
                    break;
                }
                Step::Exhausted(cause) => {
                    error!(ip = %key, attempts = state.attempts, error = %cause, "Attempts exhausted");
                    break;
                }
            }
        }

        ResultRecord::unavailable(key)
    }

    /// Counters accumulated since [`LookupController::connect`].
    pub fn stats(&self) -> LookupStats {
        self.stats
    }

    /// The sleeper used for every pause.
    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        self.sleeper.clone()
    }

    /// The session queries currently run under.
    pub fn session(&self) -> &Session {
        &self.session
    }
}
