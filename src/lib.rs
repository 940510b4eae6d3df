//! Bulk IP context lookups against Spur.us.
//!
//! Signs in to the Spur web app with an analyst's credentials, searches each
//! IP through the app's GraphQL endpoint, and flattens the replies into CSV
//! rows for triage.
//!
//! # Features
//!
//! - **Browser-style sign-in** - Two-step identifier/password flow against the
//!   Clerk frontend API, with session cookies installed for the app
//! - **Session recovery** - Expired sessions are re-established once per IP
//! - **Rate limit handling** - HTTP 429 triggers a fixed cooldown
//! - **Exponential backoff** - Transient failures retry with doubling delays
//! - **Deduplication** - Each unique IP is looked up once per run
//! - **CSV export** - New result files or input files extended with results
//!
//! # Example Configuration
//!
//! ```yaml
//! service:
//!   app_base: "https://app.spur.us"
//!   timeout_ms: 30000
//!
//! credentials:
//!   email: "${SPUR_EMAIL}"
//!
//! retry:
//!   max_attempts: 4
//!   rate_limit_cooldown_seconds: 60
//!   inter_query_delay_seconds: 2
//! ```

pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod controller;
pub mod export;
pub mod normalize;
pub mod response;
pub mod session;
pub mod sleeper;

#[cfg(test)]
mod testutil;

pub use batch::{run_batch, BatchReport, BatchSummary};
pub use client::{clerk::ClerkAuthenticator, graphql::GraphQlClient, ClientError};
pub use config::Config;
pub use controller::{LookupController, RetryPolicy};
pub use normalize::ResultRecord;
pub use session::Credentials;
pub use sleeper::TokioSleeper;
