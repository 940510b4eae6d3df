//! GraphQL search response model.
//!
//! The search endpoint answers with `{data: {search: {...}}}` on success or
//! `{errors: [...]}` when it refuses the query. [`RawResponse`] keeps the body
//! verbatim next to its interpretation so the untouched reply can be exported
//! alongside the extracted fields.

use serde::Deserialize;
use serde_json::Value;

/// Error code the API reports for an expired or missing session.
pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";

/// Server reply for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    body: Value,
    payload: Payload,
}

/// Interpretation of a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A search result object was returned.
    Search(SearchResult),
    /// No result; the server returned an error list instead.
    Errors(Vec<GraphQlError>),
    /// Neither a result nor errors.
    Empty,
    /// The body did not match the envelope or result shapes.
    Malformed(String),
}

/// The search result union.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "__typename")]
pub enum SearchResult {
    #[serde(rename = "IPContext")]
    IpContext(IpContext),
    AutonomousSystem(AutonomousSystem),
    ServiceTag(ServiceTag),
    #[serde(other)]
    Unknown,
}

/// Context for a single IP address.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IpContext {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(rename = "as", default)]
    pub autonomous_system: Option<AsSummary>,
    #[serde(default)]
    pub risks: Option<Vec<String>>,
    #[serde(default)]
    pub infrastructure: Option<String>,
    #[serde(default)]
    pub timeline: Option<Vec<TimelinePoint>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AsSummary {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TimelinePoint {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// Summary of an autonomous system, returned when the key is an ASN.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutonomousSystem {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(rename = "activeIPs", default)]
    pub active_ips: Option<u64>,
    #[serde(rename = "totalIPs", default)]
    pub total_ips: Option<u64>,
    #[serde(default)]
    pub average_device_count: Option<f64>,
    #[serde(default)]
    pub distinct_proxy_services: Option<u64>,
    #[serde(rename = "distinctVPNServices", default)]
    pub distinct_vpn_services: Option<u64>,
}

/// A tagged proxy/VPN service, returned when the key names a service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTag {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
    #[serde(default)]
    pub protocols: Option<Vec<String>>,
    #[serde(default)]
    pub allows_crypto: Option<bool>,
    #[serde(default)]
    pub is_inactive: Option<bool>,
    #[serde(default)]
    pub is_no_log: Option<bool>,
}

/// One entry of a GraphQL `errors` list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub extensions: Option<ErrorExtensions>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorExtensions {
    #[serde(default)]
    pub code: Option<String>,
}

impl GraphQlError {
    /// `extensions.code`, if present.
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.code.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Data>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct Data {
    #[serde(default)]
    search: Option<Value>,
}

impl RawResponse {
    /// Interpret a response body. Never fails: bodies that cannot be
    /// interpreted become [`Payload::Malformed`].
    ///
    /// A search result takes precedence over errors when a partial response
    /// carries both.
    pub fn from_body(body: Value) -> Self {
        let payload = interpret(&body);
        Self { body, payload }
    }

    /// The body exactly as received.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// The interpreted payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Compact JSON serialization of the body.
    pub fn serialized(&self) -> String {
        self.body.to_string()
    }

    /// Whether the server rejected the session.
    pub fn is_unauthenticated(&self) -> bool {
        match &self.payload {
            Payload::Errors(errors) => errors.iter().any(|e| e.code() == Some(UNAUTHENTICATED)),
            _ => false,
        }
    }
}

fn interpret(body: &Value) -> Payload {
    let envelope: Envelope = match Envelope::deserialize(body) {
        Ok(envelope) => envelope,
        Err(e) => return Payload::Malformed(format!("unexpected envelope: {}", e)),
    };

    let search = envelope
        .data
        .and_then(|data| data.search)
        .filter(|search| !search.is_null());

    if let Some(search) = search {
        return match SearchResult::deserialize(&search) {
            Ok(result) => Payload::Search(result),
            Err(e) => Payload::Malformed(format!("unexpected search result: {}", e)),
        };
    }

    match envelope.errors {
        Some(errors) if !errors.is_empty() => Payload::Errors(errors),
        _ => Payload::Empty,
    }
}
