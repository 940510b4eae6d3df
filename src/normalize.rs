//! Flattening of search responses into exportable result records.

use crate::response::{IpContext, Payload, RawResponse, SearchResult};
use serde::Serialize;
use tracing::error;

/// Placeholder written wherever a value could not be determined.
pub const UNAVAILABLE: &str = "N/A";

/// Column headers of a result row, in output order.
pub const RESULT_COLUMNS: [&str; 5] = [
    "IP",
    "Raw Spur.US results",
    "Identified VPN, Tunnel, Etc.",
    "IP Type",
    "IP Est. Geolocation",
];

/// One flattened lookup result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRecord {
    /// The key exactly as looked up.
    #[serde(rename = "IP")]
    pub ip: String,

    /// Compact JSON of the full server reply.
    #[serde(rename = "Raw Spur.US results")]
    pub raw: String,

    /// Risk tags joined with ", ".
    #[serde(rename = "Identified VPN, Tunnel, Etc.")]
    pub risks: String,

    /// Infrastructure classification.
    #[serde(rename = "IP Type")]
    pub ip_type: String,

    /// Estimated country.
    #[serde(rename = "IP Est. Geolocation")]
    pub geolocation: String,
}

impl ResultRecord {
    /// Record with every field except the key set to [`UNAVAILABLE`].
    pub fn unavailable(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            raw: UNAVAILABLE.to_string(),
            risks: UNAVAILABLE.to_string(),
            ip_type: UNAVAILABLE.to_string(),
            geolocation: UNAVAILABLE.to_string(),
        }
    }

    /// Record that keeps the raw reply but has no extracted fields.
    fn raw_only(ip: &str, raw: String) -> Self {
        Self {
            raw,
            ..Self::unavailable(ip)
        }
    }

    /// Whether the lookup produced no usable reply at all.
    pub fn is_unavailable(&self) -> bool {
        self.raw == UNAVAILABLE
    }

    /// Field values in [`RESULT_COLUMNS`] order.
    pub fn values(&self) -> [&str; 5] {
        [
            self.ip.as_str(),
            self.raw.as_str(),
            self.risks.as_str(),
            self.ip_type.as_str(),
            self.geolocation.as_str(),
        ]
    }
}

/// Flatten `response` into a record for `key`. Never fails.
pub fn normalize(key: &str, response: &RawResponse) -> ResultRecord {
    match response.payload() {
        Payload::Search(SearchResult::IpContext(ctx)) => from_ip_context(key, response.serialized(), ctx),
        Payload::Search(_) | Payload::Errors(_) | Payload::Empty => {
            ResultRecord::raw_only(key, response.serialized())
        }
        Payload::Malformed(reason) => {
            error!(ip = %key, error = %reason, "Error parsing response");
            ResultRecord::unavailable(key)
        }
    }
}

fn from_ip_context(key: &str, raw: String, ctx: &IpContext) -> ResultRecord {
    let risks = match ctx.risks.as_deref() {
        Some(risks) if !risks.is_empty() => risks.join(", "),
        _ => UNAVAILABLE.to_string(),
    };

    let ip_type = ctx
        .infrastructure
        .clone()
        .unwrap_or_else(|| UNAVAILABLE.to_string());

    let geolocation = ctx
        .location
        .as_ref()
        .and_then(|location| location.country.clone())
        .unwrap_or_else(|| UNAVAILABLE.to_string());

    ResultRecord {
        ip: key.to_string(),
        raw,
        risks,
        ip_type,
        geolocation,
    }
}
