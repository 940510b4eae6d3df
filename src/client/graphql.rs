//! GraphQL search client.

use super::{browser_headers, check_status, ClientError, SearchBackend};
use crate::config::ServiceConfig;
use crate::response::RawResponse;
use crate::session::Session;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::debug;

/// The search document. `$q` is the only variable.
pub const SEARCH_QUERY: &str = r#"
query Search($q: String!) {
  search(q: $q) {
    __typename
    ... on IPContext {
      ip
      location { country }
      as { number organization }
      risks
      infrastructure
      timeline { date count }
    }
    ... on AutonomousSystem {
      activeIPs
      averageDeviceCount
      distinctProxyServices
      distinctVPNServices
      number
      organization
      relatedServiceTags {
        tag
        name
        categories
        metrics { churnRate distinctIPs }
      }
      serviceTagCounts { label count }
      totalIPs
    }
    ... on ServiceTag {
      allowsCrypto
      categories
      description
      history { date count }
      isInactive
      isNoLog
      metrics {
        averageDeviceCount
        churnRate
        distinctASNs
        distinctCountries
        distinctIPs
        distinctISPs
      }
      name
      platforms
      protocols
      tag
      ipCountSparkline
      hostingCountries { label count }
      userCountries { label count }
      relatedServices { tag name categories }
    }
  }
}
"#;

const GRAPHQL_RESPONSE: &str = "application/graphql-response+json";

/// Search client for the application's GraphQL endpoint.
pub struct GraphQlClient {
    service: ServiceConfig,
}

impl GraphQlClient {
    /// Create a new search client.
    pub fn new(service: ServiceConfig) -> Self {
        Self { service }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/graphql", self.service.app_base_trimmed())
    }

    fn search_request(&self, client: &Client, key: &str) -> RequestBuilder {
        let app_base = self.service.app_base_trimmed();
        let referer = format!("{}/search?q={}", app_base, key);

        client
            .post(self.endpoint())
            .headers(browser_headers(app_base, &referer))
            .header(ACCEPT, GRAPHQL_RESPONSE)
            .json(&json!({
                "query": SEARCH_QUERY,
                "variables": { "q": key },
            }))
    }
}

#[async_trait]
impl SearchBackend for GraphQlClient {
    async fn search(&self, key: &str, session: &Session) -> Result<RawResponse, ClientError> {
        debug!(ip = %key, "Querying search API");

        let response = self.search_request(session.client(), key).send().await?;
        let response = check_status(response).await?;

        let body: Value = response.json().await.map_err(|e| {
            ClientError::InvalidResponse(format!("Failed to parse search response: {}", e))
        })?;

        debug!(ip = %key, body = %body, "Raw search response");

        Ok(RawResponse::from_body(body))
    }
}
