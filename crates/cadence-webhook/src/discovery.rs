// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead discovery and enrichment over a webhook.
//!
//! Discovery POSTs to the configured URL; enrichment POSTs to `<url>/enrich`.

use async_trait::async_trait;
use cadence_core::traits::adapter::PluginAdapter;
use cadence_core::traits::discovery::LeadDiscovery;
use cadence_core::types::{AdapterType, ContactContext, HealthStatus};
use cadence_core::CadenceError;

use crate::client::WebhookClient;
use crate::types::{DiscoverRequest, DiscoverResponse, EnrichRequest, EnrichResponse};

pub struct WebhookDiscovery {
    client: WebhookClient,
    url: String,
    enrich_url: String,
}

impl WebhookDiscovery {
    pub fn new(client: WebhookClient, url: impl Into<String>) -> Self {
        let url = url.into();
        let enrich_url = format!("{}/enrich", url.trim_end_matches('/'));
        Self {
            client,
            url,
            enrich_url,
        }
    }
}

#[async_trait]
impl PluginAdapter for WebhookDiscovery {
    fn name(&self) -> &str {
        "webhook-discovery"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Discovery
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl LeadDiscovery for WebhookDiscovery {
    async fn discover(&self, criteria: &str) -> Result<Vec<String>, CadenceError> {
        let response: DiscoverResponse = self
            .client
            .post_json(&self.url, &DiscoverRequest { criteria })
            .await
            .map_err(|e| e.into_discovery())?;
        Ok(response.contact_ids)
    }

    async fn enrich(&self, contact_id: &str) -> Result<ContactContext, CadenceError> {
        let response: EnrichResponse = self
            .client
            .post_json(&self.enrich_url, &EnrichRequest { contact_id })
            .await
            .map_err(|e| e.into_discovery())?;
        Ok(response.context)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn discovery(server: &MockServer) -> WebhookDiscovery {
        let client = WebhookClient::new(None, Duration::from_secs(5)).unwrap();
        WebhookDiscovery::new(client, format!("{}/leads/", server.uri()))
    }

    #[tokio::test]
    async fn discover_returns_contact_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/leads/"))
            .and(body_json(json!({"criteria": "industry=fintech"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"contact_ids": ["a", "b"]})),
            )
            .mount(&server)
            .await;

        let leads = discovery(&server).discover("industry=fintech").await.unwrap();
        assert_eq!(leads, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn enrich_posts_to_enrich_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/leads/enrich"))
            .and(body_json(json!({"contact_id": "a"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"context": {"company": "Acme"}})),
            )
            .mount(&server)
            .await;

        let context = discovery(&server).enrich("a").await.unwrap();
        assert_eq!(context.get("company").map(String::as_str), Some("Acme"));
    }

    #[tokio::test]
    async fn errors_map_to_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = discovery(&server).discover("x").await.unwrap_err();
        assert!(matches!(err, CadenceError::Discovery { .. }));
    }
}
