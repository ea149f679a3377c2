// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drafter that asks a webhook to write message text.

use async_trait::async_trait;
use cadence_core::traits::adapter::PluginAdapter;
use cadence_core::traits::drafter::Drafter;
use cadence_core::types::{AdapterType, ContactContext, HealthStatus};
use cadence_core::CadenceError;

use crate::client::WebhookClient;
use crate::types::{DraftRequest, DraftResponse};

pub struct WebhookDrafter {
    client: WebhookClient,
    url: String,
}

impl WebhookDrafter {
    pub fn new(client: WebhookClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PluginAdapter for WebhookDrafter {
    fn name(&self) -> &str {
        "webhook-drafter"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Drafter
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl Drafter for WebhookDrafter {
    async fn draft(&self, prompt: &str, context: &ContactContext) -> Result<String, CadenceError> {
        let response: DraftResponse = self
            .client
            .post_json(&self.url, &DraftRequest { prompt, context })
            .await
            .map_err(|e| e.into_draft())?;
        if response.text.trim().is_empty() {
            return Err(CadenceError::Draft {
                message: "drafter returned empty text".into(),
                source: None,
            });
        }
        Ok(response.text)
    }
}
