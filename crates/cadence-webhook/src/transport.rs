// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send transport that delivers messages to a webhook.

use async_trait::async_trait;
use cadence_core::traits::adapter::PluginAdapter;
use cadence_core::traits::transport::SendTransport;
use cadence_core::types::{AdapterType, HealthStatus, MessageKind, MessageRef};
use cadence_core::CadenceError;

use crate::client::WebhookClient;
use crate::types::{SendRequest, SendResponse};

pub struct WebhookTransport {
    client: WebhookClient,
    url: String,
}

impl WebhookTransport {
    pub fn new(client: WebhookClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PluginAdapter for WebhookTransport {
    fn name(&self) -> &str {
        "webhook-transport"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl SendTransport for WebhookTransport {
    async fn send(
        &self,
        contact_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<MessageRef, CadenceError> {
        let request = SendRequest {
            contact_id,
            content,
            message_kind: kind,
        };
        let response: SendResponse = self
            .client
            .post_json(&self.url, &request)
            .await
            .map_err(|e| e.into_transport())?;
        Ok(MessageRef(response.message_ref))
    }
}
