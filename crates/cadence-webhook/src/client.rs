// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared JSON-over-HTTP client.

use std::time::Duration;

use cadence_config::model::WebhookConfig;
use cadence_core::CadenceError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// A failed webhook call, classified as permanent or transient.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct WebhookError {
    pub message: String,
    pub permanent: bool,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl WebhookError {
    pub fn into_transport(self) -> CadenceError {
        CadenceError::Transport {
            message: self.message,
            permanent: self.permanent,
            source: self.source,
        }
    }

    pub fn into_draft(self) -> CadenceError {
        CadenceError::Draft {
            message: self.message,
            source: self.source,
        }
    }

    pub fn into_discovery(self) -> CadenceError {
        CadenceError::Discovery {
            message: self.message,
            source: self.source,
        }
    }
}

/// Whether a response status means retrying can never help.
pub fn is_permanent_status(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

/// HTTP client shared by the webhook adapters.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    /// Build a client with an optional bearer token and a per-request timeout.
    pub fn new(auth_token: Option<&str>, timeout: Duration) -> Result<Self, CadenceError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| CadenceError::Config(format!("invalid webhook auth token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CadenceError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &WebhookConfig) -> Result<Self, CadenceError> {
        Self::new(
            config.auth_token.as_deref(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// POST `body` as JSON to `url` and decode the JSON reply.
    pub async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, WebhookError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| WebhookError {
                message: format!("request to {url} failed: {e}"),
                permanent: false,
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(url, status = %status, "webhook response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError {
                message: format!("{url} returned {status}: {}", truncate(&body, 200)),
                permanent: is_permanent_status(status),
                source: None,
            });
        }

        response.json::<R>().await.map_err(|e| WebhookError {
            message: format!("invalid response from {url}: {e}"),
            permanent: false,
            source: Some(Box::new(e)),
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
