// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock AI drafter for deterministic testing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cadence_core::traits::adapter::PluginAdapter;
use cadence_core::traits::drafter::Drafter;
use cadence_core::types::{AdapterType, ContactContext, HealthStatus};
use cadence_core::CadenceError;

/// A drafter that returns pre-configured responses.
///
/// Responses are popped from a FIFO queue. When the queue is empty the
/// draft is "mock draft for <contact_id>".
#[derive(Default)]
pub struct MockDrafter {
    responses: Arc<Mutex<VecDeque<Result<String, CadenceError>>>>,
    prompts: Arc<Mutex<Vec<(String, ContactContext)>>>,
}

impl MockDrafter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().map(Ok).collect())),
            prompts: Arc::default(),
        }
    }

    pub async fn add_response(&self, text: String) {
        self.responses.lock().await.push_back(Ok(text));
    }

    /// Answer the next otherwise-unanswered call with `error`.
    pub async fn fail_next(&self, error: CadenceError) {
        self.responses.lock().await.push_back(Err(error));
    }

    /// Every `(prompt, context)` pair the drafter was asked about.
    pub async fn prompts(&self) -> Vec<(String, ContactContext)> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockDrafter {
    fn name(&self) -> &str {
        "mock-drafter"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Drafter
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl Drafter for MockDrafter {
    async fn draft(&self, prompt: &str, context: &ContactContext) -> Result<String, CadenceError> {
        self.prompts
            .lock()
            .await
            .push((prompt.to_string(), context.clone()));
        match self.responses.lock().await.pop_front() {
            Some(response) => response,
            None => {
                let contact = context.get("contact_id").map(String::as_str).unwrap_or("unknown");
                Ok(format!("mock draft for {contact}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_responses_in_order_then_default() {
        let drafter = MockDrafter::with_responses(vec!["one".into(), "two".into()]);
        let ctx: ContactContext = [("contact_id".to_string(), "c9".to_string())].into();
        assert_eq!(drafter.draft("p", &ctx).await.unwrap(), "one");
        assert_eq!(drafter.draft("p", &ctx).await.unwrap(), "two");
        assert_eq!(drafter.draft("p", &ctx).await.unwrap(), "mock draft for c9");
        assert_eq!(drafter.prompts().await.len(), 3);
    }

    #[tokio::test]
    async fn queued_failure_is_returned() {
        let drafter = MockDrafter::new();
        drafter
            .fail_next(CadenceError::Draft {
                message: "overloaded".into(),
                source: None,
            })
            .await;
        let err = drafter.draft("p", &ContactContext::new()).await.unwrap_err();
        assert!(matches!(err, CadenceError::Draft { .. }));
    }
}
