// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock send transport for deterministic testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cadence_core::traits::adapter::PluginAdapter;
use cadence_core::traits::transport::SendTransport;
use cadence_core::types::{AdapterType, HealthStatus, MessageKind, MessageRef};
use cadence_core::CadenceError;

/// A message accepted by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub contact_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub message_ref: MessageRef,
}

/// A send transport that captures messages instead of delivering them.
///
/// Failures queued with `fail_next()` are returned first, one per call; a
/// failure set with `fail_always()` applies to every call after that.
#[derive(Default)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failures: Arc<Mutex<VecDeque<CadenceError>>>,
    always_fail: Arc<Mutex<Option<(String, bool)>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next unanswered call with `error`.
    pub async fn fail_next(&self, error: CadenceError) {
        self.failures.lock().await.push_back(error);
    }

    /// Fail every subsequent call.
    pub async fn fail_always(&self, message: &str, permanent: bool) {
        *self.always_fail.lock().await = Some((message.to_string(), permanent));
    }

    /// Stop failing calls.
    pub async fn recover(&self) {
        self.failures.lock().await.clear();
        *self.always_fail.lock().await = None;
    }

    /// Sleep this long inside every call before answering.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    /// All successfully sent messages, in send order.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Number of `send` calls, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl SendTransport for MockTransport {
    async fn send(
        &self,
        contact_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<MessageRef, CadenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }
        if let Some((message, permanent)) = self.always_fail.lock().await.clone() {
            return Err(if permanent {
                CadenceError::permanent(message)
            } else {
                CadenceError::transient(message)
            });
        }

        let message_ref = MessageRef(format!("mock-msg-{}", uuid::Uuid::new_v4()));
        self.sent.lock().await.push(SentMessage {
            contact_id: contact_id.to_string(),
            content: content.to_string(),
            kind,
            message_ref: message_ref.clone(),
        });
        Ok(message_ref)
    }
}
