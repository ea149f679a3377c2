// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock lead discovery for deterministic testing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cadence_core::traits::adapter::PluginAdapter;
use cadence_core::traits::discovery::LeadDiscovery;
use cadence_core::types::{AdapterType, ContactContext, HealthStatus};
use cadence_core::CadenceError;

/// Lead discovery backed by queued results.
///
/// Each `discover()` call pops one queued result; an empty queue yields no
/// leads. Enrichment answers from a per-contact table.
#[derive(Default)]
pub struct MockDiscovery {
    results: Arc<Mutex<VecDeque<Result<Vec<String>, CadenceError>>>>,
    enrichments: Arc<Mutex<HashMap<String, ContactContext>>>,
    enrich_failures: Arc<Mutex<HashSet<String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    discover_calls: AtomicUsize,
    criteria_seen: Arc<Mutex<Vec<String>>>,
}

impl MockDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the leads returned by the next unanswered `discover()` call.
    pub async fn add_leads(&self, leads: Vec<String>) {
        self.results.lock().await.push_back(Ok(leads));
    }

    pub async fn fail_next_discover(&self, error: CadenceError) {
        self.results.lock().await.push_back(Err(error));
    }

    pub async fn set_enrichment(&self, contact_id: &str, context: ContactContext) {
        self.enrichments
            .lock()
            .await
            .insert(contact_id.to_string(), context);
    }

    pub async fn fail_enrich_for(&self, contact_id: &str) {
        self.enrich_failures
            .lock()
            .await
            .insert(contact_id.to_string());
    }

    /// Sleep this long inside every `discover()` call.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    pub async fn criteria_seen(&self) -> Vec<String> {
        self.criteria_seen.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockDiscovery {
    fn name(&self) -> &str {
        "mock-discovery"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Discovery
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl LeadDiscovery for MockDiscovery {
    async fn discover(&self, criteria: &str) -> Result<Vec<String>, CadenceError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        self.criteria_seen.lock().await.push(criteria.to_string());

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.results
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn enrich(&self, contact_id: &str) -> Result<ContactContext, CadenceError> {
        if self.enrich_failures.lock().await.contains(contact_id) {
            return Err(CadenceError::Discovery {
                message: format!("no enrichment data for {contact_id}"),
                source: None,
            });
        }
        Ok(self
            .enrichments
            .lock()
            .await
            .get(contact_id)
            .cloned()
            .unwrap_or_default())
    }
}
