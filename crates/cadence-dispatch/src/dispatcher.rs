// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatch tick.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use cadence_config::model::DispatchConfig;
use cadence_core::{
    CadenceError, DeliveryListener, FailureDisposition, ProspectingConfig, QueueItem, SendTransport,
};
use cadence_quota::{QuotaTracker, Reservation};
use cadence_storage::queries::tenants;
use cadence_storage::QueueStore;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::outcome::{DispatchSummary, ItemOutcome};
use crate::retry::RetryPolicy;

/// Tunables for [`Dispatcher`], usually taken from `[dispatch]`.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Due items fetched per tenant per tick.
    pub batch_size: u32,
    pub retry: RetryPolicy,
    pub send_timeout: Duration,
    /// Items left in `processing` longer than this are presumed abandoned.
    pub claim_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 25,
            retry: RetryPolicy::default(),
            send_timeout: Duration::from_secs(30),
            claim_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&DispatchConfig> for DispatchSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_secs(config.retry_base_secs),
                max_delay: Duration::from_secs(config.retry_max_secs),
            },
            send_timeout: config.send_timeout(),
            claim_timeout: Duration::from_secs(config.claim_timeout_secs),
        }
    }
}

/// Attempts at recording a delivered message before its receipt is held.
const MARK_SENT_ATTEMPTS: u32 = 3;
const MARK_SENT_BACKOFF: Duration = Duration::from_millis(50);

/// One tenant's share of a tick: its configuration and remaining due items.
struct TenantLane {
    config: ProspectingConfig,
    items: VecDeque<QueueItem>,
}

/// Claims due queue items and sends them within each tenant's throttles.
#[derive(Clone)]
pub struct Dispatcher {
    store: QueueStore,
    quota: QuotaTracker,
    transport: Arc<dyn SendTransport>,
    listener: Option<Arc<dyn DeliveryListener>>,
    settings: DispatchSettings,
    /// Receipts of delivered items whose `sent` write failed, by item ID.
    /// While any are held, stale claims are not recovered.
    unrecorded: Arc<Mutex<HashMap<i64, String>>>,
}

impl Dispatcher {
    pub fn new(
        store: QueueStore,
        quota: QuotaTracker,
        transport: Arc<dyn SendTransport>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            quota,
            transport,
            listener: None,
            settings,
            unrecorded: Arc::default(),
        }
    }

    /// Register the component told about terminally failed items.
    pub fn with_listener(mut self, listener: Arc<dyn DeliveryListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Run one dispatch pass at `now`.
    ///
    /// Tenants are served round-robin, one item per tenant per round, each
    /// tenant's items in `scheduled_at` order. Storage errors are logged and
    /// counted; the tick itself never fails.
    pub async fn tick(&self, now: DateTime<Utc>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        let held = self.flush_unrecorded(now, &mut summary).await;
        if held > 0 {
            warn!(held, "delivery receipts still unrecorded, skipping stale claim recovery");
        } else {
            self.recover_stale(now, &mut summary).await;
        }

        let mut lanes = match self.load_lanes(now, &mut summary).await {
            Ok(lanes) => lanes,
            Err(e) => {
                error!(error = %e, "failed to list tenants with due items");
                summary.errors += 1;
                return summary;
            }
        };

        while !lanes.is_empty() {
            let mut next_round = Vec::with_capacity(lanes.len());
            for mut lane in lanes {
                let Some(item) = lane.items.pop_front() else {
                    continue;
                };
                match self.process(&mut lane.config, &item, now).await {
                    Ok(outcome) => {
                        summary.record(outcome);
                        if !outcome.stops_tenant() && !lane.items.is_empty() {
                            next_round.push(lane);
                        }
                    }
                    Err(e) => {
                        error!(
                            tenant_id = %item.tenant_id,
                            item_id = item.id,
                            error = %e,
                            "dispatch failed for tenant"
                        );
                        summary.errors += 1;
                    }
                }
            }
            lanes = next_round;
        }

        if summary != DispatchSummary::default() {
            info!(%summary, "dispatch tick complete");
        }
        summary
    }

    async fn recover_stale(&self, now: DateTime<Utc>, summary: &mut DispatchSummary) {
        let stale_before = TimeDelta::from_std(self.settings.claim_timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        match self.store.recover_stale_claims(stale_before, now).await {
            Ok(0) => {}
            Ok(n) => {
                warn!(recovered = n, "returned abandoned claims to the queue");
                summary.recovered = n;
            }
            Err(e) => {
                error!(error = %e, "failed to recover stale claims");
                summary.errors += 1;
            }
        }
    }

    /// Retry the `sent` write for every held receipt. Returns how many remain held.
    async fn flush_unrecorded(&self, now: DateTime<Utc>, summary: &mut DispatchSummary) -> usize {
        let mut unrecorded = self.unrecorded.lock().await;
        let held: Vec<(i64, String)> = unrecorded
            .iter()
            .map(|(id, message_ref)| (*id, message_ref.clone()))
            .collect();
        for (item_id, message_ref) in held {
            match self.store.mark_sent(item_id, &message_ref, now).await {
                Ok(true) => {
                    info!(item_id, %message_ref, "recorded held delivery receipt");
                    unrecorded.remove(&item_id);
                }
                Ok(false) => {
                    warn!(item_id, %message_ref, "held receipt's item is no longer processing");
                    unrecorded.remove(&item_id);
                }
                Err(e) => {
                    error!(item_id, error = %e, "still unable to record delivery receipt");
                    summary.errors += 1;
                }
            }
        }
        unrecorded.len()
    }

    async fn load_lanes(
        &self,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) -> Result<Vec<TenantLane>, CadenceError> {
        let tenant_ids = self.store.tenants_with_due(now).await?;
        let mut lanes = Vec::with_capacity(tenant_ids.len());
        for tenant_id in tenant_ids {
            let lane = async {
                let config = self.quota.ensure_tenant(&tenant_id, now).await?;
                let items = self
                    .store
                    .list_due(&tenant_id, now, self.settings.batch_size)
                    .await?;
                Ok::<_, CadenceError>(TenantLane {
                    config,
                    items: items.into(),
                })
            }
            .await;
            match lane {
                Ok(lane) if !lane.items.is_empty() => lanes.push(lane),
                Ok(_) => {}
                Err(e) => {
                    error!(tenant_id = %tenant_id, error = %e, "failed to load due items");
                    summary.errors += 1;
                }
            }
        }
        Ok(lanes)
    }

    /// Claim one item and carry it as far as the tenant's throttles allow.
    async fn process(
        &self,
        config: &mut ProspectingConfig,
        item: &QueueItem,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, CadenceError> {
        let tenant_id = item.tenant_id.as_str();

        if !self.store.claim(item.id, now).await? {
            debug!(tenant_id, item_id = item.id, "claim lost to another dispatcher");
            return Ok(ItemOutcome::ClaimConflict);
        }

        if !config.within_business_hours(now) {
            let reopen = config.next_window_start(now);
            self.store.release(item.id, Some(reopen), now).await?;
            debug!(tenant_id, item_id = item.id, %reopen, "outside business hours, rescheduled");
            return Ok(ItemOutcome::OutsideWindow);
        }

        let gap = pacing_gap(config.min_delay_seconds, config.jitter_seconds);
        let previous_send = config.last_sent_at;
        if !tenants::claim_send_slot(self.store.database(), tenant_id, now, gap).await? {
            self.store.release(item.id, None, now).await?;
            debug!(tenant_id, item_id = item.id, gap_secs = gap.as_secs(), "pacing deferred");
            return Ok(ItemOutcome::PacingDeferred);
        }
        config.last_sent_at = Some(now);

        if self.quota.reserve(tenant_id, now).await? == Reservation::QuotaExceeded {
            tenants::restore_send_slot(self.store.database(), tenant_id, now, previous_send).await?;
            config.last_sent_at = previous_send;
            self.store.release(item.id, None, now).await?;
            debug!(tenant_id, item_id = item.id, "daily quota exhausted");
            return Ok(ItemOutcome::QuotaExceeded);
        }

        match self.send(item).await {
            Ok(message_ref) => {
                self.record_sent(item, &message_ref.0, now).await;
                debug!(tenant_id, item_id = item.id, message_ref = %message_ref.0, "message sent");
                Ok(ItemOutcome::Sent)
            }
            Err(e) => self.handle_send_failure(item, e, now).await,
        }
    }

    /// Mark a delivered item `sent`, retrying the write a bounded number of
    /// times. A receipt that still cannot be written is held in memory so the
    /// item is not recovered and delivered again.
    async fn record_sent(&self, item: &QueueItem, message_ref: &str, now: DateTime<Utc>) {
        let tenant_id = item.tenant_id.as_str();
        for attempt in 1..=MARK_SENT_ATTEMPTS {
            match self.store.mark_sent(item.id, message_ref, now).await {
                Ok(true) => return,
                Ok(false) => {
                    error!(tenant_id, item_id = item.id, message_ref, "delivered item was no longer processing");
                    return;
                }
                Err(e) if attempt < MARK_SENT_ATTEMPTS => {
                    warn!(tenant_id, item_id = item.id, attempt, error = %e, "failed to record send, retrying");
                    tokio::time::sleep(MARK_SENT_BACKOFF * attempt).await;
                }
                Err(e) => {
                    error!(tenant_id, item_id = item.id, message_ref, error = %e, "delivered but not recorded, holding receipt");
                    self.unrecorded
                        .lock()
                        .await
                        .insert(item.id, message_ref.to_string());
                }
            }
        }
    }

    async fn send(&self, item: &QueueItem) -> Result<cadence_core::MessageRef, CadenceError> {
        let duration = self.settings.send_timeout;
        tokio::time::timeout(
            duration,
            self.transport
                .send(&item.contact_id, &item.content, item.message_kind),
        )
        .await
        .map_err(|_| CadenceError::Timeout { duration })?
    }

    async fn handle_send_failure(
        &self,
        item: &QueueItem,
        failure: CadenceError,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, CadenceError> {
        let tenant_id = item.tenant_id.as_str();
        // A timed-out send may still have been delivered, so it keeps its reservation.
        if !matches!(failure, CadenceError::Timeout { .. }) {
            self.quota.refund(tenant_id, now).await?;
        }

        let attempt = item.attempt_count + 1;
        let disposition = self
            .settings
            .retry
            .disposition(attempt, failure.is_permanent(), now);
        let message = failure.to_string();
        self.store
            .mark_failed(item.id, &message, disposition, now)
            .await?;

        match disposition {
            FailureDisposition::Retry { at } => {
                warn!(tenant_id, item_id = item.id, attempt, retry_at = %at, error = %message, "send failed, will retry");
                Ok(ItemOutcome::RetryScheduled)
            }
            FailureDisposition::Terminal => {
                error!(tenant_id, item_id = item.id, attempt, error = %message, "send failed permanently");
                if let Some(listener) = &self.listener {
                    let failed = self.store.get(item.id).await?;
                    if let Some(failed) = failed {
                        listener.on_terminal_failure(&failed).await;
                    }
                }
                Ok(ItemOutcome::FailedTerminal)
            }
        }
    }
}

/// Minimum gap before the next send: the tenant's delay plus a random jitter.
fn pacing_gap(min_delay_seconds: u64, jitter_seconds: u64) -> Duration {
    let jitter = if jitter_seconds == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_seconds)
    };
    Duration::from_secs(min_delay_seconds.saturating_add(jitter))
}
