// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable ledger of outbound message attempts.

use cadence_core::{CadenceError, FailureDisposition, NewQueueItem, QueueItem, QueueStatus};
use chrono::{DateTime, Utc};

use crate::database::Database;
use crate::queries::queue;

/// Queue operations bound to one [`Database`].
///
/// Mutating calls return whether this caller performed the transition; a
/// `false` means the item was not in the expected state.
#[derive(Clone)]
pub struct QueueStore {
    db: Database,
}

impl QueueStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn enqueue(&self, item: NewQueueItem, now: DateTime<Utc>) -> Result<i64, CadenceError> {
        queue::enqueue(&self.db, item, now).await
    }

    pub async fn enqueue_many(
        &self,
        items: Vec<NewQueueItem>,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, CadenceError> {
        queue::enqueue_many(&self.db, items, now).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<QueueItem>, CadenceError> {
        queue::get(&self.db, id).await
    }

    pub async fn list_due(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QueueItem>, CadenceError> {
        queue::list_due(&self.db, tenant_id, now, limit).await
    }

    pub async fn tenants_with_due(&self, now: DateTime<Utc>) -> Result<Vec<String>, CadenceError> {
        queue::tenants_with_due(&self.db, now).await
    }

    pub async fn claim(&self, id: i64, now: DateTime<Utc>) -> Result<bool, CadenceError> {
        queue::claim(&self.db, id, now).await
    }

    pub async fn mark_sent(
        &self,
        id: i64,
        message_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CadenceError> {
        queue::mark_sent(&self.db, id, message_ref, now).await
    }

    pub async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        disposition: FailureDisposition,
        now: DateTime<Utc>,
    ) -> Result<bool, CadenceError> {
        queue::mark_failed(&self.db, id, error, disposition, now).await
    }

    pub async fn release(
        &self,
        id: i64,
        reschedule_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, CadenceError> {
        queue::release(&self.db, id, reschedule_at, now).await
    }

    pub async fn cancel(&self, id: i64, now: DateTime<Utc>) -> Result<bool, CadenceError> {
        queue::cancel(&self.db, id, now).await
    }

    pub async fn clear_pending(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<usize, CadenceError> {
        queue::clear_pending(&self.db, tenant_id, now).await
    }

    pub async fn recover_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, CadenceError> {
        queue::recover_stale_claims(&self.db, claimed_before, now).await
    }

    pub async fn counts_by_status(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<(QueueStatus, u64)>, CadenceError> {
        queue::counts_by_status(&self.db, tenant_id).await
    }
}
