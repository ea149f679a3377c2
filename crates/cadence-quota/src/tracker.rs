// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quota reservation, refund, and throttle updates.

use cadence_core::{CadenceError, ProspectingConfig, SafetySettings, SafetyUpdate};
use cadence_storage::queries::tenants;
use cadence_storage::Database;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

/// Widest real-world UTC offset, +14:00.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Outcome of a quota reservation. Exhaustion is expected, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Allowed,
    QuotaExceeded,
}

/// Read-only snapshot of a tenant's quota for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaUsage {
    pub tenant_id: String,
    pub daily_limit: u32,
    /// Sends counted against the current tenant-local day.
    pub used_today: u32,
    pub remaining: u32,
    pub day_anchor: NaiveDate,
}

/// Enforces each tenant's daily send limit.
///
/// Tenants without a configuration row are created from `defaults` on first use.
#[derive(Clone)]
pub struct QuotaTracker {
    db: Database,
    defaults: SafetySettings,
}

impl QuotaTracker {
    pub fn new(db: Database, defaults: SafetySettings) -> Self {
        Self { db, defaults }
    }

    /// The tenant's configuration, creating it from defaults if absent.
    pub async fn ensure_tenant(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProspectingConfig, CadenceError> {
        tenants::ensure(&self.db, tenant_id, &self.defaults, now).await
    }

    /// Take one send from today's quota.
    pub async fn reserve(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Reservation, CadenceError> {
        let mut reserved = tenants::reserve(&self.db, tenant_id, now).await?;
        if reserved.is_none() && tenants::get(&self.db, tenant_id).await?.is_none() {
            self.ensure_tenant(tenant_id, now).await?;
            reserved = tenants::reserve(&self.db, tenant_id, now).await?;
        }

        match reserved {
            Some((used, limit)) => {
                // Warn once, on the reservation that crosses the threshold.
                if crosses_warning_threshold(used, limit) {
                    warn!(
                        tenant_id,
                        used_today = used,
                        daily_limit = limit,
                        "approaching daily send limit (80%+)"
                    );
                }
                Ok(Reservation::Allowed)
            }
            None => {
                debug!(tenant_id, "daily send limit reached");
                Ok(Reservation::QuotaExceeded)
            }
        }
    }

    /// Return a reservation whose send did not go out.
    ///
    /// A reservation made on a previous tenant-local day is not refunded.
    pub async fn refund(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<bool, CadenceError> {
        tenants::refund(&self.db, tenant_id, now).await
    }

    /// Apply an operator change to a tenant's throttles and return the result.
    ///
    /// If the new limit is below today's count, the count is lowered to it.
    pub async fn update_safety_config(
        &self,
        tenant_id: &str,
        update: &SafetyUpdate,
        now: DateTime<Utc>,
    ) -> Result<ProspectingConfig, CadenceError> {
        if let Some(offset) = update
            .utc_offset_minutes
            .filter(|offset| offset.abs() > MAX_UTC_OFFSET_MINUTES)
        {
            return Err(CadenceError::Config(format!(
                "utc offset must be within +/-{MAX_UTC_OFFSET_MINUTES} minutes, got {offset}"
            )));
        }
        self.ensure_tenant(tenant_id, now).await?;
        if !tenants::update_safety(&self.db, tenant_id, update, now).await? {
            return Err(CadenceError::not_found("tenant", tenant_id));
        }
        let config = tenants::get(&self.db, tenant_id)
            .await?
            .ok_or_else(|| CadenceError::not_found("tenant", tenant_id))?;
        info!(
            tenant_id,
            daily_limit = config.daily_limit,
            min_delay_seconds = config.min_delay_seconds,
            jitter_seconds = config.jitter_seconds,
            "safety config updated"
        );
        Ok(config)
    }

    /// Today's usage, or `None` for a tenant that has never been configured.
    pub async fn usage(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<QuotaUsage>, CadenceError> {
        Ok(tenants::get(&self.db, tenant_id)
            .await?
            .map(|config| usage_at(&config, now)))
    }
}

/// Usage as of `now`: a counter anchored on an earlier day counts as zero.
fn usage_at(config: &ProspectingConfig, now: DateTime<Utc>) -> QuotaUsage {
    let today = config.local_time(now).date();
    let used_today = if config.day_anchor < today {
        0
    } else {
        config.current_day_count
    };
    QuotaUsage {
        tenant_id: config.tenant_id.clone(),
        daily_limit: config.daily_limit,
        used_today,
        remaining: config.daily_limit.saturating_sub(used_today),
        day_anchor: config.day_anchor,
    }
}

fn crosses_warning_threshold(used: u32, limit: u32) -> bool {
    let threshold = |n: u32| u64::from(n) * 5 >= u64::from(limit) * 4;
    limit > 0 && threshold(used) && (used == 0 || !threshold(used - 1))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeDelta, TimeZone};
    use tracing_test::traced_test;

    use super::*;

    fn defaults(limit: u32) -> SafetySettings {
        SafetySettings {
            daily_limit: limit,
            min_delay_seconds: 0,
            jitter_seconds: 0,
            business_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            business_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            utc_offset_minutes: 0,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    async fn tracker(limit: u32) -> QuotaTracker {
        QuotaTracker::new(Database::open_in_memory().await.unwrap(), defaults(limit))
    }

    #[tokio::test]
    async fn unknown_tenant_is_created_on_first_reserve() {
        let quota = tracker(2).await;
        assert_eq!(quota.reserve("t1", t0()).await.unwrap(), Reservation::Allowed);
        assert_eq!(quota.reserve("t1", t0()).await.unwrap(), Reservation::Allowed);
        assert_eq!(
            quota.reserve("t1", t0()).await.unwrap(),
            Reservation::QuotaExceeded
        );
        let usage = quota.usage("t1", t0()).await.unwrap().unwrap();
        assert_eq!(usage.used_today, 2);
        assert_eq!(usage.remaining, 0);
    }

    #[tokio::test]
    async fn usage_reads_zero_after_rollover() {
        let quota = tracker(3).await;
        quota.reserve("t1", t0()).await.unwrap();
        let tomorrow = t0() + TimeDelta::days(1);
        let usage = quota.usage("t1", tomorrow).await.unwrap().unwrap();
        assert_eq!(usage.used_today, 0);
        assert_eq!(usage.remaining, 3);
        assert!(quota.usage("nobody", t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_limit_blocks_everything() {
        let quota = tracker(0).await;
        assert_eq!(
            quota.reserve("t1", t0()).await.unwrap(),
            Reservation::QuotaExceeded
        );
    }

    #[tokio::test]
    async fn refund_restores_capacity() {
        let quota = tracker(1).await;
        assert_eq!(quota.reserve("t1", t0()).await.unwrap(), Reservation::Allowed);
        assert!(quota.refund("t1", t0()).await.unwrap());
        assert_eq!(quota.reserve("t1", t0()).await.unwrap(), Reservation::Allowed);
    }

    #[tokio::test]
    async fn update_rejects_offset_beyond_fourteen_hours() {
        let quota = tracker(10).await;
        let update = SafetyUpdate {
            daily_limit: 10,
            utc_offset_minutes: Some(900),
            ..SafetyUpdate::default()
        };
        let err = quota.update_safety_config("t1", &update, t0()).await.unwrap_err();
        assert!(matches!(err, CadenceError::Config(_)));
        assert!(quota.usage("t1", t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_clamps_count_to_new_limit() {
        let quota = tracker(10).await;
        for _ in 0..5 {
            quota.reserve("t1", t0()).await.unwrap();
        }
        let update = SafetyUpdate {
            daily_limit: 3,
            min_delay_seconds: 240,
            jitter_seconds: 15,
            business_hours: Some((
                NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            )),
            utc_offset_minutes: Some(-300),
        };
        let config = quota.update_safety_config("t1", &update, t0()).await.unwrap();
        assert_eq!(config.daily_limit, 3);
        assert_eq!(config.current_day_count, 3);
        assert_eq!(config.min_delay_seconds, 240);
        assert_eq!(config.utc_offset_minutes, -300);
        assert_eq!(config.business_end, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert_eq!(
            quota.reserve("t1", t0()).await.unwrap(),
            Reservation::QuotaExceeded
        );
    }

    #[tokio::test]
    async fn update_creates_missing_tenant() {
        let quota = tracker(10).await;
        let update = SafetyUpdate {
            daily_limit: 7,
            ..SafetyUpdate::default()
        };
        let config = quota.update_safety_config("fresh", &update, t0()).await.unwrap();
        assert_eq!(config.daily_limit, 7);
        assert_eq!(config.current_day_count, 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn warns_once_when_crossing_eighty_percent() {
        let quota = tracker(5).await;
        for _ in 0..3 {
            quota.reserve("t1", t0()).await.unwrap();
        }
        assert!(!logs_contain("approaching daily send limit"));
        quota.reserve("t1", t0()).await.unwrap();
        assert!(logs_contain("approaching daily send limit"));
    }

    #[test]
    fn warning_threshold_fires_exactly_once() {
        let crossings: Vec<u32> = (1..=10).filter(|&n| crosses_warning_threshold(n, 10)).collect();
        assert_eq!(crossings, vec![8]);
        assert!(crosses_warning_threshold(1, 1));
        assert!(!crosses_warning_threshold(0, 0));
    }
}
