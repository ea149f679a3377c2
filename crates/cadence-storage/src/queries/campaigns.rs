// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Radar campaigns. The `idle -> running` flip is the campaign lock.

use cadence_core::{CadenceError, RadarCampaign};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{campaign_from_row, CAMPAIGN_COLUMNS};
use crate::time::to_ms;

/// Cooldown check shared by the eligibility scan and the guarded start.
/// `now` names the parameter holding the current time in epoch ms.
fn cooldown_elapsed(now: &str) -> String {
    format!("(last_run_at IS NULL OR {now} - last_run_at > cooldown_secs * 1000)")
}

/// Insert a campaign or update its definition.
///
/// Run state (`status`, `last_run_at`, counters) is preserved on update.
pub async fn upsert(db: &Database, campaign: &RadarCampaign, now: DateTime<Utc>) -> Result<(), CadenceError> {
    let campaign = campaign.clone();
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO radar_campaigns
                 (id, tenant_id, target_sequence_id, criteria, deep_enrich, status,
                  cooldown_secs, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'idle', ?6, ?7, ?7)
                 ON CONFLICT (id) DO UPDATE SET
                     tenant_id = excluded.tenant_id,
                     target_sequence_id = excluded.target_sequence_id,
                     criteria = excluded.criteria,
                     deep_enrich = excluded.deep_enrich,
                     cooldown_secs = excluded.cooldown_secs,
                     updated_at = excluded.updated_at",
                params![
                    campaign.id,
                    campaign.tenant_id,
                    campaign.target_sequence_id,
                    campaign.criteria,
                    campaign.deep_enrich,
                    campaign.cooldown_secs as i64,
                    now_ms,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<RadarCampaign>, CadenceError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<RadarCampaign>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM radar_campaigns WHERE id = ?1"),
                params![id],
                campaign_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_for_tenant(
    db: &Database,
    tenant_id: &str,
) -> Result<Vec<RadarCampaign>, CadenceError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<RadarCampaign>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM radar_campaigns WHERE tenant_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![tenant_id], campaign_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Idle campaigns whose cooldown has elapsed at `now`.
pub async fn list_eligible(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<Vec<RadarCampaign>, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<Vec<RadarCampaign>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM radar_campaigns
                 WHERE status = 'idle' AND {}
                 ORDER BY COALESCE(last_run_at, 0) ASC, id ASC",
                cooldown_elapsed("?1")
            ))?;
            let rows = stmt.query_map(params![now_ms], campaign_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Guarded `idle -> running`, re-checking the cooldown inside the write.
///
/// Returns `false` if the campaign is already running, still cooling down,
/// or missing.
pub async fn try_start(db: &Database, id: &str, now: DateTime<Utc>) -> Result<bool, CadenceError> {
    let id = id.to_string();
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                &format!(
                    "UPDATE radar_campaigns
                     SET status = 'running', run_started_at = ?2, updated_at = ?2
                     WHERE id = ?1 AND status = 'idle' AND {}",
                    cooldown_elapsed("?2")
                ),
                params![id, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `running -> idle` for the run that started at `started_at`, stamping
/// `last_run_at` and adding `leads_found` to the cumulative counter.
pub async fn finish(
    db: &Database,
    id: &str,
    started_at: DateTime<Utc>,
    leads_found: u64,
    now: DateTime<Utc>,
) -> Result<bool, CadenceError> {
    let id = id.to_string();
    let started_ms = to_ms(started_at);
    let now_ms = to_ms(now);
    let leads = i64::try_from(leads_found).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE radar_campaigns
                 SET status = 'idle', last_run_at = ?3, run_started_at = NULL,
                     cumulative_leads_found = cumulative_leads_found + ?4, updated_at = ?3
                 WHERE id = ?1 AND status = 'running' AND run_started_at = ?2",
                params![id, started_ms, now_ms, leads],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Release campaigns stuck in `running` since before `started_before`.
///
/// The abandoned run's start time becomes `last_run_at`, so the cooldown
/// still applies.
pub async fn reset_stale(
    db: &Database,
    started_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<usize, CadenceError> {
    let cutoff = to_ms(started_before);
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE radar_campaigns
                 SET status = 'idle', last_run_at = run_started_at, run_started_at = NULL,
                     updated_at = ?2
                 WHERE status = 'running' AND run_started_at < ?1",
                params![cutoff, now_ms],
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use cadence_core::{CampaignStatus, Sequence};
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::queries::sequences;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn campaign() -> RadarCampaign {
        RadarCampaign {
            id: "radar-1".into(),
            tenant_id: "t1".into(),
            target_sequence_id: "seq-1".into(),
            criteria: "fintech cto".into(),
            deep_enrich: false,
            status: CampaignStatus::Idle,
            last_run_at: None,
            cooldown_secs: 3600,
            cumulative_leads_found: 0,
            run_started_at: None,
        }
    }

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        let seq = Sequence {
            id: "seq-1".into(),
            tenant_id: "t1".into(),
            name: "Intro".into(),
            is_active: true,
            steps: vec![],
        };
        sequences::upsert(&db, &seq, t0()).await.unwrap();
        upsert(&db, &campaign(), t0()).await.unwrap();
        db
    }

    #[tokio::test]
    async fn start_is_exclusive_and_finish_applies_cooldown() {
        let db = setup().await;
        assert_eq!(list_eligible(&db, t0()).await.unwrap().len(), 1);
        assert!(try_start(&db, "radar-1", t0()).await.unwrap());
        assert!(!try_start(&db, "radar-1", t0()).await.unwrap());
        assert!(list_eligible(&db, t0()).await.unwrap().is_empty());

        let done = t0() + TimeDelta::minutes(1);
        assert!(finish(&db, "radar-1", t0(), 4, done).await.unwrap());
        let stored = get(&db, "radar-1").await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Idle);
        assert_eq!(stored.last_run_at, Some(done));
        assert_eq!(stored.cumulative_leads_found, 4);

        // Cooldown is strict: exactly one hour later is still too early.
        assert!(!try_start(&db, "radar-1", done + TimeDelta::hours(1)).await.unwrap());
        assert!(
            try_start(&db, "radar-1", done + TimeDelta::hours(1) + TimeDelta::seconds(1))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn upsert_preserves_run_state() {
        let db = setup().await;
        assert!(try_start(&db, "radar-1", t0()).await.unwrap());
        assert!(finish(&db, "radar-1", t0(), 7, t0()).await.unwrap());

        let mut edited = campaign();
        edited.criteria = "fintech cfo".into();
        upsert(&db, &edited, t0()).await.unwrap();
        let stored = get(&db, "radar-1").await.unwrap().unwrap();
        assert_eq!(stored.criteria, "fintech cfo");
        assert_eq!(stored.cumulative_leads_found, 7);
        assert_eq!(stored.last_run_at, Some(t0()));
    }

    #[tokio::test]
    async fn stale_runs_are_released() {
        let db = setup().await;
        assert!(try_start(&db, "radar-1", t0()).await.unwrap());

        let later = t0() + TimeDelta::hours(2);
        assert_eq!(reset_stale(&db, later - TimeDelta::hours(1), later).await.unwrap(), 1);
        let stored = get(&db, "radar-1").await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Idle);
        assert_eq!(stored.last_run_at, Some(t0()));
        // The abandoned run cannot finish over the reset.
        assert!(!finish(&db, "radar-1", t0(), 1, later).await.unwrap());
        assert_eq!(list_for_tenant(&db, "t1").await.unwrap().len(), 1);
    }
}
