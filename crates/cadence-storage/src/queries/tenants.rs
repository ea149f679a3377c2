// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant prospecting configuration: quota counter, pacing stamp, throttles.
//!
//! The tenant-local date is computed inside SQLite from the row's own
//! `utc_offset_minutes`, so day rollover and the quota check happen in the
//! same statement.

use std::time::Duration;

use cadence_core::{CadenceError, ProspectingConfig, SafetySettings, SafetyUpdate};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{config_from_row, CONFIG_COLUMNS};
use crate::time::{format_clock, format_date, to_ms};

/// Tenant-local calendar date of the epoch-ms parameter `?2`.
const LOCAL_TODAY: &str = "date(?2 / 1000, 'unixepoch', utc_offset_minutes || ' minutes')";

/// Create the tenant's row from `defaults` unless it already exists, then return it.
pub async fn ensure(
    db: &Database,
    tenant_id: &str,
    defaults: &SafetySettings,
    now: DateTime<Utc>,
) -> Result<ProspectingConfig, CadenceError> {
    let tenant_id = tenant_id.to_string();
    let anchor = format_date(cadence_core::types::local_time(now, defaults.utc_offset_minutes).date());
    let start = format_clock(defaults.business_start);
    let end = format_clock(defaults.business_end);
    let defaults = defaults.clone();
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<ProspectingConfig, rusqlite::Error> {
            conn.execute(
                "INSERT OR IGNORE INTO prospecting_config
                 (tenant_id, daily_limit, current_day_count, day_anchor, min_delay_seconds,
                  jitter_seconds, business_start, business_end, utc_offset_minutes, updated_at)
                 VALUES (?1, ?2, 0, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    tenant_id,
                    defaults.daily_limit,
                    anchor,
                    defaults.min_delay_seconds as i64,
                    defaults.jitter_seconds as i64,
                    start,
                    end,
                    defaults.utc_offset_minutes,
                    now_ms,
                ],
            )?;
            conn.query_row(
                &format!("SELECT {CONFIG_COLUMNS} FROM prospecting_config WHERE tenant_id = ?1"),
                params![tenant_id],
                config_from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, tenant_id: &str) -> Result<Option<ProspectingConfig>, CadenceError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ProspectingConfig>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {CONFIG_COLUMNS} FROM prospecting_config WHERE tenant_id = ?1"),
                params![tenant_id],
                config_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically take one unit of today's quota.
///
/// Resets the counter first when the tenant-local date has moved past
/// `day_anchor`. Returns the new `(current_day_count, daily_limit)`, or
/// `None` when the tenant is at its limit or unknown.
pub async fn reserve(
    db: &Database,
    tenant_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<(u32, u32)>, CadenceError> {
    let tenant_id = tenant_id.to_string();
    let sql = format!(
        "UPDATE prospecting_config
         SET current_day_count = CASE WHEN day_anchor < {LOCAL_TODAY} THEN 1
                                      ELSE current_day_count + 1 END,
             day_anchor = MAX(day_anchor, {LOCAL_TODAY}),
             updated_at = ?2
         WHERE tenant_id = ?1
           AND (CASE WHEN day_anchor < {LOCAL_TODAY} THEN 0
                     ELSE current_day_count END) < daily_limit
         RETURNING current_day_count, daily_limit"
    );
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<Option<(u32, u32)>, rusqlite::Error> {
            conn.query_row(&sql, params![tenant_id, now_ms], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Give back one unit reserved earlier the same tenant-local day.
pub async fn refund(db: &Database, tenant_id: &str, now: DateTime<Utc>) -> Result<bool, CadenceError> {
    let tenant_id = tenant_id.to_string();
    let sql = format!(
        "UPDATE prospecting_config
         SET current_day_count = current_day_count - 1, updated_at = ?2
         WHERE tenant_id = ?1 AND current_day_count > 0 AND day_anchor = {LOCAL_TODAY}"
    );
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            Ok(conn.execute(&sql, params![tenant_id, now_ms])? == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrite the tenant's throttles, clamping today's count to the new limit.
///
/// Returns `false` if the tenant has no configuration row.
pub async fn update_safety(
    db: &Database,
    tenant_id: &str,
    update: &SafetyUpdate,
    now: DateTime<Utc>,
) -> Result<bool, CadenceError> {
    let tenant_id = tenant_id.to_string();
    let (start, end) = match update.business_hours {
        Some((s, e)) => (Some(format_clock(s)), Some(format_clock(e))),
        None => (None, None),
    };
    let update = update.clone();
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE prospecting_config
                 SET daily_limit = ?2,
                     current_day_count = MIN(current_day_count, ?2),
                     min_delay_seconds = ?3,
                     jitter_seconds = ?4,
                     business_start = COALESCE(?5, business_start),
                     business_end = COALESCE(?6, business_end),
                     utc_offset_minutes = COALESCE(?7, utc_offset_minutes),
                     updated_at = ?8
                 WHERE tenant_id = ?1",
                params![
                    tenant_id,
                    update.daily_limit,
                    update.min_delay_seconds as i64,
                    update.jitter_seconds as i64,
                    start,
                    end,
                    update.utc_offset_minutes,
                    now_ms,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Take the tenant's send slot if at least `min_gap` has passed since the last one.
///
/// Stamps `last_sent_at = now` on success, so two dispatchers racing for the
/// same tenant cannot both pass the pacing check.
pub async fn claim_send_slot(
    db: &Database,
    tenant_id: &str,
    now: DateTime<Utc>,
    min_gap: Duration,
) -> Result<bool, CadenceError> {
    let tenant_id = tenant_id.to_string();
    let now_ms = to_ms(now);
    let gap_ms = i64::try_from(min_gap.as_millis()).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE prospecting_config SET last_sent_at = ?2, updated_at = ?2
                 WHERE tenant_id = ?1 AND (last_sent_at IS NULL OR ?2 - last_sent_at >= ?3)",
                params![tenant_id, now_ms, gap_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Undo a [`claim_send_slot`] whose send never started.
///
/// Only restores `previous` if nobody has taken the slot since `claimed_at`.
pub async fn restore_send_slot(
    db: &Database,
    tenant_id: &str,
    claimed_at: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
) -> Result<bool, CadenceError> {
    let tenant_id = tenant_id.to_string();
    let claimed_ms = to_ms(claimed_at);
    let previous_ms = previous.map(to_ms);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE prospecting_config SET last_sent_at = ?3
                 WHERE tenant_id = ?1 AND last_sent_at = ?2",
                params![tenant_id, claimed_ms, previous_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}
