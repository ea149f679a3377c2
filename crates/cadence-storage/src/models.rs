// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row decoding for the domain types stored in SQLite.
//!
//! Each `*_COLUMNS` constant lists the columns its decoder expects, in order.

use cadence_core::{
    ContactContext, ContactSequence, ProspectingConfig, QueueItem, RadarCampaign, Sequence, Step,
};
use rusqlite::types::Type;
use rusqlite::Row;

use crate::time::{clock, count, date, opt_ts, parse_col, ts};

pub(crate) const CONFIG_COLUMNS: &str = "tenant_id, daily_limit, current_day_count, day_anchor, \
     min_delay_seconds, jitter_seconds, business_start, business_end, utc_offset_minutes, last_sent_at";

pub(crate) fn config_from_row(row: &Row<'_>) -> rusqlite::Result<ProspectingConfig> {
    Ok(ProspectingConfig {
        tenant_id: row.get(0)?,
        daily_limit: row.get(1)?,
        current_day_count: row.get(2)?,
        day_anchor: date(row, 3)?,
        min_delay_seconds: count(row, 4)?,
        jitter_seconds: count(row, 5)?,
        business_start: clock(row, 6)?,
        business_end: clock(row, 7)?,
        utc_offset_minutes: row.get(8)?,
        last_sent_at: opt_ts(row, 9)?,
    })
}

pub(crate) const QUEUE_COLUMNS: &str = "id, tenant_id, contact_id, contact_sequence_id, content, \
     message_kind, status, scheduled_at, claimed_at, attempt_count, error_log, message_ref, \
     sent_at, created_at";

pub(crate) fn queue_item_from_row(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    Ok(QueueItem {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        contact_id: row.get(2)?,
        contact_sequence_id: row.get(3)?,
        content: row.get(4)?,
        message_kind: parse_col(row, 5)?,
        status: parse_col(row, 6)?,
        scheduled_at: ts(row, 7)?,
        claimed_at: opt_ts(row, 8)?,
        attempt_count: row.get(9)?,
        error_log: row.get(10)?,
        message_ref: row.get(11)?,
        sent_at: opt_ts(row, 12)?,
        created_at: ts(row, 13)?,
    })
}

pub(crate) const SEQUENCE_COLUMNS: &str = "id, tenant_id, name, is_active, steps";

pub(crate) fn sequence_from_row(row: &Row<'_>) -> rusqlite::Result<Sequence> {
    let steps: String = row.get(4)?;
    let steps: Vec<Step> = serde_json::from_str(&steps)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(Sequence {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        is_active: row.get(3)?,
        steps,
    })
}

pub(crate) const CONTACT_SEQUENCE_COLUMNS: &str = "id, tenant_id, contact_id, sequence_id, \
     current_step_index, status, next_action_at, contact_context, last_error, enrolled_at";

pub(crate) fn contact_sequence_from_row(row: &Row<'_>) -> rusqlite::Result<ContactSequence> {
    let context: String = row.get(7)?;
    let contact_context: ContactContext = serde_json::from_str(&context)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
    Ok(ContactSequence {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        contact_id: row.get(2)?,
        sequence_id: row.get(3)?,
        current_step_index: row.get(4)?,
        status: parse_col(row, 5)?,
        next_action_at: ts(row, 6)?,
        contact_context,
        last_error: row.get(8)?,
        enrolled_at: ts(row, 9)?,
    })
}

pub(crate) const CAMPAIGN_COLUMNS: &str = "id, tenant_id, target_sequence_id, criteria, deep_enrich, \
     status, last_run_at, cooldown_secs, cumulative_leads_found, run_started_at";

pub(crate) fn campaign_from_row(row: &Row<'_>) -> rusqlite::Result<RadarCampaign> {
    Ok(RadarCampaign {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        target_sequence_id: row.get(2)?,
        criteria: row.get(3)?,
        deep_enrich: row.get(4)?,
        status: parse_col(row, 5)?,
        last_run_at: opt_ts(row, 6)?,
        cooldown_secs: count(row, 7)?,
        cumulative_leads_found: count(row, 8)?,
        run_started_at: opt_ts(row, 9)?,
    })
}
