// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cadence status` command implementation.
//!
//! Reports a tenant's quota usage, queue and sequence cursor counts, and
//! radar campaign state straight from the database.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use cadence_core::CadenceError;
use cadence_quota::QuotaTracker;
use cadence_storage::queries::{campaigns, contact_sequences, queue};
use cadence_storage::Database;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::app::App;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub tenant_id: String,
    /// `None` until the tenant's first send or safety update.
    pub quota: Option<QuotaReport>,
    pub queue: BTreeMap<String, u64>,
    pub sequences: BTreeMap<String, u64>,
    pub campaigns: Vec<CampaignReport>,
}

#[derive(Debug, Serialize)]
pub struct QuotaReport {
    pub daily_limit: u32,
    pub used_today: u32,
    pub remaining: u32,
    pub day: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct CampaignReport {
    pub id: String,
    pub status: String,
    pub target_sequence_id: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub cumulative_leads_found: u64,
}

pub async fn build_report(
    db: &Database,
    quota: &QuotaTracker,
    tenant_id: &str,
    now: DateTime<Utc>,
) -> Result<StatusReport, CadenceError> {
    let usage = quota.usage(tenant_id, now).await?.map(|u| QuotaReport {
        daily_limit: u.daily_limit,
        used_today: u.used_today,
        remaining: u.remaining,
        day: u.day_anchor,
    });
    let queue = queue::counts_by_status(db, tenant_id)
        .await?
        .into_iter()
        .map(|(status, n)| (status.to_string(), n))
        .collect();
    let sequences = contact_sequences::counts_by_status(db, tenant_id)
        .await?
        .into_iter()
        .map(|(status, n)| (status.to_string(), n))
        .collect();
    let campaigns = campaigns::list_for_tenant(db, tenant_id)
        .await?
        .into_iter()
        .map(|c| CampaignReport {
            id: c.id,
            status: c.status.to_string(),
            target_sequence_id: c.target_sequence_id,
            last_run_at: c.last_run_at,
            cumulative_leads_found: c.cumulative_leads_found,
        })
        .collect();

    Ok(StatusReport {
        tenant_id: tenant_id.to_string(),
        quota: usage,
        queue,
        sequences,
        campaigns,
    })
}

fn render_counts(counts: &BTreeMap<String, u64>) -> String {
    if counts.is_empty() {
        return "none".to_string();
    }
    counts
        .iter()
        .map(|(status, n)| format!("{status}={n}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render_plain(report: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "tenant:     {}", report.tenant_id);
    match &report.quota {
        Some(q) => {
            let _ = writeln!(
                out,
                "quota:      {}/{} used on {} ({} remaining)",
                q.used_today, q.daily_limit, q.day, q.remaining
            );
        }
        None => {
            let _ = writeln!(out, "quota:      not configured (defaults apply on first send)");
        }
    }
    let _ = writeln!(out, "queue:      {}", render_counts(&report.queue));
    let _ = writeln!(out, "sequences:  {}", render_counts(&report.sequences));
    if report.campaigns.is_empty() {
        let _ = writeln!(out, "campaigns:  none");
    }
    for c in &report.campaigns {
        let last = c
            .last_run_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        let _ = writeln!(
            out,
            "campaign:   {} [{}] -> {} last_run={} leads={}",
            c.id, c.status, c.target_sequence_id, last, c.cumulative_leads_found
        );
    }
    out
}

/// Run the `cadence status` command.
pub async fn run_status(
    app: &App,
    tenant_id: &str,
    json: bool,
    now: DateTime<Utc>,
) -> Result<(), CadenceError> {
    let report = build_report(&app.db, &app.quota, tenant_id, now).await?;
    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| CadenceError::Internal(format!("failed to serialize status: {e}")))?;
        println!("{rendered}");
    } else {
        print!("{}", render_plain(&report));
    }
    Ok(())
}
