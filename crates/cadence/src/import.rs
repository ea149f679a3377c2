// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cadence import` command implementation.
//!
//! Reads sequences and radar campaigns from a TOML file:
//!
//! ```toml
//! [[sequences]]
//! id = "intro"
//! tenant_id = "acme"
//! name = "Intro"
//!
//! [[sequences.steps]]
//! kind = "message"
//! content = { template = "Hi {{first_name}}" }
//!
//! [[campaigns]]
//! id = "fintech-cto"
//! tenant_id = "acme"
//! target_sequence_id = "intro"
//! criteria = "role=cto industry=fintech"
//! cooldown_secs = 86400
//! ```

use std::collections::HashMap;
use std::path::Path;

use cadence_core::{CadenceError, CampaignStatus, RadarCampaign, Sequence};
use cadence_storage::queries::{campaigns, sequences};
use cadence_storage::Database;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::app::App;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportFile {
    #[serde(default)]
    pub sequences: Vec<Sequence>,
    #[serde(default)]
    pub campaigns: Vec<CampaignDef>,
}

/// Operator-supplied campaign definition. Run state is never imported.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignDef {
    pub id: String,
    pub tenant_id: String,
    pub target_sequence_id: String,
    pub criteria: String,
    #[serde(default)]
    pub deep_enrich: bool,
    pub cooldown_secs: u64,
}

impl CampaignDef {
    fn to_campaign(&self) -> RadarCampaign {
        RadarCampaign {
            id: self.id.clone(),
            tenant_id: self.tenant_id.clone(),
            target_sequence_id: self.target_sequence_id.clone(),
            criteria: self.criteria.clone(),
            deep_enrich: self.deep_enrich,
            status: CampaignStatus::Idle,
            last_run_at: None,
            cooldown_secs: self.cooldown_secs,
            cumulative_leads_found: 0,
            run_started_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub sequences: usize,
    pub campaigns: usize,
}

pub fn parse_import(content: &str) -> Result<ImportFile, CadenceError> {
    toml::from_str(content).map_err(|e| CadenceError::Config(format!("invalid import file: {e}")))
}

/// Checks the file and writes it. Nothing is written if any entry is invalid.
///
/// A campaign must target a sequence of the same tenant, defined either in
/// the file or already stored.
pub async fn apply_import(
    db: &Database,
    file: &ImportFile,
    now: DateTime<Utc>,
) -> Result<ImportReport, CadenceError> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for sequence in &file.sequences {
        if sequence.id.trim().is_empty() || sequence.tenant_id.trim().is_empty() {
            return Err(CadenceError::Config(
                "sequence id and tenant_id must not be empty".into(),
            ));
        }
        if owners.insert(&sequence.id, &sequence.tenant_id).is_some() {
            return Err(CadenceError::Config(format!(
                "sequence `{}` is defined more than once",
                sequence.id
            )));
        }
    }

    for def in &file.campaigns {
        let owner = match owners.get(def.target_sequence_id.as_str()) {
            Some(tenant) => (*tenant).to_string(),
            None => sequences::get(db, &def.target_sequence_id)
                .await?
                .map(|s| s.tenant_id)
                .ok_or_else(|| CadenceError::not_found("sequence", &def.target_sequence_id))?,
        };
        if owner != def.tenant_id {
            return Err(CadenceError::Config(format!(
                "campaign `{}` belongs to tenant `{}` but targets sequence `{}` of tenant `{owner}`",
                def.id, def.tenant_id, def.target_sequence_id
            )));
        }
    }

    for sequence in &file.sequences {
        sequences::upsert(db, sequence, now).await?;
    }
    for def in &file.campaigns {
        campaigns::upsert(db, &def.to_campaign(), now).await?;
    }

    let report = ImportReport {
        sequences: file.sequences.len(),
        campaigns: file.campaigns.len(),
    };
    info!(
        sequences = report.sequences,
        campaigns = report.campaigns,
        "import applied"
    );
    Ok(report)
}

pub async fn run_import(app: &App, path: &Path, now: DateTime<Utc>) -> Result<(), CadenceError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CadenceError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    let file = parse_import(&content)?;
    let report = apply_import(&app.db, &file, now).await?;
    println!(
        "imported {} sequence(s) and {} campaign(s) from {}",
        report.sequences,
        report.campaigns,
        path.display()
    );
    Ok(())
}
