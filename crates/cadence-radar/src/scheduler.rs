// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign pulses.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cadence_config::model::RadarConfig;
use cadence_core::{CadenceError, LeadDiscovery, RadarCampaign};
use cadence_sequence::SequenceEngine;
use cadence_storage::queries::campaigns;
use cadence_storage::Database;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RadarSettings {
    /// Runs older than this are presumed abandoned by a crashed process.
    pub stale_run_timeout: Duration,
}

impl Default for RadarSettings {
    fn default() -> Self {
        Self {
            stale_run_timeout: Duration::from_secs(3600),
        }
    }
}

impl From<&RadarConfig> for RadarSettings {
    fn from(config: &RadarConfig) -> Self {
        Self {
            stale_run_timeout: Duration::from_secs(config.stale_run_timeout_secs),
        }
    }
}

/// Result of offering one campaign to a pulse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PulseOutcome {
    Ran { leads_found: usize, enrolled: usize },
    /// Another pulse holds the campaign, or its cooldown has not elapsed.
    CampaignOverlap,
}

/// Aggregate result of one [`RadarScheduler::pulse`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadarSummary {
    pub campaigns_run: usize,
    pub leads_found: usize,
    pub enrolled: usize,
    pub overlaps: usize,
    /// Stuck runs released at the start of the pulse.
    pub reset: usize,
    pub errors: usize,
}

impl fmt::Display for RadarSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "campaigns_run={} leads_found={} enrolled={} overlaps={} reset={} errors={}",
            self.campaigns_run, self.leads_found, self.enrolled, self.overlaps, self.reset, self.errors
        )
    }
}

/// Runs eligible radar campaigns: discover leads, enroll them in the target sequence.
#[derive(Clone)]
pub struct RadarScheduler {
    db: Database,
    engine: SequenceEngine,
    discovery: Arc<dyn LeadDiscovery>,
    settings: RadarSettings,
}

impl RadarScheduler {
    pub fn new(
        db: Database,
        engine: SequenceEngine,
        discovery: Arc<dyn LeadDiscovery>,
        settings: RadarSettings,
    ) -> Self {
        Self {
            db,
            engine,
            discovery,
            settings,
        }
    }

    /// Run every idle campaign whose cooldown has elapsed at `now`.
    pub async fn pulse(&self, now: DateTime<Utc>) -> RadarSummary {
        let mut summary = RadarSummary::default();

        let stale_before = TimeDelta::from_std(self.settings.stale_run_timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        match campaigns::reset_stale(&self.db, stale_before, now).await {
            Ok(0) => {}
            Ok(n) => {
                warn!(reset = n, "released radar campaigns stuck in running");
                summary.reset = n;
            }
            Err(e) => {
                error!(error = %e, "failed to reset stale radar runs");
                summary.errors += 1;
            }
        }

        let eligible = match campaigns::list_eligible(&self.db, now).await {
            Ok(eligible) => eligible,
            Err(e) => {
                error!(error = %e, "failed to list eligible radar campaigns");
                summary.errors += 1;
                return summary;
            }
        };

        for campaign in &eligible {
            match self.run_campaign(campaign, now).await {
                Ok(PulseOutcome::Ran {
                    leads_found,
                    enrolled,
                }) => {
                    summary.campaigns_run += 1;
                    summary.leads_found += leads_found;
                    summary.enrolled += enrolled;
                }
                Ok(PulseOutcome::CampaignOverlap) => summary.overlaps += 1,
                Err(e) => {
                    error!(campaign_id = %campaign.id, error = %e, "radar campaign failed");
                    summary.errors += 1;
                }
            }
        }

        if summary != RadarSummary::default() {
            info!(%summary, "radar pulse complete");
        }
        summary
    }

    /// Run one campaign if it can be locked.
    ///
    /// The campaign is returned to `idle` with `last_run_at` stamped whether
    /// or not discovery and enrollment succeed.
    pub async fn run_campaign(
        &self,
        campaign: &RadarCampaign,
        now: DateTime<Utc>,
    ) -> Result<PulseOutcome, CadenceError> {
        if !campaigns::try_start(&self.db, &campaign.id, now).await? {
            debug!(campaign_id = %campaign.id, "campaign already running or cooling down");
            return Ok(PulseOutcome::CampaignOverlap);
        }

        let run = self.discover_and_enroll(campaign, now).await;
        let leads_found = run.as_ref().map_or(0, |(found, _)| *found);
        let released = campaigns::finish(&self.db, &campaign.id, now, leads_found as u64, now).await?;
        if !released {
            warn!(campaign_id = %campaign.id, "run was reset before it finished");
        }

        let (leads_found, enrolled) = run?;
        info!(
            campaign_id = %campaign.id,
            tenant_id = %campaign.tenant_id,
            leads_found,
            enrolled,
            "radar campaign ran"
        );
        Ok(PulseOutcome::Ran {
            leads_found,
            enrolled,
        })
    }

    async fn discover_and_enroll(
        &self,
        campaign: &RadarCampaign,
        now: DateTime<Utc>,
    ) -> Result<(usize, usize), CadenceError> {
        let leads = self.discovery.discover(&campaign.criteria).await?;
        let enrolled = self
            .engine
            .enroll_contacts(&campaign.target_sequence_id, &leads, campaign.deep_enrich, now)
            .await?;
        Ok((leads.len(), enrolled))
    }
}

#[cfg(test)]
mod tests {
    use cadence_core::{CampaignStatus, Sequence, Step, StepContent};
    use cadence_sequence::SequenceSettings;
    use cadence_storage::queries::sequences;
    use cadence_test_utils::MockDiscovery;
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn campaign(id: &str, cooldown_secs: u64) -> RadarCampaign {
        RadarCampaign {
            id: id.into(),
            tenant_id: "t1".into(),
            target_sequence_id: "seq-1".into(),
            criteria: "industry=fintech".into(),
            deep_enrich: false,
            status: CampaignStatus::Idle,
            last_run_at: None,
            cooldown_secs,
            cumulative_leads_found: 0,
            run_started_at: None,
        }
    }

    async fn setup(discovery: Arc<MockDiscovery>) -> (Database, RadarScheduler) {
        let db = Database::open_in_memory().await.unwrap();
        sequences::upsert(
            &db,
            &Sequence {
                id: "seq-1".into(),
                tenant_id: "t1".into(),
                name: "intro".into(),
                is_active: true,
                steps: vec![Step::Message {
                    content: StepContent::Template("hi".into()),
                    message_kind: Default::default(),
                }],
            },
            t0(),
        )
        .await
        .unwrap();
        let engine = SequenceEngine::new(db.clone(), SequenceSettings::default());
        let scheduler = RadarScheduler::new(db.clone(), engine, discovery, RadarSettings::default());
        (db, scheduler)
    }

    fn leads(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn pulse_discovers_and_enrolls() {
        let discovery = Arc::new(MockDiscovery::new());
        discovery.add_leads(leads(&["a", "b", "c"])).await;
        let (db, radar) = setup(discovery.clone()).await;
        campaigns::upsert(&db, &campaign("r1", 3600), t0()).await.unwrap();

        let summary = radar.pulse(t0()).await;
        assert_eq!(summary.campaigns_run, 1);
        assert_eq!(summary.leads_found, 3);
        assert_eq!(summary.enrolled, 3);

        let stored = campaigns::get(&db, "r1").await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Idle);
        assert_eq!(stored.last_run_at, Some(t0()));
        assert_eq!(stored.cumulative_leads_found, 3);
        assert_eq!(discovery.discover_calls(), 1);
    }

    #[tokio::test]
    async fn cooldown_is_strict_and_counter_accumulates() {
        let discovery = Arc::new(MockDiscovery::new());
        discovery.add_leads(leads(&["a", "b"])).await;
        discovery.add_leads(leads(&["b", "c"])).await;
        let (db, radar) = setup(discovery.clone()).await;
        campaigns::upsert(&db, &campaign("r1", 600), t0()).await.unwrap();

        radar.pulse(t0()).await;
        assert_eq!(radar.pulse(t0() + TimeDelta::seconds(600)).await.campaigns_run, 0);
        let second = radar.pulse(t0() + TimeDelta::seconds(601)).await;
        assert_eq!(second.campaigns_run, 1);
        assert_eq!(second.enrolled, 1);

        let stored = campaigns::get(&db, "r1").await.unwrap().unwrap();
        assert_eq!(stored.cumulative_leads_found, 4);
        assert_eq!(discovery.discover_calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_pulses_run_a_campaign_once() {
        let discovery = Arc::new(MockDiscovery::new());
        discovery.set_delay(Duration::from_millis(100)).await;
        discovery.add_leads(leads(&["a"])).await;
        let (db, radar) = setup(discovery.clone()).await;
        campaigns::upsert(&db, &campaign("r1", 3600), t0()).await.unwrap();

        let (first, second) = tokio::join!(radar.pulse(t0()), radar.pulse(t0()));
        assert_eq!(first.campaigns_run + second.campaigns_run, 1);
        assert_eq!(discovery.discover_calls(), 1);
    }

    #[tokio::test]
    async fn failed_discovery_still_releases_campaign() {
        let discovery = Arc::new(MockDiscovery::new());
        discovery
            .fail_next_discover(CadenceError::Discovery {
                message: "provider unavailable".into(),
                source: None,
            })
            .await;
        let (db, radar) = setup(discovery.clone()).await;
        campaigns::upsert(&db, &campaign("r1", 3600), t0()).await.unwrap();

        let summary = radar.pulse(t0()).await;
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.campaigns_run, 0);
        let stored = campaigns::get(&db, "r1").await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Idle);
        assert_eq!(stored.last_run_at, Some(t0()));
        assert_eq!(stored.cumulative_leads_found, 0);
    }

    #[tokio::test]
    async fn inactive_target_sequence_still_enrolls() {
        let discovery = Arc::new(MockDiscovery::new());
        discovery.add_leads(leads(&["a"])).await;
        let (db, radar) = setup(discovery).await;
        campaigns::upsert(&db, &campaign("r1", 3600), t0()).await.unwrap();
        sequences::set_active(&db, "seq-1", false, t0()).await.unwrap();

        let summary = radar.pulse(t0()).await;
        assert_eq!(summary.enrolled, 1);
        let stored = campaigns::get(&db, "r1").await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Idle);
    }

    #[tokio::test]
    async fn stale_runs_are_reset_at_pulse_start() {
        let discovery = Arc::new(MockDiscovery::new());
        let (db, radar) = setup(discovery.clone()).await;
        campaigns::upsert(&db, &campaign("r1", 60), t0()).await.unwrap();
        assert!(campaigns::try_start(&db, "r1", t0()).await.unwrap());

        let soon = radar.pulse(t0() + TimeDelta::minutes(30)).await;
        assert_eq!(soon.reset, 0);
        assert_eq!(soon.campaigns_run, 0);

        let later = radar.pulse(t0() + TimeDelta::hours(2)).await;
        assert_eq!(later.reset, 1);
        assert_eq!(later.campaigns_run, 1);
    }
}
