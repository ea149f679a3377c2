// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete engine stack (quota, queue,
//! dispatcher, sequence engine, radar) over mock collaborators and a temp
//! SQLite database. `restart()` rebuilds every component on the same
//! database file to simulate a process restart.

use std::sync::Arc;

use cadence_core::types::{RadarCampaign, SafetySettings, Sequence, Step};
use cadence_core::{CadenceError, CampaignStatus, DeliveryListener};
use cadence_dispatch::{DispatchSettings, Dispatcher};
use cadence_quota::QuotaTracker;
use cadence_radar::{RadarScheduler, RadarSettings};
use cadence_sequence::{SequenceEngine, SequenceSettings};
use cadence_storage::queries::{campaigns, sequences};
use cadence_storage::{Database, QueueStore};
use chrono::{DateTime, NaiveTime, Utc};

use crate::mock_discovery::MockDiscovery;
use crate::mock_drafter::MockDrafter;
use crate::mock_transport::MockTransport;

/// Tenant defaults used unless the builder overrides them: a generous
/// limit, no pacing, and an always-open business window.
pub fn permissive_safety() -> SafetySettings {
    SafetySettings {
        daily_limit: 1000,
        min_delay_seconds: 0,
        jitter_seconds: 0,
        business_start: NaiveTime::MIN,
        business_end: NaiveTime::MIN,
        utc_offset_minutes: 0,
    }
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    safety: SafetySettings,
    dispatch: DispatchSettings,
    sequence: SequenceSettings,
    radar: RadarSettings,
    drafts: Vec<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            safety: permissive_safety(),
            dispatch: DispatchSettings::default(),
            sequence: SequenceSettings::default(),
            radar: RadarSettings::default(),
            drafts: Vec::new(),
        }
    }

    /// Defaults applied to tenants created during the test.
    pub fn with_safety(mut self, safety: SafetySettings) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchSettings) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_sequence(mut self, sequence: SequenceSettings) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_radar(mut self, radar: RadarSettings) -> Self {
        self.radar = radar;
        self
    }

    /// Pre-load responses for the mock drafter.
    pub fn with_drafts(mut self, drafts: Vec<String>) -> Self {
        self.drafts = drafts;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, CadenceError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| CadenceError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("cadence-test.db").to_string_lossy().to_string();
        let db = Database::open(&db_path).await?;

        let mock_transport = Arc::new(MockTransport::new());
        let mock_drafter = Arc::new(MockDrafter::with_responses(self.drafts));
        let mock_discovery = Arc::new(MockDiscovery::new());

        let components = Components::assemble(
            db,
            &self.safety,
            &self.dispatch,
            &self.sequence,
            &self.radar,
            &mock_transport,
            &mock_drafter,
            &mock_discovery,
        );

        Ok(TestHarness {
            db: components.db,
            queue: components.queue,
            quota: components.quota,
            dispatcher: components.dispatcher,
            engine: components.engine,
            radar: components.radar,
            mock_transport,
            mock_drafter,
            mock_discovery,
            safety: self.safety,
            dispatch_settings: self.dispatch,
            sequence_settings: self.sequence,
            radar_settings: self.radar,
            db_path,
            _temp_dir: temp_dir,
        })
    }
}

struct Components {
    db: Database,
    queue: QueueStore,
    quota: QuotaTracker,
    dispatcher: Dispatcher,
    engine: SequenceEngine,
    radar: RadarScheduler,
}

impl Components {
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        db: Database,
        safety: &SafetySettings,
        dispatch: &DispatchSettings,
        sequence: &SequenceSettings,
        radar: &RadarSettings,
        transport: &Arc<MockTransport>,
        drafter: &Arc<MockDrafter>,
        discovery: &Arc<MockDiscovery>,
    ) -> Self {
        let queue = QueueStore::new(db.clone());
        let quota = QuotaTracker::new(db.clone(), safety.clone());
        let engine = SequenceEngine::new(db.clone(), sequence.clone())
            .with_drafter(drafter.clone())
            .with_discovery(discovery.clone());
        let listener: Arc<dyn DeliveryListener> = Arc::new(engine.clone());
        let dispatcher = Dispatcher::new(queue.clone(), quota.clone(), transport.clone(), dispatch.clone())
            .with_listener(listener);
        let radar = RadarScheduler::new(db.clone(), engine.clone(), discovery.clone(), radar.clone());
        Self {
            db,
            queue,
            quota,
            dispatcher,
            engine,
            radar,
        }
    }
}

/// A complete test environment with mock collaborators and temp storage.
pub struct TestHarness {
    /// Database handle (temp file, removed on drop).
    pub db: Database,
    pub queue: QueueStore,
    pub quota: QuotaTracker,
    pub dispatcher: Dispatcher,
    pub engine: SequenceEngine,
    pub radar: RadarScheduler,
    pub mock_transport: Arc<MockTransport>,
    pub mock_drafter: Arc<MockDrafter>,
    pub mock_discovery: Arc<MockDiscovery>,
    safety: SafetySettings,
    dispatch_settings: DispatchSettings,
    sequence_settings: SequenceSettings,
    radar_settings: RadarSettings,
    db_path: String,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Store a sequence owned by `tenant_id`.
    pub async fn create_sequence(
        &self,
        id: &str,
        tenant_id: &str,
        steps: Vec<Step>,
        now: DateTime<Utc>,
    ) -> Result<Sequence, CadenceError> {
        let sequence = Sequence {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            name: id.to_string(),
            is_active: true,
            steps,
        };
        sequences::upsert(&self.db, &sequence, now).await?;
        Ok(sequence)
    }

    /// Store an idle radar campaign feeding `target_sequence_id`.
    pub async fn create_campaign(
        &self,
        id: &str,
        tenant_id: &str,
        target_sequence_id: &str,
        cooldown_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<RadarCampaign, CadenceError> {
        let campaign = RadarCampaign {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            target_sequence_id: target_sequence_id.to_string(),
            criteria: format!("criteria for {id}"),
            deep_enrich: false,
            status: CampaignStatus::Idle,
            last_run_at: None,
            cooldown_secs,
            cumulative_leads_found: 0,
            run_started_at: None,
        };
        campaigns::upsert(&self.db, &campaign, now).await?;
        Ok(campaign)
    }

    /// Drop every component and rebuild it on a fresh connection to the same
    /// database file. Mocks are kept, so their recorded calls survive.
    pub async fn restart(&mut self) -> Result<(), CadenceError> {
        let db = Database::open(&self.db_path).await?;
        let old = std::mem::replace(&mut self.db, db.clone());
        let components = Components::assemble(
            db,
            &self.safety,
            &self.dispatch_settings,
            &self.sequence_settings,
            &self.radar_settings,
            &self.mock_transport,
            &self.mock_drafter,
            &self.mock_discovery,
        );
        self.queue = components.queue;
        self.quota = components.quota;
        self.dispatcher = components.dispatcher;
        self.engine = components.engine;
        self.radar = components.radar;
        old.close().await
    }
}
