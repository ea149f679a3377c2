// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Enrollment and cursor advancement.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cadence_config::model::SequenceConfig;
use cadence_core::{
    CadenceError, ContactContext, ContactSequence, ContactSequenceStatus, DeliveryListener,
    Drafter, LeadDiscovery, NewQueueItem, QueueItem, Sequence, Step, StepContent,
};
use cadence_storage::queries::{contact_sequences, sequences};
use cadence_storage::Database;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};

use crate::template::render;

#[derive(Debug, Clone)]
pub struct SequenceSettings {
    /// Due cursors advanced per `run_due` call.
    pub batch_size: u32,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self { batch_size: 200 }
    }
}

impl From<&SequenceConfig> for SequenceSettings {
    fn from(config: &SequenceConfig) -> Self {
        Self {
            batch_size: config.batch_size,
        }
    }
}

/// Result of advancing a single cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A message step was rendered and queued.
    Enqueued { item_id: i64 },
    /// A wait step put the cursor to sleep.
    Waiting { until: DateTime<Utc> },
    Completed,
    /// The message could not be rendered or drafted; the cursor is now `failed`.
    Failed { reason: String },
    /// The cursor or its sequence is not active; nothing changed.
    Inactive,
    /// Another invocation moved the cursor first.
    Stale,
}

/// Aggregate result of one [`SequenceEngine::run_due`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvanceSummary {
    pub enqueued: usize,
    pub waiting: usize,
    pub completed: usize,
    pub failed: usize,
    pub inactive: usize,
    pub stale: usize,
    /// Cursors halted because one of their queue items failed terminally.
    pub reconciled: usize,
    pub errors: usize,
}

impl AdvanceSummary {
    fn record(&mut self, outcome: &AdvanceOutcome) {
        match outcome {
            AdvanceOutcome::Enqueued { .. } => self.enqueued += 1,
            AdvanceOutcome::Waiting { .. } => self.waiting += 1,
            AdvanceOutcome::Completed => self.completed += 1,
            AdvanceOutcome::Failed { .. } => self.failed += 1,
            AdvanceOutcome::Inactive => self.inactive += 1,
            AdvanceOutcome::Stale => self.stale += 1,
        }
    }
}

impl fmt::Display for AdvanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "enqueued={} waiting={} completed={} failed={} inactive={} stale={} reconciled={} errors={}",
            self.enqueued,
            self.waiting,
            self.completed,
            self.failed,
            self.inactive,
            self.stale,
            self.reconciled,
            self.errors
        )
    }
}

/// Moves enrolled contacts through their sequences.
#[derive(Clone)]
pub struct SequenceEngine {
    db: Database,
    drafter: Option<Arc<dyn Drafter>>,
    discovery: Option<Arc<dyn LeadDiscovery>>,
    settings: SequenceSettings,
}

impl SequenceEngine {
    pub fn new(db: Database, settings: SequenceSettings) -> Self {
        Self {
            db,
            drafter: None,
            discovery: None,
            settings,
        }
    }

    pub fn with_drafter(mut self, drafter: Arc<dyn Drafter>) -> Self {
        self.drafter = Some(drafter);
        self
    }

    /// Source of contact context for deep enrollment.
    pub fn with_discovery(mut self, discovery: Arc<dyn LeadDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Enroll contacts at step 0, due immediately.
    ///
    /// Contacts already enrolled in the sequence are skipped. Returns the
    /// number of new enrollments.
    pub async fn enroll_contacts(
        &self,
        sequence_id: &str,
        contact_ids: &[String],
        deep_enrich: bool,
        now: DateTime<Utc>,
    ) -> Result<usize, CadenceError> {
        let sequence = sequences::get(&self.db, sequence_id)
            .await?
            .ok_or_else(|| CadenceError::not_found("sequence", sequence_id))?;

        let mut seen = HashSet::new();
        let unique: Vec<&String> = contact_ids
            .iter()
            .filter(|id| !id.trim().is_empty() && seen.insert(id.as_str()))
            .collect();

        let mut contacts = Vec::with_capacity(unique.len());
        for contact_id in unique {
            let context = if deep_enrich {
                self.enrich(contact_id).await
            } else {
                ContactContext::new()
            };
            contacts.push((contact_id.clone(), context));
        }

        let requested = contacts.len();
        let created =
            contact_sequences::enroll(&self.db, &sequence.tenant_id, &sequence.id, contacts, now)
                .await?;
        info!(
            tenant_id = %sequence.tenant_id,
            sequence_id = %sequence.id,
            requested,
            created,
            "contacts enrolled"
        );
        Ok(created)
    }

    /// Enrichment is best effort: a failure enrolls the contact without context.
    async fn enrich(&self, contact_id: &str) -> ContactContext {
        let Some(discovery) = &self.discovery else {
            warn!(contact_id, "deep enrichment requested but no discovery adapter is configured");
            return ContactContext::new();
        };
        match discovery.enrich(contact_id).await {
            Ok(context) => context,
            Err(e) => {
                warn!(contact_id, error = %e, "enrichment failed, enrolling without context");
                ContactContext::new()
            }
        }
    }

    /// Perform the cursor's current step.
    ///
    /// Every write is guarded on the cursor's step index, so calling this
    /// twice for the same observed cursor has the effect of calling it once.
    pub async fn advance(
        &self,
        cursor: &ContactSequence,
        now: DateTime<Utc>,
    ) -> Result<AdvanceOutcome, CadenceError> {
        match sequences::get(&self.db, &cursor.sequence_id).await? {
            Some(sequence) => self.advance_in(cursor, &sequence, now).await,
            None => {
                let reason = format!("sequence {} no longer exists", cursor.sequence_id);
                self.halt(cursor, reason, now).await
            }
        }
    }

    async fn advance_in(
        &self,
        cursor: &ContactSequence,
        sequence: &Sequence,
        now: DateTime<Utc>,
    ) -> Result<AdvanceOutcome, CadenceError> {
        if cursor.status != ContactSequenceStatus::Active || !sequence.is_active {
            return Ok(AdvanceOutcome::Inactive);
        }

        let index = cursor.current_step_index;
        let outcome = match sequence.steps.get(index as usize) {
            None => {
                if contact_sequences::complete(&self.db, cursor.id, index, now).await? {
                    info!(cursor_id = cursor.id, contact_id = %cursor.contact_id, "sequence completed");
                    AdvanceOutcome::Completed
                } else {
                    AdvanceOutcome::Stale
                }
            }
            Some(Step::Message {
                content,
                message_kind,
            }) => {
                let text = match self.compose(content, cursor).await {
                    Ok(text) => text,
                    Err(e) => return self.halt(cursor, e.to_string(), now).await,
                };
                let item = NewQueueItem {
                    tenant_id: cursor.tenant_id.clone(),
                    contact_id: cursor.contact_id.clone(),
                    contact_sequence_id: Some(cursor.id),
                    content: text,
                    message_kind: *message_kind,
                    scheduled_at: now,
                };
                match contact_sequences::commit_message_step(&self.db, cursor.id, index, item, now)
                    .await?
                {
                    Some(item_id) => AdvanceOutcome::Enqueued { item_id },
                    None => AdvanceOutcome::Stale,
                }
            }
            Some(Step::Wait { duration_secs }) => {
                let until = i64::try_from(*duration_secs)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|wait| now.checked_add_signed(wait));
                let Some(until) = until else {
                    return self
                        .halt(cursor, format!("wait of {duration_secs}s is out of range"), now)
                        .await;
                };
                if contact_sequences::advance_wait(&self.db, cursor.id, index, until, now).await? {
                    AdvanceOutcome::Waiting { until }
                } else {
                    AdvanceOutcome::Stale
                }
            }
        };

        debug!(cursor_id = cursor.id, step = index, ?outcome, "cursor advanced");
        Ok(outcome)
    }

    async fn compose(
        &self,
        content: &StepContent,
        cursor: &ContactSequence,
    ) -> Result<String, CadenceError> {
        match content {
            StepContent::Template(template) => {
                render(template, &cursor.contact_context, &cursor.contact_id)
            }
            StepContent::AiPrompt(prompt) => {
                let drafter = self.drafter.as_ref().ok_or_else(|| CadenceError::Draft {
                    message: "no drafter configured".into(),
                    source: None,
                })?;
                let mut context = cursor.contact_context.clone();
                context
                    .entry(crate::template::CONTACT_ID_VAR.to_string())
                    .or_insert_with(|| cursor.contact_id.clone());
                drafter.draft(prompt, &context).await
            }
        }
    }

    async fn halt(
        &self,
        cursor: &ContactSequence,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<AdvanceOutcome, CadenceError> {
        contact_sequences::fail(&self.db, cursor.id, &reason, now).await?;
        warn!(
            cursor_id = cursor.id,
            contact_id = %cursor.contact_id,
            sequence_id = %cursor.sequence_id,
            reason = %reason,
            "sequence halted"
        );
        Ok(AdvanceOutcome::Failed { reason })
    }

    /// Advance every active cursor whose wake time is at or before `now`.
    ///
    /// Starts by halting cursors that own a terminally failed queue item.
    /// Errors on individual cursors are logged and counted.
    pub async fn run_due(&self, now: DateTime<Utc>) -> AdvanceSummary {
        let mut summary = AdvanceSummary::default();

        match contact_sequences::reconcile_failed(&self.db, now).await {
            Ok(n) => summary.reconciled = n,
            Err(e) => {
                error!(error = %e, "failed to reconcile failed deliveries");
                summary.errors += 1;
            }
        }

        let due = match contact_sequences::list_due(&self.db, now, self.settings.batch_size).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "failed to list due sequence cursors");
                summary.errors += 1;
                return summary;
            }
        };

        let mut cache: HashMap<String, Option<Sequence>> = HashMap::new();
        for cursor in &due {
            if !cache.contains_key(&cursor.sequence_id) {
                match sequences::get(&self.db, &cursor.sequence_id).await {
                    Ok(sequence) => {
                        cache.insert(cursor.sequence_id.clone(), sequence);
                    }
                    Err(e) => {
                        error!(cursor_id = cursor.id, error = %e, "failed to load sequence");
                        summary.errors += 1;
                        continue;
                    }
                }
            }
            let result = match cache.get(&cursor.sequence_id) {
                Some(Some(sequence)) => self.advance_in(cursor, sequence, now).await,
                _ => {
                    let reason = format!("sequence {} no longer exists", cursor.sequence_id);
                    self.halt(cursor, reason, now).await
                }
            };
            match result {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    error!(cursor_id = cursor.id, error = %e, "failed to advance cursor");
                    summary.errors += 1;
                }
            }
        }

        if summary != AdvanceSummary::default() {
            info!(%summary, "sequence run complete");
        }
        summary
    }

    /// `active -> paused`. Returns `false` if the cursor was not active.
    pub async fn pause(&self, contact_sequence_id: i64, now: DateTime<Utc>) -> Result<bool, CadenceError> {
        contact_sequences::pause(&self.db, contact_sequence_id, now).await
    }

    /// `paused -> active`. Returns `false` if the cursor was not paused.
    pub async fn resume(&self, contact_sequence_id: i64, now: DateTime<Utc>) -> Result<bool, CadenceError> {
        contact_sequences::resume(&self.db, contact_sequence_id, now).await
    }
}

#[async_trait]
impl DeliveryListener for SequenceEngine {
    async fn on_terminal_failure(&self, item: &QueueItem) {
        let Some(cursor_id) = item.contact_sequence_id else {
            return;
        };
        let reason = format!("queue item {} failed", item.id);
        match contact_sequences::fail(&self.db, cursor_id, &reason, Utc::now()).await {
            Ok(true) => warn!(cursor_id, item_id = item.id, "sequence halted after delivery failure"),
            Ok(false) => {}
            // The next run_due reconciliation picks this up.
            Err(e) => error!(cursor_id, item_id = item.id, error = %e, "failed to halt sequence"),
        }
    }
}

#[cfg(test)]
mod tests {
    use cadence_core::{FailureDisposition, MessageKind, QueueStatus};
    use cadence_storage::queries::queue;
    use cadence_test_utils::{MockDiscovery, MockDrafter};
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn message(text: &str) -> Step {
        Step::Message {
            content: StepContent::Template(text.into()),
            message_kind: MessageKind::Text,
        }
    }

    async fn setup(steps: Vec<Step>) -> (Database, SequenceEngine) {
        let db = Database::open_in_memory().await.unwrap();
        let sequence = Sequence {
            id: "seq-1".into(),
            tenant_id: "t1".into(),
            name: "intro".into(),
            is_active: true,
            steps,
        };
        sequences::upsert(&db, &sequence, t0()).await.unwrap();
        let engine = SequenceEngine::new(db.clone(), SequenceSettings::default());
        (db, engine)
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn enrollment_skips_duplicates() {
        let (db, engine) = setup(vec![message("hi")]).await;
        let created = engine
            .enroll_contacts("seq-1", &ids(&["a", "b", "a", " "]), false, t0())
            .await
            .unwrap();
        assert_eq!(created, 2);
        let again = engine
            .enroll_contacts("seq-1", &ids(&["b", "c"]), false, t0())
            .await
            .unwrap();
        assert_eq!(again, 1);

        let cursor = contact_sequences::find(&db, "a", "seq-1").await.unwrap().unwrap();
        assert_eq!(cursor.current_step_index, 0);
        assert_eq!(cursor.status, ContactSequenceStatus::Active);
        assert_eq!(cursor.next_action_at, t0());
    }

    #[tokio::test]
    async fn enrolling_into_unknown_sequence_is_not_found() {
        let (_db, engine) = setup(vec![]).await;
        let err = engine
            .enroll_contacts("missing", &ids(&["a"]), false, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::NotFound { entity: "sequence", .. }));
    }

    #[tokio::test]
    async fn deep_enrichment_stores_context_and_tolerates_failures() {
        let db = Database::open_in_memory().await.unwrap();
        let discovery = Arc::new(MockDiscovery::new());
        discovery
            .set_enrichment("a", [("first_name".to_string(), "Ada".to_string())].into())
            .await;
        discovery.fail_enrich_for("b").await;
        sequences::upsert(
            &db,
            &Sequence {
                id: "seq-1".into(),
                tenant_id: "t1".into(),
                name: "intro".into(),
                is_active: true,
                steps: vec![message("Hi {{first_name}}")],
            },
            t0(),
        )
        .await
        .unwrap();
        let engine =
            SequenceEngine::new(db.clone(), SequenceSettings::default()).with_discovery(discovery);

        let created = engine
            .enroll_contacts("seq-1", &ids(&["a", "b"]), true, t0())
            .await
            .unwrap();
        assert_eq!(created, 2);
        let a = contact_sequences::find(&db, "a", "seq-1").await.unwrap().unwrap();
        assert_eq!(a.contact_context.get("first_name").map(String::as_str), Some("Ada"));
        let b = contact_sequences::find(&db, "b", "seq-1").await.unwrap().unwrap();
        assert!(b.contact_context.is_empty());
    }

    #[tokio::test]
    async fn message_wait_message_yields_two_items() {
        let (db, engine) = setup(vec![
            message("first {{contact_id}}"),
            Step::Wait { duration_secs: 3600 },
            message("second"),
        ])
        .await;
        engine.enroll_contacts("seq-1", &ids(&["c1"]), false, t0()).await.unwrap();

        let mut now = t0();
        for _ in 0..6 {
            engine.run_due(now).await;
            now += TimeDelta::minutes(30);
        }
        for _ in 0..4 {
            engine.run_due(now).await;
        }

        let cursor = contact_sequences::find(&db, "c1", "seq-1").await.unwrap().unwrap();
        assert_eq!(cursor.status, ContactSequenceStatus::Completed);
        let items = queue::list_for_cursor(&db, cursor.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].content, "first c1");
        assert_eq!(items[0].scheduled_at, t0());
        assert_eq!(items[1].content, "second");
        assert!(items[1].scheduled_at >= t0() + TimeDelta::hours(1));
    }

    #[tokio::test]
    async fn advancing_a_stale_snapshot_does_nothing() {
        let (db, engine) = setup(vec![message("one"), message("two")]).await;
        engine.enroll_contacts("seq-1", &ids(&["c1"]), false, t0()).await.unwrap();
        let snapshot = contact_sequences::find(&db, "c1", "seq-1").await.unwrap().unwrap();

        let first = engine.advance(&snapshot, t0()).await.unwrap();
        assert!(matches!(first, AdvanceOutcome::Enqueued { .. }));
        assert_eq!(engine.advance(&snapshot, t0()).await.unwrap(), AdvanceOutcome::Stale);
        assert_eq!(queue::list_for_cursor(&db, snapshot.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_runs_enqueue_each_step_once() {
        let (db, engine) = setup(vec![message("one")]).await;
        let contacts: Vec<String> = (0..10).map(|i| format!("c{i}")).collect();
        engine.enroll_contacts("seq-1", &contacts, false, t0()).await.unwrap();

        let runs = (0..4).map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run_due(t0()).await })
        });
        let enqueued: usize = futures::future::join_all(runs)
            .await
            .into_iter()
            .map(|r| r.unwrap().enqueued)
            .sum();
        assert_eq!(enqueued, 10);
        for contact in &contacts {
            let cursor = contact_sequences::find(&db, contact, "seq-1").await.unwrap().unwrap();
            assert_eq!(queue::list_for_cursor(&db, cursor.id).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn missing_variable_fails_cursor() {
        let (db, engine) = setup(vec![message("Hi {{first_name}}")]).await;
        engine.enroll_contacts("seq-1", &ids(&["c1"]), false, t0()).await.unwrap();

        let summary = engine.run_due(t0()).await;
        assert_eq!(summary.failed, 1);
        let cursor = contact_sequences::find(&db, "c1", "seq-1").await.unwrap().unwrap();
        assert_eq!(cursor.status, ContactSequenceStatus::Failed);
        assert!(cursor.last_error.unwrap().contains("first_name"));
        assert!(queue::list_for_cursor(&db, cursor.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ai_prompt_steps_use_the_drafter() {
        let db = Database::open_in_memory().await.unwrap();
        sequences::upsert(
            &db,
            &Sequence {
                id: "seq-ai".into(),
                tenant_id: "t1".into(),
                name: "ai".into(),
                is_active: true,
                steps: vec![Step::Message {
                    content: StepContent::AiPrompt("Write a friendly opener".into()),
                    message_kind: MessageKind::Text,
                }],
            },
            t0(),
        )
        .await
        .unwrap();
        let drafter = Arc::new(MockDrafter::with_responses(vec!["Hello there!".into()]));
        let engine = SequenceEngine::new(db.clone(), SequenceSettings::default())
            .with_drafter(drafter.clone());
        engine.enroll_contacts("seq-ai", &ids(&["c1"]), false, t0()).await.unwrap();

        assert_eq!(engine.run_due(t0()).await.enqueued, 1);
        let cursor = contact_sequences::find(&db, "c1", "seq-ai").await.unwrap().unwrap();
        let items = queue::list_for_cursor(&db, cursor.id).await.unwrap();
        assert_eq!(items[0].content, "Hello there!");
        let prompts = drafter.prompts().await;
        assert_eq!(prompts[0].0, "Write a friendly opener");
        assert_eq!(prompts[0].1.get("contact_id").map(String::as_str), Some("c1"));
    }

    #[tokio::test]
    async fn draft_failure_fails_cursor() {
        let (db, _) = setup(vec![]).await;
        sequences::upsert(
            &db,
            &Sequence {
                id: "seq-ai".into(),
                tenant_id: "t1".into(),
                name: "ai".into(),
                is_active: true,
                steps: vec![Step::Message {
                    content: StepContent::AiPrompt("opener".into()),
                    message_kind: MessageKind::Text,
                }],
            },
            t0(),
        )
        .await
        .unwrap();
        let drafter = Arc::new(MockDrafter::new());
        drafter
            .fail_next(CadenceError::Draft {
                message: "model overloaded".into(),
                source: None,
            })
            .await;
        let engine = SequenceEngine::new(db.clone(), SequenceSettings::default()).with_drafter(drafter);
        engine.enroll_contacts("seq-ai", &ids(&["c1"]), false, t0()).await.unwrap();

        assert_eq!(engine.run_due(t0()).await.failed, 1);
        let cursor = contact_sequences::find(&db, "c1", "seq-ai").await.unwrap().unwrap();
        assert_eq!(cursor.status, ContactSequenceStatus::Failed);
    }

    #[tokio::test]
    async fn inactive_sequence_holds_cursors_until_reactivated() {
        let (db, engine) = setup(vec![message("hi")]).await;
        engine.enroll_contacts("seq-1", &ids(&["c1"]), false, t0()).await.unwrap();
        sequences::set_active(&db, "seq-1", false, t0()).await.unwrap();

        assert_eq!(engine.run_due(t0()).await.inactive, 1);
        sequences::set_active(&db, "seq-1", true, t0()).await.unwrap();
        assert_eq!(engine.run_due(t0()).await.enqueued, 1);
    }

    #[tokio::test]
    async fn paused_cursor_is_skipped_until_resumed() {
        let (db, engine) = setup(vec![message("hi")]).await;
        engine.enroll_contacts("seq-1", &ids(&["c1"]), false, t0()).await.unwrap();
        let cursor = contact_sequences::find(&db, "c1", "seq-1").await.unwrap().unwrap();

        assert!(engine.pause(cursor.id, t0()).await.unwrap());
        assert!(!engine.pause(cursor.id, t0()).await.unwrap());
        assert_eq!(engine.run_due(t0()).await, AdvanceSummary::default());

        let later = t0() + TimeDelta::hours(1);
        assert!(engine.resume(cursor.id, later).await.unwrap());
        assert_eq!(engine.run_due(later).await.enqueued, 1);
    }

    #[tokio::test]
    async fn unrepresentable_wait_halts_cursor() {
        let (db, engine) = setup(vec![Step::Wait { duration_secs: u64::MAX }]).await;
        engine.enroll_contacts("seq-1", &ids(&["c1"]), false, t0()).await.unwrap();

        let summary = engine.run_due(t0()).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors, 0);
        let cursor = contact_sequences::find(&db, "c1", "seq-1").await.unwrap().unwrap();
        assert_eq!(cursor.status, ContactSequenceStatus::Failed);
        assert!(cursor.last_error.unwrap().contains("out of range"));

        assert_eq!(engine.run_due(t0()).await, AdvanceSummary::default());
    }

    #[tokio::test]
    async fn terminal_delivery_failure_halts_cursor() {
        let (db, engine) = setup(vec![message("one"), message("two")]).await;
        engine.enroll_contacts("seq-1", &ids(&["c1"]), false, t0()).await.unwrap();
        engine.run_due(t0()).await;
        let cursor = contact_sequences::find(&db, "c1", "seq-1").await.unwrap().unwrap();
        let item = queue::list_for_cursor(&db, cursor.id).await.unwrap().remove(0);

        queue::claim(&db, item.id, t0()).await.unwrap();
        queue::mark_failed(&db, item.id, "invalid recipient", FailureDisposition::Terminal, t0())
            .await
            .unwrap();
        let failed = queue::get(&db, item.id).await.unwrap().unwrap();
        assert_eq!(failed.status, QueueStatus::Failed);
        engine.on_terminal_failure(&failed).await;

        let cursor = contact_sequences::get(&db, cursor.id).await.unwrap().unwrap();
        assert_eq!(cursor.status, ContactSequenceStatus::Failed);
        assert_eq!(engine.run_due(t0()).await.enqueued, 0);
    }

    #[tokio::test]
    async fn reconciliation_catches_missed_listener_calls() {
        let (db, engine) = setup(vec![message("one"), message("two")]).await;
        engine.enroll_contacts("seq-1", &ids(&["c1"]), false, t0()).await.unwrap();
        engine.run_due(t0()).await;
        let cursor = contact_sequences::find(&db, "c1", "seq-1").await.unwrap().unwrap();
        let item = queue::list_for_cursor(&db, cursor.id).await.unwrap().remove(0);
        queue::claim(&db, item.id, t0()).await.unwrap();
        queue::mark_failed(&db, item.id, "boom", FailureDisposition::Terminal, t0())
            .await
            .unwrap();

        let summary = engine.run_due(t0()).await;
        assert_eq!(summary.reconciled, 1);
        assert_eq!(summary.enqueued, 0);
        let cursor = contact_sequences::get(&db, cursor.id).await.unwrap().unwrap();
        assert_eq!(cursor.status, ContactSequenceStatus::Failed);
    }
}
