// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the storage layer, the engines, and collaborator traits.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Receipt returned by the send transport for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef(pub String);

/// Template variables known about a contact (name, company, ...).
pub type ContactContext = BTreeMap<String, String>;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Transport,
    Drafter,
    Discovery,
    Storage,
}

/// Payload type of an outbound message.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
}

/// Lifecycle of a queue item.
///
/// `pending -> processing -> sent`, `processing -> pending` (retry or release),
/// `processing -> failed` (terminal), `pending -> cancelled`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    Cancelled,
}

/// Lifecycle of a contact's progress through a sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContactSequenceStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

/// Run state of a radar campaign. `Running` doubles as the campaign lock.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Idle,
    Running,
}

// --- Safety throttles ---

/// Per-tenant throttle settings, used both as defaults for new tenants and
/// as the shape of a tenant's persisted configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetySettings {
    pub daily_limit: u32,
    pub min_delay_seconds: u64,
    pub jitter_seconds: u64,
    pub business_start: NaiveTime,
    pub business_end: NaiveTime,
    pub utc_offset_minutes: i32,
}

/// Operator change to a tenant's throttles. The optional fields are left
/// untouched when `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyUpdate {
    pub daily_limit: u32,
    pub min_delay_seconds: u64,
    pub jitter_seconds: u64,
    pub business_hours: Option<(NaiveTime, NaiveTime)>,
    pub utc_offset_minutes: Option<i32>,
}

/// Persisted per-tenant prospecting configuration and quota counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProspectingConfig {
    pub tenant_id: String,
    pub daily_limit: u32,
    pub current_day_count: u32,
    /// Tenant-local date of the last counter reset.
    pub day_anchor: NaiveDate,
    pub min_delay_seconds: u64,
    pub jitter_seconds: u64,
    pub business_start: NaiveTime,
    pub business_end: NaiveTime,
    pub utc_offset_minutes: i32,
    pub last_sent_at: Option<DateTime<Utc>>,
}

impl ProspectingConfig {
    /// Wall-clock time in the tenant's zone.
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        local_time(now, self.utc_offset_minutes)
    }

    /// Converts a tenant-local wall-clock time back to UTC.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&(local - TimeDelta::minutes(i64::from(self.utc_offset_minutes))))
    }

    /// Whether `now` falls inside the tenant's business window.
    ///
    /// Both bounds are inclusive. A window whose start is after its end wraps
    /// midnight; equal bounds mean the window never closes.
    pub fn within_business_hours(&self, now: DateTime<Utc>) -> bool {
        let t = self.local_time(now).time();
        let (start, end) = (self.business_start, self.business_end);
        if start == end {
            true
        } else if start < end {
            t >= start && t <= end
        } else {
            t >= start || t <= end
        }
    }

    /// The next instant, strictly after `now`, at which the business window opens.
    pub fn next_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = self.local_time(now);
        let mut candidate = local.date().and_time(self.business_start);
        if candidate <= local {
            candidate += TimeDelta::days(1);
        }
        self.to_utc(candidate)
    }
}

/// Wall-clock time at a fixed UTC offset.
pub fn local_time(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDateTime {
    now.naive_utc() + TimeDelta::minutes(i64::from(utc_offset_minutes))
}

// --- Queue ---

/// One scheduled outbound message attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub id: i64,
    pub tenant_id: String,
    pub contact_id: String,
    /// Owning sequence cursor, when the item was produced by a sequence step.
    pub contact_sequence_id: Option<i64>,
    pub content: String,
    pub message_kind: MessageKind,
    pub status: QueueStatus,
    pub scheduled_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub error_log: Option<String>,
    pub message_ref: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when enqueueing a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueueItem {
    pub tenant_id: String,
    pub contact_id: String,
    pub contact_sequence_id: Option<i64>,
    pub content: String,
    pub message_kind: MessageKind,
    pub scheduled_at: DateTime<Utc>,
}

/// What happens to a queue item after a failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Return to `pending`, due again at `at`.
    Retry { at: DateTime<Utc> },
    /// Stop retrying; the item ends in `failed`.
    Terminal,
}

// --- Sequences ---

/// An ordered outreach script owned by a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sequence {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub steps: Vec<Step>,
}

fn default_true() -> bool {
    true
}

/// A single sequence step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// Enqueue a message for the contact.
    Message {
        content: StepContent,
        #[serde(default)]
        message_kind: MessageKind,
    },
    /// Pause before the next step.
    Wait { duration_secs: u64 },
}

/// Where a message step's text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepContent {
    /// Static text with `{{variable}}` placeholders.
    Template(String),
    /// Prompt handed to the AI drafter together with the contact context.
    AiPrompt(String),
}

/// A contact's cursor through a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSequence {
    pub id: i64,
    pub tenant_id: String,
    pub contact_id: String,
    pub sequence_id: String,
    pub current_step_index: u32,
    pub status: ContactSequenceStatus,
    pub next_action_at: DateTime<Utc>,
    pub contact_context: ContactContext,
    pub last_error: Option<String>,
    pub enrolled_at: DateTime<Utc>,
}

// --- Radar ---

/// A recurring lead-discovery job feeding a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarCampaign {
    pub id: String,
    pub tenant_id: String,
    pub target_sequence_id: String,
    /// Opaque discovery criteria passed to the lead-discovery collaborator.
    pub criteria: String,
    pub deep_enrich: bool,
    pub status: CampaignStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub cooldown_secs: u64,
    pub cumulative_leads_found: u64,
    pub run_started_at: Option<DateTime<Utc>>,
}

impl RadarCampaign {
    /// Whether the cooldown since the last run has strictly elapsed at `now`.
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_run_at {
            None => true,
            Some(last) => now - last > TimeDelta::seconds(self.cooldown_secs as i64),
        }
    }
}
