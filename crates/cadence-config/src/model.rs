// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Cadence outreach engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use cadence_core::SafetySettings;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Top-level Cadence configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CadenceConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Throttle defaults applied to tenants on first use.
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Dispatcher loop and retry policy.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Sequence advancement loop.
    #[serde(default)]
    pub sequence: SequenceConfig,

    /// Radar campaign loop.
    #[serde(default)]
    pub radar: RadarConfig,

    /// HTTP collaborator endpoints.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Instance name, used in log output.
    #[serde(default = "default_engine_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_engine_name() -> String {
    "cadence".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long a write waits on another process's lock before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("cadence").join("cadence.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "cadence.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Per-tenant throttle defaults.
///
/// Business hours are `HH:MM` or `HH:MM:SS` in the tenant's local time,
/// which is UTC shifted by `utc_offset_minutes`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    #[serde(default = "default_min_delay_seconds")]
    pub min_delay_seconds: u64,

    #[serde(default = "default_jitter_seconds")]
    pub jitter_seconds: u64,

    #[serde(default = "default_business_start")]
    pub business_start: String,

    #[serde(default = "default_business_end")]
    pub business_end: String,

    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            min_delay_seconds: default_min_delay_seconds(),
            jitter_seconds: default_jitter_seconds(),
            business_start: default_business_start(),
            business_end: default_business_end(),
            utc_offset_minutes: 0,
        }
    }
}

impl SafetyConfig {
    /// Converts the configured defaults into settings for a new tenant.
    ///
    /// Fails only when a business time does not parse; validation rejects
    /// such configs at startup.
    pub fn settings(&self) -> Result<SafetySettings, cadence_core::CadenceError> {
        let parse = |field: &str, value: &str| {
            parse_clock_time(value).ok_or_else(|| {
                cadence_core::CadenceError::Config(format!(
                    "safety.{field} `{value}` is not a valid HH:MM time"
                ))
            })
        };
        Ok(SafetySettings {
            daily_limit: self.daily_limit,
            min_delay_seconds: self.min_delay_seconds,
            jitter_seconds: self.jitter_seconds,
            business_start: parse("business_start", &self.business_start)?,
            business_end: parse("business_end", &self.business_end)?,
            utc_offset_minutes: self.utc_offset_minutes,
        })
    }
}

fn default_daily_limit() -> u32 {
    50
}

fn default_min_delay_seconds() -> u64 {
    180
}

fn default_jitter_seconds() -> u64 {
    60
}

fn default_business_start() -> String {
    "09:00".to_string()
}

fn default_business_end() -> String {
    "17:00".to_string()
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// Dispatcher loop and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Seconds between dispatcher ticks under `serve`.
    #[serde(default = "default_dispatch_interval_secs")]
    pub interval_secs: u64,

    /// Maximum due items fetched per tenant per tick.
    #[serde(default = "default_dispatch_batch_size")]
    pub batch_size: u32,

    /// Total send attempts before an item fails terminally.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay; doubles on each subsequent attempt.
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,

    /// Upper bound on the retry delay.
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,

    /// Bound on a single transport call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Items left `processing` longer than this are returned to `pending`.
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_dispatch_interval_secs(),
            batch_size: default_dispatch_batch_size(),
            max_retries: default_max_retries(),
            retry_base_secs: default_retry_base_secs(),
            retry_max_secs: default_retry_max_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            claim_timeout_secs: default_claim_timeout_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

fn default_dispatch_interval_secs() -> u64 {
    30
}

fn default_dispatch_batch_size() -> u32 {
    25
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_secs() -> u64 {
    60
}

fn default_retry_max_secs() -> u64 {
    3600
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_claim_timeout_secs() -> u64 {
    300
}

/// Sequence advancement loop.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceConfig {
    #[serde(default = "default_sequence_interval_secs")]
    pub interval_secs: u64,

    /// Maximum due cursors advanced per run.
    #[serde(default = "default_sequence_batch_size")]
    pub batch_size: u32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sequence_interval_secs(),
            batch_size: default_sequence_batch_size(),
        }
    }
}

fn default_sequence_interval_secs() -> u64 {
    60
}

fn default_sequence_batch_size() -> u32 {
    200
}

/// Radar campaign loop.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RadarConfig {
    #[serde(default = "default_radar_interval_secs")]
    pub interval_secs: u64,

    /// Campaigns `running` longer than this are assumed abandoned.
    #[serde(default = "default_stale_run_timeout_secs")]
    pub stale_run_timeout_secs: u64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_radar_interval_secs(),
            stale_run_timeout_secs: default_stale_run_timeout_secs(),
        }
    }
}

fn default_radar_interval_secs() -> u64 {
    300
}

fn default_stale_run_timeout_secs() -> u64 {
    3600
}

/// HTTP collaborator endpoints. An unset URL disables that collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    #[serde(default)]
    pub transport_url: Option<String>,

    #[serde(default)]
    pub drafter_url: Option<String>,

    #[serde(default)]
    pub discovery_url: Option<String>,

    /// Sent as a bearer token on every request when set.
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            transport_url: None,
            drafter_url: None,
            discovery_url: None,
            auth_token: None,
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

fn default_webhook_timeout_secs() -> u64 {
    20
}
