// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Covers constraints serde cannot express: clock-time formats, non-zero
//! intervals, and relations between timeouts.

use crate::diagnostic::ConfigError;
use crate::model::{parse_clock_time, CadenceConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration, collecting every error rather
/// than stopping at the first.
pub fn validate_config(config: &CadenceConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.engine.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "engine.log_level `{}` must be one of {}",
            config.engine.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    for (field, value) in [
        ("business_start", &config.safety.business_start),
        ("business_end", &config.safety.business_end),
    ] {
        if parse_clock_time(value).is_none() {
            errors.push(ConfigError::validation(format!(
                "safety.{field} `{value}` must be a time of day as HH:MM or HH:MM:SS"
            )));
        }
    }

    if config.safety.utc_offset_minutes.abs() > 14 * 60 {
        errors.push(ConfigError::validation(format!(
            "safety.utc_offset_minutes must be within +/-840, got {}",
            config.safety.utc_offset_minutes
        )));
    }

    for (field, value) in [
        ("dispatch.interval_secs", config.dispatch.interval_secs),
        ("dispatch.send_timeout_secs", config.dispatch.send_timeout_secs),
        ("dispatch.retry_base_secs", config.dispatch.retry_base_secs),
        ("sequence.interval_secs", config.sequence.interval_secs),
        ("radar.interval_secs", config.radar.interval_secs),
        ("webhook.timeout_secs", config.webhook.timeout_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{field} must be at least 1")));
        }
    }

    if config.dispatch.batch_size == 0 || config.sequence.batch_size == 0 {
        errors.push(ConfigError::validation(
            "dispatch.batch_size and sequence.batch_size must be at least 1",
        ));
    }

    if config.dispatch.max_retries == 0 {
        errors.push(ConfigError::validation(
            "dispatch.max_retries must be at least 1 (it counts the first attempt)",
        ));
    }

    if config.dispatch.retry_max_secs < config.dispatch.retry_base_secs {
        errors.push(ConfigError::validation(format!(
            "dispatch.retry_max_secs ({}) must not be below dispatch.retry_base_secs ({})",
            config.dispatch.retry_max_secs, config.dispatch.retry_base_secs
        )));
    }

    // A claim must outlive the send it guards or recovery would re-send in-flight items.
    if config.dispatch.claim_timeout_secs <= config.dispatch.send_timeout_secs {
        errors.push(ConfigError::validation(format!(
            "dispatch.claim_timeout_secs ({}) must exceed dispatch.send_timeout_secs ({})",
            config.dispatch.claim_timeout_secs, config.dispatch.send_timeout_secs
        )));
    }

    for (field, url) in [
        ("transport_url", &config.webhook.transport_url),
        ("drafter_url", &config.webhook.drafter_url),
        ("discovery_url", &config.webhook.discovery_url),
    ] {
        if let Some(url) = url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            errors.push(ConfigError::validation(format!(
                "webhook.{field} `{url}` must be an http:// or https:// URL"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
