// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./cadence.toml` > `~/.config/cadence/cadence.toml` >
//! `/etc/cadence/cadence.toml` with environment variable overrides via `CADENCE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CadenceConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/cadence/cadence.toml";
pub(crate) const LOCAL_CONFIG: &str = "cadence.toml";

/// Top-level sections an env var name may start with.
const SECTIONS: &[&str] = &[
    "engine", "storage", "safety", "dispatch", "sequence", "radar", "webhook",
];

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadence/cadence.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/cadence/cadence.toml` (system-wide)
/// 3. `~/.config/cadence/cadence.toml` (user XDG config)
/// 4. `./cadence.toml` (local directory)
/// 5. `CADENCE_*` environment variables
pub fn load_config() -> Result<CadenceConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<CadenceConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CadenceConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CadenceConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CadenceConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CadenceConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Only the section prefix is turned into a dot, so
/// `CADENCE_DISPATCH_SEND_TIMEOUT_SECS` maps to `dispatch.send_timeout_secs`
/// rather than `dispatch.send.timeout.secs`.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("CADENCE_").map(|key| section_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config key.
pub(crate) fn section_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section)
            && let Some(field) = rest.strip_prefix('_')
        {
            return format!("{section}.{field}");
        }
    }
    key.to_string()
}
