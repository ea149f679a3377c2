// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Radar: periodic lead discovery.
//!
//! Each campaign is a two-state machine (`idle`, `running`). A pulse only
//! runs a campaign after winning the guarded `idle -> running` write, so
//! scheduled and manual pulses can overlap safely.

pub mod scheduler;

pub use scheduler::{PulseOutcome, RadarScheduler, RadarSettings, RadarSummary};
