// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sequence orchestration.
//!
//! A contact's progress through a sequence is a persisted cursor (step index
//! plus wake time). [`SequenceEngine::run_due`] re-scans for cursors whose
//! wake time has passed, so progress survives restarts without timers.

pub mod engine;
pub mod template;

pub use engine::{AdvanceOutcome, AdvanceSummary, SequenceEngine, SequenceSettings};
pub use template::render;
