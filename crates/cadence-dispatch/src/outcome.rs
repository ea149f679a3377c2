// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-item outcomes and the per-tick summary.

use std::fmt;

/// What happened to one due queue item during a tick.
///
/// Everything except `FailedTerminal` is an expected outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Sent,
    /// Another invocation claimed the item first.
    ClaimConflict,
    /// Outside the tenant's business window; rescheduled to the next opening.
    OutsideWindow,
    /// Too soon after the tenant's previous send.
    PacingDeferred,
    QuotaExceeded,
    RetryScheduled,
    FailedTerminal,
}

impl ItemOutcome {
    /// Whether the tenant should be left alone for the rest of this tick.
    pub fn stops_tenant(self) -> bool {
        matches!(
            self,
            Self::OutsideWindow | Self::PacingDeferred | Self::QuotaExceeded
        )
    }
}

/// Aggregate result of one [`crate::Dispatcher::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    /// Items lost to a concurrent claim.
    pub skipped: usize,
    /// Items released for the window, pacing, or quota.
    pub deferred: usize,
    pub retried: usize,
    pub failed: usize,
    /// Stale `processing` items returned to `pending` at the start of the tick.
    pub recovered: usize,
    /// Storage errors encountered; the affected tenant was skipped.
    pub errors: usize,
}

impl DispatchSummary {
    pub(crate) fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Sent => self.sent += 1,
            ItemOutcome::ClaimConflict => self.skipped += 1,
            ItemOutcome::OutsideWindow | ItemOutcome::PacingDeferred | ItemOutcome::QuotaExceeded => {
                self.deferred += 1
            }
            ItemOutcome::RetryScheduled => self.retried += 1,
            ItemOutcome::FailedTerminal => self.failed += 1,
        }
    }
}

impl fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} skipped={} deferred={} retried={} failed={} recovered={} errors={}",
            self.sent, self.skipped, self.deferred, self.retried, self.failed, self.recovered, self.errors
        )
    }
}
