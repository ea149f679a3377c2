// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant daily send quota.
//!
//! The counter lives in the tenant's `prospecting_config` row and is only
//! ever changed by single conditional `UPDATE`s, so any number of
//! dispatchers can reserve concurrently without exceeding the limit. A
//! `tracing::warn` is emitted when a tenant crosses 80% of its daily limit.

pub mod tracker;

pub use tracker::{QuotaTracker, QuotaUsage, Reservation};
