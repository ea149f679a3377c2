// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch loop for queued outbound messages.
//!
//! Each [`Dispatcher::tick`] claims due queue items tenant by tenant, enforces
//! the tenant's business window, pacing gap, and daily quota, and hands the
//! message to the send transport. Ticks hold no in-memory state between
//! invocations, so any number may run at once.

pub mod dispatcher;
pub mod outcome;
pub mod retry;

pub use dispatcher::{DispatchSettings, Dispatcher};
pub use outcome::{DispatchSummary, ItemOutcome};
pub use retry::RetryPolicy;
