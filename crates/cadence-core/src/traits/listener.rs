// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery outcome callbacks from the dispatcher.

use async_trait::async_trait;

use crate::types::QueueItem;

/// Notified when a queue item reaches a terminal outcome.
///
/// Implementations must tolerate repeated and late notifications, and handle
/// their own failures: the dispatcher ignores what happens inside the callback.
#[async_trait]
pub trait DeliveryListener: Send + Sync {
    async fn on_terminal_failure(&self, item: &QueueItem);
}
