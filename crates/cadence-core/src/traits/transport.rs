// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message-send transport trait.

use async_trait::async_trait;

use crate::error::CadenceError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MessageKind, MessageRef};

/// Delivers a single outbound message to a contact.
///
/// Failures must be reported as [`CadenceError::Transport`]; the `permanent`
/// flag decides whether the dispatcher retries. Any other error variant is
/// treated as transient.
#[async_trait]
pub trait SendTransport: PluginAdapter {
    async fn send(
        &self,
        contact_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<MessageRef, CadenceError>;
}
