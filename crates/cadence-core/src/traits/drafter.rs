// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI drafting trait.

use async_trait::async_trait;

use crate::error::CadenceError;
use crate::traits::adapter::PluginAdapter;
use crate::types::ContactContext;

/// Produces message text from a prompt and what is known about the contact.
#[async_trait]
pub trait Drafter: PluginAdapter {
    async fn draft(&self, prompt: &str, context: &ContactContext) -> Result<String, CadenceError>;
}
