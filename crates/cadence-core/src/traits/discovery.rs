// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead discovery trait used by radar campaigns.

use async_trait::async_trait;

use crate::error::CadenceError;
use crate::traits::adapter::PluginAdapter;
use crate::types::ContactContext;

/// Finds contacts matching a campaign's criteria.
#[async_trait]
pub trait LeadDiscovery: PluginAdapter {
    /// Returns the contact identifiers matching `criteria`.
    async fn discover(&self, criteria: &str) -> Result<Vec<String>, CadenceError>;

    /// Looks up template variables for a single contact.
    ///
    /// Adapters without an enrichment source return an empty context.
    async fn enrich(&self, _contact_id: &str) -> Result<ContactContext, CadenceError> {
        Ok(ContactContext::new())
    }
}
