// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! External collaborators extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod discovery;
pub mod drafter;
pub mod listener;
pub mod transport;

pub use adapter::PluginAdapter;
pub use discovery::LeadDiscovery;
pub use drafter::Drafter;
pub use listener::DeliveryListener;
pub use transport::SendTransport;
