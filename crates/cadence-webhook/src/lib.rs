// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference HTTP adapters for Cadence's external collaborators.
//!
//! Each adapter POSTs JSON to a configured URL. HTTP 4xx responses other
//! than 408 and 429 are permanent failures; network errors, timeouts, and
//! every other status are transient.

pub mod client;
pub mod discovery;
pub mod drafter;
pub mod transport;
pub mod types;

pub use client::{WebhookClient, WebhookError};
pub use discovery::WebhookDiscovery;
pub use drafter::WebhookDrafter;
pub use transport::WebhookTransport;
