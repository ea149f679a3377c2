// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Cadence integration tests.
//!
//! Provides mock collaborators and a harness that assembles the full engine
//! stack on a temporary SQLite database, so tests run without any external
//! service.
//!
//! # Components
//!
//! - [`MockTransport`] - send transport that records messages and can be told to fail
//! - [`MockDrafter`] - AI drafter with pre-configured responses
//! - [`MockDiscovery`] - lead discovery with queued results and per-contact enrichment
//! - [`TestHarness`] - quota, queue, dispatcher, sequence engine, and radar wired together

pub mod harness;
pub mod mock_discovery;
pub mod mock_drafter;
pub mod mock_transport;

pub use harness::TestHarness;
pub use mock_discovery::MockDiscovery;
pub use mock_drafter::MockDrafter;
pub use mock_transport::{MockTransport, SentMessage};
