// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Cadence outreach engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`. Every state
//! transition the engines rely on (claims, quota reservations, cursor steps,
//! campaign locks) is a single conditional write whose affected-row count
//! reports whether it won.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod queue_store;
pub mod time;

pub use database::Database;
pub use queue_store::QueueStore;
