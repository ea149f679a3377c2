// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table.

pub mod campaigns;
pub mod contact_sequences;
pub mod queue;
pub mod sequences;
pub mod tenants;
