// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Cadence outreach engine.
//!
//! This crate provides the error type, the domain types shared by storage and
//! the engines, and the collaborator traits the engines call out through.

pub mod error;
pub mod traits;
pub mod types;

pub use error::CadenceError;
pub use types::{
    AdapterType, CampaignStatus, ContactContext, ContactSequence, ContactSequenceStatus,
    FailureDisposition, HealthStatus, MessageKind, MessageRef, NewQueueItem, ProspectingConfig,
    QueueItem, QueueStatus, RadarCampaign, SafetySettings, SafetyUpdate, Sequence, Step,
    StepContent,
};

pub use traits::{DeliveryListener, Drafter, LeadDiscovery, PluginAdapter, SendTransport};
