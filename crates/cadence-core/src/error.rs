// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Cadence outreach engine.
//!
//! Only genuine failures are errors. Expected outcomes such as an exhausted
//! quota, a lost claim race, or a pacing deferral are modelled as plain values
//! by the components that produce them.

use thiserror::Error;

/// The primary error type used across collaborator traits and core operations.
#[derive(Debug, Error)]
pub enum CadenceError {
    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, row decoding).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Send transport errors. `permanent` failures are never retried.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        permanent: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// AI draft collaborator errors.
    #[error("draft error: {message}")]
    Draft {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Lead discovery or enrichment errors.
    #[error("discovery error: {message}")]
    Discovery {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A message template could not be rendered for a contact.
    #[error("render error: {0}")]
    Render(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CadenceError {
    /// A transport failure that may succeed on a later attempt.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            permanent: false,
            source: None,
        }
    }

    /// A transport failure that will never succeed (invalid recipient, rejected content).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            permanent: true,
            source: None,
        }
    }

    /// Whether retrying the failed operation is pointless.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Transport { permanent: true, .. })
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
