// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response bodies exchanged with webhook endpoints.

use cadence_core::{ContactContext, MessageKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct SendRequest<'a> {
    pub contact_id: &'a str,
    pub content: &'a str,
    pub message_kind: MessageKind,
}

#[derive(Debug, Deserialize)]
pub struct SendResponse {
    pub message_ref: String,
}

#[derive(Debug, Serialize)]
pub struct DraftRequest<'a> {
    pub prompt: &'a str,
    pub context: &'a ContactContext,
}

#[derive(Debug, Deserialize)]
pub struct DraftResponse {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct DiscoverRequest<'a> {
    pub criteria: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct DiscoverResponse {
    pub contact_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EnrichRequest<'a> {
    pub contact_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct EnrichResponse {
    #[serde(default)]
    pub context: ContactContext,
}
