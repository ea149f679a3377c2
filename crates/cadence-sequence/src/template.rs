// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `{{variable}}` substitution for message templates.

use std::sync::LazyLock;

use cadence_core::{CadenceError, ContactContext};
use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap());

/// Variable always available to templates.
pub const CONTACT_ID_VAR: &str = "contact_id";

/// Fill every placeholder in `template` from `context`.
///
/// `contact_id` resolves to the contact unless the context overrides it.
/// A placeholder with no value is an error; nothing is sent half-rendered.
pub fn render(
    template: &str,
    context: &ContactContext,
    contact_id: &str,
) -> Result<String, CadenceError> {
    let mut missing = Vec::new();
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        match context.get(name) {
            Some(value) => value.clone(),
            None if name == CONTACT_ID_VAR => contact_id.to_string(),
            None => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        missing.sort();
        missing.dedup();
        Err(CadenceError::Render(format!(
            "missing template variable(s): {}",
            missing.join(", ")
        )))
    }
}
