// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sequence definitions. Steps are stored as a JSON array.

use cadence_core::{CadenceError, Sequence};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{sequence_from_row, SEQUENCE_COLUMNS};
use crate::time::to_ms;

/// Insert or replace a sequence definition.
///
/// Replacing steps does not move existing cursors; contacts continue from
/// their stored step index against the new list.
pub async fn upsert(db: &Database, sequence: &Sequence, now: DateTime<Utc>) -> Result<(), CadenceError> {
    let steps = serde_json::to_string(&sequence.steps).map_err(|e| CadenceError::Storage {
        source: Box::new(e),
    })?;
    let sequence = sequence.clone();
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO sequences (id, tenant_id, name, is_active, steps, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT (id) DO UPDATE SET
                     tenant_id = excluded.tenant_id,
                     name = excluded.name,
                     is_active = excluded.is_active,
                     steps = excluded.steps,
                     updated_at = excluded.updated_at",
                params![
                    sequence.id,
                    sequence.tenant_id,
                    sequence.name,
                    sequence.is_active,
                    steps,
                    now_ms
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<Sequence>, CadenceError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Sequence>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {SEQUENCE_COLUMNS} FROM sequences WHERE id = ?1"),
                params![id],
                sequence_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_for_tenant(db: &Database, tenant_id: &str) -> Result<Vec<Sequence>, CadenceError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Sequence>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SEQUENCE_COLUMNS} FROM sequences WHERE tenant_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![tenant_id], sequence_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Toggle `is_active`. Returns `false` if the sequence does not exist.
pub async fn set_active(
    db: &Database,
    id: &str,
    active: bool,
    now: DateTime<Utc>,
) -> Result<bool, CadenceError> {
    let id = id.to_string();
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE sequences SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, active, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}
