// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact cursors through sequences.
//!
//! Cursor moves are guarded on the step index the caller observed, so a
//! cursor advanced by one invocation is left alone by any other that read the
//! same row.

use cadence_core::{
    CadenceError, ContactContext, ContactSequence, ContactSequenceStatus, NewQueueItem,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{contact_sequence_from_row, CONTACT_SEQUENCE_COLUMNS};
use crate::queries::queue;
use crate::time::{parse_col, to_ms};

/// Create cursors at step 0 for contacts not yet enrolled in `sequence_id`.
///
/// Returns how many cursors were created.
pub async fn enroll(
    db: &Database,
    tenant_id: &str,
    sequence_id: &str,
    contacts: Vec<(String, ContactContext)>,
    now: DateTime<Utc>,
) -> Result<usize, CadenceError> {
    let tenant_id = tenant_id.to_string();
    let sequence_id = sequence_id.to_string();
    let now_ms = to_ms(now);
    let contacts = contacts
        .into_iter()
        .map(|(id, ctx)| {
            serde_json::to_string(&ctx)
                .map(|json| (id, json))
                .map_err(|e| CadenceError::Storage { source: Box::new(e) })
        })
        .collect::<Result<Vec<_>, _>>()?;
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let tx = conn.transaction()?;
            let mut created = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO contact_sequences
                     (tenant_id, contact_id, sequence_id, current_step_index, status,
                      next_action_at, contact_context, enrolled_at, updated_at)
                     VALUES (?1, ?2, ?3, 0, 'active', ?4, ?5, ?4, ?4)",
                )?;
                for (contact_id, context) in &contacts {
                    created += stmt.execute(params![tenant_id, contact_id, sequence_id, now_ms, context])?;
                }
            }
            tx.commit()?;
            Ok(created)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: i64) -> Result<Option<ContactSequence>, CadenceError> {
    db.connection()
        .call(move |conn| -> Result<Option<ContactSequence>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {CONTACT_SEQUENCE_COLUMNS} FROM contact_sequences WHERE id = ?1"),
                params![id],
                contact_sequence_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn find(
    db: &Database,
    contact_id: &str,
    sequence_id: &str,
) -> Result<Option<ContactSequence>, CadenceError> {
    let contact_id = contact_id.to_string();
    let sequence_id = sequence_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ContactSequence>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {CONTACT_SEQUENCE_COLUMNS} FROM contact_sequences
                     WHERE contact_id = ?1 AND sequence_id = ?2"
                ),
                params![contact_id, sequence_id],
                contact_sequence_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Active cursors whose `next_action_at` has passed, most overdue first.
pub async fn list_due(
    db: &Database,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<ContactSequence>, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<Vec<ContactSequence>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTACT_SEQUENCE_COLUMNS} FROM contact_sequences
                 WHERE status = 'active' AND next_action_at <= ?1
                 ORDER BY next_action_at ASC, id ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![now_ms, limit], contact_sequence_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Move past a message step and enqueue its message in one transaction.
///
/// Returns the new queue item ID, or `None` if the cursor is no longer
/// active at `expected_index` (another invocation got there first).
pub async fn commit_message_step(
    db: &Database,
    id: i64,
    expected_index: u32,
    item: NewQueueItem,
    now: DateTime<Utc>,
) -> Result<Option<i64>, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let moved = tx.execute(
                "UPDATE contact_sequences
                 SET current_step_index = ?2 + 1, next_action_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND status = 'active' AND current_step_index = ?2",
                params![id, expected_index, now_ms],
            )?;
            if moved == 0 {
                return Ok(None);
            }
            let item_id = queue::insert(&tx, &item, now_ms)?;
            tx.commit()?;
            Ok(Some(item_id))
        })
        .await
        .map_err(map_tr_err)
}

/// Move past a wait step, sleeping the cursor until `wake_at`.
pub async fn advance_wait(
    db: &Database,
    id: i64,
    expected_index: u32,
    wake_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool, CadenceError> {
    let wake_ms = to_ms(wake_at);
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE contact_sequences
                 SET current_step_index = ?2 + 1, next_action_at = ?3, updated_at = ?4
                 WHERE id = ?1 AND status = 'active' AND current_step_index = ?2",
                params![id, expected_index, wake_ms, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `active -> completed` for a cursor that ran off the end of its steps.
pub async fn complete(
    db: &Database,
    id: i64,
    expected_index: u32,
    now: DateTime<Utc>,
) -> Result<bool, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE contact_sequences SET status = 'completed', updated_at = ?3
                 WHERE id = ?1 AND status = 'active' AND current_step_index = ?2",
                params![id, expected_index, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Halt a cursor with an error. Applies to any state except `failed`.
///
/// The cursor's pending queue items are cancelled in the same transaction,
/// so steps already enqueued are never sent after the halt.
pub async fn fail(
    db: &Database,
    id: i64,
    error: &str,
    now: DateTime<Utc>,
) -> Result<bool, CadenceError> {
    let error = error.to_string();
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE contact_sequences SET status = 'failed', last_error = ?2, updated_at = ?3
                 WHERE id = ?1 AND status != 'failed'",
                params![id, error, now_ms],
            )?;
            tx.execute(
                "UPDATE queue_items SET status = 'cancelled', updated_at = ?2
                 WHERE contact_sequence_id = ?1 AND status = 'pending'",
                params![id, now_ms],
            )?;
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Fail every cursor that owns a terminally failed queue item but is not yet
/// marked failed, then cancel whatever failed cursors still have pending.
/// Returns how many cursors changed.
pub async fn reconcile_failed(db: &Database, now: DateTime<Utc>) -> Result<usize, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let tx = conn.transaction()?;
            let failed = tx.execute(
                "UPDATE contact_sequences
                 SET status = 'failed',
                     last_error = COALESCE(
                         (SELECT 'queue item ' || q.id || ' failed' FROM queue_items q
                          WHERE q.contact_sequence_id = contact_sequences.id
                            AND q.status = 'failed'
                          ORDER BY q.id LIMIT 1),
                         last_error),
                     updated_at = ?1
                 WHERE status != 'failed'
                   AND EXISTS (SELECT 1 FROM queue_items q
                               WHERE q.contact_sequence_id = contact_sequences.id
                                 AND q.status = 'failed')",
                params![now_ms],
            )?;
            tx.execute(
                "UPDATE queue_items SET status = 'cancelled', updated_at = ?1
                 WHERE status = 'pending'
                   AND contact_sequence_id IN
                       (SELECT id FROM contact_sequences WHERE status = 'failed')",
                params![now_ms],
            )?;
            tx.commit()?;
            Ok(failed)
        })
        .await
        .map_err(map_tr_err)
}

/// `active -> paused`.
pub async fn pause(db: &Database, id: i64, now: DateTime<Utc>) -> Result<bool, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE contact_sequences SET status = 'paused', updated_at = ?2
                 WHERE id = ?1 AND status = 'active'",
                params![id, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `paused -> active`. A pending wait keeps its wake time; an overdue one is due now.
pub async fn resume(db: &Database, id: i64, now: DateTime<Utc>) -> Result<bool, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE contact_sequences
                 SET status = 'active', next_action_at = MAX(next_action_at, ?2), updated_at = ?2
                 WHERE id = ?1 AND status = 'paused'",
                params![id, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Cursor counts per status for one tenant; statuses with no cursors are omitted.
pub async fn counts_by_status(
    db: &Database,
    tenant_id: &str,
) -> Result<Vec<(ContactSequenceStatus, u64)>, CadenceError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<(ContactSequenceStatus, u64)>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM contact_sequences WHERE tenant_id = ?1
                 GROUP BY status ORDER BY status",
            )?;
            let rows = stmt.query_map(params![tenant_id], |row| {
                Ok((parse_col(row, 0)?, row.get::<_, i64>(1)? as u64))
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use cadence_core::{MessageKind, QueueStatus, Sequence, Step, StepContent};
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::queries::sequences;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        let seq = Sequence {
            id: "seq-1".into(),
            tenant_id: "t1".into(),
            name: "Intro".into(),
            is_active: true,
            steps: vec![Step::Message {
                content: StepContent::Template("hi".into()),
                message_kind: MessageKind::Text,
            }],
        };
        sequences::upsert(&db, &seq, t0()).await.unwrap();
        db
    }

    fn contacts(ids: &[&str]) -> Vec<(String, ContactContext)> {
        ids.iter().map(|id| (id.to_string(), ContactContext::new())).collect()
    }

    fn message_for(cursor: &ContactSequence) -> NewQueueItem {
        NewQueueItem {
            tenant_id: cursor.tenant_id.clone(),
            contact_id: cursor.contact_id.clone(),
            contact_sequence_id: Some(cursor.id),
            content: "hi".into(),
            message_kind: MessageKind::Text,
            scheduled_at: t0(),
        }
    }

    #[tokio::test]
    async fn enroll_skips_existing_contacts() {
        let db = setup().await;
        assert_eq!(enroll(&db, "t1", "seq-1", contacts(&["a", "b"]), t0()).await.unwrap(), 2);
        assert_eq!(enroll(&db, "t1", "seq-1", contacts(&["b", "c"]), t0()).await.unwrap(), 1);

        let b = find(&db, "b", "seq-1").await.unwrap().unwrap();
        assert_eq!(b.current_step_index, 0);
        assert_eq!(b.status, ContactSequenceStatus::Active);
        assert_eq!(b.next_action_at, t0());
    }

    #[tokio::test]
    async fn message_step_commits_once() {
        let db = setup().await;
        enroll(&db, "t1", "seq-1", contacts(&["a"]), t0()).await.unwrap();
        let cursor = find(&db, "a", "seq-1").await.unwrap().unwrap();

        let first = commit_message_step(&db, cursor.id, 0, message_for(&cursor), t0()).await.unwrap();
        assert!(first.is_some());
        let second = commit_message_step(&db, cursor.id, 0, message_for(&cursor), t0()).await.unwrap();
        assert!(second.is_none());

        assert_eq!(queue::list_for_cursor(&db, cursor.id).await.unwrap().len(), 1);
        assert_eq!(get(&db, cursor.id).await.unwrap().unwrap().current_step_index, 1);
    }

    #[tokio::test]
    async fn wait_step_is_guarded_on_index() {
        let db = setup().await;
        enroll(&db, "t1", "seq-1", contacts(&["a"]), t0()).await.unwrap();
        let cursor = find(&db, "a", "seq-1").await.unwrap().unwrap();
        let wake = t0() + TimeDelta::hours(1);

        assert!(advance_wait(&db, cursor.id, 0, wake, t0()).await.unwrap());
        assert!(!advance_wait(&db, cursor.id, 0, wake, t0()).await.unwrap());
        assert!(list_due(&db, t0(), 10).await.unwrap().is_empty());
        assert_eq!(list_due(&db, wake, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_fails_owner_of_failed_item() {
        let db = setup().await;
        enroll(&db, "t1", "seq-1", contacts(&["a", "b"]), t0()).await.unwrap();
        let a = find(&db, "a", "seq-1").await.unwrap().unwrap();
        let b = find(&db, "b", "seq-1").await.unwrap().unwrap();

        let item = commit_message_step(&db, a.id, 0, message_for(&a), t0()).await.unwrap().unwrap();
        assert!(complete(&db, a.id, 1, t0()).await.unwrap());
        commit_message_step(&db, b.id, 0, message_for(&b), t0()).await.unwrap().unwrap();

        assert!(queue::claim(&db, item, t0()).await.unwrap());
        queue::mark_failed(&db, item, "bounced", cadence_core::FailureDisposition::Terminal, t0())
            .await
            .unwrap();

        assert_eq!(reconcile_failed(&db, t0()).await.unwrap(), 1);
        let a = get(&db, a.id).await.unwrap().unwrap();
        assert_eq!(a.status, ContactSequenceStatus::Failed);
        assert_eq!(a.last_error.as_deref(), Some(format!("queue item {item} failed").as_str()));
        assert_eq!(get(&db, b.id).await.unwrap().unwrap().status, ContactSequenceStatus::Active);
        assert_eq!(reconcile_failed(&db, t0()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_cursor_cancels_its_pending_items() {
        let db = setup().await;
        enroll(&db, "t1", "seq-1", contacts(&["a", "b"]), t0()).await.unwrap();
        let a = find(&db, "a", "seq-1").await.unwrap().unwrap();
        let b = find(&db, "b", "seq-1").await.unwrap().unwrap();
        let a_item = commit_message_step(&db, a.id, 0, message_for(&a), t0()).await.unwrap().unwrap();
        let b_item = commit_message_step(&db, b.id, 0, message_for(&b), t0()).await.unwrap().unwrap();

        assert!(fail(&db, a.id, "bounced", t0()).await.unwrap());
        let a_status = queue::get(&db, a_item).await.unwrap().unwrap().status;
        assert_eq!(a_status, QueueStatus::Cancelled);
        let b_status = queue::get(&db, b_item).await.unwrap().unwrap().status;
        assert_eq!(b_status, QueueStatus::Pending);
        assert!(!queue::claim(&db, a_item, t0()).await.unwrap());
    }

    #[tokio::test]
    async fn reconcile_cancels_later_steps_of_failed_cursor() {
        let db = setup().await;
        enroll(&db, "t1", "seq-1", contacts(&["a"]), t0()).await.unwrap();
        let a = find(&db, "a", "seq-1").await.unwrap().unwrap();
        let first = commit_message_step(&db, a.id, 0, message_for(&a), t0()).await.unwrap().unwrap();
        let second = commit_message_step(&db, a.id, 1, message_for(&a), t0()).await.unwrap().unwrap();

        assert!(queue::claim(&db, first, t0()).await.unwrap());
        queue::mark_failed(&db, first, "bounced", cadence_core::FailureDisposition::Terminal, t0())
            .await
            .unwrap();

        assert_eq!(reconcile_failed(&db, t0()).await.unwrap(), 1);
        let second = queue::get(&db, second).await.unwrap().unwrap();
        assert_eq!(second.status, QueueStatus::Cancelled);
    }

    #[tokio::test]
    async fn pause_and_resume() {
        let db = setup().await;
        enroll(&db, "t1", "seq-1", contacts(&["a"]), t0()).await.unwrap();
        let cursor = find(&db, "a", "seq-1").await.unwrap().unwrap();

        assert!(pause(&db, cursor.id, t0()).await.unwrap());
        assert!(!pause(&db, cursor.id, t0()).await.unwrap());
        assert!(list_due(&db, t0(), 10).await.unwrap().is_empty());

        let later = t0() + TimeDelta::minutes(30);
        assert!(resume(&db, cursor.id, later).await.unwrap());
        let resumed = get(&db, cursor.id).await.unwrap().unwrap();
        assert_eq!(resumed.status, ContactSequenceStatus::Active);
        assert_eq!(resumed.next_action_at, later);
        assert_eq!(
            counts_by_status(&db, "t1").await.unwrap(),
            vec![(ContactSequenceStatus::Active, 1)]
        );
    }
}
