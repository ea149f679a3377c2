// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue item operations.
//!
//! Every mutation is a single `UPDATE ... WHERE status = <expected>`; the
//! returned flag says whether this caller performed the transition.

use cadence_core::{CadenceError, FailureDisposition, NewQueueItem, QueueItem, QueueStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{queue_item_from_row, QUEUE_COLUMNS};
use crate::time::{parse_col, to_ms};

pub(crate) const INSERT_SQL: &str = "INSERT INTO queue_items
    (tenant_id, contact_id, contact_sequence_id, content, message_kind, status,
     scheduled_at, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?7)";

pub(crate) fn insert(
    conn: &rusqlite::Connection,
    item: &NewQueueItem,
    now_ms: i64,
) -> rusqlite::Result<i64> {
    conn.execute(
        INSERT_SQL,
        params![
            item.tenant_id,
            item.contact_id,
            item.contact_sequence_id,
            item.content,
            item.message_kind.as_ref(),
            to_ms(item.scheduled_at),
            now_ms,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert a pending item. Returns its ID.
pub async fn enqueue(
    db: &Database,
    item: NewQueueItem,
    now: DateTime<Utc>,
) -> Result<i64, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> { insert(conn, &item, now_ms) })
        .await
        .map_err(map_tr_err)
}

/// Insert several pending items in one transaction. Returns their IDs in order.
pub async fn enqueue_many(
    db: &Database,
    items: Vec<NewQueueItem>,
    now: DateTime<Utc>,
) -> Result<Vec<i64>, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<Vec<i64>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let ids = items
                .iter()
                .map(|item| insert(&tx, item, now_ms))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            tx.commit()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: i64) -> Result<Option<QueueItem>, CadenceError> {
    db.connection()
        .call(move |conn| -> Result<Option<QueueItem>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {QUEUE_COLUMNS} FROM queue_items WHERE id = ?1"),
                params![id],
                queue_item_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Pending items for `tenant_id` due at `now`, earliest `scheduled_at` first.
pub async fn list_due(
    db: &Database,
    tenant_id: &str,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<QueueItem>, CadenceError> {
    let tenant_id = tenant_id.to_string();
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<Vec<QueueItem>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {QUEUE_COLUMNS} FROM queue_items
                 WHERE tenant_id = ?1 AND status = 'pending' AND scheduled_at <= ?2
                 ORDER BY scheduled_at ASC, id ASC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![tenant_id, now_ms, limit], queue_item_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Tenants that have at least one pending item due at `now`.
pub async fn tenants_with_due(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<Vec<String>, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT tenant_id FROM queue_items
                 WHERE status = 'pending' AND scheduled_at <= ?1
                 ORDER BY tenant_id",
            )?;
            let rows = stmt.query_map(params![now_ms], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Items belonging to one sequence cursor, oldest first.
pub async fn list_for_cursor(
    db: &Database,
    contact_sequence_id: i64,
) -> Result<Vec<QueueItem>, CadenceError> {
    db.connection()
        .call(move |conn| -> Result<Vec<QueueItem>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {QUEUE_COLUMNS} FROM queue_items
                 WHERE contact_sequence_id = ?1 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![contact_sequence_id], queue_item_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// `pending -> processing`, only if the item is still pending and due.
pub async fn claim(db: &Database, id: i64, now: DateTime<Utc>) -> Result<bool, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE queue_items SET status = 'processing', claimed_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND status = 'pending' AND scheduled_at <= ?2",
                params![id, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `processing -> sent`, recording the transport receipt.
pub async fn mark_sent(
    db: &Database,
    id: i64,
    message_ref: &str,
    now: DateTime<Utc>,
) -> Result<bool, CadenceError> {
    let message_ref = message_ref.to_string();
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE queue_items
                 SET status = 'sent', message_ref = ?2, sent_at = ?3,
                     attempt_count = attempt_count + 1, updated_at = ?3
                 WHERE id = ?1 AND status = 'processing'",
                params![id, message_ref, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed attempt: bump `attempt_count`, append to `error_log`, and
/// either return the item to `pending` at the retry time or fail it for good.
pub async fn mark_failed(
    db: &Database,
    id: i64,
    error: &str,
    disposition: FailureDisposition,
    now: DateTime<Utc>,
) -> Result<bool, CadenceError> {
    let now_ms = to_ms(now);
    let line = format!("{} {}", now.to_rfc3339(), error.replace('\n', " "));
    let (status, retry_at) = match disposition {
        FailureDisposition::Retry { at } => (QueueStatus::Pending, Some(to_ms(at))),
        FailureDisposition::Terminal => (QueueStatus::Failed, None),
    };
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE queue_items
                 SET status = ?2,
                     attempt_count = attempt_count + 1,
                     error_log = COALESCE(error_log || char(10), '') || ?3,
                     scheduled_at = COALESCE(?4, scheduled_at),
                     claimed_at = NULL,
                     updated_at = ?5
                 WHERE id = ?1 AND status = 'processing'",
                params![id, status.as_ref(), line, retry_at, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `processing -> pending` without counting an attempt, optionally moving
/// `scheduled_at`.
pub async fn release(
    db: &Database,
    id: i64,
    reschedule_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<bool, CadenceError> {
    let at = reschedule_at.map(to_ms);
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE queue_items
                 SET status = 'pending', claimed_at = NULL,
                     scheduled_at = COALESCE(?2, scheduled_at), updated_at = ?3
                 WHERE id = ?1 AND status = 'processing'",
                params![id, at, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `pending -> cancelled`. Items already claimed or finished are untouched.
pub async fn cancel(db: &Database, id: i64, now: DateTime<Utc>) -> Result<bool, CadenceError> {
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE queue_items SET status = 'cancelled', updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, now_ms],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Cancel every pending item for a tenant. Returns how many were cancelled.
pub async fn clear_pending(
    db: &Database,
    tenant_id: &str,
    now: DateTime<Utc>,
) -> Result<usize, CadenceError> {
    let tenant_id = tenant_id.to_string();
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE queue_items SET status = 'cancelled', updated_at = ?2
                 WHERE tenant_id = ?1 AND status = 'pending'",
                params![tenant_id, now_ms],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Return items claimed before `claimed_before` and never finished to `pending`.
pub async fn recover_stale_claims(
    db: &Database,
    claimed_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<usize, CadenceError> {
    let cutoff = to_ms(claimed_before);
    let now_ms = to_ms(now);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE queue_items SET status = 'pending', claimed_at = NULL, updated_at = ?2
                 WHERE status = 'processing' AND claimed_at < ?1",
                params![cutoff, now_ms],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Item counts per status for one tenant; statuses with no items are omitted.
pub async fn counts_by_status(
    db: &Database,
    tenant_id: &str,
) -> Result<Vec<(QueueStatus, u64)>, CadenceError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<(QueueStatus, u64)>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM queue_items WHERE tenant_id = ?1
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
    use cadence_core::MessageKind;
    use chrono::{TimeDelta, TimeZone};
    use tempfile::tempdir;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn item(tenant: &str, contact: &str, at: DateTime<Utc>) -> NewQueueItem {
        NewQueueItem {
            tenant_id: tenant.into(),
            contact_id: contact.into(),
            contact_sequence_id: None,
            content: format!("hello {contact}"),
            message_kind: MessageKind::Text,
            scheduled_at: at,
        }
    }

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn list_due_orders_by_schedule_and_skips_future() {
        let (db, _dir) = setup_db().await;
        let later = enqueue(&db, item("t1", "b", t0() - TimeDelta::minutes(1)), t0()).await.unwrap();
        let earlier = enqueue(&db, item("t1", "a", t0() - TimeDelta::minutes(5)), t0()).await.unwrap();
        enqueue(&db, item("t1", "c", t0() + TimeDelta::minutes(5)), t0()).await.unwrap();
        enqueue(&db, item("t2", "d", t0()), t0()).await.unwrap();

        let due = list_due(&db, "t1", t0(), 10).await.unwrap();
        let ids: Vec<i64> = due.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![earlier, later]);
        assert_eq!(
            tenants_with_due(&db, t0()).await.unwrap(),
            vec!["t1".to_string(), "t2".to_string()]
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, item("t1", "a", t0()), t0()).await.unwrap();
        assert!(claim(&db, id, t0()).await.unwrap());
        assert!(!claim(&db, id, t0()).await.unwrap());

        let claimed = get(&db, id).await.unwrap().unwrap();
        assert_eq!(claimed.status, QueueStatus::Processing);
        assert_eq!(claimed.claimed_at, Some(t0()));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, item("t1", "a", t0()), t0()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let db = db.clone();
            handles.push(tokio::spawn(async move { claim(&db, id, t0()).await.unwrap() }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn future_item_cannot_be_claimed() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, item("t1", "a", t0() + TimeDelta::hours(1)), t0()).await.unwrap();
        assert!(!claim(&db, id, t0()).await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failures_append_to_error_log() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, item("t1", "a", t0()), t0()).await.unwrap();

        assert!(claim(&db, id, t0()).await.unwrap());
        let retry_at = t0() + TimeDelta::minutes(1);
        assert!(
            mark_failed(&db, id, "timeout", FailureDisposition::Retry { at: retry_at }, t0())
                .await
                .unwrap()
        );
        let retried = get(&db, id).await.unwrap().unwrap();
        assert_eq!(retried.status, QueueStatus::Pending);
        assert_eq!(retried.scheduled_at, retry_at);
        assert_eq!(retried.attempt_count, 1);
        assert!(retried.claimed_at.is_none());

        assert!(claim(&db, id, retry_at).await.unwrap());
        assert!(
            mark_failed(&db, id, "rejected", FailureDisposition::Terminal, retry_at)
                .await
                .unwrap()
        );
        let failed = get(&db, id).await.unwrap().unwrap();
        assert_eq!(failed.status, QueueStatus::Failed);
        assert_eq!(failed.attempt_count, 2);
        let log = failed.error_log.unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("timeout"));
        assert!(lines[1].ends_with("rejected"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_sent_requires_processing() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, item("t1", "a", t0()), t0()).await.unwrap();
        assert!(!mark_sent(&db, id, "ref-1", t0()).await.unwrap());

        assert!(claim(&db, id, t0()).await.unwrap());
        assert!(mark_sent(&db, id, "ref-1", t0()).await.unwrap());
        let sent = get(&db, id).await.unwrap().unwrap();
        assert_eq!(sent.status, QueueStatus::Sent);
        assert_eq!(sent.message_ref.as_deref(), Some("ref-1"));
        assert_eq!(sent.sent_at, Some(t0()));
        assert_eq!(sent.attempt_count, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn release_reschedules_without_counting_attempt() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, item("t1", "a", t0()), t0()).await.unwrap();
        assert!(claim(&db, id, t0()).await.unwrap());
        let tomorrow = t0() + TimeDelta::days(1);
        assert!(release(&db, id, Some(tomorrow), t0()).await.unwrap());

        let released = get(&db, id).await.unwrap().unwrap();
        assert_eq!(released.status, QueueStatus::Pending);
        assert_eq!(released.scheduled_at, tomorrow);
        assert_eq!(released.attempt_count, 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_only_from_pending() {
        let (db, _dir) = setup_db().await;
        let pending = enqueue(&db, item("t1", "a", t0()), t0()).await.unwrap();
        let processing = enqueue(&db, item("t1", "b", t0()), t0()).await.unwrap();
        assert!(claim(&db, processing, t0()).await.unwrap());

        assert!(cancel(&db, pending, t0()).await.unwrap());
        assert!(!cancel(&db, pending, t0()).await.unwrap());
        assert!(!cancel(&db, processing, t0()).await.unwrap());
        assert_eq!(
            get(&db, processing).await.unwrap().unwrap().status,
            QueueStatus::Processing
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn clear_pending_is_tenant_scoped() {
        let (db, _dir) = setup_db().await;
        let ids = enqueue_many(
            &db,
            vec![
                item("t1", "a", t0()),
                item("t1", "b", t0() + TimeDelta::days(2)),
                item("t2", "c", t0()),
            ],
            t0(),
        )
        .await
        .unwrap();
        assert_eq!(ids.len(), 3);

        assert_eq!(clear_pending(&db, "t1", t0()).await.unwrap(), 2);
        assert_eq!(
            counts_by_status(&db, "t1").await.unwrap(),
            vec![(QueueStatus::Cancelled, 2)]
        );
        assert_eq!(
            counts_by_status(&db, "t2").await.unwrap(),
            vec![(QueueStatus::Pending, 1)]
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn stale_claims_are_recovered() {
        let (db, _dir) = setup_db().await;
        let old = enqueue(&db, item("t1", "a", t0()), t0()).await.unwrap();
        let fresh = enqueue(&db, item("t1", "b", t0()), t0()).await.unwrap();
        assert!(claim(&db, old, t0()).await.unwrap());
        let later = t0() + TimeDelta::minutes(10);
        assert!(claim(&db, fresh, later).await.unwrap());

        let cutoff = later - TimeDelta::minutes(5);
        assert_eq!(recover_stale_claims(&db, cutoff, later).await.unwrap(), 1);
        assert_eq!(get(&db, old).await.unwrap().unwrap().status, QueueStatus::Pending);
        assert_eq!(
            get(&db, fresh).await.unwrap().unwrap().status,
            QueueStatus::Processing
        );
        db.close().await.unwrap();
    }
}
