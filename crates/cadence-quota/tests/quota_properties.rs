// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests: concurrent reservations never push a tenant over its limit.

use cadence_core::SafetySettings;
use cadence_quota::{QuotaTracker, Reservation};
use cadence_storage::Database;
use chrono::{NaiveTime, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;

fn defaults(limit: u32) -> SafetySettings {
    SafetySettings {
        daily_limit: limit,
        min_delay_seconds: 0,
        jitter_seconds: 0,
        business_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        business_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        utc_offset_minutes: 0,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn concurrent_reserves_respect_limit(
        limit in 0u32..12,
        callers in 1usize..40,
        day_offsets in proptest::collection::vec(0i64..3, 1..40),
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let db = Database::open_in_memory().await.unwrap();
            let quota = QuotaTracker::new(db, defaults(limit));
            let start = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
            quota.ensure_tenant("t1", start).await.unwrap();

            // Reservations arrive concurrently within each day; days run in order.
            let mut days: Vec<i64> = day_offsets.iter().copied().take(callers).collect();
            days.sort_unstable();
            days.dedup();
            for day in days {
                let now = start + TimeDelta::days(day);
                let tasks = (0..callers).map(|_| {
                    let quota = quota.clone();
                    tokio::spawn(async move { quota.reserve("t1", now).await.unwrap() })
                });
                let results = futures::future::join_all(tasks).await;
                let allowed = results
                    .into_iter()
                    .filter(|r| *r.as_ref().unwrap() == Reservation::Allowed)
                    .count();

                let expected = callers.min(limit as usize);
                assert_eq!(allowed, expected, "day {day}");
                let usage = quota.usage("t1", now).await.unwrap().unwrap();
                assert!(usage.used_today <= usage.daily_limit);
                assert_eq!(usage.used_today as usize, expected);
            }
        });
    }
}
