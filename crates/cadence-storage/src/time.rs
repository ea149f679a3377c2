// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversions between `chrono` values and their column representations.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Type;

/// Epoch milliseconds, the storage form of every timestamp.
pub fn to_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn from_ms(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn conversion_err(idx: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, msg.into())
}

/// Reads an epoch-ms column.
pub(crate) fn ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    from_ms(ms).ok_or_else(|| conversion_err(idx, Type::Integer, format!("timestamp {ms} out of range")))
}

/// Reads a nullable epoch-ms column.
pub(crate) fn opt_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        None => Ok(None),
        Some(_) => ts(row, idx).map(Some),
    }
}

/// Reads a non-negative integer column into a `u64`.
pub(crate) fn count(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let n: i64 = row.get(idx)?;
    u64::try_from(n).map_err(|_| conversion_err(idx, Type::Integer, format!("negative count {n}")))
}

pub(crate) fn date(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| conversion_err(idx, Type::Text, format!("date `{s}`: {e}")))
}

pub(crate) fn clock(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    let s: String = row.get(idx)?;
    NaiveTime::parse_from_str(&s, "%H:%M:%S")
        .map_err(|e| conversion_err(idx, Type::Text, format!("time `{s}`: {e}")))
}

/// Parses a `snake_case` status column into its enum.
pub(crate) fn parse_col<T: std::str::FromStr>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    s.parse()
        .map_err(|_| conversion_err(idx, Type::Text, format!("unrecognized value `{s}`")))
}

pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn format_clock(t: NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}
