// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential retry for failed sends.

use std::time::Duration;

use cadence_core::FailureDisposition;
use chrono::{DateTime, TimeDelta, Utc};

/// How many times a send is attempted and how long to wait between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_retries: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// What to do with an item whose `attempt`-th send just failed.
    pub fn disposition(&self, attempt: u32, permanent: bool, now: DateTime<Utc>) -> FailureDisposition {
        if permanent || attempt >= self.max_retries {
            return FailureDisposition::Terminal;
        }
        let delay = TimeDelta::from_std(self.backoff(attempt)).unwrap_or(TimeDelta::MAX);
        FailureDisposition::Retry {
            at: now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(600),
        };
        let delays: Vec<u64> = (1..=6).map(|a| policy.backoff(a).as_secs()).collect();
        assert_eq!(delays, vec![60, 120, 240, 480, 600, 600]);
    }

    #[test]
    fn backoff_survives_huge_attempt_numbers() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(200), policy.max_delay);
        assert_eq!(policy.backoff(0), policy.base_delay);
    }

    #[test]
    fn disposition_retries_until_budget_spent() {
        let policy = RetryPolicy::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        assert_eq!(
            policy.disposition(1, false, now),
            FailureDisposition::Retry {
                at: now + TimeDelta::seconds(60)
            }
        );
        assert_eq!(
            policy.disposition(2, false, now),
            FailureDisposition::Retry {
                at: now + TimeDelta::seconds(120)
            }
        );
        assert_eq!(policy.disposition(3, false, now), FailureDisposition::Terminal);
    }

    #[test]
    fn permanent_failures_are_terminal_immediately() {
        let policy = RetryPolicy::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        assert_eq!(policy.disposition(1, true, now), FailureDisposition::Terminal);
    }
}
