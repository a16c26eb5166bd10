use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DayKeyError;

/// Canonical `YYYY-MM-DD` identifier for a calendar day in the device's
/// local timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn parse(raw: &str) -> Result<Self, DayKeyError> {
        if raw.len() != 10 {
            return Err(DayKeyError::Invalid(raw.to_string()));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| DayKeyError::Invalid(raw.to_string()))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl TryFrom<String> for DayKey {
    type Error = DayKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DayKey> for String {
    fn from(value: DayKey) -> Self {
        value.to_string()
    }
}

/// Server-backed wall clock. The call may fail when the backend is
/// unreachable; callers fall back to the device clock.
pub trait AuthoritativeClock: Send + Sync {
    fn now(&self) -> Result<DateTime<Utc>>;
}

/// Device clock, used both as the default and as the failover source.
pub struct SystemClock;

impl AuthoritativeClock for SystemClock {
    fn now(&self) -> Result<DateTime<Utc>> {
        Ok(Utc::now())
    }
}

/// Local wall-clock "now", preferring the authoritative clock and falling
/// back to the device clock. Never fails.
pub fn local_now(clock: &dyn AuthoritativeClock) -> NaiveDateTime {
    match clock.now() {
        Ok(now) => now.with_timezone(&Local).naive_local(),
        Err(err) => {
            tracing::warn!(%err, "authoritative clock unavailable, using device time");
            Local::now().naive_local()
        }
    }
}

pub fn resolve_today(clock: &dyn AuthoritativeClock) -> DayKey {
    DayKey::new(local_now(clock).date())
}

/// Milliseconds from `now` to the next local midnight, clamped to zero on
/// clock skew. Evaluated exactly at midnight this reports the following
/// midnight, a full day away.
pub fn millis_until_next_midnight(now: NaiveDateTime) -> u64 {
    let Some(next_midnight) = now
        .date()
        .checked_add_days(Days::new(1))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
    else {
        return 0;
    };
    (next_midnight - now).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FixedClock(DateTime<Utc>);

    impl AuthoritativeClock for FixedClock {
        fn now(&self) -> Result<DateTime<Utc>> {
            Ok(self.0)
        }
    }

    struct FailingClock;

    impl AuthoritativeClock for FailingClock {
        fn now(&self) -> Result<DateTime<Utc>> {
            Err(anyhow!("time service unreachable"))
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn day_key_parses_and_renders_canonically() {
        let key = DayKey::parse("2024-03-10").expect("valid key");
        assert_eq!(key.to_string(), "2024-03-10");
        assert!(DayKey::parse("2024-3-10").is_err());
        assert!(DayKey::parse("2024-13-01").is_err());
        assert!(DayKey::parse("today").is_err());
    }

    #[test]
    fn millis_until_midnight_just_before_rollover() {
        let delta = millis_until_next_midnight(at(2024, 3, 10, 23, 59, 59));
        assert!(delta > 0 && delta <= 1_000, "got {delta}");
    }

    #[test]
    fn millis_until_midnight_at_exact_midnight_spans_a_full_day() {
        let delta = millis_until_next_midnight(at(2024, 3, 10, 0, 0, 0));
        assert_eq!(delta, 86_400_000);
    }

    #[test]
    fn millis_until_midnight_at_noon() {
        let delta = millis_until_next_midnight(at(2024, 3, 10, 12, 0, 0));
        assert_eq!(delta, 43_200_000);
    }

    #[test]
    fn resolve_today_prefers_authoritative_clock() {
        // Noon UTC keeps the local date identical across common offsets.
        let instant = DateTime::parse_from_rfc3339("2024-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let resolved = resolve_today(&FixedClock(instant));
        let expected = DayKey::new(instant.with_timezone(&Local).date_naive());
        assert_eq!(resolved, expected);
    }

    #[test]
    fn resolve_today_falls_back_to_device_clock() {
        let resolved = resolve_today(&FailingClock);
        let device = DayKey::new(Local::now().date_naive());
        assert_eq!(resolved, device);
    }
}
