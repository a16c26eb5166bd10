use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::TimeOfDayError;

/// A wall-clock time a recurring item fires at, validated once at the
/// repository boundary and rendered as zero-padded `HH:MM` everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn parse(raw: &str) -> Result<Self, TimeOfDayError> {
        let bytes = raw.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(TimeOfDayError::Invalid(raw.to_string()));
        }
        NaiveTime::parse_from_str(raw, "%H:%M")
            .map(Self)
            .map_err(|_| TimeOfDayError::Invalid(raw.to_string()))
    }

    pub fn from_time(time: NaiveTime) -> Self {
        Self(time)
    }

    pub fn as_time(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = TimeOfDayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Medication,
    Reminder,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Medication => write!(f, "medication"),
            ItemKind::Reminder => write!(f, "reminder"),
        }
    }
}

/// A medication or reminder definition as read from the item repository.
/// The core treats each read as an immutable snapshot and writes back only
/// `notification_ids`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurringItem {
    pub id: String,
    pub kind: ItemKind,
    pub display_name: String,
    pub scheduled_times: Vec<TimeOfDay>,
    /// Calendar days a reminder is pinned to; empty means "every day".
    #[serde(default)]
    pub explicit_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub notification_ids: Vec<i64>,
}

impl RecurringItem {
    pub fn new(id: impl Into<String>, kind: ItemKind, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            display_name: display_name.into(),
            scheduled_times: Vec::new(),
            explicit_dates: Vec::new(),
            notification_ids: Vec::new(),
        }
    }

    pub fn with_times(mut self, times: impl IntoIterator<Item = TimeOfDay>) -> Self {
        self.scheduled_times = times.into_iter().collect();
        self
    }

    pub fn with_dates(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.explicit_dates = dates.into_iter().collect();
        self
    }

    /// De-duplicated ascending view of the scheduled times.
    pub fn sorted_times(&self) -> Vec<TimeOfDay> {
        let set: BTreeSet<TimeOfDay> = self.scheduled_times.iter().copied().collect();
        set.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zero_padded_times() {
        let time = TimeOfDay::parse("08:30").expect("valid time");
        assert_eq!(time.to_string(), "08:30");
        assert_eq!(
            time.as_time(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap()
        );
    }

    #[test]
    fn rejects_malformed_times() {
        for raw in ["8:30", "08.30", "24:00", "08:60", "0800", "", "banana"] {
            assert_eq!(
                TimeOfDay::parse(raw),
                Err(TimeOfDayError::Invalid(raw.to_string())),
                "`{raw}` should be rejected"
            );
        }
    }

    #[test]
    fn serde_round_trips_through_canonical_string() {
        let time = TimeOfDay::parse("21:05").unwrap();
        let json = serde_json::to_string(&time).unwrap();
        assert_eq!(json, "\"21:05\"");
        let back: TimeOfDay = serde_json::from_str(&json).unwrap();
        assert_eq!(back, time);

        let malformed: Result<TimeOfDay, _> = serde_json::from_str("\"9:00\"");
        assert!(malformed.is_err());
    }

    #[test]
    fn sorted_times_deduplicates_and_orders() {
        let item = RecurringItem::new("a", ItemKind::Medication, "Paracetamol").with_times([
            TimeOfDay::parse("14:00").unwrap(),
            TimeOfDay::parse("08:00").unwrap(),
            TimeOfDay::parse("08:00").unwrap(),
        ]);
        let times: Vec<String> = item.sorted_times().iter().map(|t| t.to_string()).collect();
        assert_eq!(times, vec!["08:00", "14:00"]);
    }
}
