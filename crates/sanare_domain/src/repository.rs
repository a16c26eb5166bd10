use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checklist::StatusKey;
use crate::day::DayKey;
use crate::item::{ItemKind, RecurringItem};

/// Durable per-day status row, created implicitly on first toggle via
/// upsert and removed only by a bulk "reset today".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyStatusRecord {
    pub key: StatusKey,
    pub checked: bool,
    pub inactive: bool,
    pub updated_at: DateTime<Utc>,
}

/// Read access to recurring item definitions plus the single write-back the
/// core performs: replacing an item's registered notification ids wholesale.
pub trait ItemRepository: Send + Sync {
    fn list_medications(&self, profile: &str) -> Result<Vec<RecurringItem>>;

    fn list_reminders(&self, profile: &str) -> Result<Vec<RecurringItem>>;

    fn update_notification_ids(
        &self,
        profile: &str,
        kind: ItemKind,
        item_id: &str,
        ids: &[i64],
    ) -> Result<()>;
}

/// Durable checked/inactive state, keyed by the composite natural key.
/// Upserts resolve conflicts on that key; last write wins.
pub trait StatusRepository: Send + Sync {
    fn list_statuses(&self, profile: &str, day: DayKey) -> Result<Vec<DailyStatusRecord>>;

    fn upsert_status(
        &self,
        profile: &str,
        key: &StatusKey,
        checked: bool,
        inactive: bool,
    ) -> Result<()>;

    /// Bulk reset for one day. Returns the number of rows removed.
    fn delete_statuses(&self, profile: &str, day: DayKey) -> Result<usize>;
}

/// Consulted before committing a medication "checked" toggle. A `false`
/// answer vetoes the toggle; it is an expected rejection, not an error.
pub trait StockGuard: Send + Sync {
    fn has_sufficient_stock(&self, item_id: &str) -> bool;
}
