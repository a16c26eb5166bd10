use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::day::DayKey;
use crate::item::{ItemKind, RecurringItem, TimeOfDay};
use crate::repository::DailyStatusRecord;

/// Composite natural key for one daily slot. The same tuple keys both
/// status-store lookups and upsert conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatusKey {
    pub day: DayKey,
    pub kind: ItemKind,
    pub item_id: String,
    pub time: TimeOfDay,
}

/// One projected (item, time) slot for a specific day. Rebuilt from scratch
/// on every projection; only `checked`/`inactive` are ever persisted, under
/// the natural key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecklistEntry {
    pub id: String,
    pub item_id: String,
    pub kind: ItemKind,
    pub display_name: String,
    pub time: TimeOfDay,
    pub checked: bool,
    pub inactive: bool,
}

impl ChecklistEntry {
    pub fn compose_id(kind: ItemKind, item_id: &str, time: TimeOfDay) -> String {
        format!("{kind}:{item_id}:{time}")
    }

    pub fn status_key(&self, day: DayKey) -> StatusKey {
        StatusKey {
            day,
            kind: self.kind,
            item_id: self.item_id.clone(),
            time: self.time,
        }
    }

    pub fn pending(&self) -> bool {
        !self.checked && !self.inactive
    }
}

impl PartialOrd for ChecklistEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChecklistEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.display_name.cmp(&other.display_name))
            .then_with(|| self.item_id.cmp(&other.item_id))
    }
}

/// Expand every recurring item into its daily slots, overlay persisted
/// statuses for the same day, and return the entries in time order.
/// Pure: identical inputs always produce identical output.
pub fn project(
    items: &[RecurringItem],
    day: DayKey,
    statuses: &[DailyStatusRecord],
) -> Vec<ChecklistEntry> {
    let mut persisted: HashMap<(ItemKind, &str, TimeOfDay), &DailyStatusRecord> = HashMap::new();
    for record in statuses {
        if record.key.day != day {
            continue;
        }
        persisted.insert(
            (record.key.kind, record.key.item_id.as_str(), record.key.time),
            record,
        );
    }

    let mut entries = Vec::new();
    for item in items {
        for time in item.sorted_times() {
            let mut entry = ChecklistEntry {
                id: ChecklistEntry::compose_id(item.kind, &item.id, time),
                item_id: item.id.clone(),
                kind: item.kind,
                display_name: item.display_name.clone(),
                time,
                checked: false,
                inactive: false,
            };
            if let Some(record) = persisted.get(&(item.kind, item.id.as_str(), time)) {
                entry.checked = record.checked;
                entry.inactive = record.inactive;
            }
            entries.push(entry);
        }
    }

    entries.sort();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn t(raw: &str) -> TimeOfDay {
        TimeOfDay::parse(raw).unwrap()
    }

    fn day() -> DayKey {
        DayKey::parse("2024-03-10").unwrap()
    }

    fn med(id: &str, name: &str, times: &[&str]) -> RecurringItem {
        RecurringItem::new(id, ItemKind::Medication, name)
            .with_times(times.iter().map(|raw| t(raw)))
    }

    fn status(kind: ItemKind, item_id: &str, time: &str, checked: bool, inactive: bool) -> DailyStatusRecord {
        DailyStatusRecord {
            key: StatusKey {
                day: day(),
                kind,
                item_id: item_id.to_string(),
                time: t(time),
            },
            checked,
            inactive,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn item_without_times_projects_nothing() {
        let items = vec![med("a", "Paracetamol", &[])];
        assert!(project(&items, day(), &[]).is_empty());
    }

    #[test]
    fn distinct_times_yield_distinct_entries() {
        let items = vec![med("a", "Paracetamol", &["08:00", "14:00", "20:00"])];
        let entries = project(&items, day(), &[]);
        assert_eq!(entries.len(), 3);
        let mut ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert!(entries.iter().all(|e| e.pending()));
    }

    #[test]
    fn duplicate_times_collapse_and_order_is_non_decreasing() {
        let items = vec![med("a", "Paracetamol", &["14:00", "08:00", "08:00"])];
        let entries = project(&items, day(), &[]);
        assert_eq!(entries.len(), 2);
        for pair in entries.windows(2) {
            assert!(pair[0].time <= pair[1].time);
        }
    }

    #[test]
    fn persisted_status_merges_onto_matching_tuple_only() {
        let items = vec![
            med("a", "Paracetamol", &["08:00", "20:00"]),
            RecurringItem::new("b", ItemKind::Reminder, "Drink water")
                .with_times([t("08:00")]),
        ];
        let statuses = vec![status(ItemKind::Medication, "a", "08:00", true, false)];
        let entries = project(&items, day(), &statuses);
        assert_eq!(entries.len(), 3);
        for entry in &entries {
            let expected = entry.kind == ItemKind::Medication && entry.time == t("08:00");
            assert_eq!(entry.checked, expected, "entry {}", entry.id);
            assert!(!entry.inactive);
        }
    }

    #[test]
    fn statuses_from_other_days_are_ignored() {
        let items = vec![med("a", "Paracetamol", &["08:00"])];
        let mut stale = status(ItemKind::Medication, "a", "08:00", true, false);
        stale.key.day = DayKey::parse("2024-03-09").unwrap();
        let entries = project(&items, day(), &[stale]);
        assert!(entries[0].pending());
    }

    #[test]
    fn projection_is_idempotent() {
        let items = vec![
            med("a", "Paracetamol", &["20:00", "08:00"]),
            RecurringItem::new("b", ItemKind::Reminder, "Stretch").with_times([t("08:00")]),
        ];
        let statuses = vec![status(ItemKind::Reminder, "b", "08:00", false, true)];
        let first = project(&items, day(), &statuses);
        let second = project(&items, day(), &statuses);
        assert_eq!(first, second);
    }
}
