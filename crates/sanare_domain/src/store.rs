use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::checklist::StatusKey;
use crate::day::DayKey;
use crate::item::{ItemKind, RecurringItem};
use crate::repository::{DailyStatusRecord, ItemRepository, StatusRepository};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ProfileRecords {
    items: Vec<RecurringItem>,
    statuses: Vec<DailyStatusRecord>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreState {
    profiles: HashMap<String, ProfileRecords>,
}

impl StoreState {
    fn records_mut(&mut self, profile: &str) -> &mut ProfileRecords {
        self.profiles.entry(profile.to_string()).or_default()
    }

    fn list_items(&self, profile: &str, kind: ItemKind) -> Vec<RecurringItem> {
        self.profiles
            .get(profile)
            .map(|records| {
                records
                    .items
                    .iter()
                    .filter(|item| item.kind == kind)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn update_notification_ids(
        &mut self,
        profile: &str,
        kind: ItemKind,
        item_id: &str,
        ids: &[i64],
    ) -> Result<()> {
        let records = self.records_mut(profile);
        let item = records
            .items
            .iter_mut()
            .find(|item| item.kind == kind && item.id == item_id)
            .ok_or_else(|| anyhow!("unknown {kind} `{item_id}`"))?;
        item.notification_ids = ids.to_vec();
        Ok(())
    }

    fn list_statuses(&self, profile: &str, day: DayKey) -> Vec<DailyStatusRecord> {
        self.profiles
            .get(profile)
            .map(|records| {
                records
                    .statuses
                    .iter()
                    .filter(|record| record.key.day == day)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn upsert_status(&mut self, profile: &str, key: &StatusKey, checked: bool, inactive: bool) {
        let records = self.records_mut(profile);
        match records.statuses.iter_mut().find(|record| record.key == *key) {
            Some(record) => {
                record.checked = checked;
                record.inactive = inactive;
                record.updated_at = Utc::now();
            }
            None => records.statuses.push(DailyStatusRecord {
                key: key.clone(),
                checked,
                inactive,
                updated_at: Utc::now(),
            }),
        }
    }

    fn delete_statuses(&mut self, profile: &str, day: DayKey) -> usize {
        let records = self.records_mut(profile);
        let before = records.statuses.len();
        records.statuses.retain(|record| record.key.day != day);
        before - records.statuses.len()
    }

    fn put_item(&mut self, profile: &str, item: RecurringItem) {
        let records = self.records_mut(profile);
        records
            .items
            .retain(|existing| !(existing.kind == item.kind && existing.id == item.id));
        records.items.push(item);
    }

    fn remove_item(&mut self, profile: &str, kind: ItemKind, item_id: &str) -> bool {
        let records = self.records_mut(profile);
        let before = records.items.len();
        records
            .items
            .retain(|item| !(item.kind == kind && item.id == item_id));
        before != records.items.len()
    }
}

/// Volatile reference backend for tests and headless contexts.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace an item. Item lifecycle lives outside the core, so
    /// this is a store helper rather than part of the repository contract.
    pub fn put_item(&self, profile: &str, item: RecurringItem) {
        self.state.write().put_item(profile, item);
    }

    pub fn remove_item(&self, profile: &str, kind: ItemKind, item_id: &str) -> bool {
        self.state.write().remove_item(profile, kind, item_id)
    }
}

impl ItemRepository for MemoryStore {
    fn list_medications(&self, profile: &str) -> Result<Vec<RecurringItem>> {
        Ok(self.state.read().list_items(profile, ItemKind::Medication))
    }

    fn list_reminders(&self, profile: &str) -> Result<Vec<RecurringItem>> {
        Ok(self.state.read().list_items(profile, ItemKind::Reminder))
    }

    fn update_notification_ids(
        &self,
        profile: &str,
        kind: ItemKind,
        item_id: &str,
        ids: &[i64],
    ) -> Result<()> {
        self.state
            .write()
            .update_notification_ids(profile, kind, item_id, ids)
    }
}

impl StatusRepository for MemoryStore {
    fn list_statuses(&self, profile: &str, day: DayKey) -> Result<Vec<DailyStatusRecord>> {
        Ok(self.state.read().list_statuses(profile, day))
    }

    fn upsert_status(
        &self,
        profile: &str,
        key: &StatusKey,
        checked: bool,
        inactive: bool,
    ) -> Result<()> {
        self.state.write().upsert_status(profile, key, checked, inactive);
        Ok(())
    }

    fn delete_statuses(&self, profile: &str, day: DayKey) -> Result<usize> {
        Ok(self.state.write().delete_statuses(profile, day))
    }
}

/// File-backed reference backend. Every mutation is written through to a
/// single pretty-printed JSON document; reopening the path restores the
/// full state.
pub struct JsonStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl JsonStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read store at {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("malformed store file at {}", path.display()))?
        } else {
            StoreState::default()
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn put_item(&self, profile: &str, item: RecurringItem) -> Result<()> {
        let mut state = self.state.write();
        state.put_item(profile, item);
        self.persist(&state)
    }

    pub fn remove_item(&self, profile: &str, kind: ItemKind, item_id: &str) -> Result<bool> {
        let mut state = self.state.write();
        let removed = state.remove_item(profile, kind, item_id);
        if removed {
            self.persist(&state)?;
        }
        Ok(removed)
    }

    fn persist(&self, state: &StoreState) -> Result<()> {
        let raw = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write store at {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "store persisted");
        Ok(())
    }
}

impl ItemRepository for JsonStore {
    fn list_medications(&self, profile: &str) -> Result<Vec<RecurringItem>> {
        Ok(self.state.read().list_items(profile, ItemKind::Medication))
    }

    fn list_reminders(&self, profile: &str) -> Result<Vec<RecurringItem>> {
        Ok(self.state.read().list_items(profile, ItemKind::Reminder))
    }

    fn update_notification_ids(
        &self,
        profile: &str,
        kind: ItemKind,
        item_id: &str,
        ids: &[i64],
    ) -> Result<()> {
        let mut state = self.state.write();
        state.update_notification_ids(profile, kind, item_id, ids)?;
        self.persist(&state)
    }
}

impl StatusRepository for JsonStore {
    fn list_statuses(&self, profile: &str, day: DayKey) -> Result<Vec<DailyStatusRecord>> {
        Ok(self.state.read().list_statuses(profile, day))
    }

    fn upsert_status(
        &self,
        profile: &str,
        key: &StatusKey,
        checked: bool,
        inactive: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        state.upsert_status(profile, key, checked, inactive);
        self.persist(&state)
    }

    fn delete_statuses(&self, profile: &str, day: DayKey) -> Result<usize> {
        let mut state = self.state.write();
        let removed = state.delete_statuses(profile, day);
        if removed > 0 {
            self.persist(&state)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::TimeOfDay;
    use tempfile::tempdir;

    fn t(raw: &str) -> TimeOfDay {
        TimeOfDay::parse(raw).unwrap()
    }

    fn key(day: &str, item_id: &str, time: &str) -> StatusKey {
        StatusKey {
            day: DayKey::parse(day).unwrap(),
            kind: ItemKind::Medication,
            item_id: item_id.to_string(),
            time: t(time),
        }
    }

    #[test]
    fn upsert_creates_then_updates_in_place() {
        let store = MemoryStore::new();
        let key = key("2024-03-10", "a", "08:00");

        store.upsert_status("self", &key, true, false).unwrap();
        store.upsert_status("self", &key, false, true).unwrap();

        let statuses = store
            .list_statuses("self", DayKey::parse("2024-03-10").unwrap())
            .unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(!statuses[0].checked);
        assert!(statuses[0].inactive);
    }

    #[test]
    fn delete_statuses_only_touches_the_given_day() {
        let store = MemoryStore::new();
        store
            .upsert_status("self", &key("2024-03-10", "a", "08:00"), true, false)
            .unwrap();
        store
            .upsert_status("self", &key("2024-03-11", "a", "08:00"), true, false)
            .unwrap();

        let removed = store
            .delete_statuses("self", DayKey::parse("2024-03-10").unwrap())
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            store
                .list_statuses("self", DayKey::parse("2024-03-11").unwrap())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn profiles_are_isolated() {
        let store = MemoryStore::new();
        store.put_item(
            "alice",
            RecurringItem::new("a", ItemKind::Medication, "Paracetamol").with_times([t("08:00")]),
        );
        assert_eq!(store.list_medications("alice").unwrap().len(), 1);
        assert!(store.list_medications("bob").unwrap().is_empty());
    }

    #[test]
    fn updating_ids_of_an_unknown_item_fails() {
        let store = MemoryStore::new();
        let err = store
            .update_notification_ids("self", ItemKind::Medication, "ghost", &[1])
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn json_store_round_trips_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("sanare.json");

        {
            let store = JsonStore::open(&path).expect("open fresh store");
            store
                .put_item(
                    "self",
                    RecurringItem::new("a", ItemKind::Medication, "Paracetamol")
                        .with_times([t("08:00"), t("20:00")]),
                )
                .unwrap();
            store
                .upsert_status("self", &key("2024-03-10", "a", "08:00"), true, false)
                .unwrap();
            store
                .update_notification_ids("self", ItemKind::Medication, "a", &[41, 42])
                .unwrap();
        }

        let reopened = JsonStore::open(&path).expect("reopen store");
        let meds = reopened.list_medications("self").unwrap();
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0].notification_ids, vec![41, 42]);
        let statuses = reopened
            .list_statuses("self", DayKey::parse("2024-03-10").unwrap())
            .unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].checked);
    }
}
