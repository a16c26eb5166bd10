use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use crate::checklist::{self, ChecklistEntry};
use crate::day::{self, AuthoritativeClock, DayKey, SystemClock};
use crate::error::ToggleError;
use crate::item::{ItemKind, RecurringItem};
use crate::notifications::{self, NoopNotifier, PlatformNotifier};
use crate::repository::{ItemRepository, StatusRepository, StockGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFlag {
    Checked,
    Inactive,
}

/// Result of a toggle that did not fail: either the flag was persisted or
/// the stock guard vetoed it before any state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Committed,
    StockRejected,
}

#[derive(Default)]
struct ChecklistState {
    day: Option<DayKey>,
    entries: Vec<ChecklistEntry>,
}

/// Owns the in-memory daily checklist for one profile and coordinates the
/// collaborators around it: item/status repositories, the authoritative
/// clock, the platform notifier, and the optional stock guard.
pub struct ChecklistService {
    profile: String,
    items: Arc<dyn ItemRepository>,
    statuses: Arc<dyn StatusRepository>,
    clock: Arc<dyn AuthoritativeClock>,
    notifier: Arc<dyn PlatformNotifier>,
    stock_guard: Option<Arc<dyn StockGuard>>,
    state: RwLock<ChecklistState>,
}

pub struct ChecklistServiceBuilder {
    profile: Option<String>,
    items: Option<Arc<dyn ItemRepository>>,
    statuses: Option<Arc<dyn StatusRepository>>,
    clock: Arc<dyn AuthoritativeClock>,
    notifier: Arc<dyn PlatformNotifier>,
    stock_guard: Option<Arc<dyn StockGuard>>,
}

impl ChecklistServiceBuilder {
    pub fn new() -> Self {
        Self {
            profile: None,
            items: None,
            statuses: None,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(NoopNotifier),
            stock_guard: None,
        }
    }

    pub fn for_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_item_repository(mut self, items: Arc<dyn ItemRepository>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn with_status_repository(mut self, statuses: Arc<dyn StatusRepository>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn AuthoritativeClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn PlatformNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_stock_guard(mut self, guard: Arc<dyn StockGuard>) -> Self {
        self.stock_guard = Some(guard);
        self
    }

    /// Builds the service and performs the initial reload.
    pub fn build(self) -> Result<ChecklistService> {
        let profile = self
            .profile
            .filter(|profile| !profile.is_empty())
            .ok_or_else(|| anyhow!("a profile is required"))?;
        let items = self
            .items
            .ok_or_else(|| anyhow!("an item repository is required"))?;
        let statuses = self
            .statuses
            .ok_or_else(|| anyhow!("a status repository is required"))?;
        let service = ChecklistService {
            profile,
            items,
            statuses,
            clock: self.clock,
            notifier: self.notifier,
            stock_guard: self.stock_guard,
            state: RwLock::new(ChecklistState::default()),
        };
        service.reload()?;
        Ok(service)
    }
}

impl Default for ChecklistServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecklistService {
    pub fn builder() -> ChecklistServiceBuilder {
        ChecklistServiceBuilder::new()
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Snapshot of the projected entries, in time order.
    pub fn entries(&self) -> Vec<ChecklistEntry> {
        self.state.read().entries.clone()
    }

    /// Day key the current projection was built for.
    pub fn loaded_day(&self) -> Option<DayKey> {
        self.state.read().day
    }

    pub fn resolve_today(&self) -> DayKey {
        day::resolve_today(self.clock.as_ref())
    }

    pub fn local_now(&self) -> NaiveDateTime {
        day::local_now(self.clock.as_ref())
    }

    pub fn millis_until_next_midnight(&self) -> u64 {
        day::millis_until_next_midnight(self.local_now())
    }

    pub fn pending_notifications(&self) -> usize {
        self.notifier.pending_count()
    }

    /// Re-fetch items and statuses and rebuild the projection. Any fetch
    /// failure aborts the pass and leaves the previous state in place.
    #[instrument(skip(self), fields(profile = %self.profile))]
    pub fn reload(&self) -> Result<()> {
        let day = self.resolve_today();
        let mut items = self
            .items
            .list_medications(&self.profile)
            .context("failed to load medications")?;
        items.extend(
            self.items
                .list_reminders(&self.profile)
                .context("failed to load reminders")?,
        );
        let statuses = self
            .statuses
            .list_statuses(&self.profile, day)
            .context("failed to load daily statuses")?;
        let entries = checklist::project(&items, day, &statuses);

        info!(day = %day, entry_count = entries.len(), "checklist reloaded");
        let mut state = self.state.write();
        state.day = Some(day);
        state.entries = entries;
        Ok(())
    }

    pub fn set_checked(&self, entry_id: &str, value: bool) -> Result<ToggleOutcome, ToggleError> {
        self.set_flag(entry_id, StatusFlag::Checked, value)
    }

    pub fn set_inactive(&self, entry_id: &str, value: bool) -> Result<ToggleOutcome, ToggleError> {
        self.set_flag(entry_id, StatusFlag::Inactive, value)
    }

    /// Toggle one entry's flag: stock-guard veto first, then an optimistic
    /// in-memory update, then the upsert keyed by the natural key. An
    /// upsert failure reverts the in-memory entry before returning, so the
    /// update is never left in flight.
    pub fn set_flag(
        &self,
        entry_id: &str,
        flag: StatusFlag,
        value: bool,
    ) -> Result<ToggleOutcome, ToggleError> {
        let (key, prev_checked, prev_inactive, kind, item_id) = {
            let state = self.state.read();
            let day = state
                .day
                .ok_or_else(|| ToggleError::UnknownEntry(entry_id.to_string()))?;
            let entry = state
                .entries
                .iter()
                .find(|entry| entry.id == entry_id)
                .ok_or_else(|| ToggleError::UnknownEntry(entry_id.to_string()))?;
            (
                entry.status_key(day),
                entry.checked,
                entry.inactive,
                entry.kind,
                entry.item_id.clone(),
            )
        };

        if flag == StatusFlag::Checked && value && kind == ItemKind::Medication {
            if let Some(guard) = &self.stock_guard {
                if !guard.has_sufficient_stock(&item_id) {
                    debug!(entry = entry_id, "toggle vetoed, insufficient stock");
                    return Ok(ToggleOutcome::StockRejected);
                }
            }
        }

        // Setting a flag true clears its counterpart; clearing a flag
        // leaves the counterpart untouched.
        let (checked, inactive) = match flag {
            StatusFlag::Checked => (value, if value { false } else { prev_inactive }),
            StatusFlag::Inactive => (if value { false } else { prev_checked }, value),
        };

        self.apply_entry_flags(entry_id, checked, inactive);

        if let Err(cause) = self
            .statuses
            .upsert_status(&self.profile, &key, checked, inactive)
        {
            self.apply_entry_flags(entry_id, prev_checked, prev_inactive);
            return Err(ToggleError::Persist { cause });
        }
        debug!(entry = entry_id, checked, inactive, "status persisted");
        Ok(ToggleOutcome::Committed)
    }

    /// Bulk-delete the loaded day's statuses and rebuild the projection.
    pub fn reset_day(&self) -> Result<usize> {
        let day = self.loaded_day().unwrap_or_else(|| self.resolve_today());
        let removed = self.statuses.delete_statuses(&self.profile, day)?;
        self.reload()?;
        info!(day = %day, removed, "daily statuses reset");
        Ok(removed)
    }

    /// Resynchronize one item's local notifications and persist the fresh
    /// ids wholesale onto the item record.
    pub fn resync_item(&self, item: &RecurringItem) -> Result<Vec<i64>> {
        let ids = notifications::resync(self.notifier.as_ref(), item, self.local_now())?;
        self.items
            .update_notification_ids(&self.profile, item.kind, &item.id, &ids)?;
        Ok(ids)
    }

    /// Startup sweep: resynchronize every item so device notifications
    /// match the current schedule even if a previous session crashed
    /// mid-update.
    #[instrument(skip(self), fields(profile = %self.profile))]
    pub fn resync_all(&self) -> Result<usize> {
        let mut items = self.items.list_medications(&self.profile)?;
        items.extend(self.items.list_reminders(&self.profile)?);
        for item in &items {
            self.resync_item(item)?;
        }
        info!(item_count = items.len(), "notification sweep completed");
        Ok(items.len())
    }

    fn apply_entry_flags(&self, entry_id: &str, checked: bool, inactive: bool) {
        let mut state = self.state.write();
        if let Some(entry) = state.entries.iter_mut().find(|entry| entry.id == entry_id) {
            entry.checked = checked;
            entry.inactive = inactive;
        }
    }
}
