use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::item::{ItemKind, RecurringItem};

/// When a local notification fires. Instants are local wall-clock times,
/// matching what the device notification store expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationTrigger {
    /// First fire at `at`, repeating every day thereafter.
    Daily { at: NaiveDateTime },
    /// Single fire at `at`.
    Once { at: NaiveDateTime },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub trigger: NotificationTrigger,
}

/// Platform-specific notification adapters implement this trait. Contexts
/// without local-notification support report `is_available() == false` and
/// treat every call as a no-op.
pub trait PlatformNotifier: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    /// Register all requests in one batched call.
    fn schedule_batch(&self, requests: &[NotificationRequest]) -> Result<()>;

    fn cancel_batch(&self, ids: &[i64]) -> Result<()>;

    fn pending_count(&self) -> usize;
}

/// Degraded-mode notifier for contexts with no local notification store.
pub struct NoopNotifier;

impl PlatformNotifier for NoopNotifier {
    fn is_available(&self) -> bool {
        false
    }

    fn schedule_batch(&self, _requests: &[NotificationRequest]) -> Result<()> {
        Ok(())
    }

    fn cancel_batch(&self, _ids: &[i64]) -> Result<()> {
        Ok(())
    }

    fn pending_count(&self) -> usize {
        0
    }
}

/// Collision-resistant positive 63-bit notification id drawn from UUIDv4
/// entropy.
pub fn generate_notification_id() -> i64 {
    let raw = u128::from_le_bytes(*Uuid::new_v4().as_bytes());
    (((raw >> 65) as i64) & i64::MAX).max(1)
}

/// Build the notification requests matching an item's current schedule.
/// Daily items get one repeating request per time, anchored at the next
/// future occurrence; date-pinned reminders get one one-shot request per
/// (date, time) pair, skipping instants already in the past.
pub fn plan_requests(item: &RecurringItem, now: NaiveDateTime) -> Vec<NotificationRequest> {
    let title = match item.kind {
        ItemKind::Medication => format!("Medication: {}", item.display_name),
        ItemKind::Reminder => format!("Reminder: {}", item.display_name),
    };

    let mut requests = Vec::new();
    if item.explicit_dates.is_empty() {
        for time in item.sorted_times() {
            let today_at = now.date().and_time(time.as_time());
            let at = if today_at > now {
                today_at
            } else {
                today_at + Duration::days(1)
            };
            requests.push(NotificationRequest {
                id: generate_notification_id(),
                title: title.clone(),
                body: format!("Scheduled daily at {time}"),
                trigger: NotificationTrigger::Daily { at },
            });
        }
    } else {
        for &date in &item.explicit_dates {
            for time in item.sorted_times() {
                let at = date.and_time(time.as_time());
                if at <= now {
                    continue;
                }
                requests.push(NotificationRequest {
                    id: generate_notification_id(),
                    title: title.clone(),
                    body: format!("Scheduled for {} {}", date.format("%Y-%m-%d"), time),
                    trigger: NotificationTrigger::Once { at },
                });
            }
        }
    }
    requests
}

/// Cancel-then-reregister cycle for one item. Cancellation of stale ids is
/// best-effort and always precedes registration; the returned ids replace
/// the item's stored `notification_ids` wholesale. On an unavailable
/// platform this is a no-op returning the empty list, which callers still
/// persist to clear stale ids.
pub fn resync(
    notifier: &dyn PlatformNotifier,
    item: &RecurringItem,
    now: NaiveDateTime,
) -> Result<Vec<i64>> {
    if !notifier.is_available() {
        tracing::debug!(item = %item.id, "notification platform unavailable, skipping resync");
        return Ok(Vec::new());
    }

    if !item.notification_ids.is_empty() {
        if let Err(err) = notifier.cancel_batch(&item.notification_ids) {
            tracing::warn!(item = %item.id, %err, "failed to cancel stale notifications");
        }
    }

    let requests = plan_requests(item, now);
    notifier.schedule_batch(&requests)?;
    tracing::info!(
        item = %item.id,
        cancelled = item.notification_ids.len(),
        scheduled = requests.len(),
        "notifications resynchronized"
    );
    Ok(requests.iter().map(|request| request.id).collect())
}
