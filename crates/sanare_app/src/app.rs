use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use sanare_domain::notifications::{NotificationRequest, NotificationTrigger, PlatformNotifier};
use sanare_domain::reconciler::{ManualForegroundSource, Reconciler};
use sanare_domain::store::JsonStore;
use sanare_domain::ChecklistService;
use tracing::info;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) profile: String,
    pub(crate) data_file: PathBuf,
    pub(crate) watch: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(profile) = std::env::var("SANARE_PROFILE") {
            if !profile.trim().is_empty() {
                config.profile = profile.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("SANARE_DATA_FILE") {
            if !path.trim().is_empty() {
                config.data_file = PathBuf::from(path.trim());
            }
        }
        if let Ok(watch) = std::env::var("SANARE_WATCH") {
            config.watch = matches!(watch.trim(), "1" | "true" | "yes");
        }
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: "self".to_string(),
            data_file: PathBuf::from("sanare.json"),
            watch: false,
        }
    }
}

/// Desktop stand-in for the device notification store: registrations are
/// logged and tracked so the pending count stays observable.
#[derive(Default)]
struct LogNotifier {
    pending: Mutex<Vec<i64>>,
}

impl PlatformNotifier for LogNotifier {
    fn schedule_batch(&self, requests: &[NotificationRequest]) -> Result<()> {
        let mut pending = self.pending.lock();
        for request in requests {
            match &request.trigger {
                NotificationTrigger::Daily { at } => {
                    info!(id = request.id, title = %request.title, first_fire = %at, "daily notification registered");
                }
                NotificationTrigger::Once { at } => {
                    info!(id = request.id, title = %request.title, fire = %at, "one-shot notification registered");
                }
            }
            pending.push(request.id);
        }
        Ok(())
    }

    fn cancel_batch(&self, ids: &[i64]) -> Result<()> {
        info!(count = ids.len(), "notifications cancelled");
        self.pending.lock().retain(|id| !ids.contains(id));
        Ok(())
    }

    fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

pub fn run(config: AppConfig) -> Result<()> {
    info!(
        profile = %config.profile,
        data_file = %config.data_file.display(),
        "starting checklist harness"
    );

    let store = Arc::new(JsonStore::open(&config.data_file).context("failed to open data store")?);
    let notifier = Arc::new(LogNotifier::default());
    let service = Arc::new(
        ChecklistService::builder()
            .for_profile(config.profile.as_str())
            .with_item_repository(store.clone())
            .with_status_repository(store)
            .with_notifier(notifier)
            .build()
            .context("failed to initialize checklist service")?,
    );

    let swept = service.resync_all()?;
    info!(
        items = swept,
        pending = service.pending_notifications(),
        "notification schedules refreshed"
    );

    print_checklist(&service);

    if config.watch {
        let foreground = ManualForegroundSource::new();
        let _reconciler = Reconciler::start(service.clone(), &foreground);
        info!(
            millis_to_midnight = service.millis_until_next_midnight(),
            "watching for day rollover, terminate to exit"
        );
        loop {
            thread::park();
        }
    }

    Ok(())
}

fn print_checklist(service: &ChecklistService) {
    let entries = service.entries();
    let day = service
        .loaded_day()
        .map(|day| day.to_string())
        .unwrap_or_else(|| "unresolved".to_string());
    println!("Checklist for {day} ({} entries)", entries.len());
    for entry in entries {
        let marker = if entry.checked {
            "[x]"
        } else if entry.inactive {
            "[-]"
        } else {
            "[ ]"
        };
        println!(
            "  {marker} {} {} ({})",
            entry.time, entry.display_name, entry.kind
        );
    }
}
