pub mod digest;
pub mod registry;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono_tz::Tz;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::DaybotError;
use crate::interfaces::NotificationSink;
use crate::tasks::{TaskStatus, TaskStore};
use crate::timeutil;
use crate::Result;

use digest::DigestSummary;
use registry::{ReminderEntry, TimerRegistry};

/// Settings values that disable the daily digest.
const DIGEST_OFF_WORDS: [&str; 4] = ["off", "disable", "disabled", "none"];

/// Per-chat scheduling engine.
///
/// Owns the per-chat task stores and the process-wide timer registry, and
/// keeps the two reconciled: every store mutation goes through the chat's
/// mutex and re-derives that chat's live timer set before the lock drops.
/// Chats are fully independent of each other.
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    data_dir: PathBuf,
    tz: Tz,
    sink: Arc<dyn NotificationSink>,
    registry: TimerRegistry,
    chats: std::sync::Mutex<HashMap<i64, Arc<ChatSlot>>>,
}

/// The single mutual-exclusion scope for one chat: the task store and the
/// chat's registry entries are only touched while this mutex is held.
struct ChatSlot {
    store: Mutex<TaskStore>,
}

impl Engine {
    pub fn new(data_dir: impl Into<PathBuf>, tz: Tz, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                data_dir: data_dir.into(),
                tz,
                sink,
                registry: TimerRegistry::new(),
                chats: std::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run a store mutation under the chat lock, then reconcile that chat's
    /// timers in the same critical section.
    pub async fn with_tasks<R>(
        &self,
        chat_id: i64,
        f: impl FnOnce(&mut TaskStore) -> Result<R>,
    ) -> Result<R> {
        let slot = self.inner.chat_slot(chat_id)?;
        let mut store = slot.store.lock().await;
        let result = f(&mut store)?;
        self.inner.reconcile_locked(chat_id, &mut store)?;
        Ok(result)
    }

    /// Re-derive the chat's live timer set from store state. Reminders are
    /// reconciled first; a digest parse error is reported afterwards and
    /// never blocks the reminder pass.
    pub async fn reconcile_chat(&self, chat_id: i64) -> Result<()> {
        let slot = self.inner.chat_slot(chat_id)?;
        let mut store = slot.store.lock().await;
        self.inner.reconcile_locked(chat_id, &mut store)
    }

    /// Rebuild the registry from durable state at process start. Failures
    /// are logged per chat and never stop the loop.
    pub async fn recover_all(&self, chat_ids: &[i64]) {
        for &chat_id in chat_ids {
            if let Err(e) = self.reconcile_chat(chat_id).await {
                error!(chat_id, error = %e, "startup recovery failed for chat");
            }
        }
        info!(chats = chat_ids.len(), "startup recovery complete");
    }

    /// Validate and persist the daily digest time, then reconcile.
    /// `None`, "off", "disable", "disabled" and "none" turn the digest off.
    pub async fn set_daily_summary(
        &self,
        chat_id: i64,
        value: Option<&str>,
    ) -> Result<Option<String>> {
        let normalized = match value.map(|v| v.trim().to_lowercase()) {
            None => None,
            Some(raw) if DIGEST_OFF_WORDS.contains(&raw.as_str()) => None,
            Some(raw) => {
                let (hour, minute) = timeutil::parse_daily_time(&raw)?;
                Some(format!("{hour:02}:{minute:02}"))
            }
        };
        let stored = normalized.clone();
        self.with_tasks(chat_id, move |store| {
            store.set_daily_summary_time(stored.clone())?;
            Ok(stored)
        })
        .await
    }

    /// Stop every live timer and wait for them to wind down. Timers still
    /// sleeping exit without firing; a fire already delivering finishes and
    /// persists its fencepost before this returns, so a restart over the
    /// same data never re-delivers for the same `remind_at` value.
    pub async fn shutdown(&self) {
        for handle in self.inner.registry.shutdown() {
            if let Err(e) = handle.await {
                error!(error = %e, "timer task ended abnormally during shutdown");
            }
        }
        info!("scheduling engine shut down");
    }

    /// Registry inspection: armed reminders for one chat.
    pub fn reminder_entries(&self, chat_id: i64) -> Vec<ReminderEntry> {
        self.inner.registry.reminder_entries(chat_id)
    }

    /// Registry inspection: the `HH:MM` the chat's digest timer honors.
    pub fn digest_time(&self, chat_id: i64) -> Option<String> {
        self.inner.registry.digest_time(chat_id)
    }
}

impl EngineInner {
    fn chat_slot(self: &Arc<Self>, chat_id: i64) -> Result<Arc<ChatSlot>> {
        let mut chats = match self.chats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(slot) = chats.get(&chat_id) {
            return Ok(Arc::clone(slot));
        }
        let path = tasks_path(&self.data_dir, chat_id);
        let store = TaskStore::open(path)?;
        let slot = Arc::new(ChatSlot {
            store: Mutex::new(store),
        });
        chats.insert(chat_id, Arc::clone(&slot));
        Ok(slot)
    }

    fn reconcile_locked(self: &Arc<Self>, chat_id: i64, store: &mut TaskStore) -> Result<()> {
        self.reconcile_reminders(chat_id, store);
        self.reconcile_digest(chat_id, store)
    }

    fn reconcile_reminders(self: &Arc<Self>, chat_id: i64, store: &TaskStore) {
        let now = timeutil::now_local(self.tz);
        let mut eligible: HashSet<String> = HashSet::new();

        for task in store.tasks() {
            if !task.is_reminder_eligible() {
                continue;
            }
            let Some(remind_at) = task.remind_at.as_deref() else {
                continue;
            };
            let target = match timeutil::parse_timestamp(remind_at) {
                Ok(target) => target,
                Err(e) => {
                    // Malformed value: skip this task, never the whole chat.
                    warn!(chat_id, task_id = %task.id, error = %e, "unreadable remind_at, not scheduling");
                    continue;
                }
            };
            eligible.insert(task.id.clone());

            if self.registry.armed_remind_at(chat_id, &task.id).as_deref() == Some(remind_at) {
                continue;
            }

            let delay = timeutil::delay_until(now, target);
            let seq = self.registry.next_seq();
            let inner = Arc::clone(self);
            let task_id = task.id.clone();
            let armed = remind_at.to_string();
            debug!(chat_id, task_id = %task_id, remind_at = %armed, delay_secs = delay.as_secs(), "arming reminder");
            let (stop_tx, mut stop_rx) = watch::channel(false);
            let handle = tokio::spawn({
                let task_id = task_id.clone();
                let armed = armed.clone();
                async move {
                    // The stop signal only interrupts the sleep; once the
                    // fire starts it runs to completion.
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            inner.fire_reminder(chat_id, &task_id, &armed, seq).await;
                        }
                        _ = stop_rx.changed() => {}
                    }
                }
            });
            self.registry
                .set_reminder(chat_id, &task_id, armed, seq, stop_tx, handle);
        }

        // Sweep timers for tasks that are no longer eligible (completed,
        // deleted, cleared, already reminded, or unreadable).
        for entry in self.registry.reminder_entries(chat_id) {
            if !eligible.contains(&entry.task_id) {
                debug!(chat_id, task_id = %entry.task_id, "sweeping stale reminder timer");
                self.registry.cancel_reminder(chat_id, &entry.task_id);
            }
        }
    }

    /// Runs on the timer's own task. Re-validates against the store and the
    /// registry before delivering, closing the edit/delete-after-arm race.
    async fn fire_reminder(self: &Arc<Self>, chat_id: i64, task_id: &str, armed: &str, seq: u64) {
        let slot = match self.chat_slot(chat_id) {
            Ok(slot) => slot,
            Err(e) => {
                error!(chat_id, task_id, error = %e, "reminder fire could not open chat store");
                return;
            }
        };
        let mut store = slot.store.lock().await;

        if !self.registry.reminder_seq_current(chat_id, task_id, seq) {
            debug!(chat_id, task_id, "reminder timer superseded, skipping");
            return;
        }

        let Some(task) = store.get(task_id).cloned() else {
            debug!(chat_id, task_id, "task gone before reminder fire, skipping");
            self.registry.finish_reminder(chat_id, task_id, seq);
            return;
        };
        let still_wanted = task.status == TaskStatus::Pending
            && task.reminded_at.is_none()
            && task.remind_at.as_deref() == Some(armed);
        if !still_wanted {
            debug!(chat_id, task_id, "reminder stale at fire time, skipping");
            self.registry.finish_reminder(chat_id, task_id, seq);
            return;
        }

        if let Err(e) = self.sink.deliver_reminder(chat_id, &task).await {
            // At-most-once: the fire still counts as delivered.
            warn!(chat_id, task_id, error = %e, "reminder delivery failed");
        }

        let now = timeutil::format_timestamp(timeutil::now_local(self.tz));
        if let Err(e) = store.mark_reminded(task_id, &now) {
            // Accepted inconsistency: fired but not marked. The entry is
            // still removed so the timer cannot refire in a tight loop.
            error!(chat_id, task_id, error = %e, "failed to persist reminded_at");
        }
        self.registry.finish_reminder(chat_id, task_id, seq);
        info!(chat_id, task_id, remind_at = armed, "reminder fired");
    }

    fn reconcile_digest(self: &Arc<Self>, chat_id: i64, store: &TaskStore) -> Result<()> {
        let Some(raw) = store.get_daily_summary_time() else {
            if self.registry.cancel_digest(chat_id) {
                debug!(chat_id, "daily digest disabled");
            }
            return Ok(());
        };

        // Invalid setting: report it, leave any live timer untouched.
        let (hour, minute) = timeutil::parse_daily_time(raw)?;

        if self.registry.digest_time(chat_id).as_deref() == Some(raw) {
            return Ok(());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            inner.digest_loop(chat_id, hour, minute, stop_rx).await;
        });
        self.registry
            .set_digest(chat_id, raw.to_string(), stop_tx, handle);
        debug!(chat_id, time = raw, "daily digest armed");
        Ok(())
    }

    async fn digest_loop(self: Arc<Self>, chat_id: i64, hour: u32, minute: u32, mut stop: watch::Receiver<bool>) {
        loop {
            let now = timeutil::now_local(self.tz);
            let Some(target) = timeutil::next_daily_occurrence(now, hour, minute) else {
                error!(chat_id, hour, minute, "no next digest occurrence, stopping loop");
                return;
            };
            let delay = timeutil::delay_until(now, target);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.fire_digest(chat_id).await;
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Recurring fire: rebuild the digest from current task state. Carries
    /// no per-fire identity, so nothing to re-validate.
    async fn fire_digest(self: &Arc<Self>, chat_id: i64) {
        let slot = match self.chat_slot(chat_id) {
            Ok(slot) => slot,
            Err(e) => {
                error!(chat_id, error = %e, "digest fire could not open chat store");
                return;
            }
        };
        let store = slot.store.lock().await;
        let summary = DigestSummary::build(store.tasks());
        if let Err(e) = self.sink.deliver_digest(chat_id, &summary).await {
            warn!(chat_id, error = %e, "digest delivery failed");
        }
        info!(chat_id, pending = summary.pending, "daily digest fired");
    }
}

fn tasks_path(data_dir: &Path, chat_id: i64) -> PathBuf {
    data_dir.join(format!("tasks_{chat_id}.json"))
}

/// Scan the data directory for persisted per-chat task stores.
pub fn discover_chats(data_dir: &Path) -> Result<Vec<i64>> {
    if !data_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(data_dir)
        .map_err(|e| DaybotError::Storage(format!("read {}: {e}", data_dir.display())))?;

    let mut chats = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DaybotError::Storage(e.to_string()))?;
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(suffix) = name
            .strip_prefix("tasks_")
            .and_then(|rest| rest.strip_suffix(".json"))
        else {
            continue;
        };
        match suffix.parse::<i64>() {
            Ok(chat_id) => chats.push(chat_id),
            Err(_) => debug!(file = %name, "ignoring task file with non-numeric chat id"),
        }
    }
    chats.sort_unstable();
    Ok(chats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_chats_parses_numeric_suffixes() {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in ["tasks_42.json", "tasks_-7.json", "tasks_abc.json", "settings_42.json"] {
            std::fs::write(dir.path().join(name), "[]").expect("write");
        }
        std::fs::create_dir(dir.path().join("tasks_9.json")).expect("dir");

        let chats = discover_chats(dir.path()).expect("discover");
        assert_eq!(chats, vec![-7, 42]);
    }

    #[test]
    fn discover_chats_tolerates_missing_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("nope");
        assert!(discover_chats(&missing).expect("discover").is_empty());
    }
}
