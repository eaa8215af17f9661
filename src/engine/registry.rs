use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::watch;
use tokio::task::JoinHandle;

struct ReminderHandle {
    remind_at: String,
    seq: u64,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct DigestHandle {
    time: String,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Registry snapshot of one armed reminder, for reconcile diffing and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderEntry {
    pub task_id: String,
    pub remind_at: String,
    pub seq: u64,
}

/// Process-wide table of live timer handles. Two namespaces: one-shot
/// reminders keyed by (chat, task), recurring digests keyed by chat.
///
/// Never persisted; rebuilt from store state on startup. Reconcile-path
/// cancellation aborts the tokio task before the entry is dropped, and the
/// fire path re-checks its sequence number under the chat lock, so a
/// canceled timer cannot deliver after removal returns. Shutdown only
/// signals and drains; a fire already past its checks runs to completion.
pub struct TimerRegistry {
    inner: Mutex<Inner>,
    seq: AtomicU64,
}

struct Inner {
    reminders: HashMap<(i64, String), ReminderHandle>,
    digests: HashMap<i64, DigestHandle>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                reminders: HashMap::new(),
                digests: HashMap::new(),
            }),
            seq: AtomicU64::new(1),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// The `remind_at` value the live timer for (chat, task) was armed with.
    pub fn armed_remind_at(&self, chat_id: i64, task_id: &str) -> Option<String> {
        let inner = self.lock();
        inner
            .reminders
            .get(&(chat_id, task_id.to_string()))
            .map(|h| h.remind_at.clone())
    }

    pub fn reminder_seq_current(&self, chat_id: i64, task_id: &str, seq: u64) -> bool {
        let inner = self.lock();
        inner
            .reminders
            .get(&(chat_id, task_id.to_string()))
            .map(|h| h.seq == seq)
            .unwrap_or(false)
    }

    /// Install a reminder handle, canceling any prior one for the same key.
    pub fn set_reminder(
        &self,
        chat_id: i64,
        task_id: &str,
        remind_at: String,
        seq: u64,
        stop: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) {
        let mut inner = self.lock();
        if let Some(prior) = inner.reminders.insert(
            (chat_id, task_id.to_string()),
            ReminderHandle {
                remind_at,
                seq,
                stop,
                task,
            },
        ) {
            let _ = prior.stop.send(true);
            prior.task.abort();
        }
    }

    pub fn cancel_reminder(&self, chat_id: i64, task_id: &str) -> bool {
        let mut inner = self.lock();
        match inner.reminders.remove(&(chat_id, task_id.to_string())) {
            Some(handle) => {
                let _ = handle.stop.send(true);
                handle.task.abort();
                true
            }
            None => false,
        }
    }

    /// Drop the entry after its timer ran, but only if it still belongs to
    /// the firing timer; a newer handle under the same key stays put.
    pub fn finish_reminder(&self, chat_id: i64, task_id: &str, seq: u64) {
        let mut inner = self.lock();
        let key = (chat_id, task_id.to_string());
        if inner.reminders.get(&key).map(|h| h.seq) == Some(seq) {
            inner.reminders.remove(&key);
        }
    }

    pub fn reminder_entries(&self, chat_id: i64) -> Vec<ReminderEntry> {
        let inner = self.lock();
        let mut entries: Vec<ReminderEntry> = inner
            .reminders
            .iter()
            .filter(|((chat, _), _)| *chat == chat_id)
            .map(|((_, task_id), handle)| ReminderEntry {
                task_id: task_id.clone(),
                remind_at: handle.remind_at.clone(),
                seq: handle.seq,
            })
            .collect();
        entries.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        entries
    }

    pub fn set_digest(
        &self,
        chat_id: i64,
        time: String,
        stop: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) {
        let mut inner = self.lock();
        if let Some(prior) = inner.digests.insert(chat_id, DigestHandle { time, stop, task }) {
            let _ = prior.stop.send(true);
            prior.task.abort();
        }
    }

    pub fn cancel_digest(&self, chat_id: i64) -> bool {
        let mut inner = self.lock();
        match inner.digests.remove(&chat_id) {
            Some(handle) => {
                let _ = handle.stop.send(true);
                handle.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn digest_time(&self, chat_id: i64) -> Option<String> {
        let inner = self.lock();
        inner.digests.get(&chat_id).map(|h| h.time.clone())
    }

    /// Signal every live timer in both namespaces to stop and drain the
    /// table. Returns the join handles so the caller can await them; timers
    /// still sleeping exit on the signal, while a fire that already started
    /// delivering finishes and persists its fencepost before its handle
    /// resolves.
    pub fn shutdown(&self) -> Vec<JoinHandle<()>> {
        let mut inner = self.lock();
        let mut handles = Vec::with_capacity(inner.reminders.len() + inner.digests.len());
        for (_, handle) in inner.reminders.drain() {
            let _ = handle.stop.send(true);
            handles.push(handle.task);
        }
        for (_, handle) in inner.digests.drain() {
            let _ = handle.stop.send(true);
            handles.push(handle.task);
        }
        handles
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_task() -> (watch::Sender<bool>, JoinHandle<()>) {
        let (stop, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let _ = rx.changed().await;
        });
        (stop, task)
    }

    fn install_reminder(registry: &TimerRegistry, chat_id: i64, task_id: &str, remind_at: &str) -> u64 {
        let seq = registry.next_seq();
        let (stop, task) = idle_task();
        registry.set_reminder(chat_id, task_id, remind_at.into(), seq, stop, task);
        seq
    }

    #[tokio::test]
    async fn set_reminder_replaces_and_cancels_prior_handle() {
        let registry = TimerRegistry::new();
        let first = install_reminder(&registry, 7, "t1", "2024-01-01T09:00:00");
        let second = install_reminder(&registry, 7, "t1", "2024-01-02T09:00:00");

        assert_eq!(
            registry.armed_remind_at(7, "t1").as_deref(),
            Some("2024-01-02T09:00:00")
        );
        assert!(!registry.reminder_seq_current(7, "t1", first));
        assert!(registry.reminder_seq_current(7, "t1", second));
    }

    #[tokio::test]
    async fn finish_reminder_ignores_stale_sequence() {
        let registry = TimerRegistry::new();
        let old = registry.next_seq();
        let new = install_reminder(&registry, 7, "t1", "2024-01-02T09:00:00");
        assert!(old < new);

        registry.finish_reminder(7, "t1", old);
        assert!(registry.armed_remind_at(7, "t1").is_some());

        registry.finish_reminder(7, "t1", new);
        assert!(registry.armed_remind_at(7, "t1").is_none());
    }

    #[tokio::test]
    async fn namespaces_are_independent_per_chat() {
        let registry = TimerRegistry::new();
        install_reminder(&registry, 1, "t1", "2024-01-01T09:00:00");
        let (stop, task) = idle_task();
        registry.set_digest(1, "09:30".into(), stop, task);

        assert_eq!(registry.reminder_entries(1).len(), 1);
        assert!(registry.reminder_entries(2).is_empty());
        assert_eq!(registry.digest_time(1).as_deref(), Some("09:30"));
        assert_eq!(registry.digest_time(2), None);

        assert!(registry.cancel_digest(1));
        assert!(!registry.cancel_digest(1));
        assert_eq!(registry.reminder_entries(1).len(), 1);

        let drained = registry.shutdown();
        assert_eq!(drained.len(), 1);
        for handle in drained {
            handle.await.expect("timer task");
        }
        assert!(registry.reminder_entries(1).is_empty());
    }
}
