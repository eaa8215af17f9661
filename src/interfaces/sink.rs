use async_trait::async_trait;

use crate::engine::digest::DigestSummary;
use crate::error::Result;
use crate::tasks::Task;

/// Outbound delivery seam supplied by the surrounding chat transport.
///
/// Calls are fire-and-forget dispatches: implementations must not block for
/// unbounded time, and a returned error does not un-fire the timer; the
/// engine logs it and still commits the fired state.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver_reminder(&self, chat_id: i64, task: &Task) -> Result<()>;
    async fn deliver_digest(&self, chat_id: i64, digest: &DigestSummary) -> Result<()>;
}

/// Sink that writes deliveries to the log. Used by the daemon binary, where
/// chat transport is out of scope.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver_reminder(&self, chat_id: i64, task: &Task) -> Result<()> {
        tracing::info!(chat_id, task_id = %task.id, title = %task.title, "reminder");
        Ok(())
    }

    async fn deliver_digest(&self, chat_id: i64, digest: &DigestSummary) -> Result<()> {
        tracing::info!(chat_id, pending = digest.pending, "daily digest\n{}", digest.render());
        Ok(())
    }
}
