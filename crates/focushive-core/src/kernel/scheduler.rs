use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Opaque handle to a scheduled task, used to cancel or reschedule it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Abstracts over the ambient concurrent-task scheduler. Presence's stale
/// sweep and the timer core's expiry firing both go through this instead of
/// spawning raw tasks, so tests can run them synchronously.
pub trait Scheduler: Send + Sync {
    /// Schedule `task` to run at `at`. Scheduling the same logical unit of
    /// work again should go through [`Scheduler::cancel`] first --
    /// schedulers do not dedupe by handle.
    fn schedule_at(&self, at: DateTime<Utc>, task: BoxedTask) -> TaskHandle;

    /// Schedule `task` to run every `period`, starting after the first tick.
    fn schedule_every(&self, period: std::time::Duration, task: Arc<dyn Fn() -> BoxedTask + Send + Sync>) -> TaskHandle;

    fn cancel(&self, handle: TaskHandle);
}

/// Production scheduler backed by the Tokio runtime's timers.
pub struct TokioScheduler {
    next_id: AtomicU64,
    handles: DashMap<TaskHandle, tokio::task::JoinHandle<()>>,
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handles: DashMap::new(),
        }
    }

    fn next_handle(&self) -> TaskHandle {
        TaskHandle(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_at(&self, at: DateTime<Utc>, task: BoxedTask) -> TaskHandle {
        let handle = self.next_handle();
        let delay = (at - Utc::now()).to_std().unwrap_or_default();
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        self.handles.insert(handle, join);
        handle
    }

    fn schedule_every(
        &self,
        period: std::time::Duration,
        task: Arc<dyn Fn() -> BoxedTask + Send + Sync>,
    ) -> TaskHandle {
        let handle = self.next_handle();
        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                (task)().await;
            }
        });
        self.handles.insert(handle, join);
        handle
    }

    fn cancel(&self, handle: TaskHandle) {
        if let Some((_, join)) = self.handles.remove(&handle) {
            join.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schedule_at_fires_and_cancel_prevents_it() {
        let scheduler = TokioScheduler::new();
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let f = fired.clone();
        let handle = scheduler.schedule_at(
            Utc::now() + chrono::Duration::milliseconds(10),
            Box::pin(async move {
                f.store(true, Ordering::SeqCst);
            }),
        );
        scheduler.cancel(handle);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
