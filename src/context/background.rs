use std::future::Future;
use std::sync::{Arc, Mutex};

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, warn};

use crate::cache::CacheError;
use crate::cache::lock::lock_or_recover;

/// Tracker for work that must outlive the response it was scheduled from.
///
/// Failures are logged and counted, never returned to whoever scheduled the
/// task. One tracker is shared by the whole process; [`wait_idle`] drains it.
///
/// [`wait_idle`]: BackgroundTasks::wait_idle
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` and keep track of it until it settles.
    pub fn wait_until<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = Result<(), CacheError>> + Send + 'static,
    {
        let handle = tokio::spawn(
            async move {
                match task.await {
                    Ok(()) => debug!(task = label, "background task finished"),
                    Err(err) => {
                        counter!("stashkit_cache_background_failure_total", "task" => label)
                            .increment(1);
                        warn!(task = label, error = %err, "background task failed");
                    }
                }
            }
            .in_current_span(),
        );

        let mut tasks = lock_or_recover(&self.tasks, "wait_until");
        tasks.retain(|handle| !handle.is_finished());
        tasks.push(handle);
    }

    /// Number of tracked tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        lock_or_recover(&self.tasks, "pending")
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Wait until every tracked task, including ones scheduled meanwhile, has settled.
    ///
    /// Cancel safe: a task still running when the wait is dropped stays tracked.
    pub async fn wait_idle(&self) {
        loop {
            let next = lock_or_recover(&self.tasks, "wait_idle").pop();
            let Some(handle) = next else {
                return;
            };
            let mut awaited = Awaited {
                tasks: &self.tasks,
                handle: Some(handle),
            };
            if let Some(handle) = awaited.handle.as_mut()
                && let Err(err) = handle.await
            {
                warn!(error = %err, "background task aborted");
            }
            awaited.handle = None;
        }
    }
}

/// Handle being awaited by `wait_idle`, put back if the wait is dropped early.
struct Awaited<'a> {
    tasks: &'a Mutex<Vec<JoinHandle<()>>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Awaited<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take()
            && !handle.is_finished()
        {
            lock_or_recover(self.tasks, "wait_idle").push(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wait_idle_drains_nested_tasks() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner_tasks = tasks.clone();
        let inner_done = done.clone();
        tasks.wait_until("outer", async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            inner_tasks.wait_until("inner", async move {
                inner_done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        tasks.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let tasks = BackgroundTasks::new();
        tasks.wait_until("fails", async { Err(CacheError::storage("unavailable")) });
        tasks.wait_idle().await;
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn pending_counts_unfinished_work() {
        let tasks = BackgroundTasks::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tasks.wait_until("blocked", async move {
            let _ = rx.await;
            Ok(())
        });
        assert_eq!(tasks.pending(), 1);

        let _ = tx.send(());
        tasks.wait_idle().await;
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn timed_out_wait_keeps_running_tasks_tracked() {
        let tasks = BackgroundTasks::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tasks.wait_until("blocked", async move {
            let _ = rx.await;
            Ok(())
        });

        let waited = tokio::time::timeout(Duration::from_millis(10), tasks.wait_idle()).await;
        assert!(waited.is_err());
        assert_eq!(tasks.pending(), 1);

        let _ = tx.send(());
        tasks.wait_idle().await;
        assert_eq!(tasks.pending(), 0);
    }
}
