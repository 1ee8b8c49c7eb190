use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use ava_core::AdmissionController;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct TaskHandle {
    name: Cow<'static, str>,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn new(name: impl Into<Cow<'static, str>>, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
pub struct TaskManager {
    tasks: Vec<TaskHandle>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: TaskHandle) {
        trace!(task = task.name(), "task registered");
        self.tasks.push(task);
    }

    /// Give each task up to `grace` to finish, then abort it.
    pub async fn shutdown_with_grace(self, grace: Duration) {
        for TaskHandle { name, mut handle } in self.tasks {
            if grace.is_zero() {
                handle.abort();
                if let Err(err) = handle.await {
                    debug!(task = %name, ?err, "task join after abort failed");
                }
                continue;
            }

            let sleeper = tokio::time::sleep(grace);
            tokio::pin!(sleeper);
            tokio::select! {
                res = &mut handle => {
                    if let Err(err) = res {
                        debug!(task = %name, ?err, "task exited with error");
                    }
                }
                _ = &mut sleeper => {
                    handle.abort();
                    if let Err(err) = handle.await {
                        debug!(task = %name, ?err, "task join after abort failed");
                    }
                }
            }
        }
    }
}

/// Spawn a background loop that restarts on panic with exponential backoff.
pub fn spawn_supervised<F, Fut>(name: impl Into<Cow<'static, str>>, mut factory: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let name_cow = name.into();
    let name_for_task = name_cow.clone();
    let handle = tokio::spawn(async move {
        let mut backoff_ms: u64 = 200;
        loop {
            match std::panic::AssertUnwindSafe(factory()).catch_unwind().await {
                Ok(()) => {
                    debug!(task = %name_for_task, "supervised task completed normally");
                    break;
                }
                Err(_) => {
                    tracing::error!(task = %name_for_task, backoff_ms, "supervised task panicked; restarting");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = backoff_ms.saturating_mul(2).min(10_000);
                }
            }
        }
    });
    TaskHandle::new(name_cow, handle)
}

/// Periodically reclaim expired rate-limit counters.
pub fn spawn_admission_sweeper(
    admission: Arc<AdmissionController>,
    every: Duration,
) -> TaskHandle {
    spawn_supervised("admission.sweep", move || {
        let admission = admission.clone();
        async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                admission.sweep().await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ava_core::{Admission, AdmissionPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn grace_lets_short_tasks_finish() {
        let done = Arc::new(AtomicUsize::new(0));
        let flag = done.clone();
        let mut tasks = TaskManager::new();
        tasks.push(TaskHandle::new(
            "short",
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                flag.fetch_add(1, Ordering::SeqCst);
            }),
        ));
        tasks.push(TaskHandle::new("forever", tokio::spawn(std::future::pending())));
        tasks.shutdown_with_grace(Duration::from_millis(200)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn supervised_task_restarts_after_panic() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_supervised("flaky", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first run fails");
                }
            }
        });
        tokio::time::timeout(Duration::from_secs(5), handle.handle)
            .await
            .expect("supervisor finished")
            .expect("join");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_reclaims_expired_entries() {
        let admission = Arc::new(AdmissionController::in_memory(AdmissionPolicy {
            limit: 1,
            window: Duration::from_millis(1),
        }));
        assert!(matches!(
            admission.admit("10.0.0.1").await,
            Admission::Allowed { .. }
        ));
        let task = spawn_admission_sweeper(admission.clone(), Duration::from_millis(50));
        std::thread::sleep(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(admission.sweep().await, 0);
        let mut tasks = TaskManager::new();
        tasks.push(task);
        tasks.shutdown_with_grace(Duration::ZERO).await;
    }
}
