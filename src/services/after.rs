//! Work scheduled during a request that runs once the response is ready.
//!
//! Handlers push tasks into the request's [`AfterTasks`]; the middleware in
//! `web` drains them after the inner service has produced its response and
//! spawns them. When `experimental.after` is off the tasks are dropped.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Clone, Default)]
pub struct AfterTasks {
    tasks: Arc<Mutex<Vec<(&'static str, Task)>>>,
}

impl AfterTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().push((name, Box::pin(task)));
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns every queued task (or drops them when `enabled` is false).
    /// Returns the join handles of the spawned tasks.
    pub fn flush(&self, enabled: bool) -> Vec<tokio::task::JoinHandle<()>> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if !enabled {
            for (name, _) in &tasks {
                tracing::debug!(task = name, "experimental.after is disabled, dropping task");
            }
            return Vec::new();
        }
        tasks
            .into_iter()
            .map(|(name, task)| {
                tracing::trace!(task = name, "running after-response task");
                tokio::spawn(task)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn flush_runs_tasks_when_enabled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let after = AfterTasks::new();
        for _ in 0..3 {
            let counter = counter.clone();
            after.schedule("count", async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(after.len(), 3);

        for handle in after.flush(true) {
            handle.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn flush_drops_tasks_when_disabled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let after = AfterTasks::new();
        let c = counter.clone();
        after.schedule("count", async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(after.flush(false).is_empty());
        assert!(after.is_empty());
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
