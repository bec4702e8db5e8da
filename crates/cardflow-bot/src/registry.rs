use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Supervised task pool for message-processing cycles.
///
/// Replaces fire-and-forget spawning: every cycle is registered under an id
/// and can be aborted, and a semaphore bounds how many run at once. The
/// permit is acquired inside the spawned task, so a burst beyond the limit
/// queues without ever blocking the caller (gateway acks stay immediate).
pub struct TaskRegistry {
    tasks: Arc<DashMap<u64, JoinHandle<()>>>,
    limiter: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl TaskRegistry {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            limiter: Arc::new(Semaphore::new(max_in_flight)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Spawn a supervised task. Returns its registry id.
    pub fn spawn<F>(&self, future: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = self.tasks.clone();
        let limiter = self.limiter.clone();
        let handle = tokio::spawn(async move {
            let _permit = match limiter.acquire_owned().await {
                Ok(permit) => permit,
                // Semaphore closed: shutting down.
                Err(_) => return,
            };
            future.await;
            tasks.remove(&id);
        });
        self.tasks.insert(id, handle);
        // The task may already have finished and missed its own removal.
        let finished = self
            .tasks
            .get(&id)
            .map(|entry| entry.is_finished())
            .unwrap_or(false);
        if finished {
            self.tasks.remove(&id);
        }
        id
    }

    /// Abort a task by id. Returns whether it was still registered.
    pub fn abort(&self, id: u64) -> bool {
        match self.tasks.remove(&id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort everything still registered.
    pub fn abort_all(&self) {
        let ids: Vec<u64> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.abort(id);
        }
    }

    /// Tasks currently registered (queued or running).
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
