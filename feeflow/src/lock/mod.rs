//! Per-job run lock.
//!
//! At most one run per job may be in flight. A tick that finds its job's
//! lock taken is dropped, not queued, so a hung child can never build up
//! a backlog.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Binary gate per job id.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl RunLock {
    /// Creates a lock table with nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock for `job_id` if no run for it is in flight.
    ///
    /// The returned guard releases the lock when dropped, on every exit
    /// path including panics and cancelled futures.
    #[must_use]
    pub fn try_acquire(&self, job_id: &str) -> Option<RunGuard> {
        let acquired = self.held.lock().insert(job_id.to_string());
        trace!(job = %job_id, acquired, "Run lock attempt");
        acquired.then(|| RunGuard {
            held: Arc::clone(&self.held),
            job_id: job_id.to_string(),
        })
    }

    /// True while a run for `job_id` is in flight.
    #[must_use]
    pub fn is_held(&self, job_id: &str) -> bool {
        self.held.lock().contains(job_id)
    }

    /// Number of jobs with a run in flight.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

/// Scoped ownership of one job's run lock.
#[derive(Debug)]
pub struct RunGuard {
    held: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl RunGuard {
    /// The job this guard holds.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.job_id);
        trace!(job = %self.job_id, "Run lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let lock = RunLock::new();
        let guard = lock.try_acquire("collect-fees");
        assert!(guard.is_some());
        assert!(lock.try_acquire("collect-fees").is_none());
        assert!(lock.is_held("collect-fees"));
    }

    #[test]
    fn test_release_on_drop() {
        let lock = RunLock::new();
        {
            let _guard = lock.try_acquire("swap-tokens").unwrap();
            assert_eq!(lock.held_count(), 1);
        }
        assert!(!lock.is_held("swap-tokens"));
        assert!(lock.try_acquire("swap-tokens").is_some());
    }

    #[test]
    fn test_jobs_are_independent() {
        let lock = RunLock::new();
        let _a = lock.try_acquire("collect-fees").unwrap();
        let b = lock.try_acquire("distribute");
        assert!(b.is_some());
        assert_eq!(b.unwrap().job_id(), "distribute");
    }

    #[test]
    fn test_release_on_panic() {
        let lock = RunLock::new();
        let cloned = lock.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.try_acquire("distribute").unwrap();
            panic!("spawn blew up");
        }));
        assert!(result.is_err());
        assert!(!lock.is_held("distribute"));
    }

    #[tokio::test]
    async fn test_release_when_future_dropped() {
        let lock = RunLock::new();
        let task_lock = lock.clone();
        let handle = tokio::spawn(async move {
            let _guard = task_lock.try_acquire("collect-fees").unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        while !lock.is_held("collect-fees") {
            tokio::task::yield_now().await;
        }
        handle.abort();
        let _ = handle.await;
        assert!(!lock.is_held("collect-fees"));
    }
}
