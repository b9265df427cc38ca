use crate::metrics_defs::{RECHECK_ARMED, RECHECK_CANCELLED, RECHECK_PENDING};
use crm::ContactEmail;
use parking_lot::Mutex;
use shared::{counter, gauge};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

struct PendingRecheck {
    // Distinguishes an entry from a later one for the same email.
    id: u64,
    handle: AbortHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArmResult {
    Armed,
    AlreadyPending,
    Closed,
}

/// Deferred rechecks waiting to fire, at most one per email. An entry stays registered
/// until its task finishes, so a cancellation can still stop a recheck that is running.
#[derive(Default)]
pub(crate) struct RecheckRegistry {
    pending: Mutex<HashMap<ContactEmail, PendingRecheck>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl RecheckRegistry {
    /// Spawns `recheck` to run once after `delay`. Must be called from within a tokio runtime.
    pub fn arm<F>(self: &Arc<Self>, email: ContactEmail, delay: Duration, recheck: F) -> ArmResult
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(refused) = self.refusal(&self.pending.lock(), &email) {
            return refused;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let finished = Finished {
            registry: Arc::clone(self),
            email: email.clone(),
            id,
        };
        let (start_tx, start_rx) = oneshot::channel::<()>();

        // Spawned without holding the lock: a runtime that is shutting down drops the task
        // inline, and dropping it deregisters through the same lock.
        let task = tokio::spawn(async move {
            let _finished = finished;
            // A dropped sender means the entry was never registered.
            if start_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
            recheck.await;
        });

        let mut pending = self.pending.lock();
        if let Some(refused) = self.refusal(&pending, &email) {
            return refused;
        }
        pending.insert(
            email,
            PendingRecheck {
                id,
                handle: task.abort_handle(),
            },
        );
        counter!(RECHECK_ARMED).increment(1);
        gauge!(RECHECK_PENDING).set(pending.len() as f64);
        drop(pending);

        let _ = start_tx.send(());
        ArmResult::Armed
    }

    fn refusal(
        &self,
        pending: &HashMap<ContactEmail, PendingRecheck>,
        email: &ContactEmail,
    ) -> Option<ArmResult> {
        if self.closed.load(Ordering::Acquire) {
            Some(ArmResult::Closed)
        } else if pending.contains_key(email) {
            Some(ArmResult::AlreadyPending)
        } else {
            None
        }
    }

    /// Stops the pending recheck for `email`, whether it is still waiting or already running.
    pub fn cancel(&self, email: &ContactEmail) -> bool {
        let removed = {
            let mut pending = self.pending.lock();
            let removed = pending.remove(email);
            gauge!(RECHECK_PENDING).set(pending.len() as f64);
            removed
        };

        match removed {
            Some(entry) => {
                entry.handle.abort();
                counter!(RECHECK_CANCELLED).increment(1);
                true
            }
            None => false,
        }
    }

    /// Refuses new rechecks and aborts every pending one. Returns how many were dropped.
    pub fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock();
            self.closed.store(true, Ordering::Release);
            pending.drain().collect()
        };
        gauge!(RECHECK_PENDING).set(0.0);

        for (email, entry) in &drained {
            tracing::info!(email = %email, "dropping pending recheck on shutdown");
            entry.handle.abort();
        }
        counter!(RECHECK_CANCELLED).increment(drained.len() as u64);
        drained.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_pending(&self, email: &ContactEmail) -> bool {
        self.pending.lock().contains_key(email)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    fn finish(&self, email: &ContactEmail, id: u64) {
        let mut pending = self.pending.lock();
        if pending.get(email).is_some_and(|entry| entry.id == id) {
            pending.remove(email);
            gauge!(RECHECK_PENDING).set(pending.len() as f64);
        }
    }
}

// Deregisters the entry when the task completes, panics or is aborted.
struct Finished {
    registry: Arc<RecheckRegistry>,
    email: ContactEmail,
    id: u64,
}

impl Drop for Finished {
    fn drop(&mut self) {
        self.registry.finish(&self.email, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const DELAY: Duration = Duration::from_secs(60);

    fn email(raw: &str) -> ContactEmail {
        ContactEmail::parse(raw).unwrap()
    }

    fn counting(runs: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let runs = runs.clone();
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let registry = Arc::new(RecheckRegistry::default());
        let runs = Arc::new(AtomicUsize::new(0));

        let result = registry.arm(email("a@example.com"), DELAY, counting(&runs));
        assert_eq!(result, ArmResult::Armed);
        assert!(registry.is_pending(&email("a@example.com")));

        tokio::time::sleep(DELAY - Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_pending_recheck_per_email() {
        let registry = Arc::new(RecheckRegistry::default());
        let runs = Arc::new(AtomicUsize::new(0));

        registry.arm(email("a@example.com"), DELAY, counting(&runs));
        let second = registry.arm(email("a@example.com"), DELAY, counting(&runs));
        assert_eq!(second, ArmResult::AlreadyPending);

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_recheck_never_runs() {
        let registry = Arc::new(RecheckRegistry::default());
        let runs = Arc::new(AtomicUsize::new(0));

        registry.arm(email("a@example.com"), DELAY, counting(&runs));
        assert!(registry.cancel(&email("a@example.com")));
        assert!(!registry.cancel(&email("a@example.com")));

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_after_cancel_is_not_removed_by_old_task() {
        let registry = Arc::new(RecheckRegistry::default());
        let runs = Arc::new(AtomicUsize::new(0));

        registry.arm(email("a@example.com"), DELAY, counting(&runs));
        registry.cancel(&email("a@example.com"));
        registry.arm(email("a@example.com"), DELAY * 2, counting(&runs));

        // The aborted task is dropped; the newer entry must survive it.
        tokio::time::sleep(DELAY + Duration::from_secs(1)).await;
        assert!(registry.is_pending(&email("a@example.com")));

        tokio::time::sleep(DELAY).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_aborts_everything_and_refuses_new_rechecks() {
        let registry = Arc::new(RecheckRegistry::default());
        let runs = Arc::new(AtomicUsize::new(0));

        registry.arm(email("a@example.com"), DELAY, counting(&runs));
        registry.arm(email("b@example.com"), DELAY, counting(&runs));

        assert_eq!(registry.close(), 2);
        assert!(registry.is_closed());
        assert_eq!(
            registry.arm(email("c@example.com"), DELAY, counting(&runs)),
            ArmResult::Closed
        );

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 0);
    }
}
