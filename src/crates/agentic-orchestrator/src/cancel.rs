//! Cooperative per-request cancellation.
//!
//! Same shape as this codebase's process-wide shutdown coordinator
//! (`AtomicBool` + `Notify`), scoped down to a single `ExecutionRequest`
//! instead of the whole process. The core never forcibly terminates
//! anything; callers poll `is_cancelled()` at stage and attempt boundaries
//! and before every collaborator call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// A cancellable, deadline-bearing handle shared between the caller and the
/// orchestrator for the lifetime of one request.
#[derive(Clone)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
    deadline: Instant,
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .field("deadline_remaining_ms", &self.remaining(&self.deadline_duration()).as_millis())
            .finish()
    }
}

impl CancelSignal {
    /// `request_timeout` is the wall-clock budget for the whole request
    /// (default 300s); the deadline is computed once, at construction.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            deadline: Instant::now() + request_timeout,
        }
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// True if either explicitly cancelled or the request deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.is_deadline_exceeded()
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub async fn wait_for_cancel(&self) {
        self.notify.notified().await;
    }

    /// Remaining time budget, floor zero. Used to derive downstream
    /// deadlines for collaborator calls: derived deadlines never exceed the
    /// request deadline.
    pub fn remaining(&self, _budget: &Duration) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn deadline_duration(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_cancelled_initially() {
        let signal = CancelSignal::new(Duration::from_secs(300));
        assert!(!signal.is_cancelled());
    }

    #[test]
    fn cancel_is_observed() {
        let signal = CancelSignal::new(Duration::from_secs(300));
        signal.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let signal = CancelSignal::new(Duration::from_secs(300));
        signal.cancel();
        signal.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn expired_deadline_counts_as_cancelled() {
        let signal = CancelSignal::new(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(signal.is_cancelled());
        assert!(signal.is_deadline_exceeded());
    }

    #[tokio::test]
    async fn wait_for_cancel_resolves_on_cancel() {
        let signal = CancelSignal::new(Duration::from_secs(300));
        let waiter_signal = signal.clone();
        let waiter = tokio::spawn(async move {
            waiter_signal.wait_for_cancel().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.cancel();
        tokio::time::timeout(Duration::from_millis(200), waiter).await.unwrap().unwrap();
    }

    #[test]
    fn derived_deadline_never_exceeds_request_deadline() {
        let signal = CancelSignal::new(Duration::from_secs(10));
        let derived = signal.remaining(&Duration::from_secs(10));
        assert!(derived <= Duration::from_secs(10));
    }
}
