use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot latch that any number of tasks can wait on.
#[derive(Debug, Default)]
pub struct Signal {
    fired: AtomicBool,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before checking the flag so a `fire` in between is not lost.
            notified.as_mut().enable();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

/// Cloneable handle that stops a run early.
///
/// Cancelling moves the scheduler straight to draining. Iterations still in flight are dropped
/// without recording a sample; teardown, snapshot and threshold evaluation still run.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    signal: Arc<Signal>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.signal.is_fired() {
            tracing::info!("run cancelled");
        }
        self.signal.fire();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_fired()
    }

    pub async fn cancelled(&self) {
        self.signal.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_after_fire() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        tokio::task::yield_now().await;
        signal.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap_or_else(|_| panic!("waiter never woke"))
            .unwrap_or_else(|e| panic!("{e}"));
    }

    #[tokio::test]
    async fn wait_after_fire_is_immediate() {
        let signal = Signal::new();
        signal.fire();
        signal.wait().await;
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn cancel_handle_clones_share_state() {
        let a = CancelHandle::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
        b.cancelled().await;
    }
}
