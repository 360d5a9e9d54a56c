//! Wait-for-all barrier over a fixed set of participants.
//!
//! [`Countdown::new`] hands out one [`ReadySignal`] per participant. The
//! waiter resumes once the last signal fires; signals are consumed on use so
//! a participant can only count once. A signal that is dropped without
//! firing never releases the waiter.
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    remaining: AtomicUsize,
    notify: Notify,
}

/// Waiting side of the barrier.
#[derive(Debug, Clone)]
pub struct Countdown {
    inner: Arc<Inner>,
}

/// Participant side of the barrier.
#[derive(Debug)]
pub struct ReadySignal {
    inner: Arc<Inner>,
}

impl Countdown {
    /// Create a barrier for `participants` signals.
    pub fn new(participants: usize) -> (Self, Vec<ReadySignal>) {
        let inner = Arc::new(Inner {
            remaining: AtomicUsize::new(participants),
            notify: Notify::new(),
        });
        let signals = (0..participants)
            .map(|_| ReadySignal {
                inner: inner.clone(),
            })
            .collect();
        (Self { inner }, signals)
    }

    /// Participants that have not signalled yet.
    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.remaining() == 0
    }

    /// Resolve once every participant has signalled.
    pub async fn wait(&self) {
        loop {
            // Register before checking so a concurrent final signal is not missed.
            let notified = self.inner.notify.notified();
            if self.is_released() {
                return;
            }
            notified.await;
        }
    }
}

impl ReadySignal {
    /// Report readiness. The last participant releases the waiters.
    pub fn signal(self) {
        if self.inner.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}
