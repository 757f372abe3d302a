//! Cooperative cancellation for actor-owned tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Cancellation coordinator owned by a [`ServiceCore`](super::ServiceCore).
///
/// Every task spawned on a service receives a [`ShutdownSignal`] and is
/// expected to select on it at its suspension points. Triggering is sticky:
/// a signal obtained after the trigger resolves immediately, so a task
/// spawned late does not hang waiting for a broadcast it already missed.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a signal for one task to wait on.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
            triggered: Arc::clone(&self.triggered),
        }
    }

    /// Request cancellation of all subscribed tasks.
    ///
    /// Safe to call with zero subscribers and safe to call repeatedly.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// One task's view of the shutdown request.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: broadcast::Receiver<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Resolve once cancellation has been requested.
    ///
    /// Returns immediately when the trigger already fired, and also when the
    /// owning [`Shutdown`] has been dropped (an orphaned task has nothing
    /// left to run for).
    pub async fn recv(&mut self) {
        if self.triggered.load(Ordering::SeqCst) {
            return;
        }
        // RecvError::Lagged cannot lose the signal here: any successful or
        // lagged receive means the trigger fired; Closed means the owner is
        // gone.
        let _ = self.rx.recv().await;
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}
