//! Cancellation signals for background loops.
//!
//! A [`ShutdownTrigger`] owns the sending side; every loop holds a
//! [`Shutdown`] that resolves once the trigger fires or is dropped. Signals
//! compose with [`Shutdown::or`], which is how a subscription loop watches
//! both the client lifetime and its own stop signal.

use futures::future::{self, FutureExt};
use tokio::sync::watch;

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            signals: vec![self.tx.subscribe()],
        }
    }

    /// Fires the signal. Firing twice is a no-op.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    signals: Vec<watch::Receiver<bool>>,
}

impl Shutdown {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self {
            signals: Vec::new(),
        }
    }

    /// Combines two signals; the result fires when either does.
    pub fn or(mut self, other: &Shutdown) -> Self {
        self.signals.extend(other.signals.iter().cloned());
        self
    }

    pub fn is_triggered(&self) -> bool {
        self.signals
            .iter()
            .any(|rx| *rx.borrow() || rx.has_changed().is_err())
    }

    /// Resolves once any underlying trigger fires or is dropped.
    ///
    /// Cancel safe: every call watches fresh receivers.
    pub async fn triggered(&self) {
        if self.signals.is_empty() {
            return future::pending().await;
        }
        let waits = self.signals.iter().cloned().map(|mut rx| {
            async move {
                loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
            }
            .boxed()
        });
        future::select_all(waits).await;
    }
}
