//! Ordered action channel.
//!
//! Every applied action is published to every subscriber, in apply order.
//! Each subscriber gets its own unbounded queue so a slow reader never
//! drops actions. A receiver that is kept but never read keeps everything
//! published after it subscribed; drop it to unsubscribe.

use std::sync::Arc;

use parking_lot::Mutex;
use saga_core::{Action, State};
use tokio::sync::mpsc;

/// An action together with the snapshot it produced.
#[derive(Debug, Clone)]
pub struct AppliedAction {
    /// Position in apply order, starting at 1.
    pub seq: u64,
    /// The dispatched action.
    pub action: Action,
    /// State right after the action's reducer pass.
    pub state: Arc<State>,
}

/// Fan-out point for applied actions.
pub(crate) struct ActionChannel {
    subscribers: Mutex<Option<Vec<mpsc::UnboundedSender<AppliedAction>>>>,
}

impl ActionChannel {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Some(Vec::new())),
        }
    }

    /// Open a new subscription. A closed channel yields a receiver that ends
    /// immediately.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AppliedAction> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(subscribers) = self.subscribers.lock().as_mut() {
            subscribers.push(tx);
        }
        rx
    }

    /// Send to every live subscriber, dropping the ones that went away.
    pub fn publish(&self, applied: &AppliedAction) {
        if let Some(subscribers) = self.subscribers.lock().as_mut() {
            subscribers.retain(|tx| tx.send(applied.clone()).is_ok());
        }
    }

    /// Drop every subscriber. Receivers drain what is queued, then end.
    pub fn close(&self) {
        self.subscribers.lock().take();
    }
}

/// Read-only subscription to applied actions.
///
/// Unbounded: read it regularly or drop it.
pub struct ActionReceiver {
    rx: mpsc::UnboundedReceiver<AppliedAction>,
}

impl ActionReceiver {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<AppliedAction>) -> Self {
        Self { rx }
    }

    /// Wait for the next applied action. `None` once the runtime shut down
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<AppliedAction> {
        self.rx.recv().await
    }

    /// Next applied action if one is already queued.
    pub fn try_recv(&mut self) -> Option<AppliedAction> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued right now.
    pub fn drain(&mut self) -> Vec<AppliedAction> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Number of actions waiting to be read.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
