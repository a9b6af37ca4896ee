//! Observable store with automatic change notifications.
//!
//! The store is the single writer of state. Applying an action:
//! 1. runs the composed reducer over the current snapshot
//! 2. swaps in the new snapshot
//! 3. broadcasts it to render subscribers (`watch`)
//! 4. publishes the action on the action channel
//! 5. hands it to the effect router, which starts the matching routine
//!
//! Steps 1-4 happen under the state lock. The whole sequence runs under a
//! reentrant dispatch gate, so routines start in apply order no matter which
//! thread dispatched, and a routine that dispatches while starting re-enters
//! on the same thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, ReentrantMutex};
use saga_core::{Action, State};
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::channel::{ActionChannel, ActionReceiver, AppliedAction};
use crate::registry::ReducerRegistry;
use crate::scheduler::Router;

/// Outcome of handing an action to the store.
pub(crate) enum Delivery {
    /// The store is closed; nothing was applied.
    Rejected,
    /// Applied, and no routine is listening for its tag.
    Applied,
    /// Applied; resolves once the triggered routine finishes.
    Pending(oneshot::Receiver<()>),
}

struct Current {
    seq: u64,
    state: Arc<State>,
}

pub(crate) struct Store {
    runtime_id: Uuid,
    gate: ReentrantMutex<()>,
    current: Mutex<Current>,
    reducers: ReducerRegistry,
    router: OnceLock<Router>,
    channel: ActionChannel,
    tx: watch::Sender<Arc<State>>,
    rx: watch::Receiver<Arc<State>>,
    closed: AtomicBool,
    trace_actions: bool,
}

impl Store {
    pub fn new(
        runtime_id: Uuid,
        initial: State,
        reducers: ReducerRegistry,
        trace_actions: bool,
    ) -> Self {
        let initial = Arc::new(initial);
        let (tx, rx) = watch::channel(initial.clone());
        Self {
            runtime_id,
            gate: ReentrantMutex::new(()),
            current: Mutex::new(Current {
                seq: 0,
                state: initial,
            }),
            reducers,
            router: OnceLock::new(),
            channel: ActionChannel::new(),
            tx,
            rx,
            closed: AtomicBool::new(false),
            trace_actions,
        }
    }

    /// Connect the effect router. Only the first call has an effect.
    pub fn install_router(&self, router: Router) {
        if self.router.set(router).is_err() {
            tracing::warn!(runtime = %self.runtime_id, "Effect router already installed");
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<State> {
        self.current.lock().state.clone()
    }

    /// Subscribe to snapshots. The receiver starts at the current one.
    pub fn subscribe(&self) -> watch::Receiver<Arc<State>> {
        self.rx.clone()
    }

    /// Subscribe to applied actions.
    pub fn subscribe_actions(&self) -> ActionReceiver {
        ActionReceiver::new(self.channel.subscribe())
    }

    /// Apply an action without waiting on any routine.
    pub fn dispatch(&self, action: Action) -> bool {
        !matches!(self.apply(action, false), Delivery::Rejected)
    }

    /// Apply an action and start the routine registered for its tag. With
    /// `track`, the result resolves when that routine finishes.
    ///
    /// A panicking reducer unwinds through here; the snapshot stays as it was.
    pub fn apply(&self, action: Action, track: bool) -> Delivery {
        let _gate = self.gate.lock();

        let applied = {
            let mut current = self.current.lock();
            if self.closed.load(Ordering::Acquire) {
                tracing::debug!(
                    runtime = %self.runtime_id,
                    "Dropping '{}': store is closed",
                    action.kind()
                );
                return Delivery::Rejected;
            }

            if let Some(next) = self.reducers.reduce(&current.state, &action) {
                current.state = Arc::new(next);
            }
            current.seq += 1;

            if self.trace_actions {
                tracing::debug!(runtime = %self.runtime_id, seq = current.seq, action = ?action, "Applied action");
            } else {
                tracing::trace!(runtime = %self.runtime_id, seq = current.seq, "Applied '{}'", action.kind());
            }

            self.tx.send_replace(current.state.clone());

            let applied = AppliedAction {
                seq: current.seq,
                action,
                state: current.state.clone(),
            };
            self.channel.publish(&applied);
            applied
        };

        let Some(router) = self.router.get() else {
            return Delivery::Applied;
        };
        if !router.routes(applied.action.kind()) {
            return Delivery::Applied;
        }

        let (done, delivery) = if track {
            let (done_tx, done_rx) = oneshot::channel();
            (Some(done_tx), Delivery::Pending(done_rx))
        } else {
            (None, Delivery::Applied)
        };
        router.route(applied.action, done);
        delivery
    }

    /// Stop accepting actions and end every channel subscription.
    pub fn close(&self) {
        let _current = self.current.lock();
        self.closed.store(true, Ordering::Release);
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Cheap, clonable handle for dispatching actions into a runtime.
///
/// `dispatch` is fire-and-forget: the state update is applied and the
/// triggered routine has started before it returns; the routine finishes on
/// its own task.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<Store>,
}

impl Dispatcher {
    pub(crate) fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Apply an action. Ignored once the runtime has shut down.
    pub fn dispatch(&self, action: Action) {
        self.store.dispatch(action);
    }

    /// Apply an action and wait until the routine it triggers (if any) has
    /// finished, including everything that routine dispatched and awaited.
    ///
    /// Returns `false` if the runtime is shut down or the routine was
    /// cancelled before finishing.
    pub async fn dispatch_settled(&self, action: Action) -> bool {
        match self.store.apply(action, true) {
            Delivery::Rejected => false,
            Delivery::Applied => true,
            Delivery::Pending(done) => done.await.is_ok(),
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<State> {
        self.store.state()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("runtime", &self.store.runtime_id)
            .field("closed", &self.store.is_closed())
            .finish()
    }
}
