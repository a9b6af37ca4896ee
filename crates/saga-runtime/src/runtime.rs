//! Runtime lifecycle.
//!
//! ```text
//! Uninitialized ─▶ Composing ─▶ Running ─▶ ShuttingDown ─▶ Terminated
//! ```
//!
//! `Runtime::start` covers the first three steps: fold plugins, derive
//! default updaters, check effect tags, build the store and connect the
//! effect router. `shutdown` covers the rest. A terminated runtime cannot be
//! restarted; start a new one instead.

use std::sync::Arc;

use parking_lot::Mutex;
use saga_core::{Action, RuntimeConfig, SetupError, State};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::channel::ActionReceiver;
use crate::model::Model;
use crate::plugin::compose;
use crate::registry::{EffectRegistry, ReducerRegistry};
use crate::scheduler::{RoutineReport, Scheduler, Task};
use crate::store::{Dispatcher, Store};

/// Lifecycle phase of a runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Composing,
    Running,
    ShuttingDown,
    Terminated,
}

/// A live state container: store, dispatcher and effect scheduler.
pub struct Runtime {
    id: Uuid,
    lifecycle: Mutex<Lifecycle>,
    store: Arc<Store>,
    scheduler: Scheduler,
}

impl Runtime {
    /// Compose `model` and start it with the default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(model: Model) -> Result<Self, SetupError> {
        Self::start_with_config(model, RuntimeConfig::default())
    }

    /// Compose `model` and start it.
    pub fn start_with_config(model: Model, config: RuntimeConfig) -> Result<Self, SetupError> {
        let id = Uuid::new_v4();
        let mut lifecycle = Lifecycle::Uninitialized;

        let handle = tokio::runtime::Handle::try_current().map_err(|_| SetupError::NoRuntime)?;

        advance(&id, &mut lifecycle, Lifecycle::Composing);
        let composition = compose(model, config.collisions)?;

        let mut reducers = ReducerRegistry::with_default_updaters(&composition.state);
        reducers.extend(composition.reducers);

        let mut effects = EffectRegistry::new();
        effects.extend(composition.effects);
        effects.check_reserved_tags(&composition.state)?;

        tracing::debug!(
            runtime = %id,
            "Composed {} fields, {} reducers, {} effects",
            composition.state.len(),
            reducers.len(),
            effects.len()
        );

        let store = Arc::new(Store::new(
            id,
            composition.state,
            reducers,
            config.trace_actions,
        ));

        let scheduler = Scheduler::new(effects, config.report_capacity, handle);
        store.install_router(scheduler.router(&store));

        advance(&id, &mut lifecycle, Lifecycle::Running);
        tracing::info!(runtime = %id, "Runtime started");

        Ok(Self {
            id,
            lifecycle: Mutex::new(lifecycle),
            store,
            scheduler,
        })
    }

    /// Unique id of this runtime instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle phase.
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<State> {
        self.store.state()
    }

    /// A dispatch handle. Clone freely.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.store.clone())
    }

    /// Shorthand for `dispatcher().dispatch(action)`.
    pub fn dispatch(&self, action: Action) {
        self.store.dispatch(action);
    }

    /// Subscribe to state snapshots, one per applied action.
    pub fn subscribe(&self) -> watch::Receiver<Arc<State>> {
        self.store.subscribe()
    }

    /// Subscribe to applied actions, in apply order.
    ///
    /// The receiver is unbounded and holds every action applied after this
    /// call until it is read. Drop it when no longer needed.
    pub fn subscribe_actions(&self) -> ActionReceiver {
        self.store.subscribe_actions()
    }

    /// Subscribe to routine completion reports.
    pub fn subscribe_routines(&self) -> broadcast::Receiver<RoutineReport> {
        self.scheduler.subscribe()
    }

    /// Installed listeners, one per effect tag.
    pub fn listeners(&self) -> Vec<Task> {
        self.scheduler.listeners()
    }

    /// Close the store, cancel every routine and wait for all tasks.
    ///
    /// The store closes first, so a routine that is mid-dispatch when
    /// cancellation lands cannot apply anything.
    ///
    /// Applied state is kept. Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle != Lifecycle::Running {
                return;
            }
            advance(&self.id, &mut lifecycle, Lifecycle::ShuttingDown);
        }

        self.store.close();
        self.scheduler.cancel();
        self.scheduler.wait().await;

        advance(&self.id, &mut self.lifecycle.lock(), Lifecycle::Terminated);
        tracing::info!(runtime = %self.id, "Runtime terminated");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.store.close();
        self.scheduler.cancel();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.id)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

fn advance(id: &Uuid, lifecycle: &mut Lifecycle, next: Lifecycle) {
    debug_assert!(next > *lifecycle, "lifecycle only moves forward");
    tracing::debug!(runtime = %id, "Lifecycle {:?} -> {:?}", lifecycle, next);
    *lifecycle = next;
}

/// Start a runtime with the default configuration and return its initial
/// snapshot and a dispatcher alongside it.
///
/// The `Runtime` owns the listeners; keep it alive for as long as effects
/// should run.
pub fn create_runtime(model: Model) -> Result<(Arc<State>, Dispatcher, Runtime), SetupError> {
    let runtime = Runtime::start(model)?;
    Ok((runtime.state(), runtime.dispatcher(), runtime))
}
