//! Effect scheduler.
//!
//! One route per registered effect tag. Every applied action whose tag has a
//! route starts a fresh routine instance; instances for the same tag overlap
//! freely and are never cancelled by newer ones.
//!
//! ```text
//!   Store::apply ──(apply order)──▶ Router
//!                                     │ tag has a route
//!                                     ▼
//!                        routine(action, ctx), first poll inline
//!                                     │ still pending
//!                                     ▼
//!                            spawned on the runtime
//!                                     │
//!                                     ▼
//!                          RoutineReport ──▶ subscribers
//! ```
//!
//! Routing happens inside the store's dispatch gate, and each routine is
//! polled once before the dispatch returns. A routine therefore starts in
//! the order its action was applied and runs up to its first suspension
//! point against the state its own action produced.
//!
//! ## Failure isolation
//!
//! A routine that returns an error or panics ends only its own instance. The
//! failure is logged and reported; routes and other instances continue.
//!
//! ## Cancellation
//!
//! Every route holds a child of the scheduler's `CancellationToken`, and every
//! routine a child of its route's. Cancelling the scheduler drops each
//! routine at its current suspension point and stops new ones from starting.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use saga_core::{Action, EffectError};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::context::EffectContext;
use crate::model::Routine;
use crate::registry::EffectRegistry;
use crate::store::Store;

/// Identifier of a listener or routine task, unique per runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task:{}", self.0)
    }
}

/// What a task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Persistent route for one tag.
    Listener,
    /// One routine instance.
    Routine,
}

/// Handle to a listener or routine.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    kind: TaskKind,
    tag: String,
    token: CancellationToken,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Cooperatively cancel this task. Cancelling a listener also cancels
    /// its running routines and stops new ones.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// How a routine instance ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutineOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Published once per finished routine instance.
#[derive(Debug, Clone)]
pub struct RoutineReport {
    pub task: TaskId,
    pub tag: String,
    pub outcome: RoutineOutcome,
}

#[derive(Clone)]
struct Route {
    listener: Task,
    routine: Routine,
}

pub(crate) struct Scheduler {
    token: CancellationToken,
    tracker: TaskTracker,
    handle: Handle,
    reports: broadcast::Sender<RoutineReport>,
    routes: HashMap<String, Route>,
    listeners: Vec<Task>,
    next_id: Arc<AtomicU64>,
}

impl Scheduler {
    /// Create one route per effect tag. Routines are spawned on `handle`.
    pub fn new(effects: EffectRegistry, report_capacity: usize, handle: Handle) -> Self {
        let (reports, _) = broadcast::channel(report_capacity.max(1));
        let token = CancellationToken::new();
        let next_id = Arc::new(AtomicU64::new(1));

        let mut routes = HashMap::new();
        let mut listeners = Vec::new();
        for (tag, routine) in effects.iter() {
            let listener = Task {
                id: next_task_id(&next_id),
                kind: TaskKind::Listener,
                tag: tag.to_string(),
                token: token.child_token(),
            };
            tracing::debug!("Listening for '{}' ({})", tag, listener.id);

            listeners.push(listener.clone());
            routes.insert(
                tag.to_string(),
                Route {
                    listener,
                    routine: routine.clone(),
                },
            );
        }

        Self {
            token,
            tracker: TaskTracker::new(),
            handle,
            reports,
            routes,
            listeners,
            next_id,
        }
    }

    /// The router the store calls for every applied action.
    pub fn router(&self, store: &Arc<Store>) -> Router {
        Router {
            routes: self.routes.clone(),
            store: Arc::downgrade(store),
            tracker: self.tracker.clone(),
            handle: self.handle.clone(),
            reports: self.reports.clone(),
            next_id: self.next_id.clone(),
        }
    }

    /// Subscribe to routine reports.
    pub fn subscribe(&self) -> broadcast::Receiver<RoutineReport> {
        self.reports.subscribe()
    }

    /// Installed listeners, one per tag, in tag order.
    pub fn listeners(&self) -> Vec<Task> {
        self.listeners.clone()
    }

    /// Cancel every listener and routine.
    pub fn cancel(&self) {
        self.token.cancel();
        self.tracker.close();
    }

    /// Wait for every spawned routine to finish. Call after `cancel`.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn next_task_id(counter: &AtomicU64) -> TaskId {
    TaskId(counter.fetch_add(1, Ordering::Relaxed))
}

/// Starts routines for applied actions. Owned by the store.
pub(crate) struct Router {
    routes: HashMap<String, Route>,
    store: Weak<Store>,
    tracker: TaskTracker,
    handle: Handle,
    reports: broadcast::Sender<RoutineReport>,
    next_id: Arc<AtomicU64>,
}

impl Router {
    /// Check if an action with this tag would start a routine.
    pub fn routes(&self, tag: &str) -> bool {
        self.routes
            .get(tag)
            .is_some_and(|route| !route.listener.is_cancelled())
    }

    /// Start the routine for `action`, if its tag has a live route.
    ///
    /// The routine is polled once right here; if it suspends, the rest runs
    /// on a spawned task. `done` fires when it finishes (not when cancelled).
    pub fn route(&self, action: Action, done: Option<oneshot::Sender<()>>) {
        let Some(route) = self.routes.get(action.kind()) else {
            return;
        };
        if route.listener.is_cancelled() {
            return;
        }
        let Some(store) = self.store.upgrade() else {
            return;
        };

        let id = next_task_id(&self.next_id);
        let token = route.listener.token.child_token();
        let ctx = EffectContext::new(store, token.clone(), id);
        let tag = route.listener.tag.clone();
        let reports = self.reports.clone();
        tracing::trace!("Starting '{}' ({})", tag, id);

        // Building the future can panic too; treat it like a panicking poll.
        let routine = route.routine.clone();
        let instance = AssertUnwindSafe(async move { routine(action, ctx).await }).catch_unwind();

        let mut task = Box::pin(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => RoutineOutcome::Cancelled,
                result = instance => match result {
                    Ok(Ok(())) => RoutineOutcome::Completed,
                    Ok(Err(EffectError::Cancelled)) => RoutineOutcome::Cancelled,
                    Ok(Err(e)) => {
                        tracing::warn!("Routine '{}' ({}) failed: {}", tag, id, e);
                        RoutineOutcome::Failed(e.to_string())
                    }
                    Err(_) => {
                        tracing::warn!("Routine '{}' ({}) panicked", tag, id);
                        RoutineOutcome::Failed("routine panicked".to_string())
                    }
                },
            };

            let finished = outcome != RoutineOutcome::Cancelled;
            let _ = reports.send(RoutineReport {
                task: id,
                tag,
                outcome,
            });
            if finished {
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
        });

        let _enter = self.handle.enter();
        if task.as_mut().now_or_never().is_none() {
            self.tracker.spawn_on(task, &self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use saga_core::State;
    use uuid::Uuid;

    use super::*;
    use crate::registry::ReducerRegistry;
    use crate::store::Delivery;

    fn routine<F>(f: F) -> Routine
    where
        F: Fn(Action, EffectContext) -> BoxFuture<'static, Result<(), EffectError>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(f)
    }

    fn setup(effects: EffectRegistry) -> (Arc<Store>, Scheduler) {
        let store = Arc::new(Store::new(
            Uuid::new_v4(),
            State::new(),
            ReducerRegistry::new(),
            false,
        ));
        let scheduler = Scheduler::new(effects, 8, Handle::current());
        store.install_router(scheduler.router(&store));
        (store, scheduler)
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(7).to_string(), "task:7");
    }

    #[tokio::test]
    async fn test_one_listener_per_tag() {
        let mut effects = EffectRegistry::new();
        effects.insert("a", routine(|_, _| async { Ok(()) }.boxed()));
        effects.insert("b", routine(|_, _| async { Ok(()) }.boxed()));
        let (_store, scheduler) = setup(effects);

        let listeners = scheduler.listeners();
        let tags: Vec<&str> = listeners.iter().map(Task::tag).collect();
        assert_eq!(tags, vec!["a", "b"]);
        assert!(listeners.iter().all(|t| t.kind() == TaskKind::Listener));
        assert_ne!(listeners[0].id(), listeners[1].id());
    }

    #[tokio::test]
    async fn test_only_matching_tag_starts_routine() {
        let mut effects = EffectRegistry::new();
        effects.insert("ping", routine(|_, _| async { Ok(()) }.boxed()));
        let (store, scheduler) = setup(effects);
        let mut reports = scheduler.subscribe();

        store.dispatch(Action::new("other"));
        let Delivery::Pending(done) = store.apply(Action::new("ping"), true) else {
            panic!("expected a pending delivery");
        };
        done.await.unwrap();

        let report = reports.try_recv().unwrap();
        assert_eq!(report.tag, "ping");
        assert_eq!(report.outcome, RoutineOutcome::Completed);
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_routine_runs_until_first_suspension_before_dispatch_returns() {
        let steps = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = steps.clone();
        let mut effects = EffectRegistry::new();
        effects.insert(
            "work",
            routine(move |_, _| {
                let log = log.clone();
                async move {
                    log.lock().push("started");
                    tokio::task::yield_now().await;
                    log.lock().push("resumed");
                    Ok(())
                }
                .boxed()
            }),
        );
        let (store, scheduler) = setup(effects);
        let mut reports = scheduler.subscribe();

        store.dispatch(Action::new("work"));
        assert_eq!(*steps.lock(), vec!["started"]);

        // The rest runs on a spawned task
        let report = reports.recv().await.unwrap();
        assert_eq!(report.outcome, RoutineOutcome::Completed);
        assert_eq!(*steps.lock(), vec!["started", "resumed"]);
    }

    #[tokio::test]
    async fn test_cancel_stops_routing() {
        let mut effects = EffectRegistry::new();
        effects.insert("ping", routine(|_, _| async { Ok(()) }.boxed()));
        let (store, scheduler) = setup(effects);
        let mut reports = scheduler.subscribe();

        scheduler.cancel();
        scheduler.wait().await;
        assert!(scheduler.listeners().iter().all(Task::is_cancelled));

        // The action still applies, but no routine starts
        assert!(matches!(
            store.apply(Action::new("ping"), true),
            Delivery::Applied
        ));
        assert!(reports.try_recv().is_err());
    }
}
