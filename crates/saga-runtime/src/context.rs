//! Effect context handed to every running routine.
//!
//! The context is the routine's only way to touch the runtime:
//! - `invoke` / `call` run an external operation and surface its result
//! - `dispatch` feeds a new action into the same store
//! - `set_state` turns a field map into one `update<Field>` dispatch per field
//! - `state` reads the current snapshot
//!
//! Every suspension point observes cancellation. Once the runtime shuts down
//! a routine gets `EffectError::Cancelled` and cannot dispatch anything else.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use saga_core::{default_updater_tag, Action, EffectError, State};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::scheduler::TaskId;
use crate::store::{Delivery, Store};

/// Capabilities of one routine instance.
#[derive(Clone)]
pub struct EffectContext {
    store: Arc<Store>,
    token: CancellationToken,
    task: TaskId,
}

impl EffectContext {
    pub(crate) fn new(store: Arc<Store>, token: CancellationToken, task: TaskId) -> Self {
        Self { store, token, task }
    }

    /// Id of the routine instance this context belongs to.
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Await an external operation.
    ///
    /// Its error is converted into `EffectError::Invoke`. If the runtime shuts
    /// down first, the operation is dropped and `Cancelled` is returned.
    pub async fn invoke<F, T, E>(&self, operation: F) -> Result<T, EffectError>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.ensure_live()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(EffectError::Cancelled),
            result = operation => result.map_err(|e| EffectError::Invoke(e.to_string())),
        }
    }

    /// Run a synchronous external function.
    pub fn call<F, T, E>(&self, function: F) -> Result<T, EffectError>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        self.ensure_live()?;
        function().map_err(|e| EffectError::Invoke(e.to_string()))
    }

    /// Dispatch an action into the store.
    ///
    /// The state update is applied immediately. If a routine is registered
    /// for the action's tag, this waits until that routine has finished, so
    /// its writes land before anything this routine does next.
    pub async fn dispatch(&self, action: Action) -> Result<(), EffectError> {
        self.ensure_live()?;
        match self.store.apply(action, true) {
            Delivery::Rejected => Err(EffectError::Closed),
            Delivery::Applied => Ok(()),
            Delivery::Pending(done) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(EffectError::Cancelled),
                    // A dropped sender means the triggered routine was
                    // cancelled; only our own liveness matters here.
                    _ = done => self.ensure_live(),
                }
            }
        }
    }

    /// Bulk state set.
    ///
    /// `fields` must be an object; each entry becomes an
    /// `update<Field>` dispatch, in the object's order.
    pub async fn set_state(&self, fields: Value) -> Result<(), EffectError> {
        let Value::Object(fields) = fields else {
            return Err(EffectError::Payload {
                field: String::new(),
                message: "set_state expects an object of fields".to_string(),
            });
        };

        for (field, value) in fields {
            let action = Action::new(default_updater_tag(&field)).with(field, value);
            self.dispatch(action).await?;
        }
        Ok(())
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<State> {
        self.store.state()
    }

    /// Check if the runtime is shutting down.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the runtime starts shutting down.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    fn ensure_live(&self) -> Result<(), EffectError> {
        if self.token.is_cancelled() {
            Err(EffectError::Cancelled)
        } else if self.store.is_closed() {
            Err(EffectError::Closed)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for EffectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectContext")
            .field("task", &self.task)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ReducerRegistry;
    use serde_json::json;
    use uuid::Uuid;

    fn context() -> (EffectContext, CancellationToken) {
        let initial = State::try_from(json!({ "a": 0, "b": 0 })).unwrap();
        let reducers = ReducerRegistry::with_default_updaters(&initial);
        let store = Arc::new(Store::new(Uuid::new_v4(), initial, reducers, false));
        let token = CancellationToken::new();
        (EffectContext::new(store, token.clone(), TaskId(1)), token)
    }

    #[tokio::test]
    async fn test_set_state_dispatches_per_field_in_order() {
        let (ctx, _token) = context();
        let mut actions = ctx.store.subscribe_actions();

        ctx.set_state(json!({ "a": 1, "b": 2 })).await.unwrap();

        let applied = actions.drain();
        let tags: Vec<&str> = applied.iter().map(|a| a.action.kind()).collect();
        assert_eq!(tags, vec!["updateA", "updateB"]);

        // After updateA, b still holds its previous value
        assert_eq!(applied[0].state.get_as::<i64>("a"), Some(1));
        assert_eq!(applied[0].state.get_as::<i64>("b"), Some(0));
        assert_eq!(applied[1].state.get_as::<i64>("b"), Some(2));
    }

    #[tokio::test]
    async fn test_set_state_rejects_non_object() {
        let (ctx, _token) = context();
        let err = ctx.set_state(json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, EffectError::Payload { .. }));
    }

    #[tokio::test]
    async fn test_invoke_maps_errors() {
        let (ctx, _token) = context();

        let ok = ctx.invoke(async { Ok::<_, String>(5) }).await;
        assert_eq!(ok, Ok(5));

        let err = ctx.invoke(async { Err::<i32, _>("boom") }).await;
        assert_eq!(err, Err(EffectError::Invoke("boom".to_string())));

        let called = ctx.call(|| "7".parse::<i32>());
        assert_eq!(called, Ok(7));
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_everything() {
        let (ctx, token) = context();
        token.cancel();

        let pending = ctx.invoke(std::future::pending::<Result<(), String>>()).await;
        assert_eq!(pending, Err(EffectError::Cancelled));
        assert_eq!(
            ctx.dispatch(Action::new("updateA").with("a", 9)).await,
            Err(EffectError::Cancelled)
        );
        assert_eq!(ctx.state().get_as::<i64>("a"), Some(0));
    }

    #[tokio::test]
    async fn test_closed_store_refuses_live_routine() {
        let (ctx, token) = context();

        // Shutdown closes the store before cancelling routines
        ctx.store.close();
        assert!(!token.is_cancelled());

        assert_eq!(
            ctx.dispatch(Action::new("updateA").with("a", 9)).await,
            Err(EffectError::Closed)
        );
        assert_eq!(ctx.state().get_as::<i64>("a"), Some(0));
    }
}
