//! Model declaration.
//!
//! A `Model` bundles an initial state with the reducers and effect routines
//! that drive it, plus any plugins to mount before the store is built.
//!
//! ```ignore
//! let model = Model::new(State::try_from(json!({ "count": 0 }))?)
//!     .reducer("increment", |state, _| {
//!         let count = state.get_as::<i64>("count").unwrap_or(0);
//!         state.with("count", count + 1)
//!     })
//!     .effect("incrementLater", |_, ctx| async move {
//!         ctx.dispatch(Action::new("increment")).await
//!     });
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use saga_core::{Action, EffectError, State};

use crate::context::EffectContext;
use crate::plugin::Plugin;

/// Pure state transition for one action tag.
pub type Reducer = Arc<dyn Fn(&State, &Action) -> State + Send + Sync>;

/// Effect routine for one action tag.
///
/// Each matching action spawns a fresh instance.
pub type Routine =
    Arc<dyn Fn(Action, EffectContext) -> BoxFuture<'static, Result<(), EffectError>> + Send + Sync>;

/// State, reducers, effects and plugins of one container.
///
/// Declarations keep their order; a later declaration under the same tag
/// replaces an earlier one.
pub struct Model {
    pub(crate) state: State,
    pub(crate) reducers: Vec<(String, Reducer)>,
    pub(crate) effects: Vec<(String, Routine)>,
    pub(crate) plugins: Vec<Plugin>,
}

impl Model {
    /// Create a model with the given initial state.
    pub fn new(state: State) -> Self {
        Self {
            state,
            reducers: Vec::new(),
            effects: Vec::new(),
            plugins: Vec::new(),
        }
    }

    /// Register a reducer.
    pub fn reducer<F>(mut self, tag: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(&State, &Action) -> State + Send + Sync + 'static,
    {
        let reducer: Reducer = Arc::new(reducer);
        self.reducers.push((tag.into(), reducer));
        self
    }

    /// Register an effect routine.
    pub fn effect<F, Fut>(mut self, tag: impl Into<String>, routine: F) -> Self
    where
        F: Fn(Action, EffectContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EffectError>> + Send + 'static,
    {
        let routine: Routine = Arc::new(move |action, ctx| routine(action, ctx).boxed());
        self.effects.push((tag.into(), routine));
        self
    }

    /// Mount a plugin. Plugins are folded in declaration order.
    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// The declared initial state (without plugin namespaces).
    pub fn state(&self) -> &State {
        &self.state
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("state", &self.state)
            .field(
                "reducers",
                &self.reducers.iter().map(|(t, _)| t).collect::<Vec<_>>(),
            )
            .field(
                "effects",
                &self.effects.iter().map(|(t, _)| t).collect::<Vec<_>>(),
            )
            .field("plugins", &self.plugins)
            .finish()
    }
}
