//! Reducer and effect runtime for saga state containers.
//!
//! This crate provides:
//! - Model declaration (state, reducers, effect routines, plugins)
//! - Default updaters derived from top-level state fields
//! - Plugin composition into namespaced state slices
//! - A single-writer store with render and action subscriptions
//! - An effect scheduler that starts one routine per matching action, in
//!   apply order
//! - A ready-made fetch lifecycle model
//!
//! ## Flow
//!
//! ```text
//! Model ─▶ compose plugins ─▶ default updaters ─▶ reserved-tag check
//!                                                      │
//!                                                      ▼
//!        dispatch(action) ─▶ reduce ─▶ snapshot ─▶ watch subscribers
//!                                          │
//!                                          ├─▶ action channel subscribers
//!                                          ▼
//!                                   effect router ─▶ routines
//! ```
//!
//! ```ignore
//! let model = Model::new(State::try_from(json!({ "count": 0 }))?)
//!     .effect("reset", |_, ctx| async move {
//!         ctx.set_state(json!({ "count": 0 })).await
//!     });
//!
//! let runtime = Runtime::start(model)?;
//! runtime.dispatch(Action::new("updateCount").with("count", 5));
//! ```

pub mod channel;
pub mod context;
pub mod fetch;
pub mod model;
pub mod plugin;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod store;

pub use channel::{ActionReceiver, AppliedAction};
pub use context::EffectContext;
pub use model::{Model, Reducer, Routine};
pub use plugin::{scoped_reducer, Plugin};
pub use registry::{default_updater, EffectRegistry, ReducerRegistry};
pub use runtime::{create_runtime, Lifecycle, Runtime};
pub use scheduler::{RoutineOutcome, RoutineReport, Task, TaskId, TaskKind};
pub use store::Dispatcher;

// Re-export saga_core types for convenience
pub use saga_core::{
    default_updater_tag, Action, CollisionPolicy, ConfigError, EffectError, RuntimeConfig,
    SetupError, State,
};
