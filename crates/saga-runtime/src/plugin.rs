//! Plugin composition.
//!
//! A plugin is a namespaced sub-model. Mounting it:
//! - places its state at `host[namespace]`
//! - wraps each of its reducers so it reads `host[namespace]` and writes back
//!   only that slice, passing every other host field through
//! - merges its effects into the host registry verbatim (effect tags are
//!   global, not namespaced)
//!
//! Only a plugin's declared reducers are lifted. Default updaters are derived
//! from the final host state, so `setState` inside a plugin routine targets
//! host fields.
//!
//! Plugins may carry plugins of their own; those are folded into the plugin's
//! slice first.
//!
//! ## Collisions
//!
//! With `CollisionPolicy::LastWriterWins` a reused namespace or tag silently
//! replaces the earlier one. `CollisionPolicy::Reject` turns each collision
//! into a `SetupError`.

use std::collections::HashSet;
use std::sync::Arc;

use saga_core::{Action, CollisionPolicy, SetupError, State};

use crate::model::{Model, Reducer, Routine};

/// A namespaced sub-model mountable into a host model.
#[derive(Debug)]
pub struct Plugin {
    namespace: String,
    model: Model,
}

impl Plugin {
    /// Create a plugin mounted under `namespace`.
    pub fn new(namespace: impl Into<String>, model: Model) -> Self {
        Self {
            namespace: namespace.into(),
            model,
        }
    }

    /// The host state key this plugin owns.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Wrap a slice reducer so it operates on `host[namespace]`.
pub fn scoped_reducer(namespace: impl Into<String>, reducer: Reducer) -> Reducer {
    let namespace = namespace.into();
    Arc::new(move |host: &State, action: &Action| {
        let slice = reducer(&host.slice(&namespace), action);
        host.with_slice(namespace.clone(), slice)
    })
}

/// Result of folding plugins into a model.
///
/// `reducers` holds user reducers followed by scoped plugin reducers, in
/// precedence order. Default updaters are not included.
pub(crate) struct Composition {
    pub state: State,
    pub reducers: Vec<(String, Reducer)>,
    pub effects: Vec<(String, Routine)>,
}

/// Fold a model's plugins into its state, reducers and effects.
pub(crate) fn compose(model: Model, policy: CollisionPolicy) -> Result<Composition, SetupError> {
    let Model {
        state,
        reducers,
        effects,
        plugins,
    } = model;

    let declared: HashSet<String> = state.fields().map(str::to_string).collect();
    let mut reducer_tags: HashSet<String> = reducers.iter().map(|(t, _)| t.clone()).collect();
    let mut effect_tags: HashSet<String> = effects.iter().map(|(t, _)| t.clone()).collect();
    let mut namespaces = HashSet::new();

    let mut composition = Composition {
        state,
        reducers,
        effects,
    };

    for plugin in plugins {
        let Plugin { namespace, model } = plugin;
        let inner = compose(model, policy)?;

        let reused = !namespaces.insert(namespace.clone()) || declared.contains(&namespace);
        if reused {
            if policy.rejects() {
                return Err(SetupError::NamespaceCollision { namespace });
            }
            tracing::warn!("Plugin namespace '{}' overwrites an earlier slot", namespace);
        }

        if policy.rejects() {
            if let Some((tag, _)) = inner.reducers.iter().find(|(t, _)| reducer_tags.contains(t)) {
                return Err(SetupError::TagCollision {
                    kind: "reducer",
                    tag: tag.clone(),
                    namespace,
                });
            }
            if let Some((tag, _)) = inner.effects.iter().find(|(t, _)| effect_tags.contains(t)) {
                return Err(SetupError::TagCollision {
                    kind: "effect",
                    tag: tag.clone(),
                    namespace,
                });
            }
        }

        composition.state = composition
            .state
            .with_slice(namespace.clone(), inner.state);

        for (tag, reducer) in inner.reducers {
            reducer_tags.insert(tag.clone());
            composition
                .reducers
                .push((tag, scoped_reducer(namespace.clone(), reducer)));
        }

        for (tag, routine) in inner.effects {
            effect_tags.insert(tag.clone());
            composition.effects.push((tag, routine));
        }

        tracing::debug!("Mounted plugin '{}'", namespace);
    }

    Ok(composition)
}
