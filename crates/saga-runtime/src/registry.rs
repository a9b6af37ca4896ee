//! Reducer and effect registries.
//!
//! Both registries are built once during composition and never change while
//! the runtime is live. A later insert under an existing tag replaces the
//! earlier handler.
//!
//! ## Reducer precedence
//!
//! 1. Default updaters, one per top-level state field
//! 2. User reducers
//! 3. Plugin reducers (scoped to their namespace)

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use saga_core::{default_updater_tag, Action, SetupError, State};
use serde_json::Value;

use crate::model::{Reducer, Routine};

// =============================================================================
// Reducer Registry
// =============================================================================

/// Maps action tags to reducers.
#[derive(Default, Clone)]
pub struct ReducerRegistry {
    reducers: HashMap<String, Reducer>,
}

impl ReducerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding one default updater per top-level field of `state`.
    pub fn with_default_updaters(state: &State) -> Self {
        let mut registry = Self::new();
        for field in state.fields() {
            registry.insert(default_updater_tag(field), default_updater(field));
        }
        registry
    }

    /// Register a reducer, returning the one it replaced.
    pub fn insert(&mut self, tag: impl Into<String>, reducer: Reducer) -> Option<Reducer> {
        let tag = tag.into();
        let replaced = self.reducers.insert(tag.clone(), reducer);
        if replaced.is_some() {
            tracing::debug!("Reducer '{}' replaced an earlier registration", tag);
        }
        replaced
    }

    /// Register reducers in order.
    pub fn extend(&mut self, reducers: impl IntoIterator<Item = (String, Reducer)>) {
        for (tag, reducer) in reducers {
            self.insert(tag, reducer);
        }
    }

    /// Run the reducer registered for the action's tag.
    ///
    /// Returns `None` when no reducer handles the tag; the caller keeps the
    /// current snapshot as-is.
    pub fn reduce(&self, state: &State, action: &Action) -> Option<State> {
        self.reducers
            .get(action.kind())
            .map(|reducer| reducer(state, action))
    }

    /// Check if a tag has a reducer.
    pub fn contains(&self, tag: &str) -> bool {
        self.reducers.contains_key(tag)
    }

    /// Number of registered reducers.
    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    /// Check if no reducers are registered.
    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}

/// Reducer that copies `action[field]` into `state[field]`.
///
/// A missing payload field writes `null`.
pub fn default_updater(field: &str) -> Reducer {
    let field = field.to_string();
    Arc::new(move |state: &State, action: &Action| {
        let value = action.get(&field).cloned().unwrap_or(Value::Null);
        state.with(field.clone(), value)
    })
}

// =============================================================================
// Effect Registry
// =============================================================================

/// Maps action tags to effect routines.
///
/// Ordered by tag so listeners are installed deterministically.
#[derive(Default, Clone)]
pub struct EffectRegistry {
    routines: BTreeMap<String, Routine>,
}

impl EffectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routine, returning the one it replaced.
    pub fn insert(&mut self, tag: impl Into<String>, routine: Routine) -> Option<Routine> {
        let tag = tag.into();
        let replaced = self.routines.insert(tag.clone(), routine);
        if replaced.is_some() {
            tracing::debug!("Effect '{}' replaced an earlier registration", tag);
        }
        replaced
    }

    /// Register routines in order.
    pub fn extend(&mut self, routines: impl IntoIterator<Item = (String, Routine)>) {
        for (tag, routine) in routines {
            self.insert(tag, routine);
        }
    }

    /// Get the routine for a tag.
    pub fn get(&self, tag: &str) -> Option<&Routine> {
        self.routines.get(tag)
    }

    /// Check if a tag has a routine.
    pub fn contains(&self, tag: &str) -> bool {
        self.routines.contains_key(tag)
    }

    /// Registered tags in order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.routines.keys().map(String::as_str)
    }

    /// Iterate over `(tag, routine)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Routine)> {
        self.routines.iter().map(|(t, r)| (t.as_str(), r))
    }

    /// Number of registered routines.
    pub fn len(&self) -> usize {
        self.routines.len()
    }

    /// Check if no routines are registered.
    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    /// Fail if any routine sits on a default-updater tag of `state`.
    ///
    /// Runs at setup, before the scheduler starts.
    pub fn check_reserved_tags(&self, state: &State) -> Result<(), SetupError> {
        for field in state.fields() {
            let tag = default_updater_tag(field);
            if self.routines.contains_key(&tag) {
                return Err(SetupError::ReservedEffectTag {
                    tag,
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use serde_json::json;

    fn state(value: Value) -> State {
        State::try_from(value).unwrap()
    }

    fn noop_routine() -> Routine {
        let model = Model::new(State::new()).effect("noop", |_, _| async { Ok(()) });
        model.effects[0].1.clone()
    }

    #[test]
    fn test_default_updaters_replace_one_field() {
        let initial = state(json!({ "a": 1, "b": "x", "c": [1, 2] }));
        let registry = ReducerRegistry::with_default_updaters(&initial);
        assert_eq!(registry.len(), 3);

        for (field, value) in [("a", json!(7)), ("b", json!("y")), ("c", json!(null))] {
            let tag = default_updater_tag(field);
            let action = Action::new(tag).with(field, value.clone());
            let next = registry.reduce(&initial, &action).unwrap();

            assert_eq!(next.get(field), Some(&value));
            for other in initial.fields().filter(|f| *f != field) {
                assert_eq!(next.get(other), initial.get(other));
            }
        }
    }

    #[test]
    fn test_unknown_tag_is_unhandled() {
        let initial = state(json!({ "a": 1 }));
        let registry = ReducerRegistry::with_default_updaters(&initial);

        assert!(registry.reduce(&initial, &Action::new("nothing")).is_none());
    }

    #[test]
    fn test_user_reducer_overrides_default() {
        let initial = state(json!({ "count": 0 }));
        let mut registry = ReducerRegistry::with_default_updaters(&initial);

        let doubled: Reducer = Arc::new(|s: &State, a: &Action| {
            let n = a.field::<i64>("count").unwrap_or(0);
            s.with("count", n * 2)
        });
        assert!(registry.insert("updateCount", doubled).is_some());

        let next = registry
            .reduce(&initial, &Action::new("updateCount").with("count", 4))
            .unwrap();
        assert_eq!(next.get_as::<i64>("count"), Some(8));
    }

    #[test]
    fn test_reserved_effect_tag_rejected() {
        let initial = state(json!({ "count": 0, "name": "" }));
        let mut effects = EffectRegistry::new();
        effects.insert("load", noop_routine());
        assert!(effects.check_reserved_tags(&initial).is_ok());

        effects.insert("updateName", noop_routine());
        let err = effects.check_reserved_tags(&initial).unwrap_err();
        assert!(matches!(
            err,
            SetupError::ReservedEffectTag { ref tag, ref field } if tag == "updateName" && field == "name"
        ));
    }
}
