//! Immutable state snapshots.
//!
//! A `State` is a JSON object whose top-level keys are the declared fields
//! (and mounted plugin namespaces). Fields keep declaration order, which is
//! the order default updaters are derived in.
//!
//! There is no in-place mutation API: every transition builds a new value
//! with `with` / `with_slice`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SetupError;

/// An immutable state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Map<String, Value>);

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from any serializable record.
    ///
    /// The record must serialize to a JSON object.
    pub fn from_record<T: Serialize>(record: &T) -> Result<Self, SetupError> {
        let value =
            serde_json::to_value(record).map_err(|e| SetupError::InvalidState(e.to_string()))?;
        Self::try_from(value)
    }

    /// Deserialize the snapshot into a typed record.
    pub fn to_record<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }

    /// Raw field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Typed field value. `None` if missing or not convertible.
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Option<T> {
        self.0
            .get(field)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Check if a top-level field exists.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Copy of this snapshot with one field replaced (or appended).
    ///
    /// A replaced field keeps its position.
    pub fn with(&self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.0.clone();
        next.insert(field.into(), value.into());
        Self(next)
    }

    /// The object stored under `namespace`, as its own snapshot.
    ///
    /// A missing or non-object value yields an empty state.
    pub fn slice(&self, namespace: &str) -> State {
        match self.0.get(namespace) {
            Some(Value::Object(map)) => Self(map.clone()),
            _ => Self::default(),
        }
    }

    /// Copy of this snapshot with `namespace` replaced by `slice`.
    pub fn with_slice(&self, namespace: impl Into<String>, slice: State) -> Self {
        self.with(namespace, Value::Object(slice.0))
    }

    /// Top-level field names in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the state has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Value> for State {
    type Error = SetupError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SetupError::InvalidState(format!(
                "state must be an object, got {}",
                other
            ))),
        }
    }
}

impl From<Map<String, Value>> for State {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<State> for Value {
    fn from(state: State) -> Self {
        state.into_value()
    }
}
