//! Action-related types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EffectError;

/// Tag prefix of the reducer derived for every top-level state field.
const DEFAULT_UPDATER_PREFIX: &str = "update";

/// Reserved tag of the default updater for `field`.
///
/// `count` becomes `updateCount`. Only the first character is upper-cased,
/// the rest of the field name is kept verbatim.
pub fn default_updater_tag(field: &str) -> String {
    let mut chars = field.chars();
    let mut tag = String::with_capacity(DEFAULT_UPDATER_PREFIX.len() + field.len());
    tag.push_str(DEFAULT_UPDATER_PREFIX);
    if let Some(first) = chars.next() {
        tag.extend(first.to_uppercase());
        tag.push_str(chars.as_str());
    }
    tag
}

/// A dispatched action: a type tag plus an opaque payload.
///
/// Serializes as `{ "type": <tag>, ...payload }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    kind: String,

    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl Action {
    /// Create an action with an empty payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Add a payload field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(field.into(), value.into());
        self
    }

    /// The action's type tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Check the type tag.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Raw payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    /// Deserialize a payload field.
    ///
    /// A missing field deserializes from `null`, so `Option<T>` reads
    /// never fail on absence.
    pub fn field<T: DeserializeOwned>(&self, field: &str) -> Result<T, EffectError> {
        let value = self.payload.get(field).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| EffectError::Payload {
            field: field.to_string(),
            message: e.to_string(),
        })
    }

    /// All payload fields, in insertion order.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_updater_tag() {
        assert_eq!(default_updater_tag("count"), "updateCount");
        assert_eq!(default_updater_tag("userName"), "updateUserName");
        assert_eq!(default_updater_tag("x"), "updateX");
        assert_eq!(default_updater_tag("ärger"), "updateÄrger");
        assert_eq!(default_updater_tag(""), "update");
    }

    #[test]
    fn test_action_wire_shape() {
        let action = Action::new("FETCH_SUCCEEDED").with("data", json!({ "id": "test" }));

        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value, json!({ "type": "FETCH_SUCCEEDED", "data": { "id": "test" } }));

        let parsed: Action = serde_json::from_value(json!({ "type": "toOne", "n": 3 })).unwrap();
        assert!(parsed.is("toOne"));
        assert_eq!(parsed.get("n"), Some(&json!(3)));
    }

    #[test]
    fn test_field_reads() {
        let action = Action::new("setName").with("name", "ada").with("age", 36);

        assert_eq!(action.field::<String>("name").unwrap(), "ada");
        assert_eq!(action.field::<u32>("age").unwrap(), 36);
        assert_eq!(action.field::<Option<String>>("missing").unwrap(), None);

        let err = action.field::<u32>("name").unwrap_err();
        assert!(matches!(err, EffectError::Payload { ref field, .. } if field == "name"));
    }
}
