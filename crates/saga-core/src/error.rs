//! Error types for the saga runtime.

use thiserror::Error;

/// Setup errors - fatal, surfaced before the runtime starts.
#[derive(Debug, Error)]
pub enum SetupError {
    /// An effect is registered under a reserved default-updater tag.
    #[error("effect '{tag}' collides with the default updater for state field '{field}'")]
    ReservedEffectTag { tag: String, field: String },

    /// A plugin namespace is already taken (reject policy only).
    #[error("plugin namespace '{namespace}' is already in use")]
    NamespaceCollision { namespace: String },

    /// A plugin reducer or effect tag is already registered (reject policy only).
    #[error("{kind} tag '{tag}' from plugin '{namespace}' is already registered")]
    TagCollision {
        kind: &'static str,
        tag: String,
        namespace: String,
    },

    /// Initial state is not an object.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Started outside of a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Errors raised inside an effect routine.
///
/// These are local to one routine instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    /// An invoked external operation failed.
    #[error("external call failed: {0}")]
    Invoke(String),

    /// The runtime is shutting down.
    #[error("routine cancelled")]
    Cancelled,

    /// A payload field could not be read.
    #[error("invalid payload field '{field}': {message}")]
    Payload { field: String, message: String },

    /// The runtime no longer accepts actions.
    #[error("runtime closed")]
    Closed,

    /// Routine-defined failure.
    #[error("{0}")]
    Routine(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SetupError::ReservedEffectTag {
            tag: "updateCount".to_string(),
            field: "count".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "effect 'updateCount' collides with the default updater for state field 'count'"
        );

        let err = EffectError::Invoke("timeout".to_string());
        assert_eq!(err.to_string(), "external call failed: timeout");
    }
}
