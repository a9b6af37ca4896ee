//! Configuration types.
//!
//! Defaults reproduce the permissive composition rules: colliding plugin
//! namespaces and tags silently overwrite earlier ones.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How plugin composition treats collisions.
    pub collisions: CollisionPolicy,

    /// Buffer size of the routine report channel.
    pub report_capacity: usize,

    /// Log every applied action with its payload at debug level.
    pub trace_actions: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            collisions: CollisionPolicy::default(),
            report_capacity: 256,
            trace_actions: false,
        }
    }
}

impl RuntimeConfig {
    /// Parse configuration from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&source)
    }
}

/// Collision handling during plugin composition.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Later plugins silently replace earlier namespaces and tags.
    #[default]
    LastWriterWins,
    /// Any namespace or tag collision aborts setup.
    Reject,
}

impl CollisionPolicy {
    pub fn rejects(self) -> bool {
        self == CollisionPolicy::Reject
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.collisions, CollisionPolicy::LastWriterWins);
        assert_eq!(config.report_capacity, 256);
        assert!(!config.trace_actions);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("collisions = \"reject\"").unwrap();
        assert!(config.collisions.rejects());
        assert_eq!(config.report_capacity, 256);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "trace_actions = true").unwrap();
        writeln!(file, "report_capacity = 16").unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();
        assert!(config.trace_actions);
        assert_eq!(config.report_capacity, 16);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            RuntimeConfig::from_toml_str("collisions = \"sometimes\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            RuntimeConfig::load("/definitely/not/here.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
