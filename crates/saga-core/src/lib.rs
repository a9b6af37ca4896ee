//! Core types for the saga state runtime.
//!
//! This crate contains the value types shared by every saga crate:
//! - Actions and the default-updater naming contract
//! - Immutable state snapshots
//! - Runtime configuration
//! - Error types

mod action;
mod config;
mod error;
mod state;

pub use action::{default_updater_tag, Action};
pub use config::{CollisionPolicy, RuntimeConfig};
pub use error::{ConfigError, EffectError, SetupError};
pub use state::State;
