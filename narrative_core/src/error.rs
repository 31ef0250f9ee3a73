//! Error taxonomy for the runtime.

use game_rules::{Phase, RulesError};
use thiserror::Error;

use crate::backend::BackendError;
use crate::store::StoreError;

/// Everything the runtime can fail with.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Module resolution or `init` failed; the plugin is excluded, the rest continue.
    #[error("plugin '{name}' failed to load: {reason}")]
    PluginLoad { name: String, reason: String },

    /// An extension context referenced its own plugin, but no wrapper exists.
    #[error("plugin '{0}' is not registered")]
    NotRegistered(String),

    /// An operation named a plugin that has no wrapper.
    #[error("plugin '{0}' not found")]
    NotFound(String),

    #[error("plugin '{0}' is already registered")]
    AlreadyRegistered(String),

    /// Manifest discovery failed as a whole.
    #[error("plugin discovery failed: {0}")]
    Discovery(String),

    /// Fatal to the current progression step; the step is rolled back.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A broadcast hook failed on one plugin. Logged, never fatal.
    #[error("hook '{hook}' failed in plugin '{plugin}': {reason}")]
    HookFailure {
        plugin: String,
        hook: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot {action} during the {phase} phase")]
    InvalidTransition { phase: Phase, action: &'static str },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Rules(#[from] RulesError),
}

impl EngineError {
    /// Whether retrying the same step may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Backend(err) => err.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = EngineError::InvalidTransition {
            phase: Phase::Chat,
            action: "advance",
        };
        assert_eq!(err.to_string(), "cannot advance during the chat phase");
        assert_eq!(
            EngineError::NotRegistered("dice".into()).to_string(),
            "plugin 'dice' is not registered"
        );
    }

    #[test]
    fn test_schema_failures_are_retryable() {
        let err = EngineError::from(BackendError::SchemaValidation("missing field".into()));
        assert!(err.is_retryable());
        assert!(!EngineError::from(BackendError::Aborted).is_retryable());
        assert!(!EngineError::NotFound("x".into()).is_retryable());
    }
}
