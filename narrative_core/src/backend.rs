//! LLM backend boundary.
//!
//! Concrete clients (OpenAI-style, OpenRouter-style, local models) live
//! outside this crate and implement [`Backend`]. Plugins may contribute
//! backends; the host keeps them in a [`BackendRegistry`] and routes every
//! call to whichever one is active at call time.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Receives streamed tokens as they arrive.
pub type TokenSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend call aborted")]
    Aborted,

    /// The structured reply did not match the requested schema.
    #[error("backend reply did not match the expected shape: {0}")]
    SchemaValidation(String),

    #[error("no backend is active")]
    NoActiveBackend,

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),
}

impl BackendError {
    pub fn is_abort(&self) -> bool {
        matches!(self, BackendError::Aborted)
    }

    /// Transient failures worth retrying; schema mismatches count, since the
    /// model usually complies on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Request(_) | BackendError::SchemaValidation(_)
        )
    }
}

/// A narration backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Free-form narration for `prompt`.
    async fn narration(&self, prompt: &str, on_token: Option<TokenSink>) -> Result<String, BackendError>;

    /// A JSON value shaped like `schema`. Callers validate the reply.
    async fn object(
        &self,
        prompt: &str,
        schema: &Value,
        on_token: Option<TokenSink>,
    ) -> Result<Value, BackendError>;

    /// Cancel whatever request is in flight.
    fn abort(&self) {}
}

/// Check `value` against the subset of JSON Schema used for generation
/// requests: `type`, `properties`, `required` and `items`.
pub fn validate_schema(value: &Value, schema: &Value) -> Result<(), BackendError> {
    validate_at("$", value, schema)
}

fn validate_at(path: &str, value: &Value, schema: &Value) -> Result<(), BackendError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        let matches = match expected {
            "object" => value.is_object(),
            "array" => value.is_array(),
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            _ => true,
        };
        if !matches {
            return Err(BackendError::SchemaValidation(format!(
                "{path}: expected {expected}"
            )));
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if value.get(key).is_none() {
                return Err(BackendError::SchemaValidation(format!(
                    "{path}: missing field '{key}'"
                )));
            }
        }
    }

    if let (Some(properties), Some(object)) = (
        schema.get("properties").and_then(Value::as_object),
        value.as_object(),
    ) {
        for (key, property_schema) in properties {
            if let Some(field) = object.get(key) {
                validate_at(&format!("{path}.{key}"), field, property_schema)?;
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (index, item) in array.iter().enumerate() {
            validate_at(&format!("{path}[{index}]"), item, items)?;
        }
    }

    Ok(())
}

/// Named backends plus the one currently active.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<BTreeMap<String, Arc<dyn Backend>>>,
    active: RwLock<Option<String>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a backend under `name`.
    pub fn register(&self, name: impl Into<String>, backend: Arc<dyn Backend>) {
        let name = name.into();
        if self.backends.write().insert(name.clone(), backend).is_some() {
            warn!(backend = %name, "replaced registered backend");
        } else {
            info!(backend = %name, "registered backend");
        }
    }

    /// Register `backend` only if `name` is free. Returns whether it was added.
    pub fn register_new(&self, name: impl Into<String>, backend: Arc<dyn Backend>) -> bool {
        let name = name.into();
        let mut backends = self.backends.write();
        if backends.contains_key(&name) {
            warn!(backend = %name, "backend name already taken; keeping the registered one");
            return false;
        }
        backends.insert(name.clone(), backend);
        info!(backend = %name, "registered backend");
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.read().keys().cloned().collect()
    }

    /// Make `name` the backend every later call goes to.
    pub fn activate(&self, name: &str) -> Result<(), BackendError> {
        if !self.contains(name) {
            return Err(BackendError::UnknownBackend(name.to_string()));
        }
        *self.active.write() = Some(name.to_string());
        info!(backend = %name, "activated backend");
        Ok(())
    }

    pub fn active_name(&self) -> Option<String> {
        self.active.read().clone()
    }

    pub fn active(&self) -> Result<Arc<dyn Backend>, BackendError> {
        let name = self.active_name().ok_or(BackendError::NoActiveBackend)?;
        self.backends
            .read()
            .get(&name)
            .cloned()
            .ok_or(BackendError::UnknownBackend(name))
    }
}
