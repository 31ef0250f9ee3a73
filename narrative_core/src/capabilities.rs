//! Capability Bundle - the narrowly-scoped services every plugin receives.
//!
//! The host builds one bundle at startup and shares it by `Arc` with every
//! plugin's `init`. Plugins never see the host's registries, store or
//! engine directly; each handle below forwards to the live component at call
//! time, so a backend switch made after `init` is still observed.

use game_rules::{DefaultRuleLogic, GameState, RandomSource};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{validate_schema, Backend, BackendError, BackendRegistry, TokenSink};
use crate::store::{GameStore, StoreError};

/// Shared libraries, so plugins reuse the host's instances instead of
/// bringing competing copies.
pub struct LibraryAccess {
    dice: Arc<dyn RandomSource>,
    default_rules: Arc<DefaultRuleLogic>,
}

impl LibraryAccess {
    pub fn new(dice: Arc<dyn RandomSource>, default_rules: Arc<DefaultRuleLogic>) -> Self {
        Self {
            dice,
            default_rules,
        }
    }

    /// The host's random source.
    pub fn dice(&self) -> Arc<dyn RandomSource> {
        Arc::clone(&self.dice)
    }

    /// The built-in rules, for providers that only override a few methods.
    pub fn default_rules(&self) -> Arc<DefaultRuleLogic> {
        Arc::clone(&self.default_rules)
    }
}

/// Calls into whichever backend is active, with host-controlled abort.
pub struct BackendAccess {
    registry: Arc<BackendRegistry>,
    cancel: Mutex<CancellationToken>,
}

impl BackendAccess {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn is_active(&self) -> bool {
        self.registry.active().is_ok()
    }

    pub fn active_name(&self) -> Option<String> {
        self.registry.active_name()
    }

    pub async fn narration(&self, prompt: &str, on_token: Option<TokenSink>) -> Result<String, BackendError> {
        let backend = self.registry.active()?;
        self.abortable(backend.narration(prompt, on_token)).await
    }

    /// Generate a structured reply, validate it against `schema` and decode it.
    pub async fn object<T: DeserializeOwned>(
        &self,
        prompt: &str,
        schema: &Value,
        on_token: Option<TokenSink>,
    ) -> Result<T, BackendError> {
        let backend: Arc<dyn Backend> = self.registry.active()?;
        let value = self
            .abortable(backend.object(prompt, schema, on_token))
            .await?;
        validate_schema(&value, schema)?;
        serde_json::from_value(value).map_err(|e| BackendError::SchemaValidation(e.to_string()))
    }

    /// Fail the in-flight call with [`BackendError::Aborted`].
    pub fn abort(&self) {
        let token = std::mem::replace(&mut *self.cancel.lock(), CancellationToken::new());
        token.cancel();
        if let Ok(backend) = self.registry.active() {
            backend.abort();
        }
        info!("backend call aborted");
    }

    pub fn is_abort_error(&self, err: &BackendError) -> bool {
        err.is_abort()
    }

    async fn abortable<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        let token = self.cancel.lock().clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(BackendError::Aborted),
            result = call => result,
        }
    }
}

/// Read access plus the guarded mutation path.
///
/// Plugin wrappers are read-only through this handle: a plugin changes its
/// own settings with [`ExtensionContext::save_settings`](crate::extension::ExtensionContext::save_settings).
pub struct StateAccess {
    store: Arc<GameStore>,
}

impl StateAccess {
    pub fn new(store: Arc<GameStore>) -> Self {
        Self { store }
    }

    pub fn snapshot(&self) -> Arc<GameState> {
        self.store.snapshot()
    }

    /// See [`GameStore::mutate`]. Edits to `plugins` are dropped on commit.
    pub async fn mutate<F, Fut, T, E>(&self, updater: F) -> Result<T, E>
    where
        F: FnOnce(GameState) -> Fut,
        Fut: Future<Output = Result<(GameState, T), E>>,
        E: From<StoreError>,
    {
        self.store
            .mutate(|draft| async move {
                let wrappers = draft.plugins.clone();
                let (mut draft, value) = updater(draft).await?;
                if draft.plugins != wrappers {
                    warn!("plugin wrappers changed through shared state access; discarded");
                    draft.plugins = wrappers;
                }
                Ok((draft, value))
            })
            .await
    }
}

/// A message for the player-facing UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    Progress(String),
    Error(String),
    /// A streamed narration token.
    Token(String),
}

/// Progress and error signalling towards the view layer.
pub struct Feedback {
    tx: broadcast::Sender<FeedbackEvent>,
}

impl Feedback {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.tx.subscribe()
    }

    pub fn progress(&self, message: impl Into<String>) {
        let message = message.into();
        info!(%message, "progress");
        let _ = self.tx.send(FeedbackEvent::Progress(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "reported error");
        let _ = self.tx.send(FeedbackEvent::Error(message));
    }

    pub fn token(&self, token: &str) {
        let _ = self.tx.send(FeedbackEvent::Token(token.to_string()));
    }
}

impl Default for Feedback {
    fn default() -> Self {
        Self::new(256)
    }
}

/// The immutable set of handles given to every plugin.
pub struct CapabilityBundle {
    library: LibraryAccess,
    backend: Arc<BackendAccess>,
    state: StateAccess,
    feedback: Arc<Feedback>,
}

impl CapabilityBundle {
    pub fn new(
        library: LibraryAccess,
        backend: Arc<BackendAccess>,
        state: StateAccess,
        feedback: Arc<Feedback>,
    ) -> Self {
        Self {
            library,
            backend,
            state,
            feedback,
        }
    }

    pub fn library(&self) -> &LibraryAccess {
        &self.library
    }

    pub fn backend(&self) -> &BackendAccess {
        &self.backend
    }

    pub fn state(&self) -> &StateAccess {
        &self.state
    }

    pub fn feedback(&self) -> &Feedback {
        &self.feedback
    }
}
