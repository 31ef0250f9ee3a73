//! Plugin Registry - discovery, loading, registration and `init`.

use game_rules::{GameState, PluginWrapper, Settings};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{call_plugin, ManifestSource, Plugin, PluginLoader, PluginManifest, PluginStatus};
use crate::capabilities::CapabilityBundle;
use crate::error::{EngineError, Result};
use crate::extension::{ExtensionContext, UiRegistry};
use crate::store::GameStore;

struct PluginEntry {
    instance: Arc<dyn Plugin>,
    status: PluginStatus,
}

/// One plugin that did not make it to `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of [`PluginRegistry::load_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub ready: Vec<String>,
    pub failed: Vec<PluginFailure>,
}

/// Live plugin instances keyed by wrapper name.
///
/// The persisted half of each record ([`PluginWrapper`]) lives in the game
/// state; this registry holds the half that is rebuilt every start.
pub struct PluginRegistry {
    source: Arc<dyn ManifestSource>,
    loader: Arc<dyn PluginLoader>,
    store: Arc<GameStore>,
    caps: Arc<CapabilityBundle>,
    ui: Arc<UiRegistry>,
    entries: RwLock<BTreeMap<String, PluginEntry>>,
}

impl PluginRegistry {
    pub fn new(
        source: Arc<dyn ManifestSource>,
        loader: Arc<dyn PluginLoader>,
        store: Arc<GameStore>,
        caps: Arc<CapabilityBundle>,
        ui: Arc<UiRegistry>,
    ) -> Self {
        Self {
            source,
            loader,
            store,
            caps,
            ui,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// All manifests the source knows about.
    pub async fn discover(&self) -> Result<Vec<PluginManifest>> {
        self.source.discover().await
    }

    /// Resolve a manifest's entry point.
    pub async fn load(&self, manifest: &PluginManifest) -> Result<Arc<dyn Plugin>> {
        call_plugin(self.loader.load(manifest))
            .await
            .map_err(|reason| EngineError::PluginLoad {
                name: manifest.name.clone(),
                reason,
            })
    }

    /// Register an instance, creating or reusing its wrapper, and run `init`.
    ///
    /// Persisted settings win over `default_settings`. An `init` failure is
    /// not an error here: the plugin is recorded as
    /// [`PluginStatus::Failed`], its wrapper stays in state, and the returned
    /// status says so.
    pub async fn register(
        &self,
        name: &str,
        instance: Arc<dyn Plugin>,
        default_settings: Settings,
    ) -> Result<PluginStatus> {
        {
            let mut entries = self.entries.write();
            if entries.contains_key(name) {
                return Err(EngineError::AlreadyRegistered(name.to_string()));
            }
            entries.insert(
                name.to_string(),
                PluginEntry {
                    instance: Arc::clone(&instance),
                    status: PluginStatus::Pending,
                },
            );
        }

        let target = Arc::clone(&instance);
        let outcome = self
            .store
            .mutate(|mut draft| async move {
                let settings = match draft.plugin(name) {
                    Some(wrapper) => wrapper.settings.clone(),
                    None => {
                        draft.plugins.push(PluginWrapper::new(name, default_settings.clone()));
                        default_settings
                    }
                };
                let outcome = self.run_init(name, target.as_ref(), settings).await;
                Ok::<_, EngineError>((draft, outcome))
            })
            .await;

        let status = match outcome {
            Ok(status) => status,
            Err(err) => {
                self.entries.write().remove(name);
                return Err(err);
            }
        };
        if status.is_ready() {
            self.register_backends(name, instance.as_ref()).await;
        }
        self.set_status(name, status.clone());
        Ok(status)
    }

    /// Discover, load and register every plugin; one failure never stops the rest.
    pub async fn load_all(&self) -> Result<LoadReport> {
        let manifests = self.discover().await?;
        let mut report = LoadReport::default();

        for manifest in manifests {
            let result = match self.load(&manifest).await {
                Ok(instance) => {
                    self.register(&manifest.name, instance, manifest.settings.clone())
                        .await
                }
                Err(err) => Err(err),
            };
            match result {
                Ok(PluginStatus::Ready) => report.ready.push(manifest.name),
                Ok(PluginStatus::Failed { reason }) => report.failed.push(PluginFailure {
                    name: manifest.name,
                    reason,
                }),
                Ok(PluginStatus::Pending) => {}
                Err(err) => {
                    error!(plugin = %manifest.name, error = %err, "plugin skipped");
                    self.caps.feedback().error(err.to_string());
                    report.failed.push(PluginFailure {
                        name: manifest.name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            ready = report.ready.len(),
            failed = report.failed.len(),
            "plugins loaded"
        );
        Ok(report)
    }

    /// Run `init` again for a plugin whose first `init` failed.
    ///
    /// A plugin that is already ready is left alone.
    pub async fn retry_init(&self, name: &str) -> Result<PluginStatus> {
        let (instance, status) = {
            let entries = self.entries.read();
            let entry = entries
                .get(name)
                .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
            (Arc::clone(&entry.instance), entry.status.clone())
        };
        if !matches!(status, PluginStatus::Failed { .. }) {
            return Ok(status);
        }

        self.set_status(name, PluginStatus::Pending);
        let target = Arc::clone(&instance);
        let outcome = self
            .store
            .mutate(|draft| async move {
                let settings = draft
                    .plugin(name)
                    .map(|w| w.settings.clone())
                    .ok_or_else(|| EngineError::NotRegistered(name.to_string()))?;
                let outcome = self.run_init(name, target.as_ref(), settings).await;
                Ok::<_, EngineError>((draft, outcome))
            })
            .await;

        let status = match outcome {
            Ok(status) => status,
            Err(err) => {
                self.set_status(name, status);
                return Err(err);
            }
        };
        if status.is_ready() {
            self.register_backends(name, instance.as_ref()).await;
        }
        self.set_status(name, status.clone());
        Ok(status)
    }

    /// Toggle a wrapper's `enabled` flag.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.store
            .mutate(|mut draft| async move {
                let wrapper = draft
                    .plugin_mut(name)
                    .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
                wrapper.enabled = enabled;
                Ok::<_, EngineError>((draft, ()))
            })
            .await?;
        info!(plugin = name, enabled, "plugin toggled");
        Ok(())
    }

    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        self.entries.read().get(name).map(|e| e.status.clone())
    }

    /// The live instance for `name`, but only once its `init` succeeded.
    pub fn ready_instance(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.entries
            .read()
            .get(name)
            .filter(|e| e.status.is_ready())
            .map(|e| Arc::clone(&e.instance))
    }

    /// Enabled, ready plugins in wrapper order.
    pub fn ready_plugins(&self, state: &GameState) -> Vec<(String, Arc<dyn Plugin>)> {
        state
            .plugins
            .iter()
            .filter(|w| w.enabled)
            .filter_map(|w| self.ready_instance(&w.name).map(|p| (w.name.clone(), p)))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    async fn run_init(&self, name: &str, instance: &dyn Plugin, settings: Settings) -> PluginStatus {
        let ctx = ExtensionContext::new(name, Arc::clone(&self.store), Arc::clone(&self.ui));
        match call_plugin(instance.init(settings, ctx, Arc::clone(&self.caps))).await {
            Ok(()) => {
                info!(plugin = name, "plugin initialised");
                PluginStatus::Ready
            }
            Err(reason) => {
                let err = EngineError::PluginLoad {
                    name: name.to_string(),
                    reason: reason.clone(),
                };
                error!(plugin = name, error = %reason, "plugin init failed");
                self.caps.feedback().error(err.to_string());
                PluginStatus::Failed { reason }
            }
        }
    }

    async fn register_backends(&self, name: &str, instance: &dyn Plugin) {
        match call_plugin(instance.backends()).await {
            Ok(backends) => {
                let registry = self.caps.backend().registry();
                for (backend_name, backend) in backends {
                    if !registry.register_new(backend_name.as_str(), backend) {
                        self.caps.feedback().error(format!(
                            "plugin '{name}' offered backend '{backend_name}', but that name is already registered"
                        ));
                    }
                }
            }
            Err(reason) => {
                warn!(plugin = name, error = %reason, "plugin backends unavailable");
                self.caps
                    .feedback()
                    .error(format!("plugin '{name}' could not provide backends: {reason}"));
            }
        }
    }

    fn set_status(&self, name: &str, status: PluginStatus) {
        if let Some(entry) = self.entries.write().get_mut(name) {
            entry.status = status;
        }
    }
}
