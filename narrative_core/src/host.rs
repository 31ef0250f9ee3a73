//! Host - builds every runtime component once and wires them together.

use game_rules::{DefaultRuleLogic, RandomSource, ThreadRandom};
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{Backend, BackendRegistry};
use crate::capabilities::{BackendAccess, CapabilityBundle, Feedback, LibraryAccess, StateAccess};
use crate::config::EngineConfig;
use crate::dispatcher::RuleDispatcher;
use crate::engine::GameEngine;
use crate::error::Result;
use crate::extension::UiRegistry;
use crate::plugin::{
    DirectoryManifestSource, LoadReport, ManifestSource, PluginLoader, PluginRegistry,
    StaticLoader, StaticManifestSource,
};
use crate::store::GameStore;

/// Configures a [`Host`].
pub struct HostBuilder {
    config: EngineConfig,
    source: Option<Arc<dyn ManifestSource>>,
    loader: Arc<dyn PluginLoader>,
    store: GameStore,
    dice: Arc<dyn RandomSource>,
    backends: Vec<(String, Arc<dyn Backend>)>,
}

impl HostBuilder {
    /// Manifests to load instead of scanning `config.plugins.directory`.
    pub fn manifest_source(mut self, source: Arc<dyn ManifestSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn PluginLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Start from an existing store, e.g. one restored from a save.
    pub fn store(mut self, store: GameStore) -> Self {
        self.store = store;
        self
    }

    pub fn dice(mut self, dice: Arc<dyn RandomSource>) -> Self {
        self.dice = dice;
        self
    }

    /// A backend supplied by the embedding application rather than a plugin.
    pub fn backend(mut self, name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.backends.push((name.into(), backend));
        self
    }

    pub fn build(self) -> Host {
        let source: Arc<dyn ManifestSource> = match (self.source, &self.config.plugins.directory) {
            (Some(source), _) => source,
            (None, Some(directory)) => Arc::new(DirectoryManifestSource::new(
                directory.clone(),
                self.config.plugins.manifest_file.clone(),
            )),
            (None, None) => Arc::new(StaticManifestSource::default()),
        };

        let store = Arc::new(self.store);
        let backends = Arc::new(BackendRegistry::new());
        for (name, backend) in self.backends {
            backends.register(name, backend);
        }
        let backend = Arc::new(BackendAccess::new(Arc::clone(&backends)));
        let feedback = Arc::new(Feedback::default());
        let ui = Arc::new(UiRegistry::new());
        let default_rules = Arc::new(DefaultRuleLogic::new(Arc::clone(&self.dice)));

        let caps = Arc::new(CapabilityBundle::new(
            LibraryAccess::new(self.dice, Arc::clone(&default_rules)),
            Arc::clone(&backend),
            StateAccess::new(Arc::clone(&store)),
            Arc::clone(&feedback),
        ));
        let plugins = Arc::new(PluginRegistry::new(
            source,
            self.loader,
            Arc::clone(&store),
            Arc::clone(&caps),
            Arc::clone(&ui),
        ));
        let dispatcher = Arc::new(RuleDispatcher::new(Arc::clone(&plugins), default_rules));
        let engine = GameEngine::new(
            Arc::clone(&store),
            backend,
            Arc::clone(&plugins),
            Arc::clone(&dispatcher),
            Arc::clone(&feedback),
            &self.config.narration,
        );

        Host {
            config: self.config,
            store,
            backends,
            feedback,
            ui,
            caps,
            plugins,
            dispatcher,
            engine,
        }
    }
}

/// The running application core.
pub struct Host {
    config: EngineConfig,
    store: Arc<GameStore>,
    backends: Arc<BackendRegistry>,
    feedback: Arc<Feedback>,
    ui: Arc<UiRegistry>,
    caps: Arc<CapabilityBundle>,
    plugins: Arc<PluginRegistry>,
    dispatcher: Arc<RuleDispatcher>,
    engine: GameEngine,
}

impl Host {
    pub fn builder(config: EngineConfig) -> HostBuilder {
        HostBuilder {
            config,
            source: None,
            loader: Arc::new(StaticLoader::new()),
            store: GameStore::default(),
            dice: Arc::new(ThreadRandom),
            backends: Vec::new(),
        }
    }

    /// Load every plugin, then activate a backend.
    ///
    /// The backend chosen in a restored session wins over
    /// `config.backend.default`; either is skipped with a warning if nothing
    /// registered it.
    pub async fn start(&self) -> Result<LoadReport> {
        info!("starting host");
        let report = self.plugins.load_all().await?;

        let preferred = self
            .store
            .snapshot()
            .backend
            .clone()
            .or_else(|| self.config.backend.default.clone());
        if let Some(name) = preferred {
            if let Err(err) = self.backends.activate(&name) {
                warn!(backend = %name, error = %err, "backend not activated");
                self.feedback.error(err.to_string());
            }
        }

        info!(
            ready = report.ready.len(),
            failed = report.failed.len(),
            backends = self.backends.names().len(),
            "host started"
        );
        Ok(report)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<GameStore> {
        &self.store
    }

    pub fn backends(&self) -> &Arc<BackendRegistry> {
        &self.backends
    }

    pub fn feedback(&self) -> &Arc<Feedback> {
        &self.feedback
    }

    pub fn ui(&self) -> &Arc<UiRegistry> {
        &self.ui
    }

    pub fn capabilities(&self) -> &Arc<CapabilityBundle> {
        &self.caps
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    pub fn dispatcher(&self) -> &Arc<RuleDispatcher> {
        &self.dispatcher
    }
}
