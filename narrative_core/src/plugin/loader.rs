//! Manifest discovery and entry-point resolution.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Plugin, PluginManifest};
use crate::error::{EngineError, Result};

/// Where plugin manifests come from.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn discover(&self) -> Result<Vec<PluginManifest>>;
}

/// Resolves a manifest's `main` entry into a live instance.
#[async_trait]
pub trait PluginLoader: Send + Sync {
    async fn load(&self, manifest: &PluginManifest) -> anyhow::Result<Arc<dyn Plugin>>;
}

/// Scans `<directory>/*/<manifest_file>`, in directory-name order.
///
/// A subdirectory without a manifest is ignored; a malformed manifest is
/// logged and skipped so the remaining plugins still load.
pub struct DirectoryManifestSource {
    directory: PathBuf,
    manifest_file: String,
}

impl DirectoryManifestSource {
    pub fn new(directory: impl Into<PathBuf>, manifest_file: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            manifest_file: manifest_file.into(),
        }
    }
}

#[async_trait]
impl ManifestSource for DirectoryManifestSource {
    async fn discover(&self) -> Result<Vec<PluginManifest>> {
        let discovery = |e: std::io::Error| {
            EngineError::Discovery(format!("{}: {e}", self.directory.display()))
        };

        let mut entries = tokio::fs::read_dir(&self.directory).await.map_err(discovery)?;
        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(discovery)? {
            let path = entry.path().join(&self.manifest_file);
            if tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
                candidates.push(path);
            }
        }
        candidates.sort();

        let mut manifests = Vec::with_capacity(candidates.len());
        for path in candidates {
            let parsed = tokio::fs::read_to_string(&path)
                .await
                .map_err(anyhow::Error::from)
                .and_then(|raw| serde_json::from_str::<PluginManifest>(&raw).map_err(Into::into));
            match parsed {
                Ok(manifest) => {
                    debug!(plugin = %manifest.name, path = %path.display(), "discovered plugin");
                    manifests.push(manifest);
                }
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable manifest"),
            }
        }
        Ok(manifests)
    }
}

/// A fixed, in-memory list of manifests.
#[derive(Debug, Clone, Default)]
pub struct StaticManifestSource {
    manifests: Vec<PluginManifest>,
}

impl StaticManifestSource {
    pub fn new(manifests: Vec<PluginManifest>) -> Self {
        Self { manifests }
    }
}

#[async_trait]
impl ManifestSource for StaticManifestSource {
    async fn discover(&self) -> Result<Vec<PluginManifest>> {
        Ok(self.manifests.clone())
    }
}

/// Builds a plugin from its manifest.
pub type PluginFactory = Arc<dyn Fn(&PluginManifest) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync>;

/// Entry points compiled into the host, keyed by `main`.
#[derive(Default, Clone)]
pub struct StaticLoader {
    factories: BTreeMap<String, PluginFactory>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, main: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&PluginManifest) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.insert(main.into(), Arc::new(factory));
        self
    }
}

#[async_trait]
impl PluginLoader for StaticLoader {
    async fn load(&self, manifest: &PluginManifest) -> anyhow::Result<Arc<dyn Plugin>> {
        let factory = self
            .factories
            .get(&manifest.main)
            .ok_or_else(|| anyhow::anyhow!("no entry point named '{}'", manifest.main))?;
        factory(manifest)
    }
}
