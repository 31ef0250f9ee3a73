//! Plugin boundary - the contract third-party rule plugins implement.
//!
//! A plugin is discovered through its [`PluginManifest`], resolved into a
//! live [`Plugin`] by a [`PluginLoader`], and registered with the
//! [`PluginRegistry`]. Plugin code is untrusted: every call the host makes
//! into it goes through [`call_plugin`], which turns both errors and panics
//! into a plain failure reason.

mod loader;
mod registry;

pub use loader::*;
pub use registry::*;

use async_trait::async_trait;
use futures::FutureExt;
use game_rules::{GameState, Location, RuleLogic, Settings};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::backend::Backend;
use crate::capabilities::CapabilityBundle;
use crate::extension::ExtensionContext;

/// A loaded plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called once per process, inside the registration's guarded mutation.
    ///
    /// Do not call [`ExtensionContext::save_settings`] from here; it would be
    /// a nested mutation and fails.
    async fn init(
        &self,
        settings: Settings,
        ctx: ExtensionContext,
        caps: Arc<CapabilityBundle>,
    ) -> anyhow::Result<()>;

    /// Backends this plugin contributes, keyed by name.
    async fn backends(&self) -> anyhow::Result<BTreeMap<String, Arc<dyn Backend>>> {
        Ok(BTreeMap::new())
    }

    /// The protagonist entered `location`. Runs inside an active mutation
    /// and may edit `draft` directly.
    async fn on_location_change(&self, _location: &Location, _draft: &mut GameState) -> anyhow::Result<()> {
        Ok(())
    }

    /// The plugin's rule provider, if it has one.
    fn rule_logic(&self) -> Option<Arc<dyn RuleLogic>> {
        None
    }
}

/// `manifest.json` contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    /// Entry point handed to the loader.
    pub main: String,
    /// Defaults used when no settings were persisted for this plugin.
    #[serde(default)]
    pub settings: Settings,
}

impl PluginManifest {
    pub fn new(name: impl Into<String>, main: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            main: main.into(),
            settings: Settings::new(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }
}

/// Lifecycle status of a registered instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginStatus {
    /// `init` is running.
    Pending,
    Ready,
    /// `init` failed; the plugin is excluded from every dispatch.
    Failed { reason: String },
}

impl PluginStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, PluginStatus::Ready)
    }
}

/// Await a call into plugin code, catching panics as well as errors.
pub(crate) async fn call_plugin<T, Fut>(call: Fut) -> Result<T, String>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_plugin_contains_errors_and_panics() {
        assert_eq!(call_plugin(async { Ok::<_, anyhow::Error>(7) }).await, Ok(7));

        let err = call_plugin(async { Err::<(), _>(anyhow::anyhow!("bad settings")) })
            .await
            .unwrap_err();
        assert_eq!(err, "bad settings");

        let err = call_plugin(async {
            if true {
                panic!("boom");
            }
            Ok::<(), anyhow::Error>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err, "panicked: boom");
    }

    #[test]
    fn test_manifest_defaults() {
        let manifest: PluginManifest =
            serde_json::from_value(json!({"name": "dnd5e", "main": "dnd5e"})).unwrap();
        assert!(manifest.settings.is_empty());

        let manifest: PluginManifest = serde_json::from_value(json!({
            "name": "dnd5e",
            "main": "dnd5e",
            "settings": {"pointBuy": 27}
        }))
        .unwrap();
        assert_eq!(manifest.settings["pointBuy"], json!(27));
    }
}
