//! Extension Context - identity-scoped operations for one plugin.
//!
//! Unlike the shared [`CapabilityBundle`](crate::capabilities::CapabilityBundle),
//! each plugin gets its own context carrying its name. Operations that touch
//! a plugin's wrapper record resolve it by that name, so a plugin can only
//! save its own settings.

use game_rules::Settings;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::store::GameStore;

/// Where a UI fragment is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiSlot {
    /// Character creation and sheet views.
    Character,
    /// Backend connection settings.
    Backend,
}

/// A label plus an opaque renderable descriptor, owned by the view layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiFragment {
    pub plugin: String,
    pub slot: UiSlot,
    pub label: String,
    pub fragment: Value,
}

/// Append-only list of UI fragments registered during this session.
///
/// Duplicates are kept; the view layer filters them if it cares.
#[derive(Debug, Default)]
pub struct UiRegistry {
    fragments: RwLock<Vec<UiFragment>>,
}

impl UiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, fragment: UiFragment) {
        self.fragments.write().push(fragment);
    }

    pub fn all(&self) -> Vec<UiFragment> {
        self.fragments.read().clone()
    }

    pub fn for_slot(&self, slot: UiSlot) -> Vec<UiFragment> {
        self.fragments
            .read()
            .iter()
            .filter(|f| f.slot == slot)
            .cloned()
            .collect()
    }
}

/// Replace a plugin's stored settings through the store's guarded path.
pub(crate) async fn save_plugin_settings(store: &GameStore, plugin: &str, settings: Settings) -> Result<()> {
    store
        .mutate(|mut draft| async move {
            let wrapper = draft
                .plugin_mut(plugin)
                .ok_or_else(|| EngineError::NotRegistered(plugin.to_string()))?;
            wrapper.settings = settings;
            Ok::<_, EngineError>((draft, ()))
        })
        .await?;
    debug!(plugin, "saved plugin settings");
    Ok(())
}

/// Per-plugin handle handed to `init`.
#[derive(Clone)]
pub struct ExtensionContext {
    plugin: Arc<str>,
    store: Arc<GameStore>,
    ui: Arc<UiRegistry>,
}

impl ExtensionContext {
    pub fn new(plugin: impl Into<Arc<str>>, store: Arc<GameStore>, ui: Arc<UiRegistry>) -> Self {
        Self {
            plugin: plugin.into(),
            store,
            ui,
        }
    }

    /// The owning plugin's name.
    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    /// Replace this plugin's settings.
    ///
    /// Fails with [`EngineError::NotRegistered`] if the plugin has no wrapper,
    /// and with a nested-mutation error if called from `init` or a hook, which
    /// already run inside a guarded mutation.
    pub async fn save_settings(&self, settings: Settings) -> Result<()> {
        save_plugin_settings(&self.store, &self.plugin, settings).await
    }

    /// Mark `name` as the active rule provider, or clear it.
    ///
    /// Selecting one plugin deselects all others.
    pub async fn set_plugin_selected(&self, name: &str, selected: bool) -> Result<()> {
        self.store
            .mutate(|mut draft| async move {
                if !draft.select_plugin(name, selected) {
                    return Err(EngineError::NotFound(name.to_string()));
                }
                Ok((draft, ()))
            })
            .await?;
        debug!(plugin = %self.plugin, target = name, selected, "changed rule provider selection");
        Ok(())
    }

    pub fn add_character_ui(&self, label: impl Into<String>, fragment: Value) {
        self.add_ui(UiSlot::Character, label.into(), fragment);
    }

    pub fn add_backend_ui(&self, label: impl Into<String>, fragment: Value) {
        self.add_ui(UiSlot::Backend, label.into(), fragment);
    }

    fn add_ui(&self, slot: UiSlot, label: String, fragment: Value) {
        self.ui.push(UiFragment {
            plugin: self.plugin.to_string(),
            slot,
            label,
            fragment,
        });
    }
}
