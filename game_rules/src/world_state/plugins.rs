//! Per-plugin wrapper records stored inside the game state.

use serde::{Deserialize, Serialize};

/// Opaque plugin settings. Owned by the plugin, persisted by the host.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// The persisted half of a plugin record.
///
/// The live instance lives in the host's plugin registry under the same name
/// and is rebuilt on every start; only this part survives a reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginWrapper {
    pub name: String,
    pub enabled: bool,
    /// Whether this plugin is the chosen rule-logic provider.
    pub selected_plugin: bool,
    #[serde(default)]
    pub settings: Settings,
}

impl PluginWrapper {
    /// A freshly discovered plugin: enabled, not selected.
    pub fn new(name: impl Into<String>, settings: Settings) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            selected_plugin: false,
            settings,
        }
    }
}
