//! Game state - the single document holding all game data.

mod events;
mod plugins;

pub use events::*;
pub use plugins::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::entities::{Character, EventId, Location, LocationId};
use crate::mechanics::CheckOutcome;

/// Progression phases, in order. `Chat` is terminal until a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Welcome,
    Connection,
    Genre,
    Character,
    Scenario,
    Chat,
}

impl Phase {
    /// The phase an `advance` from this one leads to.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Welcome => Some(Phase::Connection),
            Phase::Connection => Some(Phase::Genre),
            Phase::Genre => Some(Phase::Character),
            Phase::Character => Some(Phase::Scenario),
            Phase::Scenario => Some(Phase::Chat),
            Phase::Chat => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Welcome => "welcome",
            Phase::Connection => "connection",
            Phase::Genre => "genre",
            Phase::Character => "character",
            Phase::Scenario => "scenario",
            Phase::Chat => "chat",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The generated setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub genre: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tone: Option<String>,
}

/// Flag value types for plot-branch flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl FlagValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FlagValue::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// The complete game document.
///
/// Fields below `flags` are transient: they are recomputed every step and
/// left out of [`PersistedState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GameState {
    pub phase: Phase,

    /// Name of the backend the player connected to.
    pub backend: Option<String>,

    pub world: Option<World>,
    pub protagonist: Option<Character>,
    pub characters: Vec<Character>,
    pub locations: Vec<Location>,
    pub current_location: Option<LocationId>,

    /// Append-only story log.
    pub events: Vec<NarrativeEvent>,

    /// Plugin wrapper records, in load order.
    pub plugins: Vec<PluginWrapper>,

    /// Plot-branch flags set by rule providers.
    pub flags: BTreeMap<String, FlagValue>,

    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default)]
    pub last_checks: Vec<CheckOutcome>,
}

/// The subset of [`GameState`] that survives a reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PersistedState {
    pub phase: Phase,
    pub backend: Option<String>,
    pub world: Option<World>,
    pub protagonist: Option<Character>,
    pub characters: Vec<Character>,
    pub locations: Vec<Location>,
    pub current_location: Option<LocationId>,
    pub events: Vec<NarrativeEvent>,
    pub plugins: Vec<PluginWrapper>,
    pub flags: BTreeMap<String, FlagValue>,
}

impl GameState {
    /// Create a new empty game state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the persisted fields.
    pub fn persisted(&self) -> PersistedState {
        PersistedState {
            phase: self.phase,
            backend: self.backend.clone(),
            world: self.world.clone(),
            protagonist: self.protagonist.clone(),
            characters: self.characters.clone(),
            locations: self.locations.clone(),
            current_location: self.current_location,
            events: self.events.clone(),
            plugins: self.plugins.clone(),
            flags: self.flags.clone(),
        }
    }

    /// Rebuild a state from its persisted subset; transient fields start empty.
    pub fn restore(persisted: PersistedState) -> Self {
        Self {
            phase: persisted.phase,
            backend: persisted.backend,
            world: persisted.world,
            protagonist: persisted.protagonist,
            characters: persisted.characters,
            locations: persisted.locations,
            current_location: persisted.current_location,
            events: persisted.events,
            plugins: persisted.plugins,
            flags: persisted.flags,
            suggested_actions: Vec::new(),
            last_checks: Vec::new(),
        }
    }

    /// Start over: clear the game, keep plugin records and the backend choice.
    pub fn reset_game(&mut self) {
        let plugins = std::mem::take(&mut self.plugins);
        let backend = self.backend.take();
        *self = Self {
            plugins,
            backend,
            ..Self::default()
        };
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginWrapper> {
        self.plugins.iter().find(|p| p.name == name)
    }

    pub fn plugin_mut(&mut self, name: &str) -> Option<&mut PluginWrapper> {
        self.plugins.iter_mut().find(|p| p.name == name)
    }

    /// Set or clear the selected flag on `name`.
    ///
    /// Selecting a plugin clears every other selection, so at most one
    /// wrapper is ever selected. Returns `false` if no wrapper has that name.
    pub fn select_plugin(&mut self, name: &str, selected: bool) -> bool {
        if self.plugin(name).is_none() {
            return false;
        }
        for wrapper in &mut self.plugins {
            if wrapper.name == name {
                wrapper.selected_plugin = selected;
            } else if selected {
                wrapper.selected_plugin = false;
            }
        }
        true
    }

    /// Append an event to the story log.
    pub fn push_event(&mut self, kind: EventKind, content: impl Into<String>) -> EventId {
        let event = NarrativeEvent::new(kind, content);
        let id = event.id;
        self.events.push(event);
        id
    }

    /// The last `count` events, oldest first.
    pub fn recent_events(&self, count: usize) -> &[NarrativeEvent] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }

    /// Case-insensitive lookup by name.
    pub fn location_by_name(&self, name: &str) -> Option<&Location> {
        self.locations
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.current_location.and_then(|id| self.location(id))
    }

    pub fn set_flag(&mut self, name: impl Into<String>, value: FlagValue) {
        self.flags.insert(name.into(), value);
    }

    pub fn flag(&self, name: &str) -> Option<&FlagValue> {
        self.flags.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapper(name: &str) -> PluginWrapper {
        PluginWrapper::new(name, Settings::new())
    }

    #[test]
    fn test_phase_order() {
        let mut phase = Phase::Welcome;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(
            seen,
            vec![
                Phase::Welcome,
                Phase::Connection,
                Phase::Genre,
                Phase::Character,
                Phase::Scenario,
                Phase::Chat
            ]
        );
        assert_eq!(serde_json::to_string(&Phase::Chat).unwrap(), "\"chat\"");
    }

    #[test]
    fn test_select_plugin_clears_others() {
        let mut state = GameState::new();
        state.plugins = vec![wrapper("a"), wrapper("b"), wrapper("c")];

        assert!(state.select_plugin("a", true));
        assert!(state.select_plugin("c", true));

        let selected: Vec<_> = state
            .plugins
            .iter()
            .filter(|p| p.selected_plugin)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(selected, vec!["c"]);

        assert!(state.select_plugin("c", false));
        assert!(state.plugins.iter().all(|p| !p.selected_plugin));
        assert!(!state.select_plugin("missing", true));
    }

    #[test]
    fn test_persisted_drops_transient_fields() {
        let mut state = GameState::new();
        state.phase = Phase::Chat;
        state.suggested_actions = vec!["Look around".into()];
        state.push_event(EventKind::Narration, "Rain falls.");
        state.plugins.push(wrapper("dice"));

        let restored = GameState::restore(state.persisted());
        assert_eq!(restored.phase, Phase::Chat);
        assert_eq!(restored.events, state.events);
        assert_eq!(restored.plugins, state.plugins);
        assert!(restored.suggested_actions.is_empty());

        let json = serde_json::to_value(state.persisted()).unwrap();
        assert!(json.get("suggested_actions").is_none());
    }

    #[test]
    fn test_reset_keeps_plugins_and_backend() {
        let mut state = GameState::new();
        state.phase = Phase::Chat;
        state.backend = Some("local".into());
        state.plugins.push(wrapper("dice"));
        state.push_event(EventKind::System, "hello");
        state.set_flag("met_the_king", FlagValue::Bool(true));

        state.reset_game();

        assert_eq!(state.phase, Phase::Welcome);
        assert_eq!(state.backend.as_deref(), Some("local"));
        assert_eq!(state.plugins.len(), 1);
        assert!(state.events.is_empty());
        assert!(state.flags.is_empty());
    }

    #[test]
    fn test_recent_events_window() {
        let mut state = GameState::new();
        for i in 0..5 {
            state.push_event(EventKind::Narration, format!("event {i}"));
        }
        let recent = state.recent_events(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "event 3");
        assert_eq!(state.recent_events(50).len(), 5);
    }

    #[test]
    fn test_location_lookup() {
        let mut state = GameState::new();
        let tavern = Location::new("The Gilded Goose", "A crowded tavern");
        let id = tavern.id;
        state.locations.push(tavern);
        state.current_location = Some(id);

        assert_eq!(state.location_by_name("the gilded goose").map(|l| l.id), Some(id));
        assert_eq!(state.current_location().map(|l| l.name.as_str()), Some("The Gilded Goose"));
    }
}
