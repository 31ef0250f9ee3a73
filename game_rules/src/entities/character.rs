//! Character definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{EntityId, InventoryComponent, StatsComponent};

/// A character: the protagonist or any non-player character in the scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub race: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub biography: Option<String>,

    #[serde(default)]
    pub stats: StatsComponent,
    #[serde(default)]
    pub inventory: InventoryComponent,

    /// Character name -> disposition score.
    #[serde(default)]
    pub relationships: BTreeMap<String, i32>,

    /// Plugin-owned data (rule-specific sheets, tables, counters).
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Character {
    /// Create a new character with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            race: None,
            class: None,
            biography: None,
            stats: StatsComponent::default(),
            inventory: InventoryComponent::default(),
            relationships: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_race(mut self, race: impl Into<String>) -> Self {
        self.race = Some(race.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_biography(mut self, biography: impl Into<String>) -> Self {
        self.biography = Some(biography.into());
        self
    }

    pub fn with_stats(mut self, stats: StatsComponent) -> Self {
        self.stats = stats;
        self
    }

    /// Check if the character is alive.
    pub fn is_alive(&self) -> bool {
        self.stats.current_hp > 0
    }

    /// Shift the disposition toward another character by `delta`.
    pub fn adjust_relationship(&mut self, other: impl Into<String>, delta: i32) {
        *self.relationships.entry(other.into()).or_default() += delta;
    }

    /// One-line summary used in prompts: "Aria, Elf Rogue".
    pub fn summary(&self) -> String {
        let descriptor: Vec<&str> = [self.race.as_deref(), self.class.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if descriptor.is_empty() {
            self.name.clone()
        } else {
            format!("{}, {}", self.name, descriptor.join(" "))
        }
    }
}
