//! Structured generation requests: schemas sent to the backend and the
//! replies they decode into.

use game_rules::{Character, Location, StatsComponent, World};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::BackendError;

pub(crate) fn world_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name", "description"],
        "properties": {
            "name": {"type": "string"},
            "description": {"type": "string"},
            "tone": {"type": "string"}
        }
    })
}

pub(crate) fn protagonist_schema() -> Value {
    let ability = json!({"type": "integer"});
    json!({
        "type": "object",
        "required": ["stats", "hp", "biography"],
        "properties": {
            "stats": {
                "type": "object",
                "required": ["strength", "dexterity", "constitution", "intelligence", "wisdom", "charisma"],
                "properties": {
                    "strength": ability,
                    "dexterity": ability,
                    "constitution": ability,
                    "intelligence": ability,
                    "wisdom": ability,
                    "charisma": ability
                }
            },
            "hp": {"type": "integer"},
            "biography": {"type": "string"}
        }
    })
}

pub(crate) fn scenario_schema() -> Value {
    json!({
        "type": "object",
        "required": ["characters", "locations"],
        "properties": {
            "characters": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "race": {"type": "string"},
                        "class": {"type": "string"},
                        "description": {"type": "string"}
                    }
                }
            },
            "locations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "description"],
                    "properties": {
                        "name": {"type": "string"},
                        "description": {"type": "string"},
                        "connections": {"type": "array", "items": {"type": "string"}}
                    }
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorldReply {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tone: Option<String>,
}

impl WorldReply {
    pub fn into_world(self, genre: &str) -> World {
        World {
            genre: genre.to_string(),
            name: self.name,
            description: self.description,
            tone: self.tone,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProtagonistReply {
    pub stats: AbilityScores,
    pub hp: i32,
    pub biography: String,
}

impl ProtagonistReply {
    /// Fill in `seed` (name, race, class) with the generated sheet.
    pub fn into_character(self, seed: Character) -> Character {
        let ability = |score: i32| score.clamp(1, 30);
        let hp = self.hp.max(1);
        let stats = StatsComponent {
            strength: ability(self.stats.strength),
            dexterity: ability(self.stats.dexterity),
            constitution: ability(self.stats.constitution),
            intelligence: ability(self.stats.intelligence),
            wisdom: ability(self.stats.wisdom),
            charisma: ability(self.stats.charisma),
            current_hp: hp,
            max_hp: hp,
        };
        seed.with_stats(stats).with_biography(self.biography)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CharacterReply {
    pub name: String,
    #[serde(default)]
    pub race: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LocationReply {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub connections: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScenarioReply {
    pub characters: Vec<CharacterReply>,
    pub locations: Vec<LocationReply>,
}

impl ScenarioReply {
    /// Build the cast and the location graph. Connections are made in both
    /// directions; names that match no location are dropped. The starting
    /// location comes first.
    pub fn into_parts(self) -> Result<(Vec<Character>, Vec<Location>), BackendError> {
        if self.locations.is_empty() {
            return Err(BackendError::SchemaValidation(
                "$.locations: expected at least one location".to_string(),
            ));
        }

        let characters = self
            .characters
            .into_iter()
            .map(|reply| {
                let mut character = Character::new(reply.name);
                character.race = reply.race;
                character.class = reply.class;
                character.biography = reply.description;
                character
            })
            .collect();

        let mut locations: Vec<Location> = self
            .locations
            .iter()
            .map(|reply| Location::new(reply.name.clone(), reply.description.clone()))
            .collect();
        for (index, reply) in self.locations.iter().enumerate() {
            for target in &reply.connections {
                let Some(other) = locations
                    .iter()
                    .position(|l| l.name.eq_ignore_ascii_case(target.trim()))
                else {
                    continue;
                };
                if other == index {
                    continue;
                }
                let (from, to) = (locations[index].id, locations[other].id);
                locations[index].connect(to);
                locations[other].connect(from);
            }
        }

        Ok((characters, locations))
    }
}
