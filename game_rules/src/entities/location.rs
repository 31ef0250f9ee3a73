//! Locations the protagonist can visit.

use serde::{Deserialize, Serialize};

use super::LocationId;

/// A location in the game world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub connected_locations: Vec<LocationId>,
}

impl Location {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: LocationId::new(),
            name: name.into(),
            description: description.into(),
            connected_locations: Vec::new(),
        }
    }

    pub fn connect(&mut self, other: LocationId) {
        if !self.connected_locations.contains(&other) {
            self.connected_locations.push(other);
        }
    }
}
