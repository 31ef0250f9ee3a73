//! Component definitions for entities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ability scores and hit points for characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsComponent {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
    pub current_hp: i32,
    pub max_hp: i32,
}

impl Default for StatsComponent {
    fn default() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
            current_hp: 10,
            max_hp: 10,
        }
    }
}

/// Stat types for modifier calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatType {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl StatType {
    /// Parse an attribute name ("dexterity", "DEX", ...). Case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "strength" | "str" => Some(StatType::Strength),
            "dexterity" | "dex" => Some(StatType::Dexterity),
            "constitution" | "con" => Some(StatType::Constitution),
            "intelligence" | "int" => Some(StatType::Intelligence),
            "wisdom" | "wis" => Some(StatType::Wisdom),
            "charisma" | "cha" => Some(StatType::Charisma),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatType::Strength => "Strength",
            StatType::Dexterity => "Dexterity",
            StatType::Constitution => "Constitution",
            StatType::Intelligence => "Intelligence",
            StatType::Wisdom => "Wisdom",
            StatType::Charisma => "Charisma",
        }
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl StatsComponent {
    /// Raw score for a stat.
    pub fn score(&self, stat: StatType) -> i32 {
        match stat {
            StatType::Strength => self.strength,
            StatType::Dexterity => self.dexterity,
            StatType::Constitution => self.constitution,
            StatType::Intelligence => self.intelligence,
            StatType::Wisdom => self.wisdom,
            StatType::Charisma => self.charisma,
        }
    }

    /// Calculate modifier for a given stat (D&D style, rounded down).
    pub fn modifier(&self, stat: StatType) -> i32 {
        (self.score(stat) - 10).div_euclid(2)
    }

    /// Apply damage (negative) or healing (positive), clamped to `0..=max_hp`.
    pub fn adjust_hp(&mut self, delta: i32) {
        self.current_hp = self.current_hp.saturating_add(delta).clamp(0, self.max_hp.max(0));
    }
}

/// A stack of identical items carried by a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub name: String,
    pub quantity: u32,
}

/// Items a character carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InventoryComponent {
    pub items: Vec<ItemStack>,
}

impl InventoryComponent {
    /// Add items, merging with an existing stack of the same name.
    pub fn add(&mut self, name: impl Into<String>, quantity: u32) {
        let name = name.into();
        match self.items.iter_mut().find(|stack| stack.name == name) {
            Some(stack) => stack.quantity += quantity,
            None => self.items.push(ItemStack { name, quantity }),
        }
    }

    /// Remove up to `quantity` items. Returns how many were actually removed.
    pub fn remove(&mut self, name: &str, quantity: u32) -> u32 {
        let Some(index) = self.items.iter().position(|stack| stack.name == name) else {
            return 0;
        };
        let stack = &mut self.items[index];
        let removed = stack.quantity.min(quantity);
        stack.quantity -= removed;
        if stack.quantity == 0 {
            self.items.remove(index);
        }
        removed
    }

    pub fn count(&self, name: &str) -> u32 {
        self.items
            .iter()
            .find(|stack| stack.name == name)
            .map(|stack| stack.quantity)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_rounds_toward_negative() {
        let stats = StatsComponent {
            strength: 20,
            dexterity: 15,
            intelligence: 9,
            wisdom: 3,
            ..Default::default()
        };

        assert_eq!(stats.modifier(StatType::Strength), 5);
        assert_eq!(stats.modifier(StatType::Dexterity), 2);
        assert_eq!(stats.modifier(StatType::Constitution), 0);
        assert_eq!(stats.modifier(StatType::Intelligence), -1);
        assert_eq!(stats.modifier(StatType::Wisdom), -4);
    }

    #[test]
    fn test_stat_from_name() {
        assert_eq!(StatType::from_name("Dexterity"), Some(StatType::Dexterity));
        assert_eq!(StatType::from_name("cha"), Some(StatType::Charisma));
        assert_eq!(StatType::from_name("stealth"), None);
    }

    #[test]
    fn test_hp_is_clamped() {
        let mut stats = StatsComponent::default();
        stats.adjust_hp(-25);
        assert_eq!(stats.current_hp, 0);
        stats.adjust_hp(50);
        assert_eq!(stats.current_hp, stats.max_hp);
    }

    #[test]
    fn test_hp_adjustment_saturates() {
        let mut stats = StatsComponent::default();
        stats.adjust_hp(i32::MAX);
        assert_eq!(stats.current_hp, stats.max_hp);
        stats.adjust_hp(i32::MIN);
        assert_eq!(stats.current_hp, 0);

        let mut broken = StatsComponent {
            max_hp: -1,
            ..Default::default()
        };
        broken.adjust_hp(5);
        assert_eq!(broken.current_hp, 0);
    }

    #[test]
    fn test_inventory_stacks() {
        let mut inventory = InventoryComponent::default();
        inventory.add("Torch", 2);
        inventory.add("Torch", 1);
        inventory.add("Rope", 1);

        assert_eq!(inventory.count("Torch"), 3);
        assert_eq!(inventory.remove("Torch", 5), 3);
        assert_eq!(inventory.count("Torch"), 0);
        assert_eq!(inventory.items.len(), 1);
        assert_eq!(inventory.remove("Lantern", 1), 0);
    }
}
