//! Check definitions and their resolved outcomes.

use serde::{Deserialize, Serialize};

use crate::entities::{StatType, StatsComponent};

/// A test the protagonist must pass for an action to succeed.
///
/// Produced per action by the active rule provider and consumed immediately
/// by check resolution; never stored in the game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDefinition {
    /// Skill, attribute, "to-hit" or "initiative".
    #[serde(rename = "type")]
    pub check_type: String,
    pub difficulty_class: i32,
    /// Extra attributes whose modifiers are added, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
}

impl CheckDefinition {
    pub fn new(check_type: impl Into<String>, difficulty_class: i32) -> Self {
        Self {
            check_type: check_type.into(),
            difficulty_class,
            modifiers: Vec::new(),
        }
    }

    pub fn with_modifier(mut self, attribute: impl Into<String>) -> Self {
        self.modifiers.push(attribute.into());
        self
    }

    /// The attribute that governs this check, if the type maps to one.
    pub fn governing_stat(&self) -> Option<StatType> {
        governing_stat(&self.check_type)
    }

    /// Total modifier from the governing stat plus every listed modifier.
    pub fn total_modifier(&self, stats: &StatsComponent) -> i32 {
        let base = self
            .governing_stat()
            .map(|stat| stats.modifier(stat))
            .unwrap_or(0);
        let extra: i32 = self
            .modifiers
            .iter()
            .filter_map(|name| StatType::from_name(name))
            .map(|stat| stats.modifier(stat))
            .sum();
        base + extra
    }

    /// Display label: "Dexterity", "Stealth", "To-hit".
    pub fn label(&self) -> String {
        let mut chars = self.check_type.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::from("Check"),
        }
    }
}

/// Maps a check type to its attribute: attributes map to themselves, common
/// skills map to their usual attribute.
pub fn governing_stat(check_type: &str) -> Option<StatType> {
    if let Some(stat) = StatType::from_name(check_type) {
        return Some(stat);
    }
    let stat = match check_type.trim().to_ascii_lowercase().as_str() {
        "to-hit" | "athletics" => StatType::Strength,
        "initiative" | "acrobatics" | "stealth" | "sleight of hand" | "lockpicking" => {
            StatType::Dexterity
        }
        "endurance" => StatType::Constitution,
        "arcana" | "history" | "investigation" | "nature" | "religion" => StatType::Intelligence,
        "insight" | "medicine" | "perception" | "survival" | "animal handling" => StatType::Wisdom,
        "deception" | "intimidation" | "performance" | "persuasion" => StatType::Charisma,
        _ => return None,
    };
    Some(stat)
}

/// A resolved check, carrying the sentence that is shown to the narrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: CheckDefinition,
    pub roll: i32,
    pub modifier: i32,
    pub total: i32,
    pub success: bool,
    pub statement: String,
}

impl CheckOutcome {
    /// Build an outcome from a raw roll. Success means `total >= DC`.
    pub fn from_roll(check: CheckDefinition, roll: i32, modifier: i32) -> Self {
        let total = roll + modifier;
        let success = total >= check.difficulty_class;
        let statement = format!(
            "{} check (DC {}): rolled {} {} {} = {}. {}.",
            check.label(),
            check.difficulty_class,
            roll,
            if modifier < 0 { '-' } else { '+' },
            modifier.abs(),
            total,
            if success { "Success" } else { "Failure" }
        );
        Self {
            check,
            roll,
            modifier,
            total,
            success,
            statement,
        }
    }
}
