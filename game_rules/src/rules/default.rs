//! Built-in rule provider used when no plugin is selected.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Result, RuleLogic, RulesError};
use crate::mechanics::{CheckDefinition, CheckOutcome, DiceRoll, RandomSource, ThreadRandom};
use crate::world_state::{FlagValue, GameState};

/// Keyword -> check table consulted in order; the first hit wins.
const ACTION_CHECKS: &[(&[&str], &str, i32)] = &[
    (&["pick", "lock", "sneak", "steal", "pickpocket"], "dexterity", 15),
    (&["attack", "strike", "shoot", "stab"], "to-hit", 12),
    (&["climb", "lift", "force", "break", "push"], "strength", 12),
    (&["persuade", "convince", "bargain", "lie", "charm"], "charisma", 13),
    (&["search", "investigate", "study", "decipher"], "intelligence", 12),
    (&["listen", "spot", "watch", "track"], "wisdom", 12),
    (&["endure", "resist", "hold my breath"], "constitution", 12),
];

/// The host's default rules: a d20 plus the governing attribute modifier
/// against the difficulty class.
pub struct DefaultRuleLogic {
    dice: Arc<dyn RandomSource>,
}

impl DefaultRuleLogic {
    pub fn new(dice: Arc<dyn RandomSource>) -> Self {
        Self { dice }
    }

    /// Checks implied by the wording of an action.
    pub fn checks_for(action: &str) -> Vec<CheckDefinition> {
        let lowered = action.to_ascii_lowercase();
        ACTION_CHECKS
            .iter()
            .find(|(keywords, _, _)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(_, check_type, dc)| vec![CheckDefinition::new(*check_type, *dc)])
            .unwrap_or_default()
    }
}

impl Default for DefaultRuleLogic {
    fn default() -> Self {
        Self::new(Arc::new(ThreadRandom))
    }
}

#[async_trait]
impl RuleLogic for DefaultRuleLogic {
    fn biography_guidance(&self) -> Option<String> {
        Some(
            "Write the biography in at most three sentences: origin, a defining event, \
             and what drives the character now."
                .to_string(),
        )
    }

    fn available_races(&self) -> Vec<String> {
        ["Human", "Elf", "Dwarf", "Halfling"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn available_classes(&self) -> Vec<String> {
        ["Fighter", "Rogue", "Wizard", "Cleric"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    async fn action_checks(&self, action: &str, _state: &GameState) -> Result<Vec<CheckDefinition>> {
        Ok(Self::checks_for(action))
    }

    async fn resolve_check(&self, check: &CheckDefinition, state: &GameState) -> Result<CheckOutcome> {
        let protagonist = state.protagonist.as_ref().ok_or(RulesError::NoProtagonist)?;
        let roll = DiceRoll::d20(self.dice.as_ref());
        let modifier = check.total_modifier(&protagonist.stats);
        Ok(CheckOutcome::from_roll(check.clone(), roll.total, modifier))
    }

    async fn handle_consequence(
        &self,
        _action: &str,
        outcomes: &[CheckOutcome],
        state: &mut GameState,
    ) -> Result<()> {
        if !outcomes.is_empty() {
            let succeeded = outcomes.iter().all(|o| o.success);
            state.set_flag("last_action_succeeded", FlagValue::Bool(succeeded));
        }
        Ok(())
    }

    async fn suggested_actions(&self, state: &GameState) -> Result<Vec<String>> {
        let mut actions = vec!["Look around".to_string()];
        if let Some(here) = state.current_location() {
            actions.extend(
                here.connected_locations
                    .iter()
                    .filter_map(|id| state.location(*id))
                    .map(|l| format!("Travel to {}", l.name)),
            );
        }
        actions.extend(
            state
                .characters
                .iter()
                .take(2)
                .map(|c| format!("Talk to {}", c.name)),
        );
        Ok(actions)
    }

    fn narrative_guidance(&self, _state: &GameState) -> Option<String> {
        Some(
            "Narrate in second person. Honour every check result exactly as stated \
             and never decide the player's next action."
                .to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Character, Location, StatsComponent};
    use crate::mechanics::FixedRandom;

    fn state_with_hero(dexterity: i32) -> GameState {
        let mut state = GameState::new();
        state.protagonist = Some(Character::new("Hero").with_stats(StatsComponent {
            dexterity,
            ..Default::default()
        }));
        state
    }

    #[tokio::test]
    async fn test_pick_the_lock_needs_dexterity() {
        let rules = DefaultRuleLogic::default();
        let checks = rules
            .action_checks("pick the lock", &GameState::new())
            .await
            .unwrap();
        assert_eq!(checks, vec![CheckDefinition::new("dexterity", 15)]);
    }

    #[tokio::test]
    async fn test_plain_actions_need_no_checks() {
        let rules = DefaultRuleLogic::default();
        let checks = rules
            .action_checks("wave at the bartender", &GameState::new())
            .await
            .unwrap();
        assert!(checks.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_check_uses_dice_and_modifier() {
        let rules = DefaultRuleLogic::new(Arc::new(FixedRandom::constant(12)));
        let state = state_with_hero(16);

        let outcome = rules
            .resolve_check(&CheckDefinition::new("dexterity", 15), &state)
            .await
            .unwrap();

        assert_eq!(outcome.roll, 12);
        assert_eq!(outcome.modifier, 3);
        assert!(outcome.success);
        assert!(outcome.statement.contains("Success"));
    }

    #[tokio::test]
    async fn test_resolve_without_protagonist_fails() {
        let rules = DefaultRuleLogic::default();
        let err = rules
            .resolve_check(&CheckDefinition::new("dexterity", 15), &GameState::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RulesError::NoProtagonist));
    }

    #[tokio::test]
    async fn test_consequence_records_flag() {
        let rules = DefaultRuleLogic::new(Arc::new(FixedRandom::constant(2)));
        let mut state = state_with_hero(10);
        let outcome = rules
            .resolve_check(&CheckDefinition::new("strength", 12), &state)
            .await
            .unwrap();

        rules
            .handle_consequence("force the door", &[outcome], &mut state)
            .await
            .unwrap();

        assert_eq!(state.flag("last_action_succeeded"), Some(&FlagValue::Bool(false)));
    }

    #[tokio::test]
    async fn test_suggested_actions_follow_connections() {
        let rules = DefaultRuleLogic::default();
        let mut state = GameState::new();
        let mut square = Location::new("Square", "Market square");
        let docks = Location::new("Docks", "Salt and tar");
        square.connect(docks.id);
        state.current_location = Some(square.id);
        state.locations = vec![square, docks];
        state.characters.push(Character::new("Mara"));

        let actions = rules.suggested_actions(&state).await.unwrap();
        assert_eq!(actions, vec!["Look around", "Travel to Docks", "Talk to Mara"]);
    }
}
