//! Rule logic: the strategy the narration pipeline consults at each decision point.
//!
//! A [`RuleLogic`] decides which checks an action needs, how they resolve,
//! what happens afterwards, and how narration is steered. The host ships
//! [`DefaultRuleLogic`]; any plugin may supply its own implementation and be
//! selected as the active provider instead.

mod default;

pub use default::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::mechanics::{CheckDefinition, CheckOutcome};
use crate::world_state::GameState;

/// Errors raised by rule providers.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("no protagonist to roll for")]
    NoProtagonist,

    #[error("unsupported check type: {0}")]
    UnsupportedCheck(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RulesError>;

/// A pluggable rule set.
///
/// Methods with defaults are optional extension points; a provider that only
/// cares about checks can leave the narrative hooks alone.
#[async_trait]
pub trait RuleLogic: Send + Sync {
    /// Extra instructions for writing the protagonist's biography.
    fn biography_guidance(&self) -> Option<String> {
        None
    }

    /// Rewrite the prompt used to generate the protagonist.
    fn modify_protagonist_prompt(&self, prompt: String) -> String {
        prompt
    }

    /// Races the player may pick.
    fn available_races(&self) -> Vec<String>;

    /// Classes the player may pick.
    fn available_classes(&self) -> Vec<String>;

    /// Checks the protagonist must pass to attempt `action`. Empty = automatic.
    async fn action_checks(&self, action: &str, state: &GameState) -> Result<Vec<CheckDefinition>>;

    /// Resolve one check, performing whatever randomness the rules need.
    async fn resolve_check(&self, check: &CheckDefinition, state: &GameState) -> Result<CheckOutcome>;

    /// Apply consequences of the resolved checks (HP, inventory, flags...).
    async fn handle_consequence(
        &self,
        _action: &str,
        _outcomes: &[CheckOutcome],
        _state: &mut GameState,
    ) -> Result<()> {
        Ok(())
    }

    /// Actions to offer the player next.
    async fn suggested_actions(&self, state: &GameState) -> Result<Vec<String>>;

    /// Tone or pacing instructions appended to the narration prompt.
    fn narrative_guidance(&self, _state: &GameState) -> Option<String> {
        None
    }
}
