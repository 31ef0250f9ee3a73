//! Context Assembler - builds the prompts sent to the narration backend.
//!
//! Narration prompts are assembled in sections:
//! 1. **World**: name, genre and tone of the setting
//! 2. **Protagonist**: who the player is
//! 3. **Scene**: current location, exits and characters present
//! 4. **History**: the last `history_window` story events
//! 5. **Checks**: resolved check statements, which the narrator must honour
//! 6. **Guidance**: instructions from the active rule provider
//! 7. **Action**: what the player just did
//!
//! Generation prompts (world, protagonist, scenario) are plain strings; the
//! expected reply shape travels separately as a JSON schema.

use game_rules::{CheckOutcome, Character, GameState, RuleLogic, World};
use serde::{Deserialize, Serialize};

use crate::config::NarrationConfig;

/// Builds prompts from the committed game state.
pub struct ContextAssembler {
    history_window: usize,
}

impl ContextAssembler {
    pub fn new(config: &NarrationConfig) -> Self {
        Self {
            history_window: config.history_window,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&NarrationConfig::default())
    }

    /// Context for narrating `action` after its checks resolved.
    pub fn assemble(
        &self,
        state: &GameState,
        action: &str,
        outcomes: &[CheckOutcome],
        rules: &dyn RuleLogic,
    ) -> AssembledContext {
        AssembledContext {
            world: state.world.as_ref().map(describe_world),
            protagonist: state.protagonist.as_ref().map(describe_character),
            scene: self.extract_scene(state),
            history: state
                .recent_events(self.history_window)
                .iter()
                .map(|e| e.as_prompt_line())
                .collect(),
            check_results: outcomes.iter().map(|o| o.statement.clone()).collect(),
            guidance: rules.narrative_guidance(state),
            action: action.trim().to_string(),
        }
    }

    fn extract_scene(&self, state: &GameState) -> Option<SceneContext> {
        let here = state.current_location()?;
        Some(SceneContext {
            location: here.name.clone(),
            description: here.description.clone(),
            exits: here
                .connected_locations
                .iter()
                .filter_map(|id| state.location(*id))
                .map(|l| l.name.clone())
                .collect(),
            characters: state.characters.iter().map(Character::summary).collect(),
        })
    }

    /// Prompt asking for a world in `genre`.
    pub fn world_prompt(&self, genre: &str) -> String {
        format!(
            "Create the setting for a text role-playing game in the {genre} genre. \
             Give the world a name, a two-sentence description and a one-word tone."
        )
    }

    /// Prompt asking for the protagonist's sheet, routed through the active rules.
    pub fn protagonist_prompt(&self, world: Option<&World>, seed: &Character, rules: &dyn RuleLogic) -> String {
        let mut prompt = String::new();
        if let Some(world) = world {
            prompt.push_str(&format!("Setting: {}\n", describe_world(world)));
        }
        prompt.push_str(&format!("Create the protagonist {}.\n", seed.summary()));
        if let Some(biography) = &seed.biography {
            prompt.push_str(&format!("The player wrote this about them: {biography}\n"));
        }
        prompt.push_str(
            "Return six ability scores between 3 and 18, hit points and a biography.\n",
        );
        if let Some(guidance) = rules.biography_guidance() {
            prompt.push_str(&guidance);
            prompt.push('\n');
        }
        rules.modify_protagonist_prompt(prompt)
    }

    /// Prompt asking for the cast and places of the opening scenario.
    pub fn scenario_prompt(&self, state: &GameState) -> String {
        let mut prompt = String::new();
        if let Some(world) = &state.world {
            prompt.push_str(&format!("Setting: {}\n", describe_world(world)));
        }
        if let Some(protagonist) = &state.protagonist {
            prompt.push_str(&format!("Protagonist: {}\n", describe_character(protagonist)));
        }
        prompt.push_str(
            "Create the opening scenario: two to four non-player characters and three to \
             five connected locations. List the starting location first. Each location \
             names the locations it connects to.\n",
        );
        prompt
    }
}

fn describe_world(world: &World) -> String {
    let mut text = format!("{} ({}): {}", world.name, world.genre, world.description);
    if let Some(tone) = &world.tone {
        text.push_str(&format!(" Tone: {tone}."));
    }
    text
}

fn describe_character(character: &Character) -> String {
    let mut text = format!(
        "{}, HP {}/{}",
        character.summary(),
        character.stats.current_hp,
        character.stats.max_hp
    );
    if let Some(biography) = &character.biography {
        text.push_str(&format!(". {biography}"));
    }
    text
}

/// The assembled context ready for prompt generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub world: Option<String>,
    pub protagonist: Option<String>,
    pub scene: Option<SceneContext>,

    /// Recent story events as prompt lines, oldest first.
    pub history: Vec<String>,

    /// Check statements the narration must agree with.
    pub check_results: Vec<String>,

    pub guidance: Option<String>,

    pub action: String,
}

impl AssembledContext {
    /// Format the context as a prompt string.
    pub fn to_prompt_string(&self) -> String {
        let mut prompt = String::new();

        if let Some(world) = &self.world {
            prompt.push_str("## World\n");
            prompt.push_str(world);
            prompt.push_str("\n\n");
        }

        if let Some(protagonist) = &self.protagonist {
            prompt.push_str("## Protagonist\n");
            prompt.push_str(protagonist);
            prompt.push_str("\n\n");
        }

        if let Some(scene) = &self.scene {
            prompt.push_str("## Scene\n");
            prompt.push_str(&format!("{}: {}\n", scene.location, scene.description));
            if !scene.exits.is_empty() {
                prompt.push_str(&format!("Exits: {}\n", scene.exits.join(", ")));
            }
            if !scene.characters.is_empty() {
                prompt.push_str(&format!("Characters: {}\n", scene.characters.join("; ")));
            }
            prompt.push('\n');
        }

        if !self.history.is_empty() {
            prompt.push_str("## Story So Far\n");
            for line in &self.history {
                prompt.push_str(&format!("- {}\n", line));
            }
            prompt.push('\n');
        }

        if !self.check_results.is_empty() {
            prompt.push_str("## Check Results\n");
            for statement in &self.check_results {
                prompt.push_str(&format!("- {}\n", statement));
            }
            prompt.push('\n');
        }

        if let Some(guidance) = &self.guidance {
            prompt.push_str("## Guidance\n");
            prompt.push_str(guidance);
            prompt.push_str("\n\n");
        }

        prompt.push_str("## Player Action\n");
        prompt.push_str(&self.action);
        prompt.push('\n');

        prompt
    }
}

/// Where the protagonist currently is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneContext {
    pub location: String,
    pub description: String,
    pub exits: Vec<String>,
    /// One-line summaries of the non-player characters.
    pub characters: Vec<String>,
}
