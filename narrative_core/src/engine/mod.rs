//! Game Progression Engine - the phase state machine and the narration loop.
//!
//! Every step runs inside exactly one [`GameStore::mutate`]:
//! 1. **Validate**: check the phase and the player's input
//! 2. **Generate**: call the active backend (world, protagonist, scenario, narration)
//! 3. **Broadcast**: run plugin lifecycle hooks against the same draft
//! 4. **Commit**: set the new phase; the store publishes the draft
//!
//! A backend failure or abort rolls the whole step back. A failing plugin
//! hook is contained: its edits are discarded, the other plugins still run
//! and the step still commits.

mod generation;

use game_rules::{
    Character, CheckOutcome, EventKind, GameState, Location, Phase, RuleLogic,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, TokenSink};
use crate::capabilities::{BackendAccess, Feedback};
use crate::config::NarrationConfig;
use crate::context_assembler::ContextAssembler;
use crate::dispatcher::{ActiveRules, RuleDispatcher};
use crate::error::{EngineError, Result};
use crate::plugin::{call_plugin, PluginRegistry};
use crate::store::GameStore;

use generation::{
    protagonist_schema, scenario_schema, world_schema, ProtagonistReply, ScenarioReply, WorldReply,
};

/// The player's protagonist choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRequest {
    pub name: String,
    pub race: String,
    pub class: String,
    #[serde(default)]
    pub biography: Option<String>,
}

/// Input for [`GameEngine::advance`]; each phase accepts exactly one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseInput {
    /// Leave `welcome`, or start the story from `scenario`.
    Continue,
    /// Pick the backend in `connection`.
    Connect { backend: String },
    /// Pick a genre in `genre`.
    Genre { genre: String },
    /// Create the protagonist in `character`.
    Character(CharacterRequest),
}

fn expected_input(phase: Phase) -> &'static str {
    match phase {
        Phase::Welcome | Phase::Scenario => "continue",
        Phase::Connection => "a backend",
        Phase::Genre => "a genre",
        Phase::Character => "a character",
        Phase::Chat => "nothing",
    }
}

/// Result of a successful [`GameEngine::advance`].
#[derive(Debug)]
pub struct Advance {
    pub phase: Phase,
    /// Contained plugin failures; the step committed regardless.
    pub warnings: Vec<EngineError>,
}

/// Result of a successful [`GameEngine::act`].
#[derive(Debug)]
pub struct NarrationStep {
    pub checks: Vec<CheckOutcome>,
    pub narration: String,
    pub suggested_actions: Vec<String>,
    /// Plugin that supplied the rules; `None` for the built-in rules.
    pub rules_source: Option<String>,
    pub warnings: Vec<EngineError>,
}

/// Result of a successful [`GameEngine::travel`].
#[derive(Debug)]
pub struct Travel {
    pub location: Location,
    pub suggested_actions: Vec<String>,
    pub warnings: Vec<EngineError>,
}

pub struct GameEngine {
    store: Arc<GameStore>,
    backend: Arc<BackendAccess>,
    plugins: Arc<PluginRegistry>,
    dispatcher: Arc<RuleDispatcher>,
    feedback: Arc<Feedback>,
    assembler: ContextAssembler,
    max_checks_per_action: usize,
}

impl GameEngine {
    pub fn new(
        store: Arc<GameStore>,
        backend: Arc<BackendAccess>,
        plugins: Arc<PluginRegistry>,
        dispatcher: Arc<RuleDispatcher>,
        feedback: Arc<Feedback>,
        config: &NarrationConfig,
    ) -> Self {
        Self {
            store,
            backend,
            plugins,
            dispatcher,
            feedback,
            assembler: ContextAssembler::new(config),
            max_checks_per_action: config.max_checks_per_action,
        }
    }

    pub fn phase(&self) -> Phase {
        self.store.snapshot().phase
    }

    /// Move to the next phase.
    pub async fn advance(&self, input: PhaseInput) -> Result<Advance> {
        let result = self
            .store
            .mutate(|draft| self.transition(draft, input))
            .await;
        let advance = self.settle(result)?;
        self.report_warnings(&advance.warnings);
        Ok(advance)
    }

    /// Narrate one player action in the `chat` phase.
    pub async fn act(&self, action: &str) -> Result<NarrationStep> {
        let action = action.trim();
        if action.is_empty() {
            return self.settle(Err(EngineError::Precondition(
                "action must not be empty".to_string(),
            )));
        }
        let result = self
            .store
            .mutate(|draft| self.narrate(draft, action))
            .await;
        let step = self.settle(result)?;
        self.report_warnings(&step.warnings);
        Ok(step)
    }

    /// Move the protagonist to a connected location in the `chat` phase.
    pub async fn travel(&self, destination: &str) -> Result<Travel> {
        let result = self
            .store
            .mutate(|draft| self.move_to(draft, destination))
            .await;
        let travel = self.settle(result)?;
        self.report_warnings(&travel.warnings);
        Ok(travel)
    }

    /// Back to `welcome`. Plugin records and the chosen backend survive.
    pub async fn reset(&self) -> Result<()> {
        let result = self
            .store
            .mutate(|mut draft| async move {
                draft.reset_game();
                Ok::<_, EngineError>((draft, ()))
            })
            .await;
        self.settle(result)?;
        info!("game reset");
        Ok(())
    }

    /// Abort the in-flight backend call; its step rolls back.
    pub fn abort(&self) {
        self.backend.abort();
    }

    async fn transition(&self, mut draft: GameState, input: PhaseInput) -> Result<(GameState, Advance)> {
        let from = draft.phase;
        let Some(next) = from.next() else {
            return Err(EngineError::InvalidTransition {
                phase: from,
                action: "advance",
            });
        };

        let mut warnings = Vec::new();
        match (from, input) {
            (Phase::Welcome, PhaseInput::Continue) => {}
            (Phase::Connection, PhaseInput::Connect { backend }) => {
                self.backend.registry().activate(&backend)?;
                draft.backend = Some(backend);
            }
            (Phase::Genre, PhaseInput::Genre { genre }) => {
                let genre = genre.trim();
                if genre.is_empty() {
                    return Err(EngineError::Precondition("genre must not be empty".to_string()));
                }
                self.feedback.progress("Generating world");
                let reply: WorldReply = self
                    .backend
                    .object(&self.assembler.world_prompt(genre), &world_schema(), None)
                    .await?;
                draft.world = Some(reply.into_world(genre));
            }
            (Phase::Character, PhaseInput::Character(request)) => {
                let rules = self.dispatcher.active(&draft);
                let seed = validate_character(&request, &rules)?;
                self.feedback.progress("Generating protagonist");
                let prompt = self
                    .assembler
                    .protagonist_prompt(draft.world.as_ref(), &seed, &rules);
                let reply: ProtagonistReply = self
                    .backend
                    .object(&prompt, &protagonist_schema(), None)
                    .await?;
                draft.protagonist = Some(reply.into_character(seed));
                warnings.extend(rules.take_failures());
            }
            (Phase::Scenario, PhaseInput::Continue) => {
                warnings = self.open_scenario(&mut draft).await?;
            }
            (phase, _) => {
                return Err(EngineError::Precondition(format!(
                    "the {phase} phase expects {}",
                    expected_input(phase)
                )));
            }
        }

        draft.phase = next;
        info!(from = %from, to = %next, "phase advanced");
        Ok((draft, Advance { phase: next, warnings }))
    }

    async fn open_scenario(&self, draft: &mut GameState) -> Result<Vec<EngineError>> {
        if draft.protagonist.is_none() {
            return Err(EngineError::Precondition("no protagonist".to_string()));
        }

        self.feedback.progress("Generating scenario");
        let reply: ScenarioReply = self
            .backend
            .object(&self.assembler.scenario_prompt(draft), &scenario_schema(), None)
            .await?;
        let (characters, locations) = reply.into_parts()?;
        let start = locations[0].clone();
        draft.characters = characters;
        draft.locations = locations;
        draft.current_location = Some(start.id);

        let rules = self.dispatcher.active(draft);
        let opening = format!("Begin the story with the protagonist arriving at {}.", start.name);
        let prompt = self
            .assembler
            .assemble(draft, &opening, &[], &rules)
            .to_prompt_string();
        self.feedback.progress("Writing the opening");
        let narration = self.backend.narration(&prompt, Some(self.token_sink())).await?;
        draft.push_event(EventKind::Narration, narration);

        let mut warnings = self.broadcast_location_change(draft, &start).await;
        draft.suggested_actions = rules.suggested_actions(draft).await?;
        warnings.extend(rules.take_failures());
        Ok(warnings)
    }

    async fn narrate(&self, mut draft: GameState, action: &str) -> Result<(GameState, NarrationStep)> {
        if draft.phase != Phase::Chat {
            return Err(EngineError::InvalidTransition {
                phase: draft.phase,
                action: "act",
            });
        }

        let rules = self.dispatcher.active(&draft);
        let mut checks = rules.action_checks(action, &draft).await?;
        if checks.len() > self.max_checks_per_action {
            debug!(
                requested = checks.len(),
                kept = self.max_checks_per_action,
                "dropping extra checks"
            );
            checks.truncate(self.max_checks_per_action);
        }

        let mut outcomes = Vec::with_capacity(checks.len());
        for check in &checks {
            let outcome = rules.resolve_check(check, &draft).await?;
            debug!(statement = %outcome.statement, "check resolved");
            outcomes.push(outcome);
        }

        let prompt = self
            .assembler
            .assemble(&draft, action, &outcomes, &rules)
            .to_prompt_string();
        let narration = self.backend.narration(&prompt, Some(self.token_sink())).await?;

        rules.handle_consequence(action, &outcomes, &mut draft).await?;

        draft.push_event(EventKind::PlayerAction, action);
        for outcome in &outcomes {
            draft.push_event(EventKind::CheckResult, outcome.statement.clone());
        }
        draft.push_event(EventKind::Narration, narration.clone());
        draft.last_checks = outcomes.clone();
        draft.suggested_actions = rules.suggested_actions(&draft).await?;

        let step = NarrationStep {
            checks: outcomes,
            narration,
            suggested_actions: draft.suggested_actions.clone(),
            rules_source: rules.source().map(str::to_string),
            warnings: rules.take_failures(),
        };
        Ok((draft, step))
    }

    async fn move_to(&self, mut draft: GameState, destination: &str) -> Result<(GameState, Travel)> {
        if draft.phase != Phase::Chat {
            return Err(EngineError::InvalidTransition {
                phase: draft.phase,
                action: "travel",
            });
        }
        let target = draft
            .location_by_name(destination)
            .cloned()
            .ok_or_else(|| EngineError::Precondition(format!("unknown location '{}'", destination.trim())))?;
        if let Some(here) = draft.current_location() {
            if here.id != target.id && !here.connected_locations.contains(&target.id) {
                return Err(EngineError::Precondition(format!(
                    "{} cannot be reached from {}",
                    target.name, here.name
                )));
            }
        }

        draft.current_location = Some(target.id);
        let traveller = draft
            .protagonist
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "The party".to_string());
        draft.push_event(
            EventKind::LocationChange,
            format!("{traveller} travels to {}", target.name),
        );

        let mut warnings = self.broadcast_location_change(&mut draft, &target).await;
        let rules = self.dispatcher.active(&draft);
        draft.suggested_actions = rules.suggested_actions(&draft).await?;
        warnings.extend(rules.take_failures());

        let travel = Travel {
            location: target,
            suggested_actions: draft.suggested_actions.clone(),
            warnings,
        };
        Ok((draft, travel))
    }

    /// Run `on_location_change` for every enabled, ready plugin in wrapper
    /// order. A failing hook's edits are discarded; the rest keep theirs.
    async fn broadcast_location_change(&self, draft: &mut GameState, location: &Location) -> Vec<EngineError> {
        let mut failures = Vec::new();
        for (name, plugin) in self.plugins.ready_plugins(draft) {
            let before = draft.clone();
            if let Err(reason) = call_plugin(plugin.on_location_change(location, draft)).await {
                *draft = before;
                warn!(plugin = %name, %reason, "location hook failed");
                failures.push(EngineError::HookFailure {
                    plugin: name,
                    hook: "on_location_change",
                    reason,
                });
            }
        }
        failures
    }

    fn token_sink(&self) -> TokenSink {
        let feedback = Arc::clone(&self.feedback);
        Arc::new(move |token: &str| feedback.token(token))
    }

    /// Log and surface a failed step.
    fn settle<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            match err {
                EngineError::Backend(BackendError::Aborted) => {
                    info!("step aborted; state rolled back");
                    self.feedback.progress("Cancelled");
                }
                _ => {
                    error!(error = %err, retryable = err.is_retryable(), "step failed; state rolled back");
                    self.feedback.error(err.to_string());
                }
            }
        }
        result
    }

    fn report_warnings(&self, warnings: &[EngineError]) {
        if warnings.is_empty() {
            return;
        }
        self.feedback.error(format!(
            "{} plugin call(s) failed during this step; see the log for details",
            warnings.len()
        ));
    }
}

/// Check the player's choices against the active rules and build the seed
/// character the backend fills in.
fn validate_character(request: &CharacterRequest, rules: &ActiveRules) -> Result<Character> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(EngineError::Precondition("character name must not be empty".to_string()));
    }
    let race = pick(&request.race, rules.available_races(), "race")?;
    let class = pick(&request.class, rules.available_classes(), "class")?;

    let mut seed = Character::new(name).with_race(race).with_class(class);
    seed.biography = request
        .biography
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string);
    Ok(seed)
}

/// Case-insensitive match against the offered options, returning the offered spelling.
fn pick(choice: &str, offered: Vec<String>, what: &str) -> Result<String> {
    let choice = choice.trim();
    offered
        .iter()
        .find(|option| option.eq_ignore_ascii_case(choice))
        .cloned()
        .ok_or_else(|| {
            EngineError::Precondition(format!(
                "{what} '{choice}' is not available; choose one of: {}",
                offered.join(", ")
            ))
        })
}
