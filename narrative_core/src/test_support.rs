//! Scripted backends, test plugins and a wired-up runtime for unit tests.

use anyhow::anyhow;
use async_trait::async_trait;
use game_rules::rules::Result as RulesResult;
use game_rules::{
    CheckDefinition, CheckOutcome, DefaultRuleLogic, FixedRandom, FlagValue, GameState, Location,
    RandomSource, RuleLogic, RulesError, Settings,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::backend::{Backend, BackendError, BackendRegistry, TokenSink};
use crate::capabilities::{BackendAccess, CapabilityBundle, Feedback, LibraryAccess, StateAccess};
use crate::config::NarrationConfig;
use crate::dispatcher::RuleDispatcher;
use crate::engine::GameEngine;
use crate::extension::{ExtensionContext, UiRegistry};
use crate::plugin::{Plugin, PluginRegistry, StaticLoader, StaticManifestSource};
use crate::store::GameStore;

/// Replays queued replies in order and records every prompt.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    narrations: Mutex<VecDeque<Result<String, BackendError>>>,
    objects: Mutex<VecDeque<Result<Value, BackendError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn narrate(self, text: &str) -> Self {
        self.narrations.lock().push_back(Ok(text.to_string()));
        self
    }

    pub fn object(self, value: Value) -> Self {
        self.objects.lock().push_back(Ok(value));
        self
    }

    pub fn fail_object(self, err: BackendError) -> Self {
        self.objects.lock().push_back(Err(err));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn narration(&self, prompt: &str, on_token: Option<TokenSink>) -> Result<String, BackendError> {
        self.prompts.lock().push(prompt.to_string());
        let reply = self
            .narrations
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Request("script exhausted".into())))?;
        if let Some(sink) = on_token {
            for word in reply.split_inclusive(' ') {
                sink(word);
            }
        }
        Ok(reply)
    }

    async fn object(
        &self,
        prompt: &str,
        _schema: &Value,
        _on_token: Option<TokenSink>,
    ) -> Result<Value, BackendError> {
        self.prompts.lock().push(prompt.to_string());
        self.objects
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Request("script exhausted".into())))
    }
}

/// Never answers; records whether it was asked to abort.
#[derive(Default)]
pub(crate) struct HangingBackend {
    started: Notify,
    aborted: AtomicBool,
}

impl HangingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a call is in flight.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    pub fn abort_requested(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for HangingBackend {
    async fn narration(&self, _prompt: &str, _on_token: Option<TokenSink>) -> Result<String, BackendError> {
        self.started.notify_one();
        futures::future::pending().await
    }

    async fn object(
        &self,
        _prompt: &str,
        _schema: &Value,
        _on_token: Option<TokenSink>,
    ) -> Result<Value, BackendError> {
        self.started.notify_one();
        futures::future::pending().await
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn world_json() -> Value {
    json!({
        "name": "Eldmoor",
        "description": "A drowned kingdom.",
        "tone": "grim"
    })
}

pub(crate) fn protagonist_json() -> Value {
    json!({
        "stats": {"strength": 10, "dexterity": 14, "constitution": 12,
                  "intelligence": 10, "wisdom": 11, "charisma": 13},
        "hp": 9,
        "biography": "Raised by smugglers on the flooded docks."
    })
}

pub(crate) fn scenario_json() -> Value {
    json!({
        "characters": [
            {"name": "Brother Hale", "class": "Cleric", "description": "A tired priest."}
        ],
        "locations": [
            {"name": "Sunken Gate", "description": "Moss-covered arches.", "connections": ["Night Market"]},
            {"name": "Night Market", "description": "Lanterns on the water.", "connections": ["Old Lighthouse"]},
            {"name": "Old Lighthouse", "description": "Dark for a decade."}
        ]
    })
}

/// Initialises and does nothing else.
pub(crate) struct NoopPlugin;

#[async_trait]
impl Plugin for NoopPlugin {
    async fn init(&self, _settings: Settings, _ctx: ExtensionContext, _caps: Arc<CapabilityBundle>) -> anyhow::Result<()> {
        Ok(())
    }
}

pub(crate) struct FailingInitPlugin;

#[async_trait]
impl Plugin for FailingInitPlugin {
    async fn init(&self, _settings: Settings, _ctx: ExtensionContext, _caps: Arc<CapabilityBundle>) -> anyhow::Result<()> {
        Err(anyhow!("missing api key"))
    }
}

pub(crate) struct PanickingPlugin;

#[async_trait]
impl Plugin for PanickingPlugin {
    async fn init(&self, _settings: Settings, _ctx: ExtensionContext, _caps: Arc<CapabilityBundle>) -> anyhow::Result<()> {
        panic!("plugin bug")
    }
}

/// Fails `init` a fixed number of times, then succeeds.
pub(crate) struct FlakyInitPlugin {
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyInitPlugin {
    pub fn failing_times(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for FlakyInitPlugin {
    async fn init(&self, _settings: Settings, _ctx: ExtensionContext, _caps: Arc<CapabilityBundle>) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(anyhow!("attempt {attempt} failed"));
        }
        Ok(())
    }
}

/// Records the settings `init` received; optionally tries to save them.
#[derive(Default)]
pub(crate) struct SettingsRecorderPlugin {
    save_during_init: bool,
    received: Mutex<Option<Settings>>,
}

impl SettingsRecorderPlugin {
    pub fn saving_during_init() -> Self {
        Self {
            save_during_init: true,
            ..Self::default()
        }
    }

    pub fn received(&self) -> Option<Settings> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl Plugin for SettingsRecorderPlugin {
    async fn init(&self, settings: Settings, ctx: ExtensionContext, _caps: Arc<CapabilityBundle>) -> anyhow::Result<()> {
        *self.received.lock() = Some(settings.clone());
        if self.save_during_init {
            ctx.save_settings(settings).await?;
        }
        Ok(())
    }
}

/// Rules tagged with the plugin name so tests can tell providers apart.
pub(crate) struct TaggedRules {
    tag: String,
    failing: bool,
}

#[async_trait]
impl RuleLogic for TaggedRules {
    fn available_races(&self) -> Vec<String> {
        vec![format!("{}-race", self.tag)]
    }

    fn available_classes(&self) -> Vec<String> {
        vec![format!("{}-class", self.tag)]
    }

    async fn action_checks(&self, _action: &str, _state: &GameState) -> RulesResult<Vec<CheckDefinition>> {
        if self.failing {
            return Err(RulesError::Other("rules offline".into()));
        }
        Ok(vec![CheckDefinition::new("wisdom", 10)])
    }

    async fn resolve_check(&self, check: &CheckDefinition, _state: &GameState) -> RulesResult<CheckOutcome> {
        Ok(CheckOutcome::from_roll(check.clone(), 10, 0))
    }

    async fn suggested_actions(&self, _state: &GameState) -> RulesResult<Vec<String>> {
        Ok(vec![format!("{} action", self.tag)])
    }
}

/// Exposes [`TaggedRules`] and optionally contributes a backend.
pub(crate) struct RulesPlugin {
    rules: Arc<TaggedRules>,
    backend: Option<String>,
}

impl RulesPlugin {
    pub fn new(tag: &str) -> Self {
        Self {
            rules: Arc::new(TaggedRules {
                tag: tag.to_string(),
                failing: false,
            }),
            backend: None,
        }
    }

    pub fn failing(self) -> Self {
        Self {
            rules: Arc::new(TaggedRules {
                tag: self.rules.tag.clone(),
                failing: true,
            }),
            ..self
        }
    }

    pub fn with_backend(mut self, name: &str) -> Self {
        self.backend = Some(name.to_string());
        self
    }
}

#[async_trait]
impl Plugin for RulesPlugin {
    async fn init(&self, _settings: Settings, _ctx: ExtensionContext, _caps: Arc<CapabilityBundle>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn backends(&self) -> anyhow::Result<BTreeMap<String, Arc<dyn Backend>>> {
        let mut backends: BTreeMap<String, Arc<dyn Backend>> = BTreeMap::new();
        if let Some(name) = &self.backend {
            backends.insert(name.clone(), Arc::new(ScriptedBackend::new()));
        }
        Ok(backends)
    }

    fn rule_logic(&self) -> Option<Arc<dyn RuleLogic>> {
        let rules: Arc<dyn RuleLogic> = self.rules.clone();
        Some(rules)
    }
}

/// Sets `visited_by_<tag>` to the entered location's name.
pub(crate) struct LocationTagPlugin {
    tag: String,
}

impl LocationTagPlugin {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }
}

#[async_trait]
impl Plugin for LocationTagPlugin {
    async fn init(&self, _settings: Settings, _ctx: ExtensionContext, _caps: Arc<CapabilityBundle>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_location_change(&self, location: &Location, draft: &mut GameState) -> anyhow::Result<()> {
        draft.set_flag(
            format!("visited_by_{}", self.tag),
            FlagValue::String(location.name.clone()),
        );
        Ok(())
    }
}

/// Edits the draft, then fails.
pub(crate) struct FailingLocationPlugin;

#[async_trait]
impl Plugin for FailingLocationPlugin {
    async fn init(&self, _settings: Settings, _ctx: ExtensionContext, _caps: Arc<CapabilityBundle>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_location_change(&self, _location: &Location, draft: &mut GameState) -> anyhow::Result<()> {
        draft.set_flag("half_written", FlagValue::Bool(true));
        Err(anyhow!("map service unreachable"))
    }
}

/// Keeps its extension context and tries to remember every location it enters.
#[derive(Default)]
pub(crate) struct RememberLocationPlugin {
    ctx: Mutex<Option<ExtensionContext>>,
}

#[async_trait]
impl Plugin for RememberLocationPlugin {
    async fn init(&self, _settings: Settings, ctx: ExtensionContext, _caps: Arc<CapabilityBundle>) -> anyhow::Result<()> {
        *self.ctx.lock() = Some(ctx);
        Ok(())
    }

    async fn on_location_change(&self, location: &Location, draft: &mut GameState) -> anyhow::Result<()> {
        let ctx = self.ctx.lock().clone().ok_or_else(|| anyhow!("not initialised"))?;
        draft.set_flag("remembered", FlagValue::String(location.name.clone()));
        let mut settings = Settings::new();
        settings.insert("last_location".to_string(), json!(location.name));
        ctx.save_settings(settings).await?;
        Ok(())
    }
}

/// A d20 luck check rolled with the bundle's dice; races and classes come
/// from the bundle's built-in rules.
#[derive(Default)]
pub(crate) struct SharedDiceRules {
    caps: Mutex<Option<Arc<CapabilityBundle>>>,
}

impl SharedDiceRules {
    fn caps(&self) -> RulesResult<Arc<CapabilityBundle>> {
        self.caps
            .lock()
            .clone()
            .ok_or_else(|| RulesError::Other("not initialised".into()))
    }
}

#[async_trait]
impl RuleLogic for SharedDiceRules {
    fn available_races(&self) -> Vec<String> {
        self.caps()
            .map(|caps| caps.library().default_rules().available_races())
            .unwrap_or_default()
    }

    fn available_classes(&self) -> Vec<String> {
        self.caps()
            .map(|caps| caps.library().default_rules().available_classes())
            .unwrap_or_default()
    }

    async fn action_checks(&self, _action: &str, _state: &GameState) -> RulesResult<Vec<CheckDefinition>> {
        Ok(vec![CheckDefinition::new("luck", 10)])
    }

    async fn resolve_check(&self, check: &CheckDefinition, _state: &GameState) -> RulesResult<CheckOutcome> {
        let roll = self.caps()?.library().dice().range(1, 20);
        Ok(CheckOutcome::from_roll(check.clone(), roll, 0))
    }

    async fn suggested_actions(&self, _state: &GameState) -> RulesResult<Vec<String>> {
        let action = if self.caps()?.backend().is_active() {
            "Ask the narrator"
        } else {
            "Connect a backend"
        };
        Ok(vec![action.to_string()])
    }
}

/// Hands the bundle it receives in `init` to [`SharedDiceRules`].
#[derive(Default)]
pub(crate) struct SharedDicePlugin {
    rules: Arc<SharedDiceRules>,
}

#[async_trait]
impl Plugin for SharedDicePlugin {
    async fn init(&self, _settings: Settings, _ctx: ExtensionContext, caps: Arc<CapabilityBundle>) -> anyhow::Result<()> {
        *self.rules.caps.lock() = Some(caps);
        Ok(())
    }

    fn rule_logic(&self) -> Option<Arc<dyn RuleLogic>> {
        let rules: Arc<dyn RuleLogic> = self.rules.clone();
        Some(rules)
    }
}

/// Every runtime component, wired the way the host wires them.
pub(crate) struct Harness {
    pub store: Arc<GameStore>,
    pub backends: Arc<BackendRegistry>,
    pub backend: Arc<BackendAccess>,
    pub feedback: Arc<Feedback>,
    pub ui: Arc<UiRegistry>,
    pub caps: Arc<CapabilityBundle>,
    pub default_rules: Arc<DefaultRuleLogic>,
    pub plugins: Arc<PluginRegistry>,
    pub dispatcher: Arc<RuleDispatcher>,
}

impl Harness {
    pub fn engine(&self) -> GameEngine {
        GameEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.backend),
            Arc::clone(&self.plugins),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.feedback),
            &NarrationConfig::default(),
        )
    }
}

/// A fresh runtime whose dice always roll 13.
pub(crate) fn harness() -> Harness {
    harness_with_dice(Arc::new(FixedRandom::constant(13)))
}

pub(crate) fn harness_with_dice(dice: Arc<dyn RandomSource>) -> Harness {
    let store = Arc::new(GameStore::default());
    let backends = Arc::new(BackendRegistry::new());
    let backend = Arc::new(BackendAccess::new(Arc::clone(&backends)));
    let feedback = Arc::new(Feedback::default());
    let ui = Arc::new(UiRegistry::new());
    let default_rules = Arc::new(DefaultRuleLogic::new(Arc::clone(&dice)));
    let caps = Arc::new(CapabilityBundle::new(
        LibraryAccess::new(dice, Arc::clone(&default_rules)),
        Arc::clone(&backend),
        StateAccess::new(Arc::clone(&store)),
        Arc::clone(&feedback),
    ));
    let plugins = Arc::new(PluginRegistry::new(
        Arc::new(StaticManifestSource::default()),
        Arc::new(StaticLoader::new()),
        Arc::clone(&store),
        Arc::clone(&caps),
        Arc::clone(&ui),
    ));
    let dispatcher = Arc::new(RuleDispatcher::new(
        Arc::clone(&plugins),
        Arc::clone(&default_rules),
    ));
    Harness {
        store,
        backends,
        backend,
        feedback,
        ui,
        caps,
        default_rules,
        plugins,
        dispatcher,
    }
}
