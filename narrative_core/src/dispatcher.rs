//! Rule Logic Dispatcher - picks the rule provider for one progression step.
//!
//! The answer is recomputed from the committed wrapper list every time it is
//! asked for; nothing is cached between steps, so toggling a plugin takes
//! effect on the very next step.

use async_trait::async_trait;
use game_rules::rules::Result as RulesResult;
use game_rules::{CheckDefinition, CheckOutcome, DefaultRuleLogic, GameState, RuleLogic};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::plugin::{call_plugin, PluginRegistry};

pub struct RuleDispatcher {
    plugins: Arc<PluginRegistry>,
    default: Arc<DefaultRuleLogic>,
}

impl RuleDispatcher {
    pub fn new(plugins: Arc<PluginRegistry>, default: Arc<DefaultRuleLogic>) -> Self {
        Self { plugins, default }
    }

    /// The provider for a step taken against `state`.
    ///
    /// Scans wrappers in stored order and takes the first that is enabled,
    /// selected, initialised and exposes rule logic; otherwise the built-in
    /// rules. If more than one wrapper is selected the earliest wins.
    pub fn active(&self, state: &GameState) -> ActiveRules {
        let candidates = state
            .plugins
            .iter()
            .filter(|w| w.enabled && w.selected_plugin);

        for wrapper in candidates {
            let Some(instance) = self.plugins.ready_instance(&wrapper.name) else {
                continue;
            };
            match catch_unwind(AssertUnwindSafe(|| instance.rule_logic())) {
                Ok(Some(logic)) => {
                    debug!(plugin = %wrapper.name, "plugin rules active");
                    return ActiveRules::plugin(&wrapper.name, logic, Arc::clone(&self.default));
                }
                Ok(None) => {}
                Err(_) => warn!(plugin = %wrapper.name, "rule_logic accessor panicked"),
            }
        }
        ActiveRules::builtin(Arc::clone(&self.default))
    }
}

/// The provider chosen for one step.
///
/// Calls into a plugin provider are guarded: an error or panic is recorded
/// and the built-in rules answer that call instead. The engine drains the
/// recorded failures with [`ActiveRules::take_failures`].
pub struct ActiveRules {
    source: Option<String>,
    logic: Arc<dyn RuleLogic>,
    fallback: Arc<DefaultRuleLogic>,
    failures: Mutex<Vec<EngineError>>,
}

impl ActiveRules {
    pub fn builtin(default: Arc<DefaultRuleLogic>) -> Self {
        Self {
            source: None,
            logic: default.clone(),
            fallback: default,
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn plugin(name: &str, logic: Arc<dyn RuleLogic>, fallback: Arc<DefaultRuleLogic>) -> Self {
        Self {
            source: Some(name.to_string()),
            logic,
            fallback,
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Name of the providing plugin; `None` for the built-in rules.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn is_builtin(&self) -> bool {
        self.source.is_none()
    }

    pub fn take_failures(&self) -> Vec<EngineError> {
        std::mem::take(&mut *self.failures.lock())
    }

    fn record(&self, method: &'static str, reason: String) {
        let plugin = self.source.clone().unwrap_or_default();
        warn!(%plugin, method, %reason, "plugin rules failed; using built-in rules");
        self.failures.lock().push(EngineError::HookFailure {
            plugin,
            hook: method,
            reason,
        });
    }

    fn guard_sync<T>(
        &self,
        method: &'static str,
        call: impl FnOnce(&dyn RuleLogic) -> T,
        fallback: impl FnOnce(&DefaultRuleLogic) -> T,
    ) -> T {
        if self.is_builtin() {
            return fallback(&self.fallback);
        }
        match catch_unwind(AssertUnwindSafe(|| call(self.logic.as_ref()))) {
            Ok(value) => value,
            Err(_) => {
                self.record(method, "panicked".to_string());
                fallback(&self.fallback)
            }
        }
    }

    /// `None` if the plugin call failed and was recorded.
    async fn guard_async<T>(
        &self,
        method: &'static str,
        call: impl Future<Output = RulesResult<T>>,
    ) -> Option<T> {
        match call_plugin(async { call.await.map_err(anyhow::Error::from) }).await {
            Ok(value) => Some(value),
            Err(reason) => {
                self.record(method, reason);
                None
            }
        }
    }
}

#[async_trait]
impl RuleLogic for ActiveRules {
    fn biography_guidance(&self) -> Option<String> {
        self.guard_sync(
            "biography_guidance",
            |logic| logic.biography_guidance(),
            |default| default.biography_guidance(),
        )
    }

    fn modify_protagonist_prompt(&self, prompt: String) -> String {
        let fallback_prompt = prompt.clone();
        self.guard_sync(
            "modify_protagonist_prompt",
            |logic| logic.modify_protagonist_prompt(prompt),
            |default| default.modify_protagonist_prompt(fallback_prompt),
        )
    }

    fn available_races(&self) -> Vec<String> {
        self.guard_sync(
            "available_races",
            |logic| logic.available_races(),
            |default| default.available_races(),
        )
    }

    fn available_classes(&self) -> Vec<String> {
        self.guard_sync(
            "available_classes",
            |logic| logic.available_classes(),
            |default| default.available_classes(),
        )
    }

    async fn action_checks(&self, action: &str, state: &GameState) -> RulesResult<Vec<CheckDefinition>> {
        if !self.is_builtin() {
            if let Some(checks) = self
                .guard_async("action_checks", self.logic.action_checks(action, state))
                .await
            {
                return Ok(checks);
            }
        }
        self.fallback.action_checks(action, state).await
    }

    async fn resolve_check(&self, check: &CheckDefinition, state: &GameState) -> RulesResult<CheckOutcome> {
        if !self.is_builtin() {
            if let Some(outcome) = self
                .guard_async("resolve_check", self.logic.resolve_check(check, state))
                .await
            {
                return Ok(outcome);
            }
        }
        self.fallback.resolve_check(check, state).await
    }

    async fn handle_consequence(
        &self,
        action: &str,
        outcomes: &[CheckOutcome],
        state: &mut GameState,
    ) -> RulesResult<()> {
        if !self.is_builtin() {
            let before = state.clone();
            let handled = self
                .guard_async(
                    "handle_consequence",
                    self.logic.handle_consequence(action, outcomes, state),
                )
                .await;
            if handled.is_some() {
                return Ok(());
            }
            *state = before;
        }
        self.fallback.handle_consequence(action, outcomes, state).await
    }

    async fn suggested_actions(&self, state: &GameState) -> RulesResult<Vec<String>> {
        if !self.is_builtin() {
            if let Some(actions) = self
                .guard_async("suggested_actions", self.logic.suggested_actions(state))
                .await
            {
                return Ok(actions);
            }
        }
        self.fallback.suggested_actions(state).await
    }

    fn narrative_guidance(&self, state: &GameState) -> Option<String> {
        self.guard_sync(
            "narrative_guidance",
            |logic| logic.narrative_guidance(state),
            |default| default.narrative_guidance(state),
        )
    }
}
