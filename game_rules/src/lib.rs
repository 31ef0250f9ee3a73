//! # Game Rules
//!
//! The "World Bible" crate - the game state document, entities, dice, checks,
//! and the [`RuleLogic`] strategy that plugins may replace.
//! This crate holds no AI logic, no I/O and no locking; the runtime in
//! `narrative_core` owns the single live [`GameState`].

pub mod entities;
pub mod mechanics;
pub mod rules;
pub mod world_state;

pub use entities::*;
pub use mechanics::*;
pub use rules::{DefaultRuleLogic, RuleLogic, RulesError};
pub use world_state::*;
