//! # Narrative Core (The Cortex)
//!
//! The runtime of the storytelling engine. This crate loads rule plugins,
//! hands them a capability bundle, owns the single live game state behind an
//! async mutex, and drives the game through its phases by calling an LLM
//! backend.
//!
//! ## Core Components
//!
//! - **store**: The game state store - FIFO guarded mutation plus non-blocking snapshots
//! - **plugin**: Manifest discovery, loading, registration and `init`
//! - **capabilities** / **extension**: What plugins may touch, and as whom
//! - **dispatcher**: Chooses the rule provider for each step
//! - **engine**: The phase state machine and the narration loop
//! - **context_assembler**: Builds the prompts sent to the backend
//! - **host**: Wires all of the above together
//!
//! ## Design Philosophy
//!
//! - **State-Driven**: Every step reads the committed state and commits a new one, or nothing
//! - **Contained Plugins**: A failing plugin never blocks another plugin or the engine
//! - **Extensible**: Rules, hooks and backends come from plugins without changes to the core

pub mod backend;
pub mod capabilities;
pub mod config;
pub mod context_assembler;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod extension;
pub mod host;
pub mod plugin;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use backend::{Backend, BackendError, BackendRegistry, TokenSink};
pub use capabilities::{BackendAccess, CapabilityBundle, Feedback, FeedbackEvent, LibraryAccess, StateAccess};
pub use config::{ConfigError, EngineConfig};
pub use context_assembler::{AssembledContext, ContextAssembler};
pub use dispatcher::{ActiveRules, RuleDispatcher};
pub use engine::{Advance, CharacterRequest, GameEngine, NarrationStep, PhaseInput, Travel};
pub use error::{EngineError, Result};
pub use extension::{ExtensionContext, UiFragment, UiRegistry, UiSlot};
pub use host::{Host, HostBuilder};
pub use plugin::{
    DirectoryManifestSource, LoadReport, ManifestSource, Plugin, PluginFailure, PluginLoader,
    PluginManifest, PluginRegistry, PluginStatus, StaticLoader, StaticManifestSource,
};
pub use store::{GameStore, PersistenceSink, StoreError};
pub use telemetry::init_logging;
