//! Narrative events: the append-only story log.

use serde::{Deserialize, Serialize};

use crate::entities::EventId;

/// What produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Text the player chose or typed.
    PlayerAction,
    /// Prose returned by the narration backend.
    Narration,
    /// A resolved check statement.
    CheckResult,
    /// The protagonist moved.
    LocationChange,
    /// Host or plugin notices.
    System,
}

/// One entry in the story log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub content: String,
}

impl NarrativeEvent {
    pub fn new(kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            kind,
            content: content.into(),
        }
    }

    /// Prompt line for this event, e.g. "Player: open the door".
    pub fn as_prompt_line(&self) -> String {
        match self.kind {
            EventKind::PlayerAction => format!("Player: {}", self.content),
            EventKind::Narration => format!("Narrator: {}", self.content),
            EventKind::CheckResult => format!("Check: {}", self.content),
            EventKind::LocationChange => format!("Travel: {}", self.content),
            EventKind::System => format!("Note: {}", self.content),
        }
    }
}
