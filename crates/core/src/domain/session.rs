use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::payload::{Clock, Payload, PayloadBuilder};
use crate::domain::slot::{SlotValue, Slots};
use crate::errors::DomainError;
use crate::flows::routing::ToolKind;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One transcript entry, tagged with where it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum Turn {
    User { text: String },
    Prompt { text: String },
    ToolResult { tool: ToolKind, text: String },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn prompt(text: impl Into<String>) -> Self {
        Self::Prompt { text: text.into() }
    }

    pub fn tool_result(tool: ToolKind, text: impl Into<String>) -> Self {
        Self::ToolResult { tool, text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::User { text } | Self::Prompt { text } | Self::ToolResult { text, .. } => text,
        }
    }
}

/// Append-only turn log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Everything collected so far in one conversation.
///
/// The caller owns persistence: the orchestrator receives a state, works on a
/// clone, and hands back the successor. Fields are private so the only way to
/// change a state in-process is through the invariant-preserving methods
/// below; a state that arrives through deserialization is checked with
/// [`SessionState::check_invariants`] before use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    session_id: SessionId,
    transcript: Transcript,
    slots: Slots,
    complete: bool,
    payload: Option<Payload>,
}

impl SessionState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            transcript: Transcript::default(),
            slots: Slots::default(),
            complete: false,
            payload: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn record(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    pub fn assign_slot(&mut self, value: SlotValue) -> Result<(), DomainError> {
        if self.complete {
            return Err(DomainError::SlotAlreadySet(value.slot()));
        }
        self.slots.fill(value)
    }

    /// Marks the session complete and stores its payload. Once a payload
    /// exists it is returned as-is, so repeated calls never re-read the clock.
    pub fn finalize<C>(&mut self, builder: &PayloadBuilder<C>) -> Result<&Payload, DomainError>
    where
        C: Clock,
    {
        if self.payload.is_none() {
            let payload = builder.build(&self.slots)?;
            self.complete = true;
            self.payload = Some(payload);
        }

        self.payload.as_ref().ok_or_else(|| {
            DomainError::CorruptedState("payload missing after finalization".to_string())
        })
    }

    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if let Some((slot, failure)) = self.slots.first_invalid() {
            return Err(DomainError::CorruptedState(format!(
                "slot `{slot}` holds an invalid value: {failure}"
            )));
        }
        if !self.slots.is_fill_order_prefix() {
            return Err(DomainError::CorruptedState(
                "slots were filled out of order".to_string(),
            ));
        }
        if self.complete != self.slots.is_filled() {
            return Err(DomainError::CorruptedState(format!(
                "complete flag is {} but {} slot(s) are missing",
                self.complete,
                self.slots.missing().len()
            )));
        }
        match (&self.payload, self.complete) {
            (Some(_), false) => Err(DomainError::CorruptedState(
                "payload present on an incomplete session".to_string(),
            )),
            (None, true) => Err(DomainError::CorruptedState(
                "complete session has no payload".to_string(),
            )),
            (Some(payload), true) if !payload.matches_slots(&self.slots) => Err(
                DomainError::CorruptedState("payload disagrees with collected slots".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
