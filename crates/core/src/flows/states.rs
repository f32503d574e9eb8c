use serde::{Deserialize, Serialize};

use crate::domain::slot::{SlotName, SlotValue, Slots};
use crate::validate::ValidationFailure;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "slot", rename_all = "snake_case")]
pub enum FlowState {
    Collecting(SlotName),
    Complete,
}

impl FlowState {
    pub fn from_slots(slots: &Slots) -> Self {
        slots.active_slot().map(Self::Collecting).unwrap_or(Self::Complete)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    ExtractionMissed,
    ValidationFailed(ValidationFailure),
    SlotAccepted(SlotValue),
    TurnDeferred,
    UtteranceReceived,
}

/// Slots still unset before the event is applied, in fill order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_slots: Vec<SlotName>,
}

impl FlowContext {
    pub fn from_slots(slots: &Slots) -> Self {
        Self { missing_slots: slots.missing() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    AssignSlot(SlotValue),
    PromptForSlot(SlotName),
    RepromptSlot(SlotName),
    ExplainViolation { slot: SlotName, failure: ValidationFailure },
    BuildPayload,
    ConfirmPayload,
    DeferTurn(SlotName),
    AnnounceFinished,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
