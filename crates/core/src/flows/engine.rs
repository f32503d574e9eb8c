use thiserror::Error;
use tracing::{debug, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::slot::SlotName;
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Goal description, amount, deadline, recipient, in that order.
#[derive(Clone, Debug, Default)]
pub struct SlotFillFlow;

impl FlowDefinition for SlotFillFlow {
    fn initial_state(&self) -> FlowState {
        FlowState::Collecting(SlotName::FILL_ORDER[0])
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_slot_fill(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                debug!(
                    event_name = "flow.transition.applied",
                    correlation_id = %audit.correlation_id,
                    from = ?outcome.from,
                    to = ?outcome.to,
                    event = event_name(&outcome.event),
                    "flow transition applied"
                );
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", event_name(&outcome.event)),
                );
            }
            Err(error) => {
                warn!(
                    event_name = "flow.transition.rejected",
                    correlation_id = %audit.correlation_id,
                    state = ?current,
                    error = %error,
                    "flow transition rejected"
                );
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<SlotFillFlow> {
    fn default() -> Self {
        Self::new(SlotFillFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("value for `{offered}` offered while `{active}` is the active slot")]
    InactiveSlot { active: SlotName, offered: SlotName },
    #[error("flow state {state:?} disagrees with missing slots {missing_slots:?}")]
    StaleContext { state: FlowState, missing_slots: Vec<SlotName> },
    #[error("invalid transition from {state:?} using event {event}")]
    InvalidTransition { state: FlowState, event: String },
}

/// Event name without its payload, so audit metadata never carries raw
/// user-provided values.
fn event_name(event: &FlowEvent) -> &'static str {
    match event {
        FlowEvent::ExtractionMissed => "extraction_missed",
        FlowEvent::ValidationFailed(_) => "validation_failed",
        FlowEvent::SlotAccepted(_) => "slot_accepted",
        FlowEvent::TurnDeferred => "turn_deferred",
        FlowEvent::UtteranceReceived => "utterance_received",
    }
}

fn transition_slot_fill(
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        AnnounceFinished, AssignSlot, BuildPayload, ConfirmPayload, DeferTurn, ExplainViolation,
        PromptForSlot, RepromptSlot,
    };
    use FlowEvent::{
        ExtractionMissed, SlotAccepted, TurnDeferred, UtteranceReceived, ValidationFailed,
    };
    use FlowState::{Collecting, Complete};

    let stale = || FlowTransitionError::StaleContext {
        state: *current,
        missing_slots: context.missing_slots.clone(),
    };

    match current {
        Collecting(active) if context.missing_slots.first() != Some(active) => return Err(stale()),
        Complete if !context.missing_slots.is_empty() => return Err(stale()),
        _ => {}
    }

    let (to, actions) = match (current, event) {
        (Collecting(active), ExtractionMissed) => (Collecting(*active), vec![RepromptSlot(*active)]),
        (Collecting(active), ValidationFailed(failure)) => (
            Collecting(*active),
            vec![ExplainViolation { slot: *active, failure: failure.clone() }],
        ),
        (Collecting(active), TurnDeferred) => (Collecting(*active), vec![DeferTurn(*active)]),
        (Collecting(active), SlotAccepted(value)) => {
            if value.slot() != *active {
                return Err(FlowTransitionError::InactiveSlot {
                    active: *active,
                    offered: value.slot(),
                });
            }
            match context.missing_slots.get(1) {
                Some(next) => {
                    (Collecting(*next), vec![AssignSlot(value.clone()), PromptForSlot(*next)])
                }
                None => (Complete, vec![AssignSlot(value.clone()), BuildPayload, ConfirmPayload]),
            }
        }
        (Complete, UtteranceReceived) => (Complete, vec![AnnounceFinished]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event_name(event).to_string(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
