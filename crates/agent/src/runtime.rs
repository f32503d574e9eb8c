use std::sync::Arc;

use chrono::{DateTime, Utc};
use dreampool_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use dreampool_core::config::DialogueConfig;
use dreampool_core::domain::payload::{Clock, Payload, PayloadBuilder, SystemClock};
use dreampool_core::domain::session::{SessionId, SessionState, Turn};
use dreampool_core::domain::slot::{SlotName, SlotValue};
use dreampool_core::errors::DomainError;
use dreampool_core::flows::{
    FixedOrderRouting, FlowAction, FlowContext, FlowEngine, FlowEvent, FlowState, NextAction,
    RoutingContext, RoutingStrategy, SlotFillFlow, ToolKind,
};
use tracing::{info, warn};

use crate::conversation::PromptRenderer;
use crate::guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};
use crate::tools::{ToolInput, ToolRegistry};

const AUDIT_ACTOR: &str = "dialogue-orchestrator";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Prompt(String),
    Completed { confirmation: String, payload: Payload },
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Self::Prompt(text) => text,
            Self::Completed { confirmation, .. } => confirmation,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Prompt(_) => None,
            Self::Completed { payload, .. } => Some(payload),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    pub state: SessionState,
    pub reply: Reply,
}

/// Drives one session turn by turn.
///
/// Every call works on a clone of the state it is handed and returns the
/// successor, so the caller decides where sessions live. Each utterance
/// produces exactly one flow transition; the routing strategy only decides
/// which tools run before that transition is settled.
pub struct DialogueOrchestrator<C = SystemClock> {
    engine: FlowEngine<SlotFillFlow>,
    tools: ToolRegistry,
    guardrails: GuardrailPolicy,
    prompts: PromptRenderer,
    payloads: PayloadBuilder<C>,
    audit: Arc<dyn AuditSink>,
}

impl DialogueOrchestrator<SystemClock> {
    pub fn new(config: &DialogueConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for DialogueOrchestrator<SystemClock> {
    fn default() -> Self {
        Self::new(&DialogueConfig::default())
    }
}

impl<C> DialogueOrchestrator<C>
where
    C: Clock,
{
    pub fn with_clock(config: &DialogueConfig, clock: C) -> Self {
        Self {
            engine: FlowEngine::new(SlotFillFlow),
            tools: ToolRegistry::for_config(config),
            guardrails: GuardrailPolicy::from_config(config),
            prompts: PromptRenderer::from_config(config),
            payloads: PayloadBuilder::new(clock),
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Opens a session with the greeting. A non-blank initial utterance is
    /// processed as the first turn.
    pub fn start_session(
        &self,
        initial_utterance: Option<&str>,
    ) -> Result<TurnOutcome, DomainError> {
        let mut state = SessionState::new(SessionId::generate());
        let greeting = self.prompts.greeting();
        state.record(Turn::prompt(greeting.clone()));

        info!(
            event_name = "dialogue.session.started",
            session_id = %state.session_id(),
            "dialogue session started"
        );

        match initial_utterance.filter(|text| !text.trim().is_empty()) {
            Some(utterance) => {
                let audit = turn_audit_context(&state);
                self.run_turn(state, utterance, &FixedOrderRouting, &audit)
            }
            None => Ok(TurnOutcome { state, reply: Reply::Prompt(greeting) }),
        }
    }

    pub fn continue_session(
        &self,
        prior: &SessionState,
        utterance: &str,
    ) -> Result<TurnOutcome, DomainError> {
        self.continue_session_with(prior, utterance, &FixedOrderRouting)
    }

    /// Same transition rules as [`Self::continue_session`], with tool
    /// selection delegated to `routing`.
    pub fn continue_session_with<R>(
        &self,
        prior: &SessionState,
        utterance: &str,
        routing: &R,
    ) -> Result<TurnOutcome, DomainError>
    where
        R: RoutingStrategy + ?Sized,
    {
        let audit = turn_audit_context(prior);

        if let Err(error) = prior.check_invariants() {
            warn!(
                event_name = "dialogue.session.corrupted",
                session_id = %prior.session_id(),
                correlation_id = %audit.correlation_id,
                error = %error,
                "rejecting corrupted session state"
            );
            self.audit.emit(
                AuditEvent::from_context(
                    &audit,
                    "dialogue.session_rejected",
                    AuditCategory::Dialogue,
                    AuditOutcome::Failed,
                )
                .with_metadata("error_class", "corrupted_state"),
            );
            return Err(error);
        }

        self.run_turn(prior.clone(), utterance, routing, &audit)
    }

    fn run_turn<R>(
        &self,
        mut state: SessionState,
        utterance: &str,
        routing: &R,
        audit: &AuditContext,
    ) -> Result<TurnOutcome, DomainError>
    where
        R: RoutingStrategy + ?Sized,
    {
        state.record(Turn::user(utterance));

        let flow_state = FlowState::from_slots(state.slots());
        let context = FlowContext::from_slots(state.slots());
        let (event, yield_message) = match flow_state {
            FlowState::Complete => (FlowEvent::UtteranceReceived, None),
            FlowState::Collecting(active) => {
                self.route_turn(&mut state, utterance, active, routing, audit)
            }
        };

        let outcome = self.engine.apply_with_audit(
            &flow_state,
            &event,
            &context,
            self.audit.as_ref(),
            audit,
        )?;
        let reply = self.perform(&mut state, &outcome.actions, yield_message, audit)?;
        state.record(Turn::prompt(reply.text()));

        info!(
            event_name = "dialogue.turn.completed",
            session_id = %state.session_id(),
            correlation_id = %audit.correlation_id,
            from = ?outcome.from,
            to = ?outcome.to,
            "dialogue turn completed"
        );

        Ok(TurnOutcome { state, reply })
    }

    /// Runs tools until the active slot's tool settles the turn or routing
    /// stops. Returns the settling event and any message the strategy
    /// yielded with.
    fn route_turn<R>(
        &self,
        state: &mut SessionState,
        utterance: &str,
        active: SlotName,
        routing: &R,
        audit: &AuditContext,
    ) -> (FlowEvent, Option<String>)
    where
        R: RoutingStrategy + ?Sized,
    {
        let mut invoked: Vec<ToolKind> = Vec::new();

        loop {
            let next = routing.next_action(&RoutingContext {
                active_slot: Some(active),
                slots: state.slots(),
                utterance,
                invoked: &invoked,
            });
            let tool = match next {
                NextAction::Yield { message } => return (FlowEvent::TurnDeferred, message),
                NextAction::Invoke(tool) => tool,
            };

            let decision = self.guardrails.evaluate(&GuardrailIntent::ToolCall {
                tool,
                active_slot: Some(active),
                slots: state.slots(),
                invoked: &invoked,
            });
            invoked.push(tool);

            match decision {
                GuardrailDecision::Allow => {}
                GuardrailDecision::Deny { reason_code, user_message, .. } => {
                    self.record_refusal(state, tool, reason_code, &user_message, audit);
                    continue;
                }
                GuardrailDecision::Degrade { reason_code, user_message, .. } => {
                    self.record_refusal(state, tool, reason_code, &user_message, audit);
                    return (FlowEvent::TurnDeferred, None);
                }
            }

            let input = ToolInput { utterance, slots: state.slots() };
            let Some(result) = self.tools.execute(tool, &input) else {
                let summary = format!("`{}` is not registered", tool.name());
                state.record(Turn::tool_result(tool, summary));
                continue;
            };
            state.record(Turn::tool_result(tool, result.summary.clone()));
            self.audit.emit(
                AuditEvent::from_context(
                    audit,
                    "tool.invoked",
                    AuditCategory::Tool,
                    AuditOutcome::Success,
                )
                .with_metadata("tool", tool.name()),
            );

            if tool.target_slot() == Some(active) {
                if let Some(event) = result.verdict.into_event() {
                    return (event, None);
                }
            }
        }
    }

    fn record_refusal(
        &self,
        state: &mut SessionState,
        tool: ToolKind,
        reason_code: &'static str,
        user_message: &str,
        audit: &AuditContext,
    ) {
        state.record(Turn::tool_result(tool, format!("refused ({reason_code}): {user_message}")));
        info!(
            event_name = "dialogue.tool.refused",
            session_id = %state.session_id(),
            correlation_id = %audit.correlation_id,
            tool = tool.name(),
            reason_code,
            "tool call refused by guardrails"
        );
        self.audit.emit(
            AuditEvent::from_context(
                audit,
                "tool.refused",
                AuditCategory::Tool,
                AuditOutcome::Rejected,
            )
            .with_metadata("tool", tool.name())
            .with_metadata("reason_code", reason_code),
        );
    }

    fn perform(
        &self,
        state: &mut SessionState,
        actions: &[FlowAction],
        yield_message: Option<String>,
        audit: &AuditContext,
    ) -> Result<Reply, DomainError> {
        let mut parts = Vec::with_capacity(actions.len());
        let mut completed = None;

        for action in actions {
            match action {
                FlowAction::AssignSlot(value) => {
                    state.assign_slot(value.clone())?;
                    let deadline_date = match value {
                        SlotValue::DeadlineDays(days) => self.payloads.deadline_date(*days),
                        _ => None,
                    };
                    parts.push(self.prompts.acknowledge(value, deadline_date.as_deref()));
                    info!(
                        event_name = "dialogue.slot.accepted",
                        session_id = %state.session_id(),
                        slot = %value.slot(),
                        "slot accepted"
                    );
                }
                FlowAction::PromptForSlot(slot) => parts.push(self.prompts.prompt_for(*slot)),
                FlowAction::RepromptSlot(slot) => {
                    info!(
                        event_name = "dialogue.slot.missed",
                        session_id = %state.session_id(),
                        slot = %slot,
                        "nothing extracted for active slot"
                    );
                    parts.push(self.prompts.reprompt(*slot));
                }
                FlowAction::ExplainViolation { slot, failure } => {
                    info!(
                        event_name = "dialogue.slot.rejected",
                        session_id = %state.session_id(),
                        slot = %slot,
                        reason = %failure,
                        "candidate value failed validation"
                    );
                    parts.push(self.prompts.explain_violation(*slot, failure));
                }
                FlowAction::BuildPayload => {
                    let payload = state.finalize(&self.payloads)?.clone();
                    self.audit.emit(
                        AuditEvent::from_context(
                            audit,
                            "payload.built",
                            AuditCategory::Payload,
                            AuditOutcome::Success,
                        )
                        .with_metadata("deadline_days", payload.deadline_days.to_string()),
                    );
                    info!(
                        event_name = "dialogue.payload.built",
                        session_id = %state.session_id(),
                        deadline_timestamp = payload.deadline_timestamp,
                        "payload built"
                    );
                    completed = Some(payload);
                }
                FlowAction::ConfirmPayload => {
                    let payload = completed.as_ref().ok_or_else(|| {
                        DomainError::CorruptedState(
                            "confirmation requested before the payload was built".to_string(),
                        )
                    })?;
                    let deadline_date = deadline_date_of(payload);
                    parts.push(self.prompts.confirmation(payload, deadline_date.as_deref()));
                }
                FlowAction::DeferTurn(_) => {
                    if let Some(message) = &yield_message {
                        parts.push(message.clone());
                    }
                    parts.push(self.prompts.deferral(&state.slots().missing()));
                }
                FlowAction::AnnounceFinished => parts.push(self.prompts.finished()),
            }
        }

        let text = parts.join("\n\n");
        Ok(match completed {
            Some(payload) => Reply::Completed { confirmation: text, payload },
            None => Reply::Prompt(text),
        })
    }
}

fn turn_audit_context(state: &SessionState) -> AuditContext {
    AuditContext::new(
        Some(state.session_id().clone()),
        format!("{}-{}", state.session_id(), state.transcript().len()),
        AUDIT_ACTOR,
    )
}

fn deadline_date_of(payload: &Payload) -> Option<String> {
    DateTime::<Utc>::from_timestamp(payload.deadline_timestamp, 0)
        .map(|deadline| deadline.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use dreampool_core::audit::{AuditOutcome, InMemoryAuditSink};
    use dreampool_core::config::DialogueConfig;
    use dreampool_core::domain::payload::FixedClock;
    use dreampool_core::domain::session::{SessionState, Turn};
    use dreampool_core::domain::slot::SlotName;
    use dreampool_core::errors::DomainError;
    use serde_json::json;

    use super::{DialogueOrchestrator, Reply};

    const ADDRESS: &str = "0x742d35Cc6634C0532925a3b8D4C9db96C4b4d8b6";

    fn orchestrator() -> DialogueOrchestrator<FixedClock> {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid instant");
        DialogueOrchestrator::with_clock(&DialogueConfig::default(), FixedClock(now))
    }

    fn completed_state(orchestrator: &DialogueOrchestrator<FixedClock>) -> SessionState {
        let mut state = orchestrator.start_session(Some("buy a laptop")).expect("start").state;
        for utterance in ["2.5 ETH", "30 days", ADDRESS] {
            state = orchestrator.continue_session(&state, utterance).expect("turn").state;
        }
        state
    }

    #[test]
    fn blank_start_only_greets() {
        let outcome = orchestrator().start_session(Some("   ")).expect("start");

        assert!(outcome.reply.text().starts_with("Hello! I'm your DreamPool concierge."));
        assert_eq!(outcome.state.transcript().len(), 1);
        assert_eq!(outcome.state.slots().active_slot(), Some(SlotName::GoalDescription));
    }

    #[test]
    fn initial_utterance_runs_the_first_transition() {
        let outcome = orchestrator().start_session(Some("a trip to Japan")).expect("start");

        assert_eq!(outcome.state.slots().goal_description.as_deref(), Some("a trip to Japan"));
        assert!(outcome.reply.text().contains("How much ETH"));
        assert!(matches!(outcome.state.transcript().turns()[0], Turn::Prompt { .. }));
        assert!(matches!(outcome.state.transcript().turns()[1], Turn::User { .. }));
    }

    #[test]
    fn completed_session_is_idempotent() {
        let orchestrator = orchestrator();
        let state = completed_state(&orchestrator);
        assert!(state.is_complete());

        let outcome = orchestrator.continue_session(&state, "actually make it 90 days").expect("turn");

        assert_eq!(outcome.state.slots(), state.slots());
        assert_eq!(outcome.state.payload(), state.payload());
        assert!(outcome.state.is_complete());
        assert!(matches!(outcome.reply, Reply::Prompt(ref text) if text.contains("already complete")));
        assert_eq!(outcome.state.transcript().len(), state.transcript().len() + 2);
    }

    #[test]
    fn invalid_recipient_names_the_constraint_and_keeps_slot_unset() {
        let orchestrator = orchestrator();
        let mut state = orchestrator.start_session(Some("buy a laptop")).expect("start").state;
        for utterance in ["2.5 ETH", "30 days"] {
            state = orchestrator.continue_session(&state, utterance).expect("turn").state;
        }

        let outcome = orchestrator.continue_session(&state, "0x1234").expect("turn");

        assert!(outcome.state.slots().recipient.is_none());
        assert!(outcome.reply.text().contains("42 characters long, not 6"));
        assert!(!outcome.state.is_complete());
    }

    #[test]
    fn corrupted_state_is_rejected_and_audited() {
        let sink = InMemoryAuditSink::default();
        let orchestrator = orchestrator().with_audit_sink(Arc::new(sink.clone()));
        let state = completed_state(&orchestrator);

        let mut raw = serde_json::to_value(&state).expect("serialize");
        raw["complete"] = json!(false);
        let corrupted: SessionState = serde_json::from_value(raw).expect("deserialize");

        let error = orchestrator.continue_session(&corrupted, "hello").expect_err("corrupted");
        assert!(matches!(error, DomainError::CorruptedState(_)));

        let events = sink.events();
        let rejected = events.last().expect("audit event");
        assert_eq!(rejected.event_type, "dialogue.session_rejected");
        assert_eq!(rejected.outcome, AuditOutcome::Failed);
    }

    #[test]
    fn audit_trail_never_contains_user_values() {
        let sink = InMemoryAuditSink::default();
        let orchestrator = orchestrator().with_audit_sink(Arc::new(sink.clone()));
        let _ = completed_state(&orchestrator);

        let events = sink.events();
        assert!(events.iter().any(|event| event.event_type == "payload.built"));
        assert!(events
            .iter()
            .flat_map(|event| event.metadata.values())
            .all(|value| !value.contains("laptop") && !value.contains(ADDRESS)));
    }
}
