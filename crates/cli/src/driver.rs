use anyhow::Result;
use dreampool_agent::{DialogueOrchestrator, ModelPlanner, OpenAiCompatibleClient, TurnOutcome};
use dreampool_core::config::{AppConfig, RoutingMode};
use dreampool_core::domain::session::SessionState;
use dreampool_core::errors::DomainError;
use tracing::warn;

/// Applies user utterances to a session, asking the model for a plan first
/// when routing is model-driven.
pub struct TurnDriver {
    orchestrator: DialogueOrchestrator,
    planner: Option<ModelPlanner<OpenAiCompatibleClient>>,
}

impl TurnDriver {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let planner = match config.dialogue.routing {
            RoutingMode::Fixed => None,
            RoutingMode::Model => {
                Some(ModelPlanner::new(OpenAiCompatibleClient::from_config(&config.llm)?))
            }
        };

        Ok(Self { orchestrator: DialogueOrchestrator::new(&config.dialogue), planner })
    }

    pub fn start(&self) -> Result<TurnOutcome, DomainError> {
        self.orchestrator.start_session(None)
    }

    pub async fn respond(
        &self,
        state: &SessionState,
        utterance: &str,
    ) -> Result<TurnOutcome, DomainError> {
        let planner = match &self.planner {
            Some(planner) if !state.is_complete() => planner,
            _ => return self.orchestrator.continue_session(state, utterance),
        };

        match planner.plan_turn(state, utterance).await {
            Ok(plan) => self.orchestrator.continue_session_with(state, utterance, &plan),
            Err(error) => {
                warn!(
                    event_name = "cli.routing.fallback",
                    session_id = %state.session_id(),
                    error_class = error.error_class(),
                    error = %error,
                    "model routing failed; using fixed slot order"
                );
                self.orchestrator.continue_session(state, utterance)
            }
        }
    }
}
