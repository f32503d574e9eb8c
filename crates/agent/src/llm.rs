//! Model-assisted routing.
//!
//! The model only proposes which tools to run for a turn. Its reply is parsed
//! into a [`ModelPlan`], which the orchestrator consumes as a
//! [`RoutingStrategy`]; values still come from the extractors and validators.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dreampool_core::config::LlmConfig;
use dreampool_core::domain::session::SessionState;
use dreampool_core::domain::slot::SlotName;
use dreampool_core::errors::ApplicationError;
use dreampool_core::flows::{NextAction, RoutingContext, RoutingStrategy, ToolKind};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Chat-completions client for OpenAI and OpenAI-compatible servers (Ollama).
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.effective_base_url()),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn attempt(&self, request: &ChatRequest<'_>) -> Result<String, Attempt> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() || error.is_connect() {
                Attempt::Retry(error.into())
            } else {
                Attempt::Fail(error.into())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = anyhow!("llm provider returned {status}: {body}");
            return Err(if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                Attempt::Retry(error)
            } else {
                Attempt::Fail(error)
            });
        }

        let parsed: ChatResponse =
            response.json().await.map_err(|error| Attempt::Fail(error.into()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Attempt::Fail(anyhow!("llm response contained no message content")))
    }
}

enum Attempt {
    Retry(anyhow::Error),
    Fail(anyhow::Error),
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        };

        let mut attempt = 0;
        loop {
            match self.attempt(&request).await {
                Ok(content) => return Ok(content),
                Err(Attempt::Retry(error)) if attempt < self.max_retries => {
                    let delay = Duration::from_millis(250 << attempt.min(6));
                    warn!(
                        event_name = "llm.request.retry",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying llm request"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(Attempt::Retry(error)) | Err(Attempt::Fail(error)) => return Err(error),
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Tool calls a model proposed for one turn, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelPlan {
    pub tool_calls: Vec<ToolKind>,
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawToolCall {
    Name(String),
    Call {
        #[serde(alias = "tool")]
        name: String,
    },
}

impl ModelPlan {
    /// Parses `{"tool_calls": [...], "message": "..."}`, tolerating code
    /// fences and prose around the object. Unknown tool names are dropped.
    pub fn parse(raw: &str) -> Result<Self, ApplicationError> {
        let json = match (raw.find('{'), raw.rfind('}')) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => {
                return Err(ApplicationError::Integration(
                    "model reply did not contain a JSON object".to_string(),
                ))
            }
        };

        let plan: RawPlan = serde_json::from_str(json).map_err(|error| {
            ApplicationError::Integration(format!("model reply was not a valid plan: {error}"))
        })?;

        let tool_calls = plan
            .tool_calls
            .into_iter()
            .filter_map(|call| {
                let name = match call {
                    RawToolCall::Name(name) | RawToolCall::Call { name } => name,
                };
                let tool = ToolKind::from_name(&name);
                if tool.is_none() {
                    warn!(
                        event_name = "llm.plan.unknown_tool",
                        tool = %name,
                        "dropping unknown tool from model plan"
                    );
                }
                tool
            })
            .collect();

        let message =
            plan.message.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());

        Ok(Self { tool_calls, message })
    }
}

impl RoutingStrategy for ModelPlan {
    fn next_action(&self, context: &RoutingContext<'_>) -> NextAction {
        match self.tool_calls.get(context.invoked.len()) {
            Some(tool) => NextAction::Invoke(*tool),
            None => NextAction::Yield { message: self.message.clone() },
        }
    }
}

pub struct ModelPlanner<L> {
    client: L,
}

impl<L> ModelPlanner<L>
where
    L: LlmClient,
{
    pub fn new(client: L) -> Self {
        Self { client }
    }

    pub async fn plan_turn(
        &self,
        state: &SessionState,
        utterance: &str,
    ) -> Result<ModelPlan, ApplicationError> {
        let system = system_prompt();
        let user = turn_prompt(state, utterance);

        let raw = self
            .client
            .complete(&system, &user)
            .await
            .map_err(|error| ApplicationError::Integration(format!("{error:#}")))?;
        let plan = ModelPlan::parse(&raw)?;

        debug!(
            event_name = "llm.plan.parsed",
            session_id = %state.session_id(),
            tool_calls = plan.tool_calls.len(),
            "model plan parsed"
        );
        Ok(plan)
    }
}

fn system_prompt() -> String {
    let catalogue = ToolKind::ALL
        .iter()
        .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are the DreamPool concierge router. A user is describing a funding goal and you \
         decide which tools to run on their latest message.\n\n\
         Tools (each reads the latest user message; you never pass arguments):\n{catalogue}\n\n\
         Run the tool for the active field first. Reply with JSON only, in the form \
         {{\"tool_calls\": [\"tool_name\", ...], \"message\": \"optional text for the user\"}}."
    )
}

fn turn_prompt(state: &SessionState, utterance: &str) -> String {
    let slots = state.slots();
    let status = SlotName::FILL_ORDER
        .iter()
        .map(|slot| {
            let marker = if slots.is_set(*slot) { "collected" } else { "missing" };
            format!("- {}: {marker}", slot.key())
        })
        .collect::<Vec<_>>()
        .join("\n");
    let active = slots.active_slot().map(|slot| slot.key()).unwrap_or("none");

    format!("Fields:\n{status}\nActive field: {active}\nLatest user message: {utterance}")
}
