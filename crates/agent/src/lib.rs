//! Dialogue runtime for the DreamPool funding concierge.
//!
//! This crate turns user utterances into slot-fill flow transitions:
//! - `runtime` owns the per-turn loop and is the only place session state advances
//! - `tools` wraps the core extractors and validators as invocable tools
//! - `guardrails` bounds and filters tool calls within one turn
//! - `llm` asks an OpenAI-compatible model which tools to run
//! - `conversation` renders every prompt the user sees
//!
//! # Safety Principle
//!
//! The model is strictly a router. It never supplies slot values: every value
//! comes from a deterministic extractor reading the user's own words, and is
//! validated before the flow accepts it.

pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod runtime;
pub mod tools;

pub use conversation::PromptRenderer;
pub use guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};
pub use llm::{LlmClient, ModelPlan, ModelPlanner, OpenAiCompatibleClient};
pub use runtime::{DialogueOrchestrator, Reply, TurnOutcome};
pub use tools::{Tool, ToolInput, ToolOutcome, ToolRegistry, ToolVerdict};
