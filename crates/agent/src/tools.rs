use std::collections::HashMap;

use dreampool_core::config::DialogueConfig;
use dreampool_core::domain::slot::{SlotName, SlotValue, Slots};
use dreampool_core::extract::{self, AmountExtractor};
use dreampool_core::flows::{FlowEvent, ToolKind};
use dreampool_core::validate::{self, ValidationFailure};

/// What a tool sees: the latest utterance and the slots collected so far.
/// There is no channel for a caller-supplied value.
#[derive(Clone, Copy, Debug)]
pub struct ToolInput<'a> {
    pub utterance: &'a str,
    pub slots: &'a Slots,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolVerdict {
    Accepted(SlotValue),
    Missed,
    Rejected(ValidationFailure),
    /// Informational result that never settles a turn.
    Report,
}

impl ToolVerdict {
    /// The flow event this verdict settles a turn with, if any.
    pub fn into_event(self) -> Option<FlowEvent> {
        match self {
            Self::Accepted(value) => Some(FlowEvent::SlotAccepted(value)),
            Self::Missed => Some(FlowEvent::ExtractionMissed),
            Self::Rejected(failure) => Some(FlowEvent::ValidationFailed(failure)),
            Self::Report => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutcome {
    pub tool: ToolKind,
    pub verdict: ToolVerdict,
    /// Transcript text for the tool-result turn.
    pub summary: String,
}

pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;
    fn execute(&self, input: &ToolInput<'_>) -> ToolOutcome;
}

/// Extractor plus validator for one slot.
#[derive(Clone, Debug)]
pub struct SlotTool {
    slot: SlotName,
    amounts: AmountExtractor,
}

impl SlotTool {
    pub fn with_amounts(slot: SlotName, amounts: AmountExtractor) -> Self {
        Self { slot, amounts }
    }
}

impl Tool for SlotTool {
    fn kind(&self) -> ToolKind {
        ToolKind::for_slot(self.slot)
    }

    fn execute(&self, input: &ToolInput<'_>) -> ToolOutcome {
        let (verdict, summary) = match extract::extract(&self.amounts, self.slot, input.utterance) {
            None => (ToolVerdict::Missed, format!("no {} found", self.slot.label())),
            Some(value) => match validate::validate(&value) {
                Ok(()) => {
                    let summary = format!("{} accepted: {}", self.slot.label(), describe(&value));
                    (ToolVerdict::Accepted(value), summary)
                }
                Err(failure) => {
                    let summary = format!("{} rejected: {failure}", self.slot.label());
                    (ToolVerdict::Rejected(failure), summary)
                }
            },
        };
        ToolOutcome { tool: self.kind(), verdict, summary }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CheckCompleteTool;

impl Tool for CheckCompleteTool {
    fn kind(&self) -> ToolKind {
        ToolKind::CheckComplete
    }

    fn execute(&self, input: &ToolInput<'_>) -> ToolOutcome {
        let missing = input.slots.missing();
        let summary = if missing.is_empty() {
            "all fields collected".to_string()
        } else {
            let keys = missing.iter().map(SlotName::key).collect::<Vec<_>>().join(", ");
            format!("missing: {keys}")
        };
        ToolOutcome { tool: self.kind(), verdict: ToolVerdict::Report, summary }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Builtin tools, with amounts read in the configured currency.
    pub fn for_config(config: &DialogueConfig) -> Self {
        let amounts = AmountExtractor::for_currency(&config.currency_label);
        let mut registry = Self::default();
        for slot in SlotName::FILL_ORDER {
            registry.register(SlotTool::with_amounts(slot, amounts.clone()));
        }
        registry.register(CheckCompleteTool);
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.kind(), Box::new(tool));
    }

    pub fn execute(&self, tool: ToolKind, input: &ToolInput<'_>) -> Option<ToolOutcome> {
        self.tools.get(&tool).map(|registered| registered.execute(input))
    }

    pub fn contains(&self, tool: ToolKind) -> bool {
        self.tools.contains_key(&tool)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn describe(value: &SlotValue) -> String {
    match value {
        SlotValue::GoalDescription(text) | SlotValue::Recipient(text) => text.clone(),
        SlotValue::Amount(amount) => amount.normalize().to_string(),
        SlotValue::DeadlineDays(days) => format!("{days} days"),
    }
}
