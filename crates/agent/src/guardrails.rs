use dreampool_core::config::DialogueConfig;
use dreampool_core::domain::slot::{SlotName, Slots};
use dreampool_core::flows::ToolKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardrailIntent<'a> {
    ToolCall {
        tool: ToolKind,
        active_slot: Option<SlotName>,
        slots: &'a Slots,
        /// Every tool attempted earlier in this turn, allowed or not.
        invoked: &'a [ToolKind],
    },
}

impl GuardrailIntent<'_> {
    pub fn action_key(&self) -> String {
        match self {
            Self::ToolCall { tool, .. } => format!("tool.{}", tool.name()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Allow => None,
            Self::Deny { reason_code, .. } | Self::Degrade { reason_code, .. } => {
                Some(*reason_code)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_tool_calls_per_turn: u32,
    /// Tools for a later slot run but never settle the turn.
    pub off_route_tools_enabled: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self::from_config(&DialogueConfig::default())
    }
}

impl GuardrailPolicy {
    pub fn from_config(config: &DialogueConfig) -> Self {
        Self {
            max_tool_calls_per_turn: config.max_tool_calls_per_turn,
            off_route_tools_enabled: config.allow_off_route_tools,
        }
    }

    pub fn evaluate(&self, intent: &GuardrailIntent<'_>) -> GuardrailDecision {
        match intent {
            GuardrailIntent::ToolCall { tool, active_slot, slots, invoked } => {
                let budget = usize::try_from(self.max_tool_calls_per_turn).unwrap_or(usize::MAX);
                if invoked.len() >= budget {
                    return GuardrailDecision::Degrade {
                        reason_code: "tool_budget_exhausted",
                        user_message: format!(
                            "Tool budget of {budget} calls for this turn is used up."
                        ),
                        fallback_path: "yield_to_user",
                    };
                }

                if invoked.contains(tool) {
                    return GuardrailDecision::Deny {
                        reason_code: "duplicate_tool_call",
                        user_message: format!("`{}` already ran this turn.", tool.name()),
                        fallback_path: "skip_tool",
                    };
                }

                match tool.target_slot() {
                    Some(target) if slots.is_set(target) => GuardrailDecision::Deny {
                        reason_code: "slot_already_filled",
                        user_message: format!(
                            "The {} is already set and cannot be changed.",
                            target.label()
                        ),
                        fallback_path: "skip_tool",
                    },
                    Some(target)
                        if Some(target) != *active_slot && !self.off_route_tools_enabled =>
                    {
                        GuardrailDecision::Deny {
                            reason_code: "off_route_tool",
                            user_message: format!(
                                "The {} is not being collected yet.",
                                target.label()
                            ),
                            fallback_path: "skip_tool",
                        }
                    }
                    _ => GuardrailDecision::Allow,
                }
            }
        }
    }
}
