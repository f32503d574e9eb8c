//! Route selection for a single turn.
//!
//! A [`RoutingStrategy`] only chooses which tool to run next. Tools always
//! read the latest user utterance, and slot values only ever come out of the
//! extractor/validator pair behind a tool, so a model-backed strategy can
//! steer the turn but never inject a value.

use serde::{Deserialize, Serialize};

use crate::domain::slot::{SlotName, Slots};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    ExtractGoalDescription,
    ExtractAmount,
    ExtractDeadline,
    ValidateRecipient,
    CheckComplete,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::ExtractGoalDescription,
        ToolKind::ExtractAmount,
        ToolKind::ExtractDeadline,
        ToolKind::ValidateRecipient,
        ToolKind::CheckComplete,
    ];

    pub fn for_slot(slot: SlotName) -> Self {
        match slot {
            SlotName::GoalDescription => Self::ExtractGoalDescription,
            SlotName::Amount => Self::ExtractAmount,
            SlotName::DeadlineDays => Self::ExtractDeadline,
            SlotName::Recipient => Self::ValidateRecipient,
        }
    }

    pub fn target_slot(&self) -> Option<SlotName> {
        match self {
            Self::ExtractGoalDescription => Some(SlotName::GoalDescription),
            Self::ExtractAmount => Some(SlotName::Amount),
            Self::ExtractDeadline => Some(SlotName::DeadlineDays),
            Self::ValidateRecipient => Some(SlotName::Recipient),
            Self::CheckComplete => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ExtractGoalDescription => "extract_goal_description",
            Self::ExtractAmount => "extract_amount",
            Self::ExtractDeadline => "extract_deadline",
            Self::ValidateRecipient => "validate_recipient",
            Self::CheckComplete => "check_complete",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ExtractGoalDescription => "Store the user's message as the goal description.",
            Self::ExtractAmount => "Extract the funding amount (e.g. '2.5 ETH') from the message.",
            Self::ExtractDeadline => {
                "Extract the deadline in days from phrases like '30 days', '2 weeks', '1 month'."
            }
            Self::ValidateRecipient => "Validate the message as a 0x-prefixed recipient address.",
            Self::CheckComplete => "Report which fields are still missing.",
        }
    }

    /// Resolves a tool name proposed by a model. Accepts the canonical names
    /// plus the legacy aliases older prompts used.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "extract_goal_description" => Some(Self::ExtractGoalDescription),
            "extract_amount" | "extract_eth_amount" => Some(Self::ExtractAmount),
            "extract_deadline" => Some(Self::ExtractDeadline),
            "validate_recipient" | "validate_ethereum_address" => Some(Self::ValidateRecipient),
            "check_complete" | "check_conversation_complete" => Some(Self::CheckComplete),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NextAction {
    Invoke(ToolKind),
    Yield { message: Option<String> },
}

pub struct RoutingContext<'a> {
    pub active_slot: Option<SlotName>,
    pub slots: &'a Slots,
    pub utterance: &'a str,
    /// Tools already attempted this turn, including ones guardrails refused.
    pub invoked: &'a [ToolKind],
}

pub trait RoutingStrategy {
    fn next_action(&self, context: &RoutingContext<'_>) -> NextAction;
}

/// Runs the active slot's tool once, then yields.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedOrderRouting;

impl RoutingStrategy for FixedOrderRouting {
    fn next_action(&self, context: &RoutingContext<'_>) -> NextAction {
        match context.active_slot.map(ToolKind::for_slot) {
            Some(tool) if !context.invoked.contains(&tool) => NextAction::Invoke(tool),
            _ => NextAction::Yield { message: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FixedOrderRouting, NextAction, RoutingContext, RoutingStrategy, ToolKind};
    use crate::domain::slot::{SlotName, Slots};

    #[test]
    fn fixed_order_invokes_active_tool_once() {
        let slots = Slots::default();
        let mut invoked = Vec::new();
        let context = |invoked: &[ToolKind]| {
            FixedOrderRouting.next_action(&RoutingContext {
                active_slot: Some(SlotName::Amount),
                slots: &slots,
                utterance: "2.5 eth",
                invoked,
            })
        };

        assert_eq!(context(&invoked), NextAction::Invoke(ToolKind::ExtractAmount));
        invoked.push(ToolKind::ExtractAmount);
        assert_eq!(context(&invoked), NextAction::Yield { message: None });
    }

    #[test]
    fn tool_names_round_trip_and_accept_aliases() {
        for tool in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(tool.name()), Some(tool));
        }
        assert_eq!(ToolKind::from_name(" Extract_ETH_Amount "), Some(ToolKind::ExtractAmount));
        assert_eq!(ToolKind::from_name("prepare_contract_payload"), None);
    }

    #[test]
    fn slot_tools_target_their_slot() {
        for slot in SlotName::FILL_ORDER {
            assert_eq!(ToolKind::for_slot(slot).target_slot(), Some(slot));
        }
        assert_eq!(ToolKind::CheckComplete.target_slot(), None);
    }
}
