use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::validate::{self, ValidationFailure};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    GoalDescription,
    Amount,
    DeadlineDays,
    Recipient,
}

impl SlotName {
    /// The order in which slots are elicited. The active slot is always the
    /// first unset entry.
    pub const FILL_ORDER: [SlotName; 4] =
        [SlotName::GoalDescription, SlotName::Amount, SlotName::DeadlineDays, SlotName::Recipient];

    pub fn key(&self) -> &'static str {
        match self {
            Self::GoalDescription => "goal_description",
            Self::Amount => "amount",
            Self::DeadlineDays => "deadline_days",
            Self::Recipient => "recipient",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::GoalDescription => "goal description",
            Self::Amount => "funding amount",
            Self::DeadlineDays => "deadline",
            Self::Recipient => "recipient address",
        }
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A typed candidate value for one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "slot", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    GoalDescription(String),
    Amount(Decimal),
    DeadlineDays(u32),
    Recipient(String),
}

impl SlotValue {
    pub fn slot(&self) -> SlotName {
        match self {
            Self::GoalDescription(_) => SlotName::GoalDescription,
            Self::Amount(_) => SlotName::Amount,
            Self::DeadlineDays(_) => SlotName::DeadlineDays,
            Self::Recipient(_) => SlotName::Recipient,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots {
    pub goal_description: Option<String>,
    pub amount: Option<Decimal>,
    pub deadline_days: Option<u32>,
    pub recipient: Option<String>,
}

impl Slots {
    pub fn value(&self, slot: SlotName) -> Option<SlotValue> {
        match slot {
            SlotName::GoalDescription => {
                self.goal_description.clone().map(SlotValue::GoalDescription)
            }
            SlotName::Amount => self.amount.map(SlotValue::Amount),
            SlotName::DeadlineDays => self.deadline_days.map(SlotValue::DeadlineDays),
            SlotName::Recipient => self.recipient.clone().map(SlotValue::Recipient),
        }
    }

    pub fn is_set(&self, slot: SlotName) -> bool {
        match slot {
            SlotName::GoalDescription => self.goal_description.is_some(),
            SlotName::Amount => self.amount.is_some(),
            SlotName::DeadlineDays => self.deadline_days.is_some(),
            SlotName::Recipient => self.recipient.is_some(),
        }
    }

    pub fn active_slot(&self) -> Option<SlotName> {
        SlotName::FILL_ORDER.into_iter().find(|slot| !self.is_set(*slot))
    }

    pub fn missing(&self) -> Vec<SlotName> {
        SlotName::FILL_ORDER.into_iter().filter(|slot| !self.is_set(*slot)).collect()
    }

    pub fn is_filled(&self) -> bool {
        self.active_slot().is_none()
    }

    /// Fills an unset slot. A slot that already holds a value is never
    /// replaced.
    pub fn fill(&mut self, value: SlotValue) -> Result<(), DomainError> {
        let slot = value.slot();
        if self.is_set(slot) {
            return Err(DomainError::SlotAlreadySet(slot));
        }
        validate::validate(&value)
            .map_err(|failure| DomainError::InvalidSlotValue { slot, failure })?;

        match value {
            SlotValue::GoalDescription(text) => self.goal_description = Some(text),
            SlotValue::Amount(amount) => self.amount = Some(amount),
            SlotValue::DeadlineDays(days) => self.deadline_days = Some(days),
            SlotValue::Recipient(address) => self.recipient = Some(address),
        }
        Ok(())
    }

    /// Validates every set slot, reporting the first failure in fill order.
    pub fn first_invalid(&self) -> Option<(SlotName, ValidationFailure)> {
        SlotName::FILL_ORDER.into_iter().find_map(|slot| {
            let value = self.value(slot)?;
            validate::validate(&value).err().map(|failure| (slot, failure))
        })
    }

    /// True when the set slots are exactly a prefix of the fill order.
    pub fn is_fill_order_prefix(&self) -> bool {
        let filled = SlotName::FILL_ORDER.iter().take_while(|slot| self.is_set(**slot)).count();
        SlotName::FILL_ORDER.iter().skip(filled).all(|slot| !self.is_set(*slot))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{SlotName, SlotValue, Slots};
    use crate::errors::DomainError;

    #[test]
    fn active_slot_follows_fixed_fill_order() {
        let mut slots = Slots::default();
        assert_eq!(slots.active_slot(), Some(SlotName::GoalDescription));

        slots.fill(SlotValue::GoalDescription("buy a laptop".to_string())).expect("fill goal");
        assert_eq!(slots.active_slot(), Some(SlotName::Amount));

        slots.fill(SlotValue::Amount(Decimal::new(25, 1))).expect("fill amount");
        slots.fill(SlotValue::DeadlineDays(30)).expect("fill deadline");
        assert_eq!(slots.active_slot(), Some(SlotName::Recipient));
        assert_eq!(slots.missing(), vec![SlotName::Recipient]);
        assert!(!slots.is_filled());
    }

    #[test]
    fn set_slot_is_never_overwritten() {
        let mut slots = Slots::default();
        slots.fill(SlotValue::DeadlineDays(30)).expect("first fill");

        let error = slots.fill(SlotValue::DeadlineDays(14)).expect_err("second fill must fail");
        assert_eq!(error, DomainError::SlotAlreadySet(SlotName::DeadlineDays));
        assert_eq!(slots.deadline_days, Some(30));
    }

    #[test]
    fn invalid_values_are_not_stored() {
        let mut slots = Slots::default();
        let error = slots.fill(SlotValue::Amount(Decimal::ZERO)).expect_err("zero amount");
        assert!(matches!(error, DomainError::InvalidSlotValue { slot: SlotName::Amount, .. }));
        assert!(slots.amount.is_none());
    }

    #[test]
    fn fill_order_prefix_detects_gaps() {
        let gapped = Slots {
            goal_description: Some("trip".to_string()),
            amount: None,
            deadline_days: Some(7),
            recipient: None,
        };
        assert!(!gapped.is_fill_order_prefix());
        assert!(Slots::default().is_fill_order_prefix());
    }

    #[test]
    fn slot_names_serialize_as_snake_case_keys() {
        let json = serde_json::to_string(&SlotName::DeadlineDays).expect("serialize");
        assert_eq!(json, "\"deadline_days\"");
        assert_eq!(SlotName::DeadlineDays.to_string(), "deadline_days");
    }
}
