use dreampool_core::config::DialogueConfig;
use dreampool_core::domain::payload::{to_base_units, Payload};
use dreampool_core::domain::slot::{SlotName, SlotValue};
use dreampool_core::validate::{FormatViolation, ValidationFailure, ADDRESS_LENGTH};
use rust_decimal::Decimal;

const EXAMPLE_ADDRESS: &str = "0x...";

/// Renders every user-facing sentence the concierge produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptRenderer {
    currency_label: String,
    recipient_hint: Option<String>,
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::from_config(&DialogueConfig::default())
    }
}

impl PromptRenderer {
    pub fn from_config(config: &DialogueConfig) -> Self {
        Self {
            currency_label: config.currency_label.clone(),
            recipient_hint: config.recipient_hint.clone(),
        }
    }

    pub fn greeting(&self) -> String {
        format!(
            "Hello! I'm your DreamPool concierge. I'll help you create a funding pool for your goal.\n\n\
             To get started, I need to collect some information:\n\
             1. What's your goal? (brief description)\n\
             2. How much {currency} do you need to raise?\n\
             3. When do you need the funds by? (in days)\n\
             4. Who should receive the funds? (recipient address)\n\n\
             Let's start with your goal - what are you trying to achieve?",
            currency = self.currency_label
        )
    }

    pub fn prompt_for(&self, slot: SlotName) -> String {
        match slot {
            SlotName::GoalDescription => {
                "What's your goal? Please describe what you want to achieve.".to_string()
            }
            SlotName::Amount => {
                format!("How much {} do you need to raise for this goal?", self.currency_label)
            }
            SlotName::DeadlineDays => "When do you need the funds by? Please tell me in days \
                                       (e.g., '30 days', '2 weeks', '1 month')."
                .to_string(),
            SlotName::Recipient => format!(
                "Who should receive the funds? Please provide a recipient address ({}).",
                self.address_example()
            ),
        }
    }

    pub fn reprompt(&self, slot: SlotName) -> String {
        match slot {
            SlotName::GoalDescription => {
                "I didn't catch your goal. Please describe what you want to achieve.".to_string()
            }
            SlotName::Amount => format!(
                "I didn't catch the amount. Please tell me how much {currency} you need \
                 (e.g., '2.5 {currency}', '1.0 {currency}', '0.5 {currency}').",
                currency = self.currency_label
            ),
            SlotName::DeadlineDays => "I didn't understand the deadline. Please tell me in days \
                                       (e.g., '30 days', '2 weeks', '1 month')."
                .to_string(),
            SlotName::Recipient => format!(
                "I couldn't read a recipient address. Please provide one ({}).",
                self.address_example()
            ),
        }
    }

    /// Corrective prompt that names the violated constraint.
    pub fn explain_violation(&self, slot: SlotName, failure: &ValidationFailure) -> String {
        let constraint = match (slot, failure) {
            (SlotName::Recipient, ValidationFailure::InvalidFormat { violation }) => {
                let detail = match violation {
                    FormatViolation::MissingPrefix => "it has to start with 0x".to_string(),
                    FormatViolation::WrongLength { actual } => {
                        format!("it has to be {ADDRESS_LENGTH} characters long, not {actual}")
                    }
                    FormatViolation::NonHexDigits => {
                        "only hexadecimal characters may follow the 0x prefix".to_string()
                    }
                };
                format!("That doesn't look like a valid address: {detail}.")
            }
            (SlotName::Amount, ValidationFailure::NonPositive) => {
                "The amount has to be greater than zero.".to_string()
            }
            (SlotName::Amount, ValidationFailure::OutOfRange) => format!(
                "That amount can't be represented: it must be at least 0.000000000000000001 {} \
                 and not absurdly large.",
                self.currency_label
            ),
            (SlotName::DeadlineDays, ValidationFailure::NonPositive) => {
                "The deadline has to be at least one day away.".to_string()
            }
            (SlotName::GoalDescription, ValidationFailure::Empty) => {
                "The goal description can't be empty.".to_string()
            }
            (_, failure) => format!("That {} was rejected: {failure}.", slot.label()),
        };

        format!("{constraint} {}", self.prompt_for(slot))
    }

    /// Acknowledges an accepted value. `deadline_date` is only read for the
    /// deadline slot.
    pub fn acknowledge(&self, value: &SlotValue, deadline_date: Option<&str>) -> String {
        match value {
            SlotValue::GoalDescription(text) => format!("Great! So you want to: {text}"),
            SlotValue::Amount(amount) => {
                let base_units = to_base_units(*amount)
                    .map(group_thousands)
                    .unwrap_or_else(|| "?".to_string());
                format!(
                    "Perfect! You need {} {}. That's {base_units} base units.",
                    display_amount(*amount),
                    self.currency_label
                )
            }
            SlotValue::DeadlineDays(days) => match deadline_date {
                Some(date) => format!("Got it! Deadline set for {days} days from now ({date})."),
                None => format!("Got it! Deadline set for {days} days from now."),
            },
            SlotValue::Recipient(address) => format!("Recipient set to {address}."),
        }
    }

    /// Restates what is still needed when a turn ends without progress.
    pub fn deferral(&self, missing: &[SlotName]) -> String {
        let Some(active) = missing.first() else {
            return self.finished();
        };
        let labels = missing.iter().map(SlotName::label).collect::<Vec<_>>().join(", ");
        format!("I still need: {labels}. {}", self.prompt_for(*active))
    }

    pub fn finished(&self) -> String {
        "The conversation is already complete. Please start a new conversation if you want to \
         create another goal."
            .to_string()
    }

    pub fn confirmation(&self, payload: &Payload, deadline_date: Option<&str>) -> String {
        let deadline = match deadline_date {
            Some(date) => format!("{} days ({date})", payload.deadline_days),
            None => format!("{} days", payload.deadline_days),
        };
        format!(
            "Perfect! Here's a summary of your pool:\n\n\
             Goal: {goal}\n\
             Amount: {amount} {currency} ({base_units} base units)\n\
             Deadline: {deadline}\n\
             Recipient: {recipient}\n\n\
             Your pool is ready to be created! Funds are only released if the goal is met by \
             the deadline.",
            goal = payload.goal_description,
            amount = display_amount(payload.amount),
            currency = self.currency_label,
            base_units = group_thousands(payload.amount_base_units),
            recipient = payload.recipient,
        )
    }

    fn address_example(&self) -> &str {
        self.recipient_hint.as_deref().unwrap_or(EXAMPLE_ADDRESS)
    }
}

fn display_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// `2500000` -> `2,500,000`.
pub fn group_thousands(value: u128) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
