use thiserror::Error;

use crate::domain::slot::SlotName;
use crate::flows::FlowTransitionError;
use crate::validate::ValidationFailure;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("corrupted session state: {0}")]
    CorruptedState(String),
    #[error("slot `{0}` is already set and cannot be overwritten")]
    SlotAlreadySet(SlotName),
    #[error("slot `{slot}` rejected value: {failure}")]
    InvalidSlotValue { slot: SlotName, failure: ValidationFailure },
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("integration failure: {0}")]
    Integration(String),
}

impl ApplicationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::CorruptedState(_)) => {
                "This conversation can no longer be continued. Please start a new one."
            }
            Self::Domain(_) => "The conversation hit an internal rule violation.",
            Self::Integration(_) => {
                "The assistant is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::CorruptedState(_)) => "corrupted_state",
            Self::Domain(_) => "domain",
            Self::Integration(_) => "integration",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::slot::SlotName;
    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn corrupted_state_maps_to_restart_message() {
        let error = ApplicationError::from(DomainError::CorruptedState(
            "payload present on an incomplete session".to_owned(),
        ));

        assert_eq!(error.error_class(), "corrupted_state");
        assert!(error.user_message().contains("start a new one"));
    }

    #[test]
    fn integration_error_is_retryable_for_users() {
        let error = ApplicationError::Integration("llm timeout".to_owned());
        assert_eq!(error.error_class(), "integration");
        assert!(error.user_message().contains("retry"));
    }

    #[test]
    fn slot_errors_render_slot_key() {
        let error = DomainError::SlotAlreadySet(SlotName::Recipient);
        assert_eq!(error.to_string(), "slot `recipient` is already set and cannot be overwritten");
    }
}
