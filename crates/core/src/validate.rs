//! Well-formedness checks for candidate slot values.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::payload::to_base_units;
use crate::domain::slot::SlotValue;

pub const ADDRESS_PREFIX: &str = "0x";
pub const ADDRESS_LENGTH: usize = 42;

#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[error("invalid format: {violation}")]
    InvalidFormat { violation: FormatViolation },
    #[error("value must be greater than zero")]
    NonPositive,
    #[error("value must not be blank")]
    Empty,
    #[error("amount must convert to between 1 and {} base units", u128::MAX)]
    OutOfRange,
}

/// Which part of the address format was violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatViolation {
    MissingPrefix,
    WrongLength { actual: usize },
    NonHexDigits,
}

impl fmt::Display for FormatViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPrefix => write!(f, "must start with `{ADDRESS_PREFIX}`"),
            Self::WrongLength { actual } => {
                write!(f, "must be {ADDRESS_LENGTH} characters long (got {actual})")
            }
            Self::NonHexDigits => f.write_str("must contain only hexadecimal digits after `0x`"),
        }
    }
}

pub fn validate(value: &SlotValue) -> Result<(), ValidationFailure> {
    match value {
        SlotValue::GoalDescription(text) => validate_description(text),
        SlotValue::Amount(amount) => validate_amount(*amount),
        SlotValue::DeadlineDays(days) => validate_deadline_days(*days),
        SlotValue::Recipient(address) => validate_address(address),
    }
}

pub fn validate_address(address: &str) -> Result<(), ValidationFailure> {
    let invalid = |violation| ValidationFailure::InvalidFormat { violation };

    let Some(digits) = address.strip_prefix(ADDRESS_PREFIX) else {
        return Err(invalid(FormatViolation::MissingPrefix));
    };
    let actual = address.chars().count();
    if actual != ADDRESS_LENGTH {
        return Err(invalid(FormatViolation::WrongLength { actual }));
    }
    if !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(invalid(FormatViolation::NonHexDigits));
    }
    Ok(())
}

pub fn validate_amount(amount: Decimal) -> Result<(), ValidationFailure> {
    if amount <= Decimal::ZERO {
        return Err(ValidationFailure::NonPositive);
    }
    match to_base_units(amount) {
        Some(units) if units > 0 => Ok(()),
        _ => Err(ValidationFailure::OutOfRange),
    }
}

pub fn validate_deadline_days(days: u32) -> Result<(), ValidationFailure> {
    if days == 0 {
        return Err(ValidationFailure::NonPositive);
    }
    Ok(())
}

pub fn validate_description(text: &str) -> Result<(), ValidationFailure> {
    if text.trim().is_empty() {
        return Err(ValidationFailure::Empty);
    }
    Ok(())
}
