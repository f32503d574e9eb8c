use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::slot::{SlotName, Slots};
use crate::errors::DomainError;
use crate::validate;

/// Decimal places between one coin and its base unit (ether -> wei).
pub const BASE_UNIT_DECIMALS: u32 = 18;

const SECONDS_PER_DAY: i64 = 86_400;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Converts a coin amount to integer base units, truncating sub-unit dust.
pub fn to_base_units(amount: Decimal) -> Option<u128> {
    let scale = Decimal::from_i128_with_scale(10_i128.pow(BASE_UNIT_DECIMALS), 0);
    amount.checked_mul(scale)?.trunc().to_u128()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub goal_description: String,
    pub amount: Decimal,
    /// Serialized as a decimal string; most amounts exceed `u64`.
    #[serde(with = "base_units")]
    pub amount_base_units: u128,
    pub deadline_days: u32,
    pub deadline_timestamp: i64,
    pub recipient: String,
    pub created_at: DateTime<Utc>,
}

impl Payload {
    /// True when the payload was built from exactly these slot values and
    /// its derived fields agree with them.
    pub fn matches_slots(&self, slots: &Slots) -> bool {
        slots.goal_description.as_deref() == Some(self.goal_description.as_str())
            && slots.amount == Some(self.amount)
            && slots.deadline_days == Some(self.deadline_days)
            && slots.recipient.as_deref() == Some(self.recipient.as_str())
            && to_base_units(self.amount) == Some(self.amount_base_units)
            && deadline_timestamp(self.created_at, self.deadline_days)
                == Some(self.deadline_timestamp)
    }
}

fn deadline_timestamp(created_at: DateTime<Utc>, deadline_days: u32) -> Option<i64> {
    created_at.timestamp().checked_add(i64::from(deadline_days) * SECONDS_PER_DAY)
}

mod base_units {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(BaseUnitsVisitor)
    }

    struct BaseUnitsVisitor;

    impl<'de> Visitor<'de> for BaseUnitsVisitor {
        type Value = u128;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a non-negative integer or a decimal string")
        }

        fn visit_u64<E>(self, value: u64) -> Result<u128, E>
        where
            E: de::Error,
        {
            Ok(u128::from(value))
        }

        fn visit_u128<E>(self, value: u128) -> Result<u128, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_str<E>(self, value: &str) -> Result<u128, E>
        where
            E: de::Error,
        {
            value.parse().map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PayloadBuilder<C = SystemClock> {
    clock: C,
}

impl<C> PayloadBuilder<C>
where
    C: Clock,
{
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn build(&self, slots: &Slots) -> Result<Payload, DomainError> {
        if let Some((slot, failure)) = slots.first_invalid() {
            return Err(DomainError::InvalidSlotValue { slot, failure });
        }

        let goal_description = required(slots.goal_description.clone(), SlotName::GoalDescription)?;
        let amount = required(slots.amount, SlotName::Amount)?;
        let deadline_days = required(slots.deadline_days, SlotName::DeadlineDays)?;
        let recipient = required(slots.recipient.clone(), SlotName::Recipient)?;

        let amount_base_units = to_base_units(amount).ok_or(DomainError::InvalidSlotValue {
            slot: SlotName::Amount,
            failure: validate::ValidationFailure::OutOfRange,
        })?;

        let created_at = self.clock.now();
        let deadline = deadline_timestamp(created_at, deadline_days).ok_or_else(|| {
            DomainError::CorruptedState(format!(
                "deadline of {deadline_days} days overflows the timestamp range"
            ))
        })?;

        Ok(Payload {
            goal_description,
            amount,
            amount_base_units,
            deadline_days,
            deadline_timestamp: deadline,
            recipient,
            created_at,
        })
    }

    /// Deadline rendered as a calendar date relative to the builder's clock.
    pub fn deadline_date(&self, deadline_days: u32) -> Option<String> {
        let deadline = self.clock.now().checked_add_signed(Duration::days(deadline_days.into()))?;
        Some(deadline.format("%Y-%m-%d").to_string())
    }
}

fn required<T>(value: Option<T>, slot: SlotName) -> Result<T, DomainError> {
    value.ok_or_else(|| {
        DomainError::CorruptedState(format!("cannot build payload while `{slot}` is unset"))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{to_base_units, FixedClock, Payload, PayloadBuilder};
    use crate::domain::slot::Slots;
    use crate::errors::DomainError;

    fn filled_slots() -> Slots {
        Slots {
            goal_description: Some("buy a laptop".to_string()),
            amount: Some(Decimal::new(25, 1)),
            deadline_days: Some(30),
            recipient: Some("0x742d35Cc6634C0532925a3b8D4C9db96C4b4d8b6".to_string()),
        }
    }

    #[test]
    fn converts_amount_to_base_units() {
        assert_eq!(to_base_units(Decimal::new(25, 1)), Some(2_500_000_000_000_000_000));
        assert_eq!(to_base_units(Decimal::ONE), Some(1_000_000_000_000_000_000));
        assert_eq!(to_base_units(Decimal::new(-1, 0)), None);
    }

    #[test]
    fn builds_payload_with_deadline_relative_to_clock() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).single().expect("valid instant");
        let builder = PayloadBuilder::new(FixedClock(now));

        let payload = builder.build(&filled_slots()).expect("payload");

        assert_eq!(payload.goal_description, "buy a laptop");
        assert_eq!(payload.amount_base_units, 2_500_000_000_000_000_000);
        assert_eq!(payload.deadline_timestamp, now.timestamp() + 30 * 86_400);
        assert_eq!(payload.recipient, "0x742d35Cc6634C0532925a3b8D4C9db96C4b4d8b6");
        assert_eq!(payload.created_at, now);
        assert!(payload.matches_slots(&filled_slots()));
        assert_eq!(builder.deadline_date(30).as_deref(), Some("2026-01-31"));
    }

    #[test]
    fn large_base_units_survive_a_json_value_round_trip() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).single().expect("valid instant");
        let mut slots = filled_slots();
        slots.amount = Some(Decimal::new(50, 0));
        let payload = PayloadBuilder::new(FixedClock(now)).build(&slots).expect("payload");

        let value = serde_json::to_value(&payload).expect("to_value");
        assert_eq!(value["amount_base_units"], "50000000000000000000");

        let restored: Payload = serde_json::from_value(value).expect("from_value");
        assert_eq!(restored, payload);
        assert_eq!(restored.amount_base_units, 50_000_000_000_000_000_000);
    }

    #[test]
    fn tampered_derived_fields_no_longer_match_slots() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).single().expect("valid instant");
        let payload = PayloadBuilder::new(FixedClock(now)).build(&filled_slots()).expect("payload");

        let mut inflated = payload.clone();
        inflated.amount_base_units += 1;
        assert!(!inflated.matches_slots(&filled_slots()));

        let mut stretched = payload.clone();
        stretched.deadline_timestamp += 86_400;
        assert!(!stretched.matches_slots(&filled_slots()));

        assert!(payload.matches_slots(&filled_slots()));
    }

    #[test]
    fn refuses_to_build_from_partial_slots() {
        let builder = PayloadBuilder::new(FixedClock(Utc::now()));
        let mut slots = filled_slots();
        slots.recipient = None;

        let error = builder.build(&slots).expect_err("recipient missing");
        assert!(matches!(error, DomainError::CorruptedState(ref message) if message.contains("recipient")));
    }
}
