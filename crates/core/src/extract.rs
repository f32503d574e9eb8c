//! Pattern extractors that pull one typed value out of a raw utterance.
//!
//! Each extractor walks a fixed, ordered list of patterns over the
//! lower-cased utterance and the first pattern that matches decides. Pattern
//! order is part of the contract: deadline text is tried against day
//! patterns, then week patterns, then month patterns, so `"2 weeks"` is 14
//! days while `"30 days"` stays 30.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::slot::{SlotName, SlotValue};

const AMOUNT_NUMBER: &str = r"(\d+\.?\d*)";
const BARE_AMOUNT_PATTERN: &str = r"^(\d+\.?\d*)$";

const DEADLINE_PATTERNS: [(&str, u32); 6] = [
    (r"(\d+)\s*days?", 1),
    (r"(\d+)\s*d", 1),
    (r"(\d+)\s*weeks?", 7),
    (r"(\d+)\s*w", 7),
    (r"(\d+)\s*months?", 30),
    (r"(\d+)\s*m", 30),
];

struct DeadlinePattern {
    regex: Regex,
    days_per_unit: u32,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("extractor patterns are static and valid")
}

fn bare_amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| compile(BARE_AMOUNT_PATTERN))
}

/// Amount patterns for one currency: `<number> <unit>`, then a bare number
/// filling the whole utterance.
#[derive(Clone, Debug)]
pub struct AmountExtractor {
    patterns: Vec<Regex>,
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::for_currency("ETH")
    }
}

impl AmountExtractor {
    /// Labels match case-insensitively and as a prefix, so `ETH` also reads
    /// `3 ether`.
    pub fn for_currency(label: &str) -> Self {
        let unit = regex::escape(&label.trim().to_lowercase());
        let mut patterns: Vec<Regex> =
            Regex::new(&format!(r"{AMOUNT_NUMBER}\s*{unit}")).ok().into_iter().collect();
        patterns.push(bare_amount_pattern().clone());
        Self { patterns }
    }

    /// The first pattern that matches decides; a number that does not parse
    /// is a miss.
    pub fn extract(&self, text: &str) -> Option<Decimal> {
        let normalized = normalize(text);
        let captures = self.patterns.iter().find_map(|pattern| pattern.captures(&normalized))?;
        // "2." is a valid way to write 2.
        Decimal::from_str(captures.get(1)?.as_str().trim_end_matches('.')).ok()
    }
}

fn deadline_patterns() -> &'static [DeadlinePattern] {
    static PATTERNS: OnceLock<Vec<DeadlinePattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DEADLINE_PATTERNS
            .iter()
            .map(|(pattern, days_per_unit)| DeadlinePattern {
                regex: compile(pattern),
                days_per_unit: *days_per_unit,
            })
            .collect()
    })
}

/// Runs the extractor that belongs to `slot`.
pub fn extract(amounts: &AmountExtractor, slot: SlotName, text: &str) -> Option<SlotValue> {
    match slot {
        SlotName::GoalDescription => extract_goal_description(text).map(SlotValue::GoalDescription),
        SlotName::Amount => amounts.extract(text).map(SlotValue::Amount),
        SlotName::DeadlineDays => extract_deadline_days(text).map(SlotValue::DeadlineDays),
        SlotName::Recipient => extract_recipient(text).map(SlotValue::Recipient),
    }
}

/// The whole utterance is the description.
pub fn extract_goal_description(text: &str) -> Option<String> {
    Some(text.to_string())
}

/// The first pattern that matches decides. A count that overflows is a miss
/// rather than a reason to try the next unit.
pub fn extract_deadline_days(text: &str) -> Option<u32> {
    let normalized = normalize(text);
    let (pattern, captures) = deadline_patterns()
        .iter()
        .find_map(|pattern| pattern.regex.captures(&normalized).map(|found| (pattern, found)))?;
    captures.get(1)?.as_str().parse::<u32>().ok()?.checked_mul(pattern.days_per_unit)
}

/// Addresses are validated in place; extraction only trims surrounding
/// whitespace.
pub fn extract_recipient(text: &str) -> Option<String> {
    Some(text.trim().to_string())
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{extract, extract_deadline_days, extract_recipient, AmountExtractor};

    fn extract_amount(text: &str) -> Option<Decimal> {
        AmountExtractor::default().extract(text)
    }
    use crate::domain::slot::{SlotName, SlotValue};

    #[test]
    fn deadline_precedence_prefers_days_then_weeks_then_months() {
        assert_eq!(extract_deadline_days("30 days"), Some(30));
        assert_eq!(extract_deadline_days("2 weeks"), Some(14));
        assert_eq!(extract_deadline_days("1 month"), Some(30));
        assert_eq!(extract_deadline_days("10d"), Some(10));
        assert_eq!(extract_deadline_days("3w"), Some(21));
        // A day pattern anywhere in the text wins over an earlier week mention.
        assert_eq!(extract_deadline_days("2 weeks and 3 days"), Some(3));
    }

    #[test]
    fn deadline_without_digits_is_a_miss() {
        assert_eq!(extract_deadline_days("soon"), None);
        assert_eq!(extract_deadline_days("next month"), None);
    }

    #[test]
    fn deadline_overflow_is_a_miss_for_that_pattern() {
        assert_eq!(extract_deadline_days("99999999999 days"), None);
        assert_eq!(extract_deadline_days("200000000 months"), None);
    }

    #[test]
    fn overflowing_day_count_does_not_fall_through_to_weeks() {
        assert_eq!(extract_deadline_days("99999999999 days or 2 weeks"), None);
        assert_eq!(extract_deadline_days("3 days or 2 weeks"), Some(3));
    }

    #[test]
    fn amount_accepts_unit_suffix_or_bare_decimal() {
        assert_eq!(extract_amount("2.5 ETH"), Some(Decimal::new(25, 1)));
        assert_eq!(extract_amount("I need 3 ether please"), Some(Decimal::new(3, 0)));
        assert_eq!(extract_amount("0.5eth"), Some(Decimal::new(5, 1)));
        assert_eq!(extract_amount("  1.25 "), Some(Decimal::new(125, 2)));
        assert_eq!(extract_amount("2. eth"), Some(Decimal::new(2, 0)));
    }

    #[test]
    fn amount_requires_unit_unless_whole_utterance_is_numeric() {
        assert_eq!(extract_amount("about 20 dollars"), None);
        assert_eq!(extract_amount("30 days"), None);
        assert_eq!(extract_amount("a lot"), None);
    }

    #[test]
    fn amount_follows_configured_currency() {
        let xdai = AmountExtractor::for_currency("xDAI");

        assert_eq!(xdai.extract("2.5 xDAI"), Some(Decimal::new(25, 1)));
        assert_eq!(xdai.extract("about 40xdai"), Some(Decimal::new(40, 0)));
        assert_eq!(xdai.extract("7"), Some(Decimal::new(7, 0)));
        assert_eq!(xdai.extract("2.5 ETH"), None);
        assert_eq!(
            extract(&xdai, SlotName::Amount, "3 XDAI"),
            Some(SlotValue::Amount(Decimal::new(3, 0)))
        );
    }

    #[test]
    fn malformed_amounts_are_skipped_not_raised() {
        let oversized = format!("{} eth", "9".repeat(40));
        assert_eq!(extract_amount(&oversized), None);
    }

    #[test]
    fn recipient_and_goal_are_pass_through() {
        assert_eq!(extract_recipient("  0xabc \n").as_deref(), Some("0xabc"));
        assert_eq!(
            extract(&AmountExtractor::default(), SlotName::GoalDescription, "buy a laptop"),
            Some(SlotValue::GoalDescription("buy a laptop".to_string()))
        );
    }
}
