//! Pricing policy strategies
//!
//! A closed set of calculation methods dispatched by match, one per
//! charge item. `price` is pure: factors in, non-negative base amount
//! out, no side effects. Factor values parse as integers; absent or
//! non-numeric values count as zero, never as an error.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::CalculationMethod;

/// The billing factors effective over one prorated period, in source
/// order. Lookups take the first factor map that carries the key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingFactors {
    entries: Vec<HashMap<String, String>>,
}

impl BillingFactors {
    pub fn new(entries: Vec<HashMap<String, String>>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find_map(|map| map.get(key).map(String::as_str))
    }

    /// Integer value for `key`; absent or non-numeric values are zero.
    pub fn quantity_of(&self, key: &str) -> i64 {
        self.get(key)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(0)
    }

    /// Whether every condition entry matches the effective factors.
    pub fn satisfies(&self, conditions: &HashMap<String, String>) -> bool {
        conditions
            .iter()
            .all(|(key, expected)| self.get(key) == Some(expected.as_str()))
    }
}

/// One conditional rule of a matching-factor policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRule {
    pub conditions: HashMap<String, String>,
    pub amount: Decimal,
}

/// One quantity band. `to = None` is an unbounded upper band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandRule {
    pub from: i64,
    pub to: Option<i64>,
    pub amount: Decimal,
}

impl BandRule {
    fn contains(&self, quantity: i64) -> bool {
        quantity >= self.from && self.to.map_or(true, |to| quantity <= to)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PricingPolicy {
    /// Fixed amount regardless of factors.
    FlatRate { amount: Decimal },
    /// Amount of the first rule whose conditions all match.
    MatchingFactor { rules: Vec<MatchRule> },
    /// Amount of the first band containing the factor value.
    RangeFactor { factor_key: String, rules: Vec<BandRule> },
    /// Cumulative: each band charges its per-unit amount for the units
    /// falling inside it, consuming the quantity band by band.
    StepFactor { factor_key: String, rules: Vec<BandRule> },
    /// Single bracket: the band containing the whole quantity prices
    /// every unit. Not cumulative; distinct from [`Self::StepFactor`].
    TierFactor { factor_key: String, rules: Vec<BandRule> },
    /// Per-unit price times the factor quantity.
    UnitPrice { factor_key: String, unit_price: Decimal },
}

impl PricingPolicy {
    pub fn method(&self) -> CalculationMethod {
        match self {
            Self::FlatRate { .. } => CalculationMethod::FlatRate,
            Self::MatchingFactor { .. } => CalculationMethod::MatchingFactor,
            Self::RangeFactor { .. } => CalculationMethod::RangeFactor,
            Self::StepFactor { .. } => CalculationMethod::StepFactor,
            Self::TierFactor { .. } => CalculationMethod::TierFactor,
            Self::UnitPrice { .. } => CalculationMethod::UnitPrice,
        }
    }

    /// Base (pre-proration) amount for the given factors.
    pub fn price(&self, factors: &BillingFactors) -> Decimal {
        match self {
            Self::FlatRate { amount } => *amount,

            Self::MatchingFactor { rules } => rules
                .iter()
                .find(|rule| factors.satisfies(&rule.conditions))
                .map(|rule| rule.amount)
                .unwrap_or(Decimal::ZERO),

            Self::RangeFactor { factor_key, rules } => {
                let value = factors.quantity_of(factor_key);
                rules
                    .iter()
                    .find(|rule| rule.contains(value))
                    .map(|rule| rule.amount)
                    .unwrap_or(Decimal::ZERO)
            }

            Self::StepFactor { factor_key, rules } => {
                let quantity = factors.quantity_of(factor_key);
                let mut total = Decimal::ZERO;
                for rule in rules {
                    if quantity < rule.from {
                        continue;
                    }
                    let upper = rule.to.map_or(quantity, |to| to.min(quantity));
                    let units = upper - rule.from + 1;
                    if units > 0 {
                        total += rule.amount * Decimal::from(units);
                    }
                }
                total
            }

            Self::TierFactor { factor_key, rules } => {
                let quantity = factors.quantity_of(factor_key);
                rules
                    .iter()
                    .find(|rule| rule.contains(quantity))
                    .map(|rule| rule.amount * Decimal::from(quantity))
                    .unwrap_or(Decimal::ZERO)
            }

            Self::UnitPrice { factor_key, unit_price } => {
                *unit_price * Decimal::from(factors.quantity_of(factor_key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn factors(pairs: &[(&str, &str)]) -> BillingFactors {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BillingFactors::new(vec![map])
    }

    fn bands() -> Vec<BandRule> {
        vec![
            BandRule { from: 1, to: Some(5), amount: dec!(1000) },
            BandRule { from: 6, to: Some(10), amount: dec!(800) },
            BandRule { from: 11, to: None, amount: dec!(600) },
        ]
    }

    #[test]
    fn test_flat_rate_ignores_factors() {
        let policy = PricingPolicy::FlatRate { amount: dec!(10000) };
        assert_eq!(policy.price(&factors(&[("line_count", "99")])), dec!(10000));
        assert_eq!(policy.price(&BillingFactors::default()), dec!(10000));
    }

    #[test]
    fn test_matching_factor_first_rule_wins() {
        let rule = |k: &str, v: &str, amount| MatchRule {
            conditions: HashMap::from([(k.to_string(), v.to_string())]),
            amount,
        };
        let policy = PricingPolicy::MatchingFactor {
            rules: vec![rule("speed", "100M", dec!(30000)), rule("speed", "1G", dec!(50000))],
        };
        assert_eq!(policy.price(&factors(&[("speed", "1G")])), dec!(50000));
        assert_eq!(policy.price(&factors(&[("speed", "100M")])), dec!(30000));
        assert_eq!(policy.price(&factors(&[("speed", "10G")])), Decimal::ZERO);
    }

    #[test]
    fn test_range_factor_picks_single_band() {
        let policy = PricingPolicy::RangeFactor {
            factor_key: "line_count".to_string(),
            rules: bands(),
        };
        assert_eq!(policy.price(&factors(&[("line_count", "3")])), dec!(1000));
        assert_eq!(policy.price(&factors(&[("line_count", "10")])), dec!(800));
        assert_eq!(policy.price(&factors(&[("line_count", "40")])), dec!(600));
        assert_eq!(policy.price(&factors(&[("line_count", "0")])), Decimal::ZERO);
    }

    #[test]
    fn test_step_vs_tier_divergence() {
        // Quantity 15 over (1,5,1000)(6,10,800)(11,inf,600):
        // step charges each band, tier charges one bracket for all units.
        let step = PricingPolicy::StepFactor {
            factor_key: "line_count".to_string(),
            rules: bands(),
        };
        let tier = PricingPolicy::TierFactor {
            factor_key: "line_count".to_string(),
            rules: bands(),
        };
        let input = factors(&[("line_count", "15")]);
        assert_eq!(step.price(&input), dec!(12000));
        assert_eq!(tier.price(&input), dec!(9000));
    }

    #[test]
    fn test_step_factor_partial_band() {
        let policy = PricingPolicy::StepFactor {
            factor_key: "line_count".to_string(),
            rules: bands(),
        };
        // 5x1000 + 3x800
        assert_eq!(policy.price(&factors(&[("line_count", "8")])), dec!(7400));
    }

    #[test]
    fn test_unit_price() {
        let policy = PricingPolicy::UnitPrice {
            factor_key: "line_count".to_string(),
            unit_price: dec!(250),
        };
        assert_eq!(policy.price(&factors(&[("line_count", "15")])), dec!(3750));
    }

    #[test]
    fn test_missing_or_bad_factor_is_zero() {
        let policy = PricingPolicy::UnitPrice {
            factor_key: "line_count".to_string(),
            unit_price: dec!(250),
        };
        assert_eq!(policy.price(&BillingFactors::default()), Decimal::ZERO);
        assert_eq!(policy.price(&factors(&[("line_count", "many")])), Decimal::ZERO);
    }

    #[test]
    fn test_first_factor_entry_wins() {
        let first = HashMap::from([("line_count".to_string(), "5".to_string())]);
        let second = HashMap::from([("line_count".to_string(), "9".to_string())]);
        let layered = BillingFactors::new(vec![first, second]);
        assert_eq!(layered.quantity_of("line_count"), 5);
    }
}
