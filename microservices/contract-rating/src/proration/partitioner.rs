//! Interval partitioner
//!
//! Merges the independently-changing validity ranges of products,
//! suspensions and billing factors into the minimal ordered set of
//! non-overlapping sub-intervals of the billing window, then emits one
//! prorated period per sub-interval, product and charge item.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::pricing::BillingFactors;
use crate::temporal::{next_day, Effective, TemporalRange};
use crate::types::{AdditionalBillingFactor, ChargeItem, Product, Suspension, SuspensionType};

/// The unit of calculation: one sub-interval during which one product
/// charge item's inputs are constant. Constructed only here.
#[derive(Debug, Clone)]
pub struct ProratedPeriod {
    pub range: TemporalRange,
    pub product_offering_id: String,
    pub charge_item: ChargeItem,
    pub suspension_type: Option<SuspensionType>,
    pub factors: BillingFactors,
}

/// Partitions `window` at every point where a product, suspension or
/// billing factor starts or stops being effective.
///
/// Cut points are each entity's clipped start and the day after its
/// clipped end, so sub-intervals are non-overlapping, contiguous, and
/// exactly cover each entity's clipped range. When several suspensions
/// overlap one sub-interval, the earliest-starting one is attached.
pub fn build_prorated_periods(
    window: &TemporalRange,
    products: &[Product],
    suspensions: &[Suspension],
    billing_factors: &[AdditionalBillingFactor],
) -> Vec<ProratedPeriod> {
    let mut cuts: BTreeSet<NaiveDate> = BTreeSet::new();
    cuts.insert(window.start());
    cuts.insert(next_day(window.end()));

    collect_cuts(&mut cuts, window, products);
    collect_cuts(&mut cuts, window, suspensions);
    collect_cuts(&mut cuts, window, billing_factors);

    // Deterministic tie-break for overlapping suspensions.
    let mut suspensions: Vec<&Suspension> = suspensions.iter().collect();
    suspensions.sort_by_key(|s| s.started_on);

    let boundaries: Vec<NaiveDate> = cuts.into_iter().collect();
    let mut periods = Vec::new();

    for pair in boundaries.windows(2) {
        let Some(end) = pair[1].pred_opt() else {
            continue;
        };
        let Ok(sub) = TemporalRange::new(pair[0], end) else {
            continue;
        };

        for product in products {
            let Some(product_range) = product.effective_range_within(window) else {
                continue;
            };
            if !product_range.overlaps(&sub) {
                continue;
            }

            let suspension_type = suspensions
                .iter()
                .find(|s| overlaps_within(*s, window, &sub))
                .map(|s| s.suspension_type);

            let factors = BillingFactors::new(
                billing_factors
                    .iter()
                    .filter(|f| overlaps_within(*f, window, &sub))
                    .map(|f| f.factors.clone())
                    .collect(),
            );

            for charge_item in &product.offering.charge_items {
                periods.push(ProratedPeriod {
                    range: sub,
                    product_offering_id: product.offering.id.clone(),
                    charge_item: charge_item.clone(),
                    suspension_type,
                    factors: factors.clone(),
                });
            }
        }
    }

    periods
}

fn collect_cuts<E: Effective>(cuts: &mut BTreeSet<NaiveDate>, window: &TemporalRange, entities: &[E]) {
    for entity in entities {
        if let Some(clipped) = entity.effective_range_within(window) {
            cuts.insert(clipped.start());
            cuts.insert(next_day(clipped.end()));
        }
    }
}

fn overlaps_within<E: Effective>(entity: &E, window: &TemporalRange, sub: &TemporalRange) -> bool {
    entity
        .effective_range_within(window)
        .is_some_and(|range| range.overlaps(sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PricingPolicy;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    fn window() -> TemporalRange {
        TemporalRange::new(d(2025, 5, 1), d(2025, 5, 31)).expect("valid range")
    }

    fn flat_product(subscribed_on: NaiveDate, terminated_on: Option<NaiveDate>) -> Product {
        Product {
            id: 1,
            offering: crate::types::ProductOffering {
                id: "PO-100".to_string(),
                name: "Fiber 100M".to_string(),
                charge_items: vec![ChargeItem {
                    id: "CI-BASE".to_string(),
                    name: "Base fee".to_string(),
                    revenue_item_id: Some("RV-1".to_string()),
                    suspension_charge_ratio: dec!(0.5),
                    policy: PricingPolicy::FlatRate { amount: dec!(10000) },
                }],
            },
            subscribed_on,
            activated_on: None,
            terminated_on,
        }
    }

    #[test]
    fn test_single_product_whole_window() {
        let products = vec![flat_product(d(2025, 4, 1), None)];
        let periods = build_prorated_periods(&window(), &products, &[], &[]);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].range.start(), d(2025, 5, 1));
        assert_eq!(periods[0].range.end(), d(2025, 5, 31));
        assert!(periods[0].suspension_type.is_none());
    }

    #[test]
    fn test_mid_month_subscription_splits_window() {
        let products = vec![flat_product(d(2025, 5, 15), None)];
        let periods = build_prorated_periods(&window(), &products, &[], &[]);
        // The leading slice has no effective product, so only one period.
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].range.start(), d(2025, 5, 15));
        assert_eq!(periods[0].range.end(), d(2025, 5, 31));
    }

    #[test]
    fn test_suspension_cuts_three_ways() {
        let products = vec![flat_product(d(2025, 4, 1), None)];
        let suspensions = vec![Suspension {
            suspension_type: SuspensionType::Temporary,
            started_on: d(2025, 5, 10),
            ended_on: Some(d(2025, 5, 20)),
        }];
        let periods = build_prorated_periods(&window(), &products, &suspensions, &[]);
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].range.end(), d(2025, 5, 9));
        assert_eq!(periods[1].range.start(), d(2025, 5, 10));
        assert_eq!(periods[1].range.end(), d(2025, 5, 20));
        assert_eq!(periods[1].suspension_type, Some(SuspensionType::Temporary));
        assert_eq!(periods[2].range.start(), d(2025, 5, 21));
        assert!(periods[0].suspension_type.is_none());
        assert!(periods[2].suspension_type.is_none());
    }

    #[test]
    fn test_coverage_no_gaps_no_overlaps() {
        let products = vec![flat_product(d(2025, 5, 5), Some(d(2025, 5, 28)))];
        let suspensions = vec![Suspension {
            suspension_type: SuspensionType::NonPayment,
            started_on: d(2025, 5, 12),
            ended_on: Some(d(2025, 5, 18)),
        }];
        let factors = vec![AdditionalBillingFactor {
            factors: HashMap::from([("line_count".to_string(), "15".to_string())]),
            started_on: d(2025, 5, 20),
            ended_on: None,
        }];
        let periods = build_prorated_periods(&window(), &products, &suspensions, &factors);

        // Union of the product's periods covers exactly [05-05, 05-28].
        let mut expected = d(2025, 5, 5);
        for period in &periods {
            assert_eq!(period.range.start(), expected);
            expected = next_day(period.range.end());
        }
        let last = periods.last().expect("periods emitted");
        assert_eq!(last.range.end(), d(2025, 5, 28));
    }

    #[test]
    fn test_earliest_suspension_wins_tie_break() {
        let products = vec![flat_product(d(2025, 4, 1), None)];
        let suspensions = vec![
            Suspension {
                suspension_type: SuspensionType::NonPayment,
                started_on: d(2025, 5, 8),
                ended_on: Some(d(2025, 5, 25)),
            },
            Suspension {
                suspension_type: SuspensionType::Temporary,
                started_on: d(2025, 5, 5),
                ended_on: Some(d(2025, 5, 15)),
            },
        ];
        let periods = build_prorated_periods(&window(), &products, &suspensions, &[]);
        let overlapped = periods
            .iter()
            .find(|p| p.range.contains(d(2025, 5, 10)))
            .expect("overlapped period");
        assert_eq!(overlapped.suspension_type, Some(SuspensionType::Temporary));
    }

    #[test]
    fn test_factor_change_attaches_effective_factors() {
        let products = vec![flat_product(d(2025, 4, 1), None)];
        let factors = vec![
            AdditionalBillingFactor {
                factors: HashMap::from([("line_count".to_string(), "10".to_string())]),
                started_on: d(2025, 4, 1),
                ended_on: Some(d(2025, 5, 15)),
            },
            AdditionalBillingFactor {
                factors: HashMap::from([("line_count".to_string(), "20".to_string())]),
                started_on: d(2025, 5, 16),
                ended_on: None,
            },
        ];
        let periods = build_prorated_periods(&window(), &products, &[], &factors);
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].factors.quantity_of("line_count"), 10);
        assert_eq!(periods[1].factors.quantity_of("line_count"), 20);
    }

    #[test]
    fn test_no_entities_no_periods() {
        let periods = build_prorated_periods(&window(), &[], &[], &[]);
        assert!(periods.is_empty());
    }
}
