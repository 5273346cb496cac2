//! Temporal ranges
//!
//! Inclusive date ranges with overlap, clipping and day-count operations.
//! Every dated entity in the rating domain (contract, product, suspension,
//! billing factor, discount) exposes its validity through the [`Effective`]
//! trait and is partitioned against the billing window with these helpers.

use chrono::{Datelike, Days, NaiveDate};
use rating_core::{RatingError, Result};
use serde::{Deserialize, Serialize};

/// Sentinel end date for open-ended subscriptions.
pub const OPEN_END: NaiveDate = NaiveDate::MAX;

/// An inclusive `[start, end]` date range. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TemporalRange {
    /// Builds a range, rejecting inverted bounds instead of swapping them.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(RatingError::Validation(format!(
                "invalid temporal range: {} > {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn overlaps(&self, other: &TemporalRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Intersection with `other`, or `None` when the ranges are disjoint.
    pub fn clip_to(&self, other: &TemporalRange) -> Option<TemporalRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(TemporalRange { start, end })
    }

    /// Number of days covered, counting both bounds.
    pub fn inclusive_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Days in the calendar month containing the range start.
    pub fn days_in_start_month(&self) -> i64 {
        days_in_month(self.start)
    }
}

/// Days in the calendar month containing `date`.
pub fn days_in_month(date: NaiveDate) -> i64 {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .unwrap_or(date);
    let next = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
    .unwrap_or(date);
    (next - first).num_days()
}

/// Next calendar day, saturating at the far-future sentinel.
pub fn next_day(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(OPEN_END)
}

/// A dated domain entity. Open-ended entities report [`OPEN_END`].
pub trait Effective {
    fn effective_start(&self) -> NaiveDate;

    fn effective_end(&self) -> NaiveDate;

    /// The entity's validity clipped to `window`, or `None` when the
    /// entity is not effective anywhere inside it.
    fn effective_range_within(&self, window: &TemporalRange) -> Option<TemporalRange> {
        let start = self.effective_start();
        let end = self.effective_end();
        if start > end {
            return None;
        }
        TemporalRange { start, end }.clip_to(window)
    }
}

// Partitioning iterates borrowed entity lists; references stay usable
// wherever an `Effective` bound is required.
impl<T: Effective + ?Sized> Effective for &T {
    fn effective_start(&self) -> NaiveDate {
        (**self).effective_start()
    }

    fn effective_end(&self) -> NaiveDate {
        (**self).effective_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    fn range(s: NaiveDate, e: NaiveDate) -> TemporalRange {
        TemporalRange::new(s, e).expect("valid range")
    }

    #[test]
    fn test_inverted_range_rejected() {
        let result = TemporalRange::new(d(2025, 5, 10), d(2025, 5, 1));
        assert!(result.is_err());
    }

    #[test]
    fn test_single_day_range() {
        let r = range(d(2025, 5, 10), d(2025, 5, 10));
        assert_eq!(r.inclusive_days(), 1);
    }

    #[test]
    fn test_overlaps() {
        let a = range(d(2025, 5, 1), d(2025, 5, 10));
        let b = range(d(2025, 5, 10), d(2025, 5, 20));
        let c = range(d(2025, 5, 11), d(2025, 5, 20));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_clip_to() {
        let a = range(d(2025, 5, 5), d(2025, 5, 25));
        let w = range(d(2025, 5, 1), d(2025, 5, 15));
        let clipped = a.clip_to(&w).expect("overlapping");
        assert_eq!(clipped.start(), d(2025, 5, 5));
        assert_eq!(clipped.end(), d(2025, 5, 15));

        let disjoint = range(d(2025, 6, 1), d(2025, 6, 30));
        assert!(disjoint.clip_to(&w).is_none());
    }

    #[test]
    fn test_inclusive_days() {
        let r = range(d(2025, 5, 15), d(2025, 5, 31));
        assert_eq!(r.inclusive_days(), 17);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(d(2025, 5, 15)), 31);
        assert_eq!(days_in_month(d(2025, 4, 1)), 30);
        assert_eq!(days_in_month(d(2024, 2, 29)), 29);
        assert_eq!(days_in_month(d(2025, 2, 1)), 28);
        assert_eq!(days_in_month(d(2025, 12, 31)), 31);
    }

    struct Span(NaiveDate, NaiveDate);

    impl Effective for Span {
        fn effective_start(&self) -> NaiveDate {
            self.0
        }
        fn effective_end(&self) -> NaiveDate {
            self.1
        }
    }

    #[test]
    fn test_effective_range_within() {
        let w = range(d(2025, 5, 1), d(2025, 5, 31));
        let clipped = Span(d(2025, 4, 20), d(2025, 5, 10))
            .effective_range_within(&w)
            .expect("overlapping");
        assert_eq!(clipped.start(), d(2025, 5, 1));
        assert_eq!(clipped.end(), d(2025, 5, 10));

        assert!(Span(d(2025, 6, 1), OPEN_END).effective_range_within(&w).is_none());
        // Inverted entity dates are treated as empty, never swapped.
        assert!(Span(d(2025, 5, 20), d(2025, 5, 10)).effective_range_within(&w).is_none());
    }

    fn clipped<E: Effective>(entity: E, window: &TemporalRange) -> Option<TemporalRange> {
        entity.effective_range_within(window)
    }

    #[test]
    fn test_effective_holds_through_references() {
        let w = range(d(2025, 5, 1), d(2025, 5, 31));
        let span = Span(d(2025, 5, 10), d(2025, 5, 20));
        let direct = clipped(&span, &w).expect("overlapping");
        let doubled = clipped(&&span, &w).expect("overlapping");
        assert_eq!(direct, doubled);
        assert_eq!(direct.start(), d(2025, 5, 10));
        assert_eq!(direct.end(), d(2025, 5, 20));
    }
}
