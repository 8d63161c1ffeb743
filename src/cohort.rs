//! Cohort retention by first-order month
//!
//! Customers are grouped by the calendar month of their first counted
//! order. For every later month up to the last activity month in the
//! snapshot, the table reports how many of the cohort's customers were
//! still ordering, as a percentage of the cohort's size. Months where
//! nobody remained show up as 0%, they are never omitted.

use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A calendar month, stored as a flat index so month arithmetic is plain
/// integer arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month(i32);

impl Month {
    pub fn of(date: NaiveDate) -> Self {
        Month(date.year() * 12 + date.month0() as i32)
    }

    pub fn year(self) -> i32 {
        self.0.div_euclid(12)
    }

    pub fn month(self) -> u32 {
        self.0.rem_euclid(12) as u32 + 1
    }

    /// Number of months from `earlier` to `self`
    pub fn offset_from(self, earlier: Month) -> i32 {
        self.0 - earlier.0
    }

    pub fn plus(self, months: i32) -> Self {
        Month(self.0 + months)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

/// One cell of the retention table
#[derive(Debug, Clone, PartialEq)]
pub struct CohortRow {
    pub cohort: Month,
    /// 0 for the cohort's own month
    pub month_offset: u32,
    pub cohort_size: u64,
    pub active_customers: u64,
    /// `active_customers / cohort_size * 100`; 100.0 at offset 0 by
    /// definition
    pub retention_pct: f64,
}

/// Build the retention table from `(customer, order date)` activity pairs,
/// as produced by the aggregator.
///
/// Rows are ordered by cohort month, then offset. Every cohort is reported
/// from its own month through the latest activity month in the snapshot.
pub fn cohort_retention(activity: &[(String, NaiveDate)]) -> Vec<CohortRow> {
    let mut by_customer: BTreeMap<&str, BTreeSet<Month>> = BTreeMap::new();
    for (customer, date) in activity {
        by_customer
            .entry(customer.as_str())
            .or_default()
            .insert(Month::of(*date));
    }

    let Some(last_month) = by_customer
        .values()
        .flat_map(|months| months.iter().copied())
        .max()
    else {
        return Vec::new();
    };

    // cohort month -> (size, active customer count per month)
    let mut cohorts: BTreeMap<Month, (u64, BTreeMap<Month, u64>)> = BTreeMap::new();
    for months in by_customer.values() {
        let Some(first) = months.iter().next().copied() else {
            continue;
        };
        let (size, active) = cohorts.entry(first).or_default();
        *size += 1;
        for month in months {
            *active.entry(*month).or_default() += 1;
        }
    }

    let mut rows = Vec::new();
    for (cohort, (size, active)) in cohorts {
        for offset in 0..=last_month.offset_from(cohort) {
            let month = cohort.plus(offset);
            let count = active.get(&month).copied().unwrap_or(0);
            let retention_pct = if size == 0 {
                0.0
            } else {
                count as f64 / size as f64 * 100.0
            };
            rows.push(CohortRow {
                cohort,
                month_offset: offset as u32,
                cohort_size: size,
                active_customers: count,
                retention_pct,
            });
        }
    }
    rows
}
