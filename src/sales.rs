//! Revenue rollups over time: daily series, monthly totals, moving averages

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::cohort::Month;
use crate::data::{Order, OrderItem};

/// Item revenue summed over one purchase day
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Decimal,
}

/// Item revenue summed over one calendar month
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyRevenue {
    pub month: Month,
    pub revenue: Decimal,
}

/// Sum item revenue (price + freight) per purchase day, sorted by day.
///
/// Items whose order id does not resolve are skipped here; the aggregator
/// is the place that accounts for them. Days without sales do not appear.
pub fn daily_revenue(orders: &[Order], items: &[OrderItem]) -> Vec<DailyRevenue> {
    let purchase_day: HashMap<&str, NaiveDate> = orders
        .iter()
        .map(|o| (o.order_id.as_str(), o.purchase_date()))
        .collect();

    let mut days: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for item in items {
        if let Some(date) = purchase_day.get(item.order_id.as_str()) {
            *days.entry(*date).or_default() += item.total();
        }
    }
    days.into_iter()
        .map(|(date, revenue)| DailyRevenue { date, revenue })
        .collect()
}

/// Roll a daily series up to calendar months
pub fn monthly_revenue(daily: &[DailyRevenue]) -> Vec<MonthlyRevenue> {
    let mut months: BTreeMap<Month, Decimal> = BTreeMap::new();
    for day in daily {
        *months.entry(Month::of(day.date)).or_default() += day.revenue;
    }
    months
        .into_iter()
        .map(|(month, revenue)| MonthlyRevenue { month, revenue })
        .collect()
}

/// Trailing moving average over the daily series, aligned with the input.
///
/// `None` until the window is full, like a strict rolling mean. The mean
/// is taken over observed sales days, not calendar days.
pub fn moving_average(daily: &[DailyRevenue], window: usize) -> Vec<Option<Decimal>> {
    if window == 0 {
        return vec![None; daily.len()];
    }
    let mut out = Vec::with_capacity(daily.len());
    let mut running = Decimal::ZERO;
    for (i, day) in daily.iter().enumerate() {
        running += day.revenue;
        if i >= window {
            running -= daily[i - window].revenue;
        }
        if i + 1 >= window {
            out.push(Some(running / Decimal::from(window as u64)));
        } else {
            out.push(None);
        }
    }
    out
}

/// Total revenue across the series
pub fn total_revenue(daily: &[DailyRevenue]) -> Decimal {
    daily.iter().map(|d| d.revenue).sum()
}
