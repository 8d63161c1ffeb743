//! State-level rollup of the aggregated metrics

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::data::Customer;
use crate::metrics::CustomerMetrics;

/// Aggregated performance of one customer state
#[derive(Debug, Clone, PartialEq)]
pub struct StateSummary {
    pub state: String,
    /// Customers with metrics rows in this state
    pub customers: u64,
    pub total_orders: u64,
    pub total_revenue: Decimal,
    /// Review-weighted mean score over the state's reviewed customers,
    /// `None` when the state has no reviews at all
    pub avg_review_score: Option<f64>,
}

/// Roll the metrics table up by customer state, highest revenue first.
///
/// The customers slice supplies the state of each metrics row; rows whose
/// customer is absent from it are skipped.
pub fn state_summary(customers: &[Customer], metrics: &[CustomerMetrics]) -> Vec<StateSummary> {
    let state_of: HashMap<&str, &str> = customers
        .iter()
        .map(|c| (c.customer_id.as_str(), c.state.as_str()))
        .collect();

    #[derive(Default)]
    struct Accum {
        customers: u64,
        orders: u64,
        revenue: Decimal,
        score_sum: f64,
        score_count: u64,
    }

    let mut states: BTreeMap<&str, Accum> = BTreeMap::new();
    for m in metrics {
        let Some(state) = state_of.get(m.customer_id.as_str()) else {
            continue;
        };
        let acc = states.entry(*state).or_default();
        acc.customers += 1;
        acc.orders += m.total_orders;
        acc.revenue += m.total_spent;
        if let Some(avg) = m.avg_review_score {
            // Weight by review count so the state mean equals the mean
            // over its underlying reviews
            acc.score_sum += avg * m.review_count as f64;
            acc.score_count += m.review_count;
        }
    }

    let mut rows: Vec<StateSummary> = states
        .into_iter()
        .map(|(state, acc)| StateSummary {
            state: state.to_string(),
            customers: acc.customers,
            total_orders: acc.orders,
            total_revenue: acc.revenue,
            avg_review_score: (acc.score_count > 0)
                .then(|| acc.score_sum / acc.score_count as f64),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_revenue
            .cmp(&a.total_revenue)
            .then_with(|| a.state.cmp(&b.state))
    });
    rows
}
