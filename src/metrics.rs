//! Per-customer grouped aggregation over the source relations
//!
//! One pass over an immutable snapshot of the four tables produces one
//! `CustomerMetrics` row per customer with at least one counted order,
//! plus a report of the dangling references dropped along the way. The
//! reduction is pure: running it twice on the same snapshot yields the
//! same output set.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::data::{Customer, Order, OrderItem, Review};
use crate::segment::{Satisfaction, Segment};

/// Churn window used by the reference analysis: no order in 90 days
pub const DEFAULT_CHURN_WINDOW_DAYS: i64 = 90;

/// Lifetime metrics for one customer, with derived classifications.
///
/// Rows only exist for customers with `total_orders >= 1`, so the average
/// order value is always well defined. Monetary fields carry full decimal
/// precision; rounding happens at presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerMetrics {
    pub customer_id: String,
    /// Distinct orders with at least one item
    pub total_orders: u64,
    /// Sum of price + freight over all items of the customer's orders
    pub total_spent: Decimal,
    pub avg_order_value: Decimal,
    pub first_order_date: NaiveDate,
    pub last_order_date: NaiveDate,
    /// `last_order_date - first_order_date`; 0 for a single order
    pub lifespan_days: i64,
    pub review_count: u64,
    /// Mean review score, `None` when the customer has no reviews
    pub avg_review_score: Option<f64>,
    pub segment: Segment,
    pub satisfaction: Satisfaction,
}

impl CustomerMetrics {
    /// Whether the customer counts as churned at `reference`: their last
    /// order is older than the trailing window.
    pub fn is_churned(&self, reference: NaiveDate, window_days: i64) -> bool {
        self.last_order_date < reference - Duration::days(window_days)
    }
}

/// Fraction of customers churned at `reference`, in `[0, 1]`
pub fn churn_rate(metrics: &[CustomerMetrics], reference: NaiveDate, window_days: i64) -> f64 {
    if metrics.is_empty() {
        return 0.0;
    }
    let churned = metrics
        .iter()
        .filter(|m| m.is_churned(reference, window_days))
        .count();
    churned as f64 / metrics.len() as f64
}

/// Counts of rows dropped from aggregation because their join key did not
/// resolve. Dangling references are not fatal; they are excluded and
/// reported here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscrepancyReport {
    /// Orders referencing a customer that does not exist
    pub orphaned_orders: u64,
    /// Items referencing an order that does not exist (or was orphaned)
    pub orphaned_items: u64,
    /// Reviews referencing an order that does not exist (or was orphaned)
    pub orphaned_reviews: u64,
}

impl DiscrepancyReport {
    pub fn total(&self) -> u64 {
        self.orphaned_orders + self.orphaned_items + self.orphaned_reviews
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// Result of one aggregation run
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// One row per customer with >= 1 counted order, sorted by customer id
    pub metrics: Vec<CustomerMetrics>,
    pub discrepancies: DiscrepancyReport,
    /// `(customer_id, purchase date)` for every counted order, the feed
    /// for cohort retention
    pub activity: Vec<(String, NaiveDate)>,
}

#[derive(Default)]
struct Accum<'a> {
    spent: Decimal,
    counted_orders: HashSet<&'a str>,
    first: Option<NaiveDateTime>,
    last: Option<NaiveDateTime>,
    review_sum: u64,
    review_count: u64,
}

/// Aggregate the four source relations into per-customer metrics.
///
/// Join policy: customers -> orders inner (customers without a counted
/// order are excluded), orders -> items one-to-many (items drive spend,
/// summed before the single division by order count), orders -> reviews
/// left (no reviews leaves the average undefined). Empty inputs produce
/// an empty output.
pub fn aggregate(
    customers: &[Customer],
    orders: &[Order],
    items: &[OrderItem],
    reviews: &[Review],
) -> Aggregation {
    let known_customers: HashSet<&str> =
        customers.iter().map(|c| c.customer_id.as_str()).collect();

    let mut discrepancies = DiscrepancyReport::default();

    // Orders that resolve to an existing customer, by order id
    let mut order_index: HashMap<&str, &Order> = HashMap::with_capacity(orders.len());
    for order in orders {
        if known_customers.contains(order.customer_id.as_str()) {
            order_index.insert(order.order_id.as_str(), order);
        } else {
            discrepancies.orphaned_orders += 1;
        }
    }

    let mut accums: HashMap<&str, Accum<'_>> = HashMap::new();

    for item in items {
        let Some(order) = order_index.get(item.order_id.as_str()) else {
            discrepancies.orphaned_items += 1;
            continue;
        };
        let accum = accums.entry(order.customer_id.as_str()).or_default();
        accum.spent += item.total();
        // An order becomes counted when its first item shows up; only
        // counted orders move the date range
        if accum.counted_orders.insert(order.order_id.as_str()) {
            let ts = order.purchased_at;
            accum.first = Some(accum.first.map_or(ts, |f| f.min(ts)));
            accum.last = Some(accum.last.map_or(ts, |l| l.max(ts)));
        }
    }

    for review in reviews {
        let Some(order) = order_index.get(review.order_id.as_str()) else {
            discrepancies.orphaned_reviews += 1;
            continue;
        };
        let accum = accums.entry(order.customer_id.as_str()).or_default();
        accum.review_sum += u64::from(review.score);
        accum.review_count += 1;
    }

    let mut metrics = Vec::with_capacity(accums.len());
    let mut activity = Vec::new();
    for (customer_id, accum) in accums {
        let total_orders = accum.counted_orders.len() as u64;
        let (Some(first), Some(last)) = (accum.first, accum.last) else {
            // Reviews resolved for this customer but no order ever got an
            // item: no counted order, no output row
            continue;
        };

        for order_id in &accum.counted_orders {
            activity.push((customer_id.to_string(), order_index[order_id].purchase_date()));
        }

        let total_spent = accum.spent;
        let avg_order_value = total_spent / Decimal::from(total_orders);
        let avg_review_score = (accum.review_count > 0)
            .then(|| accum.review_sum as f64 / accum.review_count as f64);

        metrics.push(CustomerMetrics {
            customer_id: customer_id.to_string(),
            total_orders,
            total_spent,
            avg_order_value,
            first_order_date: first.date(),
            last_order_date: last.date(),
            lifespan_days: (last.date() - first.date()).num_days(),
            review_count: accum.review_count,
            avg_review_score,
            segment: Segment::classify(total_spent, total_orders),
            satisfaction: Satisfaction::classify(avg_review_score),
        });
    }

    metrics.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
    activity.sort();
    debug!(
        customers = metrics.len(),
        dropped = discrepancies.total(),
        "aggregated customer metrics"
    );

    Aggregation {
        metrics,
        discrepancies,
        activity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::OrderStatus;
    use rust_decimal_macros::dec;

    fn customer(id: &str) -> Customer {
        Customer {
            customer_id: id.to_string(),
            city: "sao paulo".to_string(),
            state: "SP".to_string(),
        }
    }

    fn order(id: &str, customer_id: &str, ts: &str) -> Order {
        Order {
            order_id: id.to_string(),
            customer_id: customer_id.to_string(),
            status: OrderStatus::Delivered,
            purchased_at: NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap(),
        }
    }

    fn item(order_id: &str, price: Decimal, freight: Decimal) -> OrderItem {
        OrderItem {
            order_id: order_id.to_string(),
            price,
            freight,
        }
    }

    fn review(order_id: &str, score: u8) -> Review {
        Review {
            order_id: order_id.to_string(),
            score,
        }
    }

    #[test]
    fn test_basic_aggregation() {
        let customers = vec![customer("c1")];
        let orders = vec![
            order("o1", "c1", "2017-01-10 08:00:00"),
            order("o2", "c1", "2017-03-01 12:30:00"),
        ];
        let items = vec![
            item("o1", dec!(2.55), dec!(0.45)),
            item("o1", dec!(10.00), dec!(1.00)),
            item("o2", dec!(30.00), dec!(6.00)),
        ];
        let reviews = vec![review("o1", 5), review("o2", 4)];

        let agg = aggregate(&customers, &orders, &items, &reviews);
        assert!(agg.discrepancies.is_clean());
        assert_eq!(agg.metrics.len(), 1);

        let m = &agg.metrics[0];
        assert_eq!(m.total_orders, 2);
        assert_eq!(m.total_spent, dec!(50.00));
        assert_eq!(m.avg_order_value, dec!(25.00));
        assert_eq!(m.first_order_date, NaiveDate::from_ymd_opt(2017, 1, 10).unwrap());
        assert_eq!(m.last_order_date, NaiveDate::from_ymd_opt(2017, 3, 1).unwrap());
        assert_eq!(m.lifespan_days, 50);
        assert_eq!(m.avg_review_score, Some(4.5));
        assert_eq!(m.satisfaction, Satisfaction::VerySatisfied);
    }

    #[test]
    fn test_customers_without_orders_are_excluded() {
        let customers = vec![customer("c1"), customer("c2")];
        let orders = vec![order("o1", "c1", "2017-01-10 08:00:00")];
        let items = vec![item("o1", dec!(10), dec!(2))];

        let agg = aggregate(&customers, &orders, &items, &[]);
        assert_eq!(agg.metrics.len(), 1);
        assert_eq!(agg.metrics[0].customer_id, "c1");
        assert!(agg.metrics.iter().all(|m| m.total_orders >= 1));
    }

    #[test]
    fn test_order_without_items_is_not_counted() {
        let customers = vec![customer("c1")];
        // o2 never gets an item: it must not affect order count or dates
        let orders = vec![
            order("o1", "c1", "2017-02-01 08:00:00"),
            order("o2", "c1", "2017-06-01 08:00:00"),
        ];
        let items = vec![item("o1", dec!(100), dec!(10))];

        let agg = aggregate(&customers, &orders, &items, &[]);
        let m = &agg.metrics[0];
        assert_eq!(m.total_orders, 1);
        assert_eq!(m.lifespan_days, 0);
        assert_eq!(m.last_order_date, NaiveDate::from_ymd_opt(2017, 2, 1).unwrap());
        // An item-less order is present, not dangling
        assert!(agg.discrepancies.is_clean());
    }

    #[test]
    fn test_customer_with_only_itemless_orders_is_excluded() {
        let customers = vec![customer("c1")];
        let orders = vec![order("o1", "c1", "2017-02-01 08:00:00")];

        let agg = aggregate(&customers, &orders, &[], &[review("o1", 5)]);
        assert!(agg.metrics.is_empty());
        assert!(agg.discrepancies.is_clean());
    }

    #[test]
    fn test_no_reviews_leaves_average_undefined() {
        let customers = vec![customer("c1")];
        let orders = vec![order("o1", "c1", "2017-02-01 08:00:00")];
        let items = vec![item("o1", dec!(10), dec!(0))];

        let agg = aggregate(&customers, &orders, &items, &[]);
        let m = &agg.metrics[0];
        assert_eq!(m.avg_review_score, None);
        assert_eq!(m.satisfaction, Satisfaction::Unknown);
    }

    #[test]
    fn test_review_scores_average() {
        let customers = vec![customer("c1")];
        let orders = vec![
            order("o1", "c1", "2017-01-01 08:00:00"),
            order("o2", "c1", "2017-01-02 08:00:00"),
            order("o3", "c1", "2017-01-03 08:00:00"),
        ];
        let items = vec![
            item("o1", dec!(10), dec!(0)),
            item("o2", dec!(10), dec!(0)),
            item("o3", dec!(10), dec!(0)),
        ];
        let reviews = vec![review("o1", 5), review("o2", 4), review("o3", 5)];

        let agg = aggregate(&customers, &orders, &items, &reviews);
        let m = &agg.metrics[0];
        let avg = m.avg_review_score.unwrap();
        assert!((avg - 14.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.satisfaction, Satisfaction::VerySatisfied);
    }

    #[test]
    fn test_dangling_references_are_dropped_and_counted() {
        let customers = vec![customer("c1")];
        let orders = vec![
            order("o1", "c1", "2017-01-01 08:00:00"),
            order("o2", "ghost", "2017-01-02 08:00:00"),
        ];
        let items = vec![
            item("o1", dec!(10), dec!(1)),
            item("o2", dec!(99), dec!(9)),
            item("o9", dec!(50), dec!(5)),
        ];
        let reviews = vec![review("o1", 4), review("o9", 1)];

        let agg = aggregate(&customers, &orders, &items, &reviews);
        assert_eq!(agg.discrepancies.orphaned_orders, 1);
        // o2 itself is orphaned, so its item dangles too
        assert_eq!(agg.discrepancies.orphaned_items, 2);
        assert_eq!(agg.discrepancies.orphaned_reviews, 1);
        assert_eq!(agg.discrepancies.total(), 4);

        let m = &agg.metrics[0];
        assert_eq!(m.total_spent, dec!(11));
        assert_eq!(m.avg_review_score, Some(4.0));
    }

    #[test]
    fn test_empty_inputs_produce_empty_output() {
        let agg = aggregate(&[], &[], &[], &[]);
        assert!(agg.metrics.is_empty());
        assert!(agg.activity.is_empty());
        assert!(agg.discrepancies.is_clean());
    }

    #[test]
    fn test_exact_decimal_accumulation() {
        // 1000 items of 0.10 + 0.01 must sum to exactly 110.00
        let customers = vec![customer("c1")];
        let orders = vec![order("o1", "c1", "2017-01-01 08:00:00")];
        let items: Vec<OrderItem> = (0..1000)
            .map(|_| item("o1", dec!(0.10), dec!(0.01)))
            .collect();

        let agg = aggregate(&customers, &orders, &items, &[]);
        assert_eq!(agg.metrics[0].total_spent, dec!(110.00));
    }

    #[test]
    fn test_spend_is_summed_before_dividing() {
        // Two orders with very different item counts: the average must be
        // total / orders, not a mean of per-order means
        let customers = vec![customer("c1")];
        let orders = vec![
            order("o1", "c1", "2017-01-01 08:00:00"),
            order("o2", "c1", "2017-01-02 08:00:00"),
        ];
        let items = vec![
            item("o1", dec!(10), dec!(0)),
            item("o1", dec!(10), dec!(0)),
            item("o1", dec!(10), dec!(0)),
            item("o2", dec!(60), dec!(0)),
        ];

        let agg = aggregate(&customers, &orders, &items, &[]);
        let m = &agg.metrics[0];
        assert_eq!(m.total_spent, dec!(90));
        assert_eq!(m.avg_order_value, dec!(45));
    }

    #[test]
    fn test_idempotent_over_the_same_snapshot() {
        let customers = vec![customer("c1"), customer("c2")];
        let orders = vec![
            order("o1", "c1", "2017-01-01 08:00:00"),
            order("o2", "c2", "2017-02-01 08:00:00"),
        ];
        let items = vec![
            item("o1", dec!(10), dec!(1)),
            item("o2", dec!(20), dec!(2)),
        ];
        let reviews = vec![review("o1", 3)];

        let first = aggregate(&customers, &orders, &items, &reviews);
        let second = aggregate(&customers, &orders, &items, &reviews);
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.discrepancies, second.discrepancies);
    }

    #[test]
    fn test_segment_scenarios() {
        // 6 orders, 1200 total -> High-Value Loyal; 1 order, 5000 -> Occasional
        let customers = vec![customer("loyal"), customer("whale")];
        let mut orders = Vec::new();
        let mut items = Vec::new();
        for i in 0..6 {
            let id = format!("l{i}");
            orders.push(order(&id, "loyal", "2017-01-01 08:00:00"));
            items.push(item(&id, dec!(200), dec!(0)));
        }
        orders.push(order("w1", "whale", "2017-01-01 08:00:00"));
        items.push(item("w1", dec!(5000), dec!(0)));

        let agg = aggregate(&customers, &orders, &items, &[]);
        let by_id: HashMap<&str, &CustomerMetrics> = agg
            .metrics
            .iter()
            .map(|m| (m.customer_id.as_str(), m))
            .collect();

        assert_eq!(by_id["loyal"].segment, Segment::HighValueLoyal);
        assert_eq!(by_id["whale"].segment, Segment::OccasionalBuyer);
    }

    #[test]
    fn test_churn_labeling() {
        let customers = vec![customer("c1")];
        let orders = vec![order("o1", "c1", "2017-01-01 08:00:00")];
        let items = vec![item("o1", dec!(10), dec!(0))];

        let agg = aggregate(&customers, &orders, &items, &[]);
        let m = &agg.metrics[0];

        let soon = NaiveDate::from_ymd_opt(2017, 2, 1).unwrap();
        let later = NaiveDate::from_ymd_opt(2017, 6, 1).unwrap();
        assert!(!m.is_churned(soon, DEFAULT_CHURN_WINDOW_DAYS));
        assert!(m.is_churned(later, DEFAULT_CHURN_WINDOW_DAYS));

        assert_eq!(churn_rate(&agg.metrics, later, DEFAULT_CHURN_WINDOW_DAYS), 1.0);
        assert_eq!(churn_rate(&agg.metrics, soon, DEFAULT_CHURN_WINDOW_DAYS), 0.0);
        assert_eq!(churn_rate(&[], later, DEFAULT_CHURN_WINDOW_DAYS), 0.0);
    }
}
