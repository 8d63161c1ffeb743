//! Typed records for the four source relations and their CSV adapters
//!
//! The aggregation core operates on plain record slices; this module owns
//! the tabular edge: reading the Olist-style CSV exports into typed rows
//! and writing the computed metrics table back out. Any row that cannot be
//! parsed into the expected shape is a schema violation and fails the whole
//! run with the offending file, line, and column named — no partial output.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use tracing::debug;

use crate::metrics::CustomerMetrics;

/// Default file names, matching the Kaggle Brazilian e-commerce export
pub const CUSTOMERS_FILE: &str = "olist_customers_dataset.csv";
pub const ORDERS_FILE: &str = "olist_orders_dataset.csv";
pub const ORDER_ITEMS_FILE: &str = "olist_order_items_dataset.csv";
pub const REVIEWS_FILE: &str = "olist_order_reviews_dataset.csv";

/// A customer with their location
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    #[serde(rename = "customer_city")]
    pub city: String,
    #[serde(rename = "customer_state")]
    pub state: String,
}

/// Lifecycle status of an order. The vocabulary is closed: a status string
/// outside this set is a schema violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Approved,
    Processing,
    Invoiced,
    Shipped,
    Delivered,
    Canceled,
    Unavailable,
}

/// An order placed by exactly one customer
#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    #[serde(rename = "order_status")]
    pub status: OrderStatus,
    #[serde(
        rename = "order_purchase_timestamp",
        deserialize_with = "de_timestamp"
    )]
    pub purchased_at: NaiveDateTime,
}

impl Order {
    /// Calendar date of the purchase
    pub fn purchase_date(&self) -> NaiveDate {
        self.purchased_at.date()
    }
}

/// A line item of an order, carrying its price and freight cost
#[derive(Debug, Clone, Deserialize)]
pub struct OrderItem {
    pub order_id: String,
    pub price: Decimal,
    #[serde(rename = "freight_value")]
    pub freight: Decimal,
}

impl OrderItem {
    /// Price plus freight, the amount this item contributes to spend
    pub fn total(&self) -> Decimal {
        self.price + self.freight
    }
}

/// A review attached to an order, with a score in 1..=5
#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    pub order_id: String,
    #[serde(rename = "review_score", deserialize_with = "de_review_score")]
    pub score: u8,
}

/// The four source relations, as loaded from one snapshot
#[derive(Debug, Clone)]
pub struct SourceTables {
    pub customers: Vec<Customer>,
    pub orders: Vec<Order>,
    pub items: Vec<OrderItem>,
    pub reviews: Vec<Review>,
}

/// Load all four relations from a directory using the Olist file names
pub fn load_tables(dir: &Path) -> crate::Result<SourceTables> {
    let tables = SourceTables {
        customers: load_customers(&dir.join(CUSTOMERS_FILE))?,
        orders: load_orders(&dir.join(ORDERS_FILE))?,
        items: load_order_items(&dir.join(ORDER_ITEMS_FILE))?,
        reviews: load_reviews(&dir.join(REVIEWS_FILE))?,
    };
    debug!(
        customers = tables.customers.len(),
        orders = tables.orders.len(),
        items = tables.items.len(),
        reviews = tables.reviews.len(),
        "loaded source tables"
    );
    Ok(tables)
}

pub fn load_customers(path: &Path) -> crate::Result<Vec<Customer>> {
    load_table(path)
}

pub fn load_orders(path: &Path) -> crate::Result<Vec<Order>> {
    load_table(path)
}

pub fn load_order_items(path: &Path) -> crate::Result<Vec<OrderItem>> {
    load_table(path)
}

pub fn load_reviews(path: &Path) -> crate::Result<Vec<Review>> {
    load_table(path)
}

/// Write the customer metrics table as CSV.
///
/// Monetary columns are rounded to 2 decimal places here and only here;
/// the aggregation keeps full precision. `avg_review_score` is left blank
/// for customers without reviews.
pub fn write_metrics_csv(path: &Path, metrics: &[CustomerMetrics]) -> crate::Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| write_err(path, e))?;
    writer
        .write_record([
            "customer_id",
            "total_orders",
            "total_spent",
            "avg_order_value",
            "first_order_date",
            "last_order_date",
            "lifespan_days",
            "avg_review_score",
            "segment",
            "satisfaction_level",
        ])
        .map_err(|e| write_err(path, e))?;

    for m in metrics {
        writer
            .write_record([
                m.customer_id.clone(),
                m.total_orders.to_string(),
                m.total_spent.round_dp(2).to_string(),
                m.avg_order_value.round_dp(2).to_string(),
                m.first_order_date.to_string(),
                m.last_order_date.to_string(),
                m.lifespan_days.to_string(),
                m.avg_review_score
                    .map(|s| format!("{s:.2}"))
                    .unwrap_or_default(),
                m.segment.to_string(),
                m.satisfaction.to_string(),
            ])
            .map_err(|e| write_err(path, e))?;
    }

    writer.flush().map_err(|source| crate::Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!(rows = metrics.len(), path = %path.display(), "wrote metrics table");
    Ok(())
}

fn load_table<T>(path: &Path) -> crate::Result<Vec<T>>
where
    T: serde::de::DeserializeOwned,
{
    let mut reader = csv::Reader::from_path(path).map_err(|e| read_err(path, e))?;
    let headers = reader.headers().map_err(|e| read_err(path, e))?.clone();

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.map_err(|e| schema_err(path, &headers, e))?);
    }
    Ok(rows)
}

fn read_err(path: &Path, err: csv::Error) -> crate::Error {
    let path_str = path.display().to_string();
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let detail = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => crate::Error::Io {
            path: path_str,
            source,
        },
        _ => crate::Error::Schema {
            path: path_str,
            line,
            column: String::from("<record>"),
            detail,
        },
    }
}

fn schema_err(path: &Path, headers: &csv::StringRecord, err: csv::Error) -> crate::Error {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let (column, detail) = match err.kind() {
        csv::ErrorKind::Deserialize { err: de, .. } => {
            let column = de
                .field()
                .and_then(|i| headers.get(i as usize))
                .unwrap_or("<record>")
                .to_string();
            (column, de.kind().to_string())
        }
        _ => (String::from("<record>"), err.to_string()),
    };
    crate::Error::Schema {
        path: path.display().to_string(),
        line,
        column,
        detail,
    }
}

fn write_err(path: &Path, source: csv::Error) -> crate::Error {
    crate::Error::Csv {
        path: path.display().to_string(),
        source,
    }
}

/// Accepted purchase timestamp formats: the Olist export uses a space
/// separator, re-exports commonly use the `T` variant
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

fn de_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&raw, fmt).ok())
        .ok_or_else(|| serde::de::Error::custom(format!("unparsable timestamp `{raw}`")))
}

fn de_review_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let score = u8::deserialize(deserializer)?;
    if !(1..=5).contains(&score) {
        return Err(serde::de::Error::custom(format!(
            "review score {score} outside the 1-5 range"
        )));
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn test_load_orders() {
        let file = write_csv(&[
            "order_id,customer_id,order_status,order_purchase_timestamp",
            "o1,c1,delivered,2017-10-02 10:56:33",
            "o2,c1,shipped,2017-11-03T09:00:00",
        ]);

        let orders = load_orders(file.path()).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].status, OrderStatus::Delivered);
        assert_eq!(
            orders[0].purchase_date(),
            NaiveDate::from_ymd_opt(2017, 10, 2).unwrap()
        );
        assert_eq!(orders[1].status, OrderStatus::Shipped);
    }

    #[test]
    fn test_load_items_keeps_exact_decimals() {
        let file = write_csv(&[
            "order_id,price,freight_value",
            "o1,2.55,0.10",
            "o1,3.39,0.01",
        ]);

        let items = load_order_items(file.path()).unwrap();
        assert_eq!(items[0].total().to_string(), "2.65");
        assert_eq!(items[1].total().to_string(), "3.40");
    }

    #[test]
    fn test_unparsable_date_is_schema_error() {
        let file = write_csv(&[
            "order_id,customer_id,order_status,order_purchase_timestamp",
            "o1,c1,delivered,not-a-date",
        ]);

        let err = load_orders(file.path()).unwrap_err();
        match err {
            crate::Error::Schema { line, column, .. } => {
                assert_eq!(line, 2);
                assert_eq!(column, "order_purchase_timestamp");
            }
            other => panic!("expected schema error, got {other}"),
        }
    }

    #[test]
    fn test_unknown_status_is_schema_error() {
        let file = write_csv(&[
            "order_id,customer_id,order_status,order_purchase_timestamp",
            "o1,c1,refunded,2017-10-02 10:56:33",
        ]);

        assert!(matches!(
            load_orders(file.path()),
            Err(crate::Error::Schema { .. })
        ));
    }

    #[test]
    fn test_out_of_range_score_is_schema_error() {
        let file = write_csv(&["review_id,order_id,review_score", "r1,o1,6"]);

        let err = load_reviews(file.path()).unwrap_err();
        match err {
            crate::Error::Schema { column, .. } => assert_eq!(column, "review_score"),
            other => panic!("expected schema error, got {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let missing = Path::new("/nonexistent/customers.csv");
        assert!(matches!(
            load_customers(missing),
            Err(crate::Error::Io { .. })
        ));
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let file = write_csv(&[
            "customer_id,customer_unique_id,customer_zip_code_prefix,customer_city,customer_state",
            "c1,u1,10000,sao paulo,SP",
        ]);

        let customers = load_customers(file.path()).unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].state, "SP");
    }
}
