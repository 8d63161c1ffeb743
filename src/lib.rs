//! MetricsForge: customer metrics aggregation and segmentation for
//! e-commerce order data
//!
//! This library turns raw order/customer/item/review records into one row
//! per customer with lifetime metrics, classifies each customer into value
//! segments and satisfaction tiers, and derives the companion analyses the
//! metrics table feeds: cohort retention, revenue trends, state rollups,
//! churn labels, and a K-Means segmentation model.

pub mod cli;
pub mod cluster;
pub mod cohort;
pub mod data;
pub mod error;
pub mod geo;
pub mod metrics;
pub mod sales;
pub mod segment;

// Re-export public items for easier access
pub use cli::Args;
pub use cluster::{feature_matrix, fit_kmeans, predict_cluster, FeatureMatrix, SegmentationModel};
pub use cohort::{cohort_retention, CohortRow, Month};
pub use data::{
    load_tables, write_metrics_csv, Customer, Order, OrderItem, OrderStatus, Review, SourceTables,
};
pub use error::Error;
pub use geo::{state_summary, StateSummary};
pub use metrics::{
    aggregate, churn_rate, Aggregation, CustomerMetrics, DiscrepancyReport,
    DEFAULT_CHURN_WINDOW_DAYS,
};
pub use sales::{daily_revenue, monthly_revenue, moving_average, DailyRevenue, MonthlyRevenue};
pub use segment::{Satisfaction, Segment};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;
