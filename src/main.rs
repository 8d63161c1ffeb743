//! MetricsForge: customer metrics and segmentation pipeline over
//! e-commerce order data
//!
//! This is the main entrypoint that orchestrates data loading, the
//! per-customer aggregation, the derived analyses, and the CSV export.

use anyhow::{Context, Result};
use clap::Parser;
use metricsforge::{
    aggregate, churn_rate, cohort_retention, daily_revenue, feature_matrix, fit_kmeans,
    load_tables, monthly_revenue, moving_average, state_summary, write_metrics_csv, Args,
    CustomerMetrics, OrderStatus, Satisfaction, Segment, SourceTables,
    DEFAULT_CHURN_WINDOW_DAYS,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if args.verbose {
        println!("MetricsForge - Customer Metrics & Segmentation");
        println!("==============================================\n");
    }

    run_pipeline(&args)
}

fn run_pipeline(args: &Args) -> Result<()> {
    println!("=== Customer Metrics Pipeline ===\n");

    let start_time = Instant::now();

    // Step 1: Load the four source tables
    if args.verbose {
        println!("Step 1: Loading source tables");
        println!("  Data directory: {}", args.data_dir);
    }

    let load_start = Instant::now();
    let tables = load_tables(Path::new(&args.data_dir))
        .with_context(|| format!("loading source tables from {}", args.data_dir))?;
    let load_time = load_start.elapsed();

    println!(
        "✓ Tables loaded: {} customers, {} orders, {} items, {} reviews",
        tables.customers.len(),
        tables.orders.len(),
        tables.items.len(),
        tables.reviews.len()
    );
    if args.verbose {
        println!("  Loading time: {:.2}s", load_time.as_secs_f64());
    }

    // Step 2: Aggregate per-customer metrics
    if args.verbose {
        println!("\nStep 2: Aggregating customer metrics");
    }

    let agg_start = Instant::now();
    let agg = aggregate(
        &tables.customers,
        &tables.orders,
        &tables.items,
        &tables.reviews,
    );
    let agg_time = agg_start.elapsed();

    println!("✓ Metrics computed for {} customers", agg.metrics.len());
    if !agg.discrepancies.is_clean() {
        println!(
            "  Dropped dangling references: {} orders, {} items, {} reviews",
            agg.discrepancies.orphaned_orders,
            agg.discrepancies.orphaned_items,
            agg.discrepancies.orphaned_reviews
        );
    }
    if args.verbose {
        println!("  Aggregation time: {:.2}s", agg_time.as_secs_f64());
    }

    // Step 3: Segment, satisfaction, churn, delivery summaries
    print_distributions(args, &tables, &agg.metrics)?;

    // Step 4: Cohort retention
    println!("\n=== Cohort Retention ===");
    let cohorts = cohort_retention(&agg.activity);
    print_cohorts(&cohorts);

    // Step 5: Revenue trends
    println!("\n=== Revenue Trends ===");
    let daily = daily_revenue(&tables.orders, &tables.items);
    print_revenue(&daily);

    // Step 6: State summary
    println!("\n=== Top States by Revenue ===");
    for row in state_summary(&tables.customers, &agg.metrics).iter().take(5) {
        let score = row
            .avg_review_score
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}: {} customers, {} orders, R$ {} revenue, avg review {}",
            row.state,
            row.customers,
            row.total_orders,
            row.total_revenue.round_dp(2),
            score
        );
    }

    // Step 7: Optional K-Means segmentation model
    if !args.skip_clustering {
        if agg.metrics.len() >= args.clusters {
            run_clustering(args, &agg.metrics)?;
        } else {
            println!("\n(skipping clustering: not enough customers)");
        }
    }

    // Step 8: Write the metrics table
    write_metrics_csv(Path::new(&args.output), &agg.metrics)
        .with_context(|| format!("writing metrics table to {}", args.output))?;

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());
    println!("Metrics table saved to: {}", args.output);

    Ok(())
}

/// Print segment/satisfaction distributions plus churn and delivery rates
fn print_distributions(
    args: &Args,
    tables: &SourceTables,
    metrics: &[CustomerMetrics],
) -> Result<()> {
    println!("\n=== Customer Distributions ===");

    let mut segments: BTreeMap<Segment, u64> = BTreeMap::new();
    let mut satisfaction: BTreeMap<Satisfaction, u64> = BTreeMap::new();
    for m in metrics {
        *segments.entry(m.segment).or_default() += 1;
        *satisfaction.entry(m.satisfaction).or_default() += 1;
    }

    let total = metrics.len().max(1) as f64;
    for (segment, count) in segments.iter().rev() {
        println!(
            "{}: {} customers ({:.1}%)",
            segment,
            count,
            *count as f64 / total * 100.0
        );
    }
    println!();
    for (tier, count) in satisfaction.iter().rev() {
        println!(
            "{}: {} customers ({:.1}%)",
            tier,
            count,
            *count as f64 / total * 100.0
        );
    }

    // Churn is measured against the supplied reference date, or the most
    // recent order in the snapshot
    let reference = match args.parse_reference_date()? {
        Some(date) => Some(date),
        None => metrics.iter().map(|m| m.last_order_date).max(),
    };
    if let Some(reference) = reference {
        let rate = churn_rate(metrics, reference, DEFAULT_CHURN_WINDOW_DAYS);
        println!(
            "\nChurn rate at {} ({}-day window): {:.1}%",
            reference,
            DEFAULT_CHURN_WINDOW_DAYS,
            rate * 100.0
        );
    }

    if !tables.orders.is_empty() {
        let delivered = tables
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Delivered)
            .count();
        println!(
            "Delivery success rate: {:.1}%",
            delivered as f64 / tables.orders.len() as f64 * 100.0
        );
    }

    Ok(())
}

/// Print the retention tail of the first few cohorts
fn print_cohorts(cohorts: &[metricsforge::CohortRow]) {
    if cohorts.is_empty() {
        println!("(no activity)");
        return;
    }

    let mut by_cohort: BTreeMap<metricsforge::Month, Vec<&metricsforge::CohortRow>> =
        BTreeMap::new();
    for row in cohorts {
        by_cohort.entry(row.cohort).or_default().push(row);
    }

    for (cohort, rows) in by_cohort.iter().take(6) {
        let size = rows.first().map(|r| r.cohort_size).unwrap_or(0);
        let tail: Vec<String> = rows
            .iter()
            .filter(|r| r.month_offset > 0)
            .take(6)
            .map(|r| format!("{:.0}%", r.retention_pct))
            .collect();
        let tail = if tail.is_empty() {
            "-".to_string()
        } else {
            tail.join(" ")
        };
        println!("{cohort} (n={size}): {tail}");
    }
}

fn print_revenue(daily: &[metricsforge::DailyRevenue]) {
    if daily.is_empty() {
        println!("(no revenue)");
        return;
    }

    let total = metricsforge::sales::total_revenue(daily);
    let avg_daily = total / Decimal::from(daily.len() as u64);
    println!("Total revenue: R$ {}", total.round_dp(2));
    println!("Average daily revenue: R$ {}", avg_daily.round_dp(2));
    println!("Months with sales: {}", monthly_revenue(daily).len());

    if let Some(Some(ma)) = moving_average(daily, 7).last() {
        println!("Trailing 7-day average: R$ {}", ma.round_dp(2));
    }
}

/// Fit the descriptive K-Means model and print its statistics
fn run_clustering(args: &Args, metrics: &[CustomerMetrics]) -> Result<()> {
    println!("\n=== K-Means Segmentation Model ===");

    if args.verbose {
        println!("  Number of clusters: {}", args.clusters);
        println!("  Max iterations: {}", args.max_iters);
        println!("  Tolerance: {}", args.tolerance);
    }

    let model_start = Instant::now();
    let data = feature_matrix(metrics)?;
    let model = fit_kmeans(&data, args.clusters, args.max_iters, args.tolerance, args.seed)?;
    let model_time = model_start.elapsed();

    println!("✓ Model fitted successfully");
    if args.verbose {
        println!("  Fitting time: {:.2}s", model_time.as_secs_f64());
    }

    let cluster_sizes = model.cluster_sizes();
    for (i, &size) in cluster_sizes.iter().enumerate() {
        let percentage = size as f64 / data.customer_ids.len() as f64 * 100.0;
        println!("Cluster {}: {} customers ({:.1}%)", i, size, percentage);
    }

    let silhouette =
        model.compute_silhouette_sample(&data.features, 100.min(data.customer_ids.len()));
    println!("\nSilhouette score (sample): {:.3}", silhouette);
    println!("Within-cluster sum of squares: {:.2}", model.inertia);

    Ok(())
}
