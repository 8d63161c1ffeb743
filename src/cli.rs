//! Command-line interface definitions and argument parsing

use chrono::NaiveDate;
use clap::Parser;

/// Customer metrics and segmentation pipeline over e-commerce order data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing the four source CSV files (Olist file names)
    #[arg(short, long, default_value = "data")]
    pub data_dir: String,

    /// Output path for the customer metrics CSV
    #[arg(short, long, default_value = "customer_metrics.csv")]
    pub output: String,

    /// Reference date for churn labeling (YYYY-MM-DD).
    /// Defaults to the latest order date in the snapshot.
    #[arg(short, long)]
    pub reference_date: Option<String>,

    /// Number of clusters for the K-Means pass
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Skip fitting the K-Means segmentation model
    #[arg(long)]
    pub skip_clustering: bool,

    /// Maximum iterations for K-Means convergence
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Seed for K-Means initialization, fixed for reproducible runs
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the churn reference date, if one was supplied
    pub fn parse_reference_date(&self) -> crate::Result<Option<NaiveDate>> {
        match &self.reference_date {
            None => Ok(None),
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| {
                    crate::Error::InvalidInput(format!(
                        "reference date must be YYYY-MM-DD, got `{raw}`"
                    ))
                }),
        }
    }
}
