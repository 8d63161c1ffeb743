//! Customer value segments and satisfaction tiers
//!
//! Both classifiers are total pure functions of the metrics row. The rules
//! are ordered matches with explicit fallthrough so the tie-break order is
//! auditable in isolation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt;

/// Customer value tier derived from lifetime spend and order count.
///
/// Variants are declared in ascending order so that `Ord` reflects tier
/// value, which the monotonicity tests rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Segment {
    #[serde(rename = "Occasional Buyer")]
    OccasionalBuyer,
    #[serde(rename = "Low-Value Regular")]
    LowValueRegular,
    #[serde(rename = "Medium-Value Active")]
    MediumValueActive,
    #[serde(rename = "High-Value Loyal")]
    HighValueLoyal,
}

impl Segment {
    /// Classify a customer from total spend and order count.
    ///
    /// First match wins, thresholds are inclusive lower bounds, and both
    /// conditions of a rule must hold: a customer with huge spend but a
    /// single order falls through to `OccasionalBuyer`.
    pub fn classify(total_spent: Decimal, total_orders: u64) -> Self {
        match (total_spent, total_orders) {
            (s, o) if s >= dec!(1000) && o >= 5 => Self::HighValueLoyal,
            (s, o) if s >= dec!(500) && o >= 3 => Self::MediumValueActive,
            (s, o) if s >= dec!(200) && o >= 2 => Self::LowValueRegular,
            _ => Self::OccasionalBuyer,
        }
    }

    /// Human-readable label used in the output table
    pub fn label(&self) -> &'static str {
        match self {
            Self::HighValueLoyal => "High-Value Loyal",
            Self::MediumValueActive => "Medium-Value Active",
            Self::LowValueRegular => "Low-Value Regular",
            Self::OccasionalBuyer => "Occasional Buyer",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Satisfaction tier derived from the average review score.
///
/// A customer without reviews is `Unknown`, an explicit tier: the absence
/// of reviews is never coerced to a numeric default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Satisfaction {
    #[serde(rename = "Unknown")]
    Unknown,
    #[serde(rename = "Dissatisfied")]
    Dissatisfied,
    #[serde(rename = "Neutral")]
    Neutral,
    #[serde(rename = "Satisfied")]
    Satisfied,
    #[serde(rename = "Very Satisfied")]
    VerySatisfied,
}

impl Satisfaction {
    /// Classify a customer from their average review score, if any.
    pub fn classify(avg_review_score: Option<f64>) -> Self {
        match avg_review_score {
            None => Self::Unknown,
            Some(s) if s >= 4.5 => Self::VerySatisfied,
            Some(s) if s >= 4.0 => Self::Satisfied,
            Some(s) if s >= 3.0 => Self::Neutral,
            Some(_) => Self::Dissatisfied,
        }
    }

    /// Human-readable label used in the output table
    pub fn label(&self) -> &'static str {
        match self {
            Self::VerySatisfied => "Very Satisfied",
            Self::Satisfied => "Satisfied",
            Self::Neutral => "Neutral",
            Self::Dissatisfied => "Dissatisfied",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Satisfaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
