//! Error types shared across the library

use thiserror::Error;

/// Errors produced while loading source tables or running the analysis
#[derive(Debug, Error)]
pub enum Error {
    /// A source file could not be opened or read
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A row violated the expected schema. Schema violations are fatal for
    /// the run: no partial output is emitted.
    #[error("schema violation in {path} at line {line}, column `{column}`: {detail}")]
    Schema {
        path: String,
        /// 1-based line in the source file, 0 when unknown
        line: u64,
        column: String,
        detail: String,
    },

    /// Failure while writing the output table
    #[error("failed to write {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Invalid parameters supplied by the caller
    #[error("{0}")]
    InvalidInput(String),

    /// K-Means fitting failed to converge or was misconfigured
    #[error("clustering failed: {0}")]
    Clustering(String),
}
