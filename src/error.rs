//! Groupcast error types.
//!
//! All fallible operations in the crate return [`Result`]. Errors carry
//! enough context to pin a failure to one experiment, one trace line, or
//! one invalid record; a failed experiment never poisons the others.

use thiserror::Error;

use crate::graph::NodeId;

/// Groupcast errors.
#[derive(Error, Debug)]
pub enum SimError {
    /// A contact record was rejected (self-loop or empty interval).
    #[error("Invalid contact between {node_a} and {node_b}: {reason}")]
    InvalidContact {
        /// First endpoint of the rejected contact.
        node_a: NodeId,
        /// Second endpoint of the rejected contact.
        node_b: NodeId,
        /// Why the record was rejected.
        reason: String,
    },

    /// Mobility-trace parsing failed.
    #[error("Trace error at line {line}: {reason}")]
    Trace {
        /// 1-based line number in the trace file.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Delivery store error.
    #[error("Store error: {0}")]
    Store(String),

    /// An experiment's simulation task failed or was abandoned.
    #[error("Experiment {id} failed: {reason}")]
    Experiment {
        /// Identifier of the failed experiment.
        id: u64,
        /// Failure description.
        reason: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for groupcast operations
pub type Result<T> = std::result::Result<T, SimError>;

impl From<toml::de::Error> for SimError {
    fn from(err: toml::de::Error) -> Self {
        SimError::Config(err.to_string())
    }
}
