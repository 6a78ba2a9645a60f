use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{context}: missing required field '{field}'")]
    MissingField { context: String, field: String },
    #[error("unknown simulation '{0}'. valid simulations: sim-1,sim-2,sim-3,sim-4")]
    UnknownSimulation(String),
    #[error("unknown method '{method}' in dfc entry {index}")]
    UnknownMethod { index: usize, method: String },
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: String,
        expected: usize,
        got: usize,
    },
    #[error("cannot align output of '{method}': expected {expected} timesteps, estimator returned {got}")]
    Alignment {
        method: String,
        expected: usize,
        got: usize,
    },
    #[error("insufficient data for {context}: need at least {required} points, got {actual}")]
    InsufficientData {
        context: String,
        required: usize,
        actual: usize,
    },
    #[error("numerical failure: {0}")]
    Numerical(String),
    #[error("missing persisted trace: {}", .0.display())]
    MissingTrace(PathBuf),
    #[error("invalid data table: {0}")]
    InvalidTable(String),
}

impl BenchError {
    pub(crate) fn missing(context: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            context: context.into(),
            field: field.into(),
        }
    }
}
