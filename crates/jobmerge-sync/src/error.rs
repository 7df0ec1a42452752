use std::fmt;

use jobmerge_adapters::AdapterError;
use jobmerge_core::SourceKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which collection a record index points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Failures that abort a run before any output exists.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("candidate pair references {side} record {index}, but only {len} {side} records exist")]
    Alignment { side: Side, index: usize, len: usize },
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Data-quality findings returned next to a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineWarning {
    DuplicateKey { job_key: String, count: usize },
    SourceSkipped { source: SourceKind, reason: String },
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineWarning::DuplicateKey { job_key, count } => {
                write!(f, "job key `{job_key}` produced by {count} records")
            }
            EngineWarning::SourceSkipped { source, reason } => {
                write!(f, "source {source} skipped: {reason}")
            }
        }
    }
}
