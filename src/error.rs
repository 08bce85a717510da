//! Error taxonomy for loading, aggregating and navigating the report.
use crate::types::Level;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    /// The data source could not be read at all.
    #[error("failed to load {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    /// The data source was read but does not have the state/city/school/job shape.
    #[error("malformed dataset in {path}: {detail}")]
    SchemaError { path: PathBuf, detail: String },

    #[error("{level} '{key}' not found")]
    NotFound { level: Level, key: String },

    /// `expected` was zero, so no percentage exists.
    #[error("percentage undefined for {allocated} allocated out of 0 expected")]
    DivisionUndefined { allocated: i64 },

    #[error("cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        from: Level,
        to: Level,
        reason: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    /// Whether the error leaves the session without any data to show.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReportError::LoadFailed { .. } | ReportError::SchemaError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
