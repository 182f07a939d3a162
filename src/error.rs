//! Error types for Synheart Cohort

use thiserror::Error;

use crate::repository::RepositoryError;

/// Errors that abort an evaluation run or a configuration load.
///
/// Data-shape problems in individual records never surface here; they are
/// dropped at the ingestion boundary and counted instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Repository fetch failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),
}
