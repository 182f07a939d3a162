//! Synheart Cohort - Tiered wellbeing screening for student cohorts
//!
//! Cohort turns anonymized daily check-ins (mood, sleep, symptoms) and
//! consultation messages into per-student risk tiers, then rolls them up to
//! class and cohort level through a deterministic pipeline: repository fetch →
//! validation → per-student history → tiered classification → class
//! aggregation → cohort summary with trend deltas.
//!
//! ## Modules
//!
//! - **Ingestion**: `repository`, `schema` (raw documents to strict records)
//! - **Classification**: `lexicon`, `symptoms`, `window`, `classifier`
//! - **Reduction**: `aggregate`, `summary`, orchestrated by `pipeline`

pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod error;
pub mod history;
pub mod lexicon;
pub mod pipeline;
pub mod repository;
pub mod schema;
pub mod summary;
pub mod symptoms;
pub mod types;
pub mod window;

pub use aggregate::{ClassAggregator, ClassTally, StudentResult};
pub use classifier::{RiskClassifier, Rule, RuleContext, RuleTable};
pub use config::{EngineConfig, RiskThresholds};
pub use error::EngineError;
pub use lexicon::LexiconMatcher;
pub use pipeline::CohortEngine;
pub use repository::{EventRepository, InMemoryRepository, RepositoryError, Scope, TimeRange};
pub use summary::{CohortSummarizer, WindowMetrics};
pub use symptoms::SymptomCounter;
pub use window::TemporalWindowEvaluator;

// Schema exports
pub use schema::{RawDocument, RecordAdapter, ValidationError};

/// Cohort version embedded in every report
pub const COHORT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "synheart-cohort";
