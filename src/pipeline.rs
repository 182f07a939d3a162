//! Pipeline orchestration
//!
//! This module provides the public API for Synheart Cohort.
//! One evaluation run goes from raw store documents to a [`CohortReport`].
//!
//! Pipeline stages:
//! 1. EventRepository - Fetch every check-in and consult for the scope up to `now`
//! 2. RecordAdapter - Validate documents into strict entities
//! 3. History - Group per student, newest first
//! 4. RiskClassifier - Classify every active student (parallel)
//! 5. ClassAggregator - Reduce by class
//! 6. CohortSummarizer - Reduce across classes, compare with the previous window

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregate::{ClassAggregator, StudentResult};
use crate::classifier::{RiskClassifier, RuleTable};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::history::{build_histories, consults_as_of, group_consults, UserHistory};
use crate::repository::{EventRepository, Scope, TimeRange};
use crate::schema::RecordAdapter;
use crate::summary::CohortSummarizer;
use crate::types::{CohortReport, ConsultMessage, IngestStats, MoodEvent};
use crate::{COHORT_VERSION, PRODUCER_NAME};

/// Evaluation engine over an injected event repository.
///
/// The engine holds configuration only; every call to [`CohortEngine::evaluate`]
/// works from a fresh snapshot and the caller-supplied instant.
///
/// # Example
/// ```ignore
/// let repo = InMemoryRepository::new(checkins, consults);
/// let engine = CohortEngine::new(repo, EngineConfig::default())?;
/// let report = engine.evaluate(&Scope::group("school-1"), Utc::now())?;
/// ```
pub struct CohortEngine<R> {
    repository: R,
    config: EngineConfig,
    classifier: RiskClassifier,
    parallel: bool,
}

impl<R: EventRepository> CohortEngine<R> {
    /// Create an engine, rejecting invalid configuration
    pub fn new(repository: R, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let classifier = RiskClassifier::new(&config);
        Ok(Self {
            repository,
            config,
            classifier,
            parallel: true,
        })
    }

    /// Replace the standard rule table
    pub fn with_rule_table(mut self, table: RuleTable) -> Self {
        self.classifier = self.classifier.with_rule_table(table);
        self
    }

    /// Classify students on the rayon pool (default) or sequentially
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Run one evaluation anchored at `now`.
    ///
    /// Histories are fetched without a lower bound so streak and staleness
    /// rules see every earlier record; the windows only decide who is active
    /// and what is counted. Only repository failures abort the run. Malformed records are dropped
    /// and counted in the report's ingest statistics.
    pub fn evaluate(&self, scope: &Scope, now: DateTime<Utc>) -> Result<CohortReport, EngineError> {
        let current = TimeRange::trailing(now, self.config.window_days);
        let previous = current.preceding();
        let fetch_range = TimeRange::until(now);

        info!(
            group = scope.group_id.as_deref().unwrap_or("*"),
            class = scope.class_id.as_deref().unwrap_or("*"),
            window_days = self.config.window_days,
            now = %now,
            "Starting cohort evaluation"
        );

        // Stage 1: Fetch
        let raw_checkins = self.repository.fetch_checkins(scope, &fetch_range)?;
        let raw_consults = self.repository.fetch_consults(scope, &fetch_range)?;
        debug!(
            checkins = raw_checkins.len(),
            consults = raw_consults.len(),
            "Fetched raw documents"
        );

        // Stage 2: Validate at the ingestion boundary
        let adapter = RecordAdapter::new(&self.config);
        let checkins = adapter.ingest_checkins(&raw_checkins);
        let consults = adapter.ingest_consults(&raw_consults);
        let ingest = IngestStats {
            checkins_accepted: checkins.records.len(),
            checkins_dropped: checkins.dropped(),
            consults_accepted: consults.records.len(),
            consults_dropped: consults.dropped(),
        };

        // Stage 3: Per-student histories
        let histories = build_histories(checkins.records);
        let consult_index = group_consults(&consults.records);
        debug!(students = histories.len(), "Built histories");

        // Stage 4: Classify both windows
        let current_results = self.classify_window(&histories, &consult_index, &current);
        let previous_results = self.classify_window(&histories, &consult_index, &previous);

        // Stage 5: Class aggregates
        let aggregator = ClassAggregator::new(&self.config);
        let classes = aggregator.aggregate(&current_results);
        let previous_classes = aggregator.aggregate(&previous_results);

        // Stage 6: Cohort summary
        let current_consults = consults_in(&consults.records, &current);
        let previous_consults = consults_in(&consults.records, &previous);
        let current_metrics = CohortSummarizer::window_metrics(
            &classes,
            &current_results,
            events_in(&histories, &current),
            &current_consults,
        );
        let previous_metrics = CohortSummarizer::window_metrics(
            &previous_classes,
            &previous_results,
            events_in(&histories, &previous),
            &previous_consults,
        );
        let summary = CohortSummarizer::summarize(&current_metrics, Some(&previous_metrics));

        let daily_heatmap = aggregator.daily_heatmap(events_in(&histories, &current), &current);
        let daily_trend = aggregator.daily_trend(events_in(&histories, &current), &current);

        info!(
            students = summary.unique_student_count,
            urgent = summary.tier_counts.urgent,
            caution = summary.tier_counts.caution,
            watch = summary.tier_counts.watch,
            classes = classes.len(),
            "Cohort evaluation complete"
        );

        Ok(CohortReport {
            run_id: Uuid::new_v4(),
            producer: PRODUCER_NAME.to_string(),
            version: COHORT_VERSION.to_string(),
            evaluated_at: now,
            window_days: self.config.window_days,
            scope: scope.clone(),
            ingest,
            classifications: current_results
                .into_iter()
                .map(|r| r.classification)
                .collect(),
            classes,
            daily_heatmap,
            daily_trend,
            summary,
        })
    }

    /// Classify every student with a check-in inside `range`, as of its end.
    ///
    /// Results are ordered by user id whichever way they were computed.
    fn classify_window(
        &self,
        histories: &BTreeMap<String, UserHistory>,
        consults: &BTreeMap<String, Vec<ConsultMessage>>,
        range: &TimeRange,
    ) -> Vec<StudentResult> {
        let classifier = &self.classifier;
        let classify_one = |(user_id, history): (&String, &UserHistory)| -> Option<StudentResult> {
            if !history.active_in(range) {
                return None;
            }
            let events = history.as_of(range.end);
            let latest = events.first()?.clone();
            let user_consults = consults
                .get(user_id)
                .map(|c| consults_as_of(c, range.end))
                .unwrap_or(&[]);
            let classification = classifier.classify(user_id, events, user_consults, range.end);
            Some(StudentResult {
                latest,
                classification,
            })
        };

        let mut results: Vec<StudentResult> = if self.parallel {
            histories.par_iter().filter_map(classify_one).collect()
        } else {
            histories.iter().filter_map(classify_one).collect()
        };
        results.sort_by(|a, b| a.user_id().cmp(b.user_id()));
        results
    }
}

fn events_in<'a>(
    histories: &'a BTreeMap<String, UserHistory>,
    range: &'a TimeRange,
) -> impl Iterator<Item = &'a MoodEvent> + 'a {
    histories
        .values()
        .flat_map(|h| h.events())
        .filter(move |e| range.contains(e.timestamp))
}

fn consults_in(consults: &[ConsultMessage], range: &TimeRange) -> Vec<ConsultMessage> {
    consults
        .iter()
        .filter(|c| range.contains(c.timestamp))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryRepository, RepositoryError, RawDocument};
    use crate::types::{Tier, TrendMetric};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 14, 8, 30, 0).unwrap()
    }

    struct FailingRepository;

    impl EventRepository for FailingRepository {
        fn fetch_checkins(
            &self,
            _scope: &Scope,
            _range: &TimeRange,
        ) -> Result<Vec<RawDocument>, RepositoryError> {
            Err(RepositoryError::Unavailable("connection refused".to_string()))
        }

        fn fetch_consults(
            &self,
            _scope: &Scope,
            _range: &TimeRange,
        ) -> Result<Vec<RawDocument>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_repository_failure_aborts_run() {
        let engine = CohortEngine::new(FailingRepository, EngineConfig::default()).unwrap();
        let result = engine.evaluate(&Scope::all(), now());
        assert!(matches!(result, Err(EngineError::Repository(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig::default().with_window_days(0);
        assert!(CohortEngine::new(InMemoryRepository::default(), config).is_err());
    }

    #[test]
    fn test_empty_store_gives_empty_report() {
        let engine =
            CohortEngine::new(InMemoryRepository::default(), EngineConfig::default()).unwrap();
        let report = engine.evaluate(&Scope::all(), now()).unwrap();

        assert!(report.classifications.is_empty());
        assert!(report.classes.is_empty());
        assert_eq!(report.summary.unique_student_count, 0);
        assert_eq!(report.summary.delta(TrendMetric::LowMoodRate), None);
        assert_eq!(report.daily_trend.len(), 8);
        assert_eq!(report.producer, PRODUCER_NAME);
    }

    #[test]
    fn test_previous_window_student_not_active_now() {
        let repo = InMemoryRepository::new(
            vec![
                json!({"ts": "2025-11-05T08:00:00Z", "uid": "a", "class_id": "1A", "mood": "low"}),
                json!({"ts": "2025-11-13T08:00:00Z", "uid": "b", "class_id": "1A", "mood": "calm"}),
            ],
            vec![],
        );
        let engine = CohortEngine::new(repo, EngineConfig::default()).unwrap();
        let report = engine.evaluate(&Scope::all(), now()).unwrap();

        assert_eq!(report.classifications.len(), 1);
        assert_eq!(report.classifications[0].user_id, "b");
        assert_eq!(report.summary.delta(TrendMetric::ActiveStudents), Some(0.0));
        assert_eq!(report.summary.delta(TrendMetric::WatchStudents), Some(-1.0));
        assert_eq!(report.summary.tier_counts.get(Tier::None), 1);
    }
}
