//! Cohort-wide summary and trend deltas
//!
//! Class tallies are reduced by addition first; cohort rates and averages are
//! computed once from the reduced totals. The cohort sleep average is the one
//! exception: it is taken over every check-in in the window, not only each
//! student's latest. Deltas compare the active window with the preceding window
//! of equal length.

use std::collections::{BTreeMap, BTreeSet};

use crate::aggregate::{rate, ClassTally, StudentResult};
use crate::types::{
    ClassAggregate, CohortSummary, ConsultMessage, MoodEvent, Tier, TrendMetric,
};

/// Reduced figures for one window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowMetrics {
    /// Distinct students with at least one check-in in the window
    pub unique_student_count: usize,
    pub totals: ClassTally,
    pub consult_count: usize,
    pub urgent_consult_count: usize,
    /// Low-mood students who also sent a consult in the window
    pub low_mood_consulters: usize,
    /// Check-ins in the window with a countable sleep value
    pub sleep_samples: usize,
    pub sleep_hours_total: f64,
}

impl WindowMetrics {
    pub fn low_mood_rate(&self) -> Option<f64> {
        if self.totals.record_count == 0 {
            None
        } else {
            Some(self.totals.low_mood_rate())
        }
    }

    pub fn consult_follow_through_rate(&self) -> Option<f64> {
        if self.totals.low_mood_count == 0 {
            None
        } else {
            Some(rate(self.low_mood_consulters, self.totals.low_mood_count))
        }
    }

    pub fn avg_sleep_hours(&self) -> Option<f64> {
        if self.sleep_samples == 0 {
            None
        } else {
            Some(self.sleep_hours_total / self.sleep_samples as f64)
        }
    }

    /// Value of a trend metric, `None` when it is undefined for this window
    pub fn value(&self, metric: TrendMetric) -> Option<f64> {
        match metric {
            TrendMetric::ActiveStudents => Some(self.unique_student_count as f64),
            TrendMetric::LowMoodRate => self.low_mood_rate(),
            TrendMetric::AvgSleepHours => self.avg_sleep_hours(),
            TrendMetric::ConsultCount => Some(self.consult_count as f64),
            TrendMetric::UrgentConsultCount => Some(self.urgent_consult_count as f64),
            TrendMetric::UrgentStudents => Some(self.totals.tier_counts.get(Tier::Urgent) as f64),
            TrendMetric::CautionStudents => {
                Some(self.totals.tier_counts.get(Tier::Caution) as f64)
            }
            TrendMetric::WatchStudents => Some(self.totals.tier_counts.get(Tier::Watch) as f64),
        }
    }
}

/// Computes cohort KPI cards from class aggregates
pub struct CohortSummarizer;

impl CohortSummarizer {
    /// Reduce one window.
    ///
    /// `checkins` and `consults` must already be restricted to the window;
    /// anonymous messages count toward the consult totals.
    pub fn window_metrics<'a>(
        classes: &[ClassAggregate],
        results: &[StudentResult],
        checkins: impl IntoIterator<Item = &'a MoodEvent>,
        consults: &[ConsultMessage],
    ) -> WindowMetrics {
        let mut ordered: Vec<&ClassAggregate> = classes.iter().collect();
        ordered.sort_by(|a, b| a.class_id.cmp(&b.class_id));
        let totals = ordered
            .into_iter()
            .map(ClassTally::from)
            .fold(ClassTally::default(), ClassTally::merge);

        let mut sleep: Vec<&MoodEvent> = checkins
            .into_iter()
            .filter(|e| e.countable_sleep().is_some())
            .collect();
        sleep.sort_by(|a, b| a.user_id.cmp(&b.user_id).then_with(|| a.recency_cmp(b)));
        let sleep_hours_total: f64 = sleep.iter().filter_map(|e| e.countable_sleep()).sum();

        let consulters: BTreeSet<&str> = consults
            .iter()
            .filter_map(|c| c.user_id.as_deref())
            .collect();
        let low_mood_consulters = results
            .iter()
            .filter(|r| r.latest.is_low_mood())
            .map(StudentResult::user_id)
            .collect::<BTreeSet<&str>>()
            .intersection(&consulters)
            .count();

        WindowMetrics {
            unique_student_count: totals.record_count,
            totals,
            consult_count: consults.len(),
            urgent_consult_count: consults.iter().filter(|c| c.is_urgent()).count(),
            low_mood_consulters,
            sleep_samples: sleep.len(),
            sleep_hours_total,
        }
    }

    /// Delta of one metric; `None` when the previous window has no value for it
    pub fn delta(
        metric: TrendMetric,
        current: &WindowMetrics,
        previous: &WindowMetrics,
    ) -> Option<f64> {
        let tier_metric = matches!(
            metric,
            TrendMetric::UrgentStudents | TrendMetric::CautionStudents | TrendMetric::WatchStudents
        );
        if tier_metric && previous.unique_student_count == 0 {
            return None;
        }
        Some(current.value(metric)? - previous.value(metric)?)
    }

    pub fn summarize(current: &WindowMetrics, previous: Option<&WindowMetrics>) -> CohortSummary {
        let trend_deltas: BTreeMap<TrendMetric, Option<f64>> = TrendMetric::ALL
            .iter()
            .map(|metric| {
                let delta = previous.and_then(|prev| Self::delta(*metric, current, prev));
                (*metric, delta)
            })
            .collect();

        CohortSummary {
            unique_student_count: current.unique_student_count,
            tier_counts: current.totals.tier_counts,
            consult_count: current.consult_count,
            urgent_consult_count: current.urgent_consult_count,
            avg_sleep_hours: current.avg_sleep_hours(),
            low_mood_rate: current.totals.low_mood_rate(),
            consult_follow_through_rate: current.consult_follow_through_rate(),
            trend_deltas,
        }
    }
}
