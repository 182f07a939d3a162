//! Core types for the Synheart Cohort engine
//!
//! This module defines the data structures that flow through each stage of an
//! evaluation run: validated check-in and consult records, per-student risk
//! classifications, class-level aggregates and the cohort summary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::repository::Scope;

/// Self-reported mood on a daily check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Calm,
    Neutral,
    Low,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Calm => "calm",
            Mood::Neutral => "neutral",
            Mood::Low => "low",
        }
    }

    /// Parse a mood label as written by the check-in clients.
    ///
    /// Accepts the canonical words, a few synonyms and the emoji used by the
    /// student app. Matching on words is case-insensitive.
    pub fn from_label(label: &str) -> Option<Mood> {
        let trimmed = label.trim();
        match trimmed {
            "😊" | "😌" | "😄" => return Some(Mood::Calm),
            "🙂" | "😐" => return Some(Mood::Neutral),
            "😟" | "😢" | "😞" | "😭" => return Some(Mood::Low),
            _ => {}
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "calm" | "good" | "great" | "happy" => Some(Mood::Calm),
            "neutral" | "ok" | "okay" | "normal" => Some(Mood::Neutral),
            "low" | "bad" | "sad" | "tough" => Some(Mood::Low),
            _ => None,
        }
    }

    /// Map a 1-5 mood level (1 = worst) onto the three-point scale.
    pub fn from_level(level: i64) -> Option<Mood> {
        match level {
            1 | 2 => Some(Mood::Low),
            3 => Some(Mood::Neutral),
            4 | 5 => Some(Mood::Calm),
            _ => None,
        }
    }
}

/// Upstream risk hint attached to a consult message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskHint {
    Urgent,
    Medium,
    Low,
}

impl RiskHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskHint::Urgent => "urgent",
            RiskHint::Medium => "medium",
            RiskHint::Low => "low",
        }
    }

    pub fn from_label(label: &str) -> Option<RiskHint> {
        match label.trim().to_ascii_lowercase().as_str() {
            "urgent" | "high" => Some(RiskHint::Urgent),
            "medium" | "mid" => Some(RiskHint::Medium),
            "low" => Some(RiskHint::Low),
            _ => None,
        }
    }
}

/// A validated daily mood/sleep/symptom check-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEvent {
    /// When the check-in was submitted (UTC)
    pub timestamp: DateTime<Utc>,
    /// Anonymized student identifier
    pub user_id: String,
    /// Class identifier (blank input is bucketed to the unknown class)
    pub class_id: String,
    /// Reported mood
    pub mood: Mood,
    /// Hours slept the previous night
    pub sleep_hours: Option<f64>,
    /// Symptom tags in canonical snake_case form
    pub symptoms: BTreeSet<String>,
    /// Optional free-text memo
    pub memo: Option<String>,
    /// Risk flag set upstream on the check-in itself
    #[serde(default)]
    pub urgent_flag: bool,
}

impl MoodEvent {
    pub fn is_low_mood(&self) -> bool {
        self.mood == Mood::Low
    }

    /// Sleep value usable for averages: defined and strictly positive.
    pub fn countable_sleep(&self) -> Option<f64> {
        self.sleep_hours.filter(|hours| *hours > 0.0)
    }

    /// Ordering used for histories: newest first, remaining fields break ties
    /// so equal timestamps never depend on input order.
    pub fn recency_cmp(&self, other: &MoodEvent) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| self.class_id.cmp(&other.class_id))
            .then_with(|| self.mood.cmp(&other.mood))
            .then_with(|| {
                self.sleep_hours
                    .map(f64::to_bits)
                    .cmp(&other.sleep_hours.map(f64::to_bits))
            })
            .then_with(|| self.symptoms.cmp(&other.symptoms))
            .then_with(|| self.memo.cmp(&other.memo))
    }
}

/// A validated free-text consultation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultMessage {
    /// When the message was sent (UTC)
    pub timestamp: DateTime<Utc>,
    /// Sender, absent for fully anonymous messages
    pub user_id: Option<String>,
    /// Class identifier of the sender
    pub class_id: String,
    /// Message body
    pub message: String,
    /// Upstream risk hint
    pub risk_hint: Option<RiskHint>,
    /// Topic tags chosen by the sender
    pub topics: BTreeSet<String>,
}

impl ConsultMessage {
    pub fn is_urgent(&self) -> bool {
        self.risk_hint == Some(RiskHint::Urgent)
    }

    pub fn recency_cmp(&self, other: &ConsultMessage) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| self.message.cmp(&other.message))
            .then_with(|| self.risk_hint.cmp(&other.risk_hint))
            .then_with(|| self.class_id.cmp(&other.class_id))
    }
}

/// Risk tier, ordered `None < Watch < Caution < Urgent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    None,
    Watch,
    Caution,
    Urgent,
}

impl Tier {
    /// Tiers that carry rules, highest priority first
    pub const ESCALATION_ORDER: [Tier; 3] = [Tier::Urgent, Tier::Caution, Tier::Watch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::None => "none",
            Tier::Watch => "watch",
            Tier::Caution => "caution",
            Tier::Urgent => "urgent",
        }
    }
}

/// Number of students per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub urgent: usize,
    pub caution: usize,
    pub watch: usize,
    pub none: usize,
}

impl TierCounts {
    pub fn record(&mut self, tier: Tier) {
        match tier {
            Tier::Urgent => self.urgent += 1,
            Tier::Caution => self.caution += 1,
            Tier::Watch => self.watch += 1,
            Tier::None => self.none += 1,
        }
    }

    pub fn get(&self, tier: Tier) -> usize {
        match tier {
            Tier::Urgent => self.urgent,
            Tier::Caution => self.caution,
            Tier::Watch => self.watch,
            Tier::None => self.none,
        }
    }

    pub fn merge(self, other: TierCounts) -> TierCounts {
        TierCounts {
            urgent: self.urgent + other.urgent,
            caution: self.caution + other.caution,
            watch: self.watch + other.watch,
            none: self.none + other.none,
        }
    }

    pub fn total(&self) -> usize {
        self.urgent + self.caution + self.watch + self.none
    }
}

/// Outcome of classifying one student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskClassification {
    pub user_id: String,
    pub tier: Tier,
    /// Messages of every matching rule in the assigned tier, in rule-table order.
    /// Empty iff `tier` is `None`.
    pub reasons: Vec<String>,
}

impl RiskClassification {
    pub fn none(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: Tier::None,
            reasons: Vec::new(),
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.tier != Tier::None
    }
}

/// Per-class rollup of students' latest check-ins and classifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAggregate {
    pub class_id: String,
    /// Human-readable class name (falls back to the class id)
    pub display_name: String,
    /// Distinct students whose latest check-in belongs to this class
    pub record_count: usize,
    pub low_mood_count: usize,
    /// `low_mood_count / record_count`, 0 when the class is empty
    pub low_mood_rate: f64,
    /// Students whose latest check-in lists at least one canonical symptom
    pub symptomatic_count: usize,
    /// `symptomatic_count / record_count`, 0 when the class is empty
    pub symptom_rate: f64,
    /// Students contributing a countable sleep value
    pub sleep_samples: usize,
    /// Sum of countable sleep values (hours)
    pub sleep_hours_total: f64,
    /// Mean over countable sleep values, absent when there are none
    pub avg_sleep_hours: Option<f64>,
    /// Mood of the most recent check-in in the class
    pub latest_mood: Option<Mood>,
    pub tier_counts: TierCounts,
    /// Flagged students, highest tier first
    pub follow_students: Vec<RiskClassification>,
}

/// Low-mood share for one class on one calendar day (UTC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub class_id: String,
    pub date: NaiveDate,
    pub records: usize,
    pub low_count: usize,
    pub low_mood_rate: f64,
}

/// Cohort-wide check-in volume for one calendar day (UTC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub records: usize,
    pub low_count: usize,
    pub low_mood_rate: f64,
}

/// Metrics tracked against the preceding window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMetric {
    ActiveStudents,
    LowMoodRate,
    AvgSleepHours,
    ConsultCount,
    UrgentConsultCount,
    UrgentStudents,
    CautionStudents,
    WatchStudents,
}

impl TrendMetric {
    pub const ALL: [TrendMetric; 8] = [
        TrendMetric::ActiveStudents,
        TrendMetric::LowMoodRate,
        TrendMetric::AvgSleepHours,
        TrendMetric::ConsultCount,
        TrendMetric::UrgentConsultCount,
        TrendMetric::UrgentStudents,
        TrendMetric::CautionStudents,
        TrendMetric::WatchStudents,
    ];
}

/// Cohort-wide KPI cards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    /// Distinct students with at least one check-in in the window
    pub unique_student_count: usize,
    pub tier_counts: TierCounts,
    /// Consult messages sent in the window (anonymous ones included)
    pub consult_count: usize,
    pub urgent_consult_count: usize,
    pub avg_sleep_hours: Option<f64>,
    /// Computed from summed class counts, never from averaged class rates
    pub low_mood_rate: f64,
    /// Share of low-mood students who also sent a consult in the window
    pub consult_follow_through_rate: Option<f64>,
    /// Current minus previous window value; `None` when undefined
    pub trend_deltas: BTreeMap<TrendMetric, Option<f64>>,
}

impl CohortSummary {
    pub fn delta(&self, metric: TrendMetric) -> Option<f64> {
        self.trend_deltas.get(&metric).copied().flatten()
    }
}

/// Accepted/dropped record counts at the ingestion boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub checkins_accepted: usize,
    pub checkins_dropped: usize,
    pub consults_accepted: usize,
    pub consults_dropped: usize,
}

/// Complete result of one evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortReport {
    pub run_id: Uuid,
    pub producer: String,
    pub version: String,
    pub evaluated_at: DateTime<Utc>,
    pub window_days: i64,
    pub scope: Scope,
    pub ingest: IngestStats,
    /// One classification per active student, ordered by user id
    pub classifications: Vec<RiskClassification>,
    /// Class aggregates in heatmap order
    pub classes: Vec<ClassAggregate>,
    pub daily_heatmap: Vec<HeatmapCell>,
    pub daily_trend: Vec<DailyPoint>,
    pub summary: CohortSummary,
}

impl CohortReport {
    /// Class aggregates in roster (display name) order
    pub fn roster(&self) -> Vec<&ClassAggregate> {
        let mut rows: Vec<&ClassAggregate> = self.classes.iter().collect();
        rows.sort_by(|a, b| crate::aggregate::roster_cmp(a, b));
        rows
    }

    /// Every flagged student across the cohort, highest tier first
    pub fn follow_students(&self) -> Vec<&RiskClassification> {
        let mut flagged: Vec<&RiskClassification> = self
            .classifications
            .iter()
            .filter(|c| c.is_flagged())
            .collect();
        flagged.sort_by(|a, b| b.tier.cmp(&a.tier).then_with(|| a.user_id.cmp(&b.user_id)));
        flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mood_labels() {
        assert_eq!(Mood::from_label("low"), Some(Mood::Low));
        assert_eq!(Mood::from_label(" Calm "), Some(Mood::Calm));
        assert_eq!(Mood::from_label("😟"), Some(Mood::Low));
        assert_eq!(Mood::from_label("🙂"), Some(Mood::Neutral));
        assert_eq!(Mood::from_label("sleepy"), None);
    }

    #[test]
    fn test_mood_levels() {
        assert_eq!(Mood::from_level(1), Some(Mood::Low));
        assert_eq!(Mood::from_level(3), Some(Mood::Neutral));
        assert_eq!(Mood::from_level(5), Some(Mood::Calm));
        assert_eq!(Mood::from_level(0), None);
        assert_eq!(Mood::from_level(6), None);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Urgent > Tier::Caution);
        assert!(Tier::Caution > Tier::Watch);
        assert!(Tier::Watch > Tier::None);
    }

    #[test]
    fn test_tier_counts_merge() {
        let mut a = TierCounts::default();
        a.record(Tier::Urgent);
        a.record(Tier::None);
        let mut b = TierCounts::default();
        b.record(Tier::Urgent);
        b.record(Tier::Watch);

        let merged = a.merge(b);
        assert_eq!(merged.get(Tier::Urgent), 2);
        assert_eq!(merged.get(Tier::Watch), 1);
        assert_eq!(merged.total(), 4);
    }

    #[test]
    fn test_countable_sleep_excludes_zero() {
        let event = MoodEvent {
            timestamp: Utc::now(),
            user_id: "u1".to_string(),
            class_id: "1A".to_string(),
            mood: Mood::Neutral,
            sleep_hours: Some(0.0),
            symptoms: BTreeSet::new(),
            memo: None,
            urgent_flag: false,
        };
        assert_eq!(event.countable_sleep(), None);
    }

    #[test]
    fn test_trend_metric_serializes_snake_case() {
        let json = serde_json::to_string(&TrendMetric::AvgSleepHours).unwrap();
        assert_eq!(json, "\"avg_sleep_hours\"");
    }
}
