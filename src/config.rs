//! Engine configuration
//!
//! Window length, the danger-phrase lexicon, the canonical symptom list and
//! every rule threshold are supplied here so the rule table can evolve without
//! touching the evaluator. Configurations round-trip through JSON; missing keys
//! fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::lexicon::LexiconMatcher;
use crate::symptoms::{canonical_tag, SymptomCounter};

/// Default evaluation window in days
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Upper bound for every day-count setting (about ten years)
pub const MAX_SPAN_DAYS: i64 = 3660;

/// Reserved class bucket for records without a class
pub const UNKNOWN_CLASS_ID: &str = "unknown";

/// Phrases that escalate a consult message straight to the urgent tier.
/// Matched as exact, case-sensitive substrings of the raw message text.
pub const DEFAULT_DANGER_PHRASES: &[&str] = &[
    "死にたい",
    "消えたい",
    "助けて",
    "もう無理",
    "自殺",
    "want to die",
    "want to disappear",
    "help me",
    "can't take it anymore",
    "kill myself",
    "suicide",
];

/// Canonical physical symptoms used for dose-response scoring
pub const DEFAULT_CANONICAL_SYMPTOMS: &[&str] =
    &["headache", "abdominal_pain", "back_pain", "dizziness"];

const DEFAULT_SYMPTOM_ALIASES: &[(&str, &str)] = &[
    ("頭痛", "headache"),
    ("腹痛", "abdominal_pain"),
    ("お腹が痛い", "abdominal_pain"),
    ("腰痛", "back_pain"),
    ("めまい", "dizziness"),
    ("stomachache", "abdominal_pain"),
    ("stomach_ache", "abdominal_pain"),
    ("stomach_pain", "abdominal_pain"),
    ("dizzy", "dizziness"),
];

/// Numeric cut-offs of the rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Sleep below this with low mood is urgent (hours)
    pub critical_sleep_hours: f64,
    /// Upper bound of short sleep (hours)
    pub short_sleep_hours: f64,
    /// Upper bound of borderline sleep (hours)
    pub borderline_sleep_hours: f64,
    /// Long sleep with neutral mood is watched (hours)
    pub long_sleep_hours: f64,
    /// Oversleep threshold (hours)
    pub oversleep_hours: f64,
    /// Most-recent low-mood check-ins in a row
    pub low_mood_streak: usize,
    /// Most-recent short-sleep check-ins in a row
    pub short_sleep_streak: usize,
    /// Low-mood check-ins within the frequency window
    pub weekly_low_mood_count: usize,
    /// Oversleep check-ins within the frequency window
    pub weekly_oversleep_count: usize,
    /// Calendar span of frequency rules (days)
    pub frequency_window_days: i64,
    /// Age at which the latest consult counts as unanswered (days)
    pub stale_consult_days: i64,
    /// Canonical symptoms which, with low mood, are urgent
    pub urgent_symptom_count: usize,
    /// Canonical symptoms that warrant caution on their own
    pub caution_symptom_count: usize,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            critical_sleep_hours: 4.0,
            short_sleep_hours: 5.0,
            borderline_sleep_hours: 6.0,
            long_sleep_hours: 8.0,
            oversleep_hours: 10.0,
            low_mood_streak: 3,
            short_sleep_streak: 3,
            weekly_low_mood_count: 5,
            weekly_oversleep_count: 3,
            frequency_window_days: 7,
            stale_consult_days: 3,
            urgent_symptom_count: 3,
            caution_symptom_count: 2,
        }
    }
}

/// Configuration for one engine instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length of the active window (days)
    pub window_days: i64,
    pub danger_phrases: Vec<String>,
    pub canonical_symptoms: Vec<String>,
    /// Raw symptom label -> canonical tag
    pub symptom_aliases: BTreeMap<String, String>,
    pub thresholds: RiskThresholds,
    /// Class id -> display name
    pub class_names: BTreeMap<String, String>,
    pub unknown_class_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            danger_phrases: DEFAULT_DANGER_PHRASES.iter().map(|p| p.to_string()).collect(),
            canonical_symptoms: DEFAULT_CANONICAL_SYMPTOMS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            symptom_aliases: DEFAULT_SYMPTOM_ALIASES
                .iter()
                .map(|(raw, tag)| (raw.to_string(), tag.to_string()))
                .collect(),
            thresholds: RiskThresholds::default(),
            class_names: BTreeMap::new(),
            unknown_class_id: UNKNOWN_CLASS_ID.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days;
        self
    }

    pub fn with_danger_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.danger_phrases = phrases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_class_name(mut self, class_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.class_names.insert(class_id.into(), name.into());
        self
    }

    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Display name of a class, falling back to its id
    pub fn display_name<'a>(&'a self, class_id: &'a str) -> &'a str {
        self.class_names
            .get(class_id)
            .map(String::as_str)
            .unwrap_or(class_id)
    }

    pub fn lexicon(&self) -> LexiconMatcher {
        LexiconMatcher::new(self.danger_phrases.iter().cloned())
    }

    pub fn symptom_counter(&self) -> SymptomCounter {
        SymptomCounter::new(self.canonical_symptoms.iter().cloned())
    }

    /// Resolve a raw symptom label to its canonical tag
    pub fn resolve_symptom(&self, raw: &str) -> String {
        if let Some(tag) = self.symptom_aliases.get(raw.trim()) {
            return canonical_tag(tag);
        }
        let tag = canonical_tag(raw);
        match self.symptom_aliases.get(&tag) {
            Some(alias) => canonical_tag(alias),
            None => tag,
        }
    }

    /// Reject configurations the evaluator cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        let t = &self.thresholds;

        if self.window_days <= 0 || self.window_days > MAX_SPAN_DAYS {
            return Err(EngineError::InvalidConfig(format!(
                "window_days must be between 1 and {MAX_SPAN_DAYS}"
            )));
        }
        if self.canonical_symptoms.iter().all(|s| s.trim().is_empty()) {
            return Err(EngineError::InvalidConfig(
                "canonical_symptoms must not be empty".to_string(),
            ));
        }
        if self.unknown_class_id.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "unknown_class_id must not be blank".to_string(),
            ));
        }
        if !(t.critical_sleep_hours < t.short_sleep_hours
            && t.short_sleep_hours < t.borderline_sleep_hours
            && t.borderline_sleep_hours <= t.long_sleep_hours
            && t.long_sleep_hours <= t.oversleep_hours)
        {
            return Err(EngineError::InvalidConfig(
                "sleep thresholds must be ascending: critical < short < borderline <= long <= oversleep"
                    .to_string(),
            ));
        }
        if t.low_mood_streak == 0 || t.short_sleep_streak == 0 {
            return Err(EngineError::InvalidConfig(
                "streak lengths must be at least 1".to_string(),
            ));
        }
        if t.weekly_low_mood_count == 0 || t.weekly_oversleep_count == 0 {
            return Err(EngineError::InvalidConfig(
                "frequency counts must be at least 1".to_string(),
            ));
        }
        if t.frequency_window_days <= 0 || t.frequency_window_days > MAX_SPAN_DAYS {
            return Err(EngineError::InvalidConfig(format!(
                "frequency_window_days must be between 1 and {MAX_SPAN_DAYS}"
            )));
        }
        if !(0..=MAX_SPAN_DAYS).contains(&t.stale_consult_days) {
            return Err(EngineError::InvalidConfig(format!(
                "stale_consult_days must be between 0 and {MAX_SPAN_DAYS}"
            )));
        }

        Ok(())
    }
}
