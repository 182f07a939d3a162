//! Tiered risk classification
//!
//! A student's tier is the highest tier with at least one matching rule.
//! Tiers are evaluated Urgent, Caution, Watch; once a tier matches, lower
//! tiers are skipped and every matching rule of that tier contributes its
//! reason.
//!
//! Rules are plain data: an id, a tier, a predicate over [`RuleContext`] and a
//! reason renderer. Each one can be evaluated on its own.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::config::{EngineConfig, RiskThresholds};
use crate::lexicon::LexiconMatcher;
use crate::symptoms::SymptomCounter;
use crate::types::{ConsultMessage, Mood, MoodEvent, RiskClassification, Tier};
use crate::window::TemporalWindowEvaluator;

/// Everything a rule may look at for one student
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub latest: &'a MoodEvent,
    /// Full check-in history, newest first (`history[0]` is `latest`)
    pub history: &'a [MoodEvent],
    /// The student's consults, newest first
    pub consults: &'a [ConsultMessage],
    pub window: TemporalWindowEvaluator,
    pub thresholds: &'a RiskThresholds,
    pub lexicon: &'a LexiconMatcher,
    /// Canonical symptoms on the latest check-in
    pub symptom_count: usize,
    /// Size of the canonical symptom list
    pub canonical_total: usize,
}

impl<'a> RuleContext<'a> {
    pub fn latest_consult(&self) -> Option<&'a ConsultMessage> {
        self.consults.first()
    }

    fn mood(&self) -> Mood {
        self.latest.mood
    }

    fn sleep_below(&self, hours: f64) -> bool {
        self.latest.sleep_hours.is_some_and(|s| s < hours)
    }

    fn sleep_at_least(&self, hours: f64) -> bool {
        self.latest.sleep_hours.is_some_and(|s| s >= hours)
    }
}

/// One entry of the rule table
#[derive(Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    pub tier: Tier,
    pub predicate: fn(&RuleContext<'_>) -> bool,
    pub reason: fn(&RiskThresholds) -> String,
}

impl Rule {
    pub fn matches(&self, ctx: &RuleContext<'_>) -> bool {
        (self.predicate)(ctx)
    }

    pub fn reason(&self, thresholds: &RiskThresholds) -> String {
        (self.reason)(thresholds)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("tier", &self.tier)
            .finish()
    }
}

/// Ordered rule table
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The production screening rules
    pub fn standard() -> Self {
        Self::new(vec![
            // Urgent
            Rule {
                id: "urgent.consult_flag",
                tier: Tier::Urgent,
                predicate: |ctx| ctx.latest_consult().is_some_and(|c| c.is_urgent()),
                reason: |_| "consult flagged urgent".to_string(),
            },
            Rule {
                id: "urgent.checkin_flag",
                tier: Tier::Urgent,
                predicate: |ctx| ctx.latest.urgent_flag,
                reason: |_| "check-in flagged urgent".to_string(),
            },
            Rule {
                id: "urgent.danger_phrase",
                tier: Tier::Urgent,
                predicate: |ctx| {
                    ctx.latest_consult()
                        .is_some_and(|c| ctx.lexicon.matches(&c.message))
                },
                reason: |_| "danger phrase in latest consult".to_string(),
            },
            Rule {
                id: "urgent.low_mood_critical_sleep",
                tier: Tier::Urgent,
                predicate: |ctx| {
                    ctx.mood() == Mood::Low && ctx.sleep_below(ctx.thresholds.critical_sleep_hours)
                },
                reason: |t| format!("mood=low+sleep<{}", t.critical_sleep_hours),
            },
            Rule {
                id: "urgent.symptoms_low_mood",
                tier: Tier::Urgent,
                predicate: |ctx| {
                    ctx.symptom_count >= ctx.thresholds.urgent_symptom_count
                        && ctx.mood() == Mood::Low
                },
                reason: |t| format!("symptoms≥{}+low mood", t.urgent_symptom_count),
            },
            Rule {
                id: "urgent.all_symptoms",
                tier: Tier::Urgent,
                predicate: |ctx| ctx.canonical_total > 0 && ctx.symptom_count == ctx.canonical_total,
                reason: |_| "all canonical symptoms present".to_string(),
            },
            // Caution
            Rule {
                id: "caution.low_mood_streak",
                tier: Tier::Caution,
                predicate: |ctx| {
                    ctx.window.consecutive(ctx.history, ctx.thresholds.low_mood_streak, |e| {
                        e.is_low_mood()
                    })
                },
                reason: |t| format!("{} consecutive low-mood days", t.low_mood_streak),
            },
            Rule {
                id: "caution.frequent_low_mood",
                tier: Tier::Caution,
                predicate: |ctx| {
                    ctx.window.frequency_at_least(
                        ctx.history,
                        ctx.thresholds.frequency_window_days,
                        |e| e.is_low_mood(),
                        ctx.thresholds.weekly_low_mood_count,
                    )
                },
                reason: |t| {
                    format!(
                        "low mood ≥{} times in {} days",
                        t.weekly_low_mood_count, t.frequency_window_days
                    )
                },
            },
            Rule {
                id: "caution.short_sleep_streak",
                tier: Tier::Caution,
                predicate: |ctx| {
                    let short = ctx.thresholds.short_sleep_hours;
                    ctx.window
                        .consecutive(ctx.history, ctx.thresholds.short_sleep_streak, |e| {
                            e.sleep_hours.is_some_and(|s| s < short)
                        })
                },
                reason: |t| {
                    format!(
                        "{} consecutive nights sleep<{}",
                        t.short_sleep_streak, t.short_sleep_hours
                    )
                },
            },
            Rule {
                id: "caution.neutral_short_sleep",
                tier: Tier::Caution,
                predicate: |ctx| {
                    ctx.mood() == Mood::Neutral
                        && ctx.sleep_at_least(ctx.thresholds.critical_sleep_hours)
                        && ctx.sleep_below(ctx.thresholds.short_sleep_hours)
                },
                reason: |t| {
                    format!(
                        "mood=neutral+sleep {}-{}h",
                        t.critical_sleep_hours, t.short_sleep_hours
                    )
                },
            },
            Rule {
                id: "caution.symptoms",
                tier: Tier::Caution,
                predicate: |ctx| ctx.symptom_count == ctx.thresholds.caution_symptom_count,
                reason: |t| format!("{} symptoms", t.caution_symptom_count),
            },
            Rule {
                id: "caution.symptom_low_mood",
                tier: Tier::Caution,
                predicate: |ctx| ctx.symptom_count == 1 && ctx.mood() == Mood::Low,
                reason: |_| "1 symptom+low mood".to_string(),
            },
            Rule {
                id: "caution.low_mood_oversleep",
                tier: Tier::Caution,
                predicate: |ctx| {
                    ctx.mood() == Mood::Low && ctx.sleep_at_least(ctx.thresholds.oversleep_hours)
                },
                reason: |t| format!("mood=low+sleep≥{}", t.oversleep_hours),
            },
            Rule {
                id: "caution.frequent_oversleep",
                tier: Tier::Caution,
                predicate: |ctx| {
                    let oversleep = ctx.thresholds.oversleep_hours;
                    ctx.window.frequency_at_least(
                        ctx.history,
                        ctx.thresholds.frequency_window_days,
                        |e| e.sleep_hours.is_some_and(|s| s >= oversleep),
                        ctx.thresholds.weekly_oversleep_count,
                    )
                },
                reason: |t| {
                    format!(
                        "sleep≥{} {}+ times in {} days",
                        t.oversleep_hours, t.weekly_oversleep_count, t.frequency_window_days
                    )
                },
            },
            Rule {
                id: "caution.stale_consult",
                tier: Tier::Caution,
                predicate: |ctx| {
                    ctx.latest_consult().is_some_and(|c| {
                        ctx.window
                            .elapsed_days(c.timestamp, ctx.thresholds.stale_consult_days)
                    })
                },
                reason: |t| format!("consult unanswered ≥{} days", t.stale_consult_days),
            },
            // Watch
            Rule {
                id: "watch.low_mood",
                tier: Tier::Watch,
                predicate: |ctx| ctx.mood() == Mood::Low,
                reason: |_| "isolated low mood".to_string(),
            },
            Rule {
                id: "watch.borderline_sleep",
                tier: Tier::Watch,
                predicate: |ctx| {
                    ctx.sleep_at_least(ctx.thresholds.short_sleep_hours)
                        && ctx.sleep_below(ctx.thresholds.borderline_sleep_hours)
                },
                reason: |t| {
                    format!(
                        "sleep {}-{}h",
                        t.short_sleep_hours, t.borderline_sleep_hours
                    )
                },
            },
            Rule {
                id: "watch.symptom",
                tier: Tier::Watch,
                predicate: |ctx| ctx.symptom_count == 1,
                reason: |_| "1 symptom".to_string(),
            },
            Rule {
                id: "watch.neutral_long_sleep",
                tier: Tier::Watch,
                predicate: |ctx| {
                    ctx.mood() == Mood::Neutral && ctx.sleep_at_least(ctx.thresholds.long_sleep_hours)
                },
                reason: |t| format!("mood=neutral+sleep≥{}", t.long_sleep_hours),
            },
        ])
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules of one tier in table order
    pub fn rules_for(&self, tier: Tier) -> impl Iterator<Item = &Rule> + '_ {
        self.rules.iter().filter(move |rule| rule.tier == tier)
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Applies the rule table to one student at a time.
///
/// Holds no per-run state; the same inputs and instant always produce the same
/// tier and reasons in the same order.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    table: RuleTable,
    thresholds: RiskThresholds,
    lexicon: LexiconMatcher,
    symptoms: SymptomCounter,
}

impl RiskClassifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            table: RuleTable::standard(),
            thresholds: config.thresholds.clone(),
            lexicon: config.lexicon(),
            symptoms: config.symptom_counter(),
        }
    }

    pub fn with_rule_table(mut self, table: RuleTable) -> Self {
        self.table = table;
        self
    }

    pub fn rule_table(&self) -> &RuleTable {
        &self.table
    }

    /// Build the rule context, or `None` for an empty history
    pub fn context<'a>(
        &'a self,
        history: &'a [MoodEvent],
        consults: &'a [ConsultMessage],
        now: DateTime<Utc>,
    ) -> Option<RuleContext<'a>> {
        let latest = history.first()?;
        Some(RuleContext {
            latest,
            history,
            consults,
            window: TemporalWindowEvaluator::new(now),
            thresholds: &self.thresholds,
            lexicon: &self.lexicon,
            symptom_count: self.symptoms.count(&latest.symptoms),
            canonical_total: self.symptoms.canonical().len(),
        })
    }

    /// Classify one student.
    ///
    /// `history` and `consults` must be ordered newest first. An empty history
    /// yields tier `None`.
    pub fn classify(
        &self,
        user_id: &str,
        history: &[MoodEvent],
        consults: &[ConsultMessage],
        now: DateTime<Utc>,
    ) -> RiskClassification {
        let Some(ctx) = self.context(history, consults, now) else {
            return RiskClassification::none(user_id);
        };

        for tier in Tier::ESCALATION_ORDER {
            let reasons: Vec<String> = self
                .table
                .rules_for(tier)
                .filter(|rule| rule.matches(&ctx))
                .map(|rule| rule.reason(&self.thresholds))
                .collect();

            if !reasons.is_empty() {
                return RiskClassification {
                    user_id: user_id.to_string(),
                    tier,
                    reasons,
                };
            }
        }

        RiskClassification::none(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskHint;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 14, 8, 30, 0).unwrap()
    }

    fn checkin(days_ago: i64, mood: Mood, sleep: Option<f64>, symptoms: &[&str]) -> MoodEvent {
        MoodEvent {
            timestamp: now() - Duration::days(days_ago),
            user_id: "s1".to_string(),
            class_id: "1A".to_string(),
            mood,
            sleep_hours: sleep,
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            memo: None,
            urgent_flag: false,
        }
    }

    fn consult(days_ago: i64, message: &str, hint: Option<RiskHint>) -> ConsultMessage {
        ConsultMessage {
            timestamp: now() - Duration::days(days_ago),
            user_id: Some("s1".to_string()),
            class_id: "1A".to_string(),
            message: message.to_string(),
            risk_hint: hint,
            topics: BTreeSet::new(),
        }
    }

    fn classifier() -> RiskClassifier {
        RiskClassifier::new(&EngineConfig::default())
    }

    fn classify(history: &[MoodEvent], consults: &[ConsultMessage]) -> RiskClassification {
        classifier().classify("s1", history, consults, now())
    }

    #[test]
    fn test_standard_table_shape() {
        let table = RuleTable::standard();
        assert_eq!(table.len(), 19);
        assert_eq!(table.rules_for(Tier::Urgent).count(), 6);
        assert_eq!(table.rules_for(Tier::Caution).count(), 9);
        assert_eq!(table.rules_for(Tier::Watch).count(), 4);
        assert!(table.rules_for(Tier::None).next().is_none());
    }

    #[test]
    fn test_low_mood_critical_sleep_with_symptoms() {
        let history = vec![checkin(
            0,
            Mood::Low,
            Some(3.0),
            &["headache", "dizziness", "back_pain"],
        )];

        let result = classify(&history, &[]);
        assert_eq!(result.tier, Tier::Urgent);
        assert!(result.reasons.contains(&"mood=low+sleep<4".to_string()));
        assert!(result.reasons.contains(&"symptoms≥3+low mood".to_string()));
    }

    #[test]
    fn test_three_low_mood_days_is_caution() {
        let history = vec![
            checkin(0, Mood::Low, Some(7.0), &[]),
            checkin(1, Mood::Low, Some(7.0), &[]),
            checkin(2, Mood::Low, Some(7.0), &[]),
        ];

        let result = classify(&history, &[]);
        assert_eq!(result.tier, Tier::Caution);
        assert_eq!(result.reasons, vec!["3 consecutive low-mood days".to_string()]);
    }

    #[test]
    fn test_isolated_low_mood_is_watch() {
        let history = vec![checkin(0, Mood::Low, Some(7.0), &[])];

        let result = classify(&history, &[]);
        assert_eq!(result.tier, Tier::Watch);
        assert_eq!(result.reasons, vec!["isolated low mood".to_string()]);
    }

    #[test]
    fn test_flagged_checkin_is_urgent() {
        let mut flagged = checkin(0, Mood::Calm, Some(7.0), &[]);
        flagged.urgent_flag = true;

        let result = classify(&[flagged], &[]);
        assert_eq!(result.tier, Tier::Urgent);
        assert_eq!(result.reasons, vec!["check-in flagged urgent".to_string()]);
    }

    #[test]
    fn test_flag_on_older_checkin_is_ignored() {
        let mut flagged = checkin(1, Mood::Calm, Some(7.0), &[]);
        flagged.urgent_flag = true;
        let history = vec![checkin(0, Mood::Calm, Some(7.0), &[]), flagged];

        assert_eq!(classify(&history, &[]).tier, Tier::None);
    }

    #[test]
    fn test_unbounded_stale_days_never_fire() {
        let mut config = EngineConfig::default();
        config.thresholds.stale_consult_days = i64::MAX;
        let classifier = RiskClassifier::new(&config);

        let history = vec![checkin(0, Mood::Calm, Some(7.0), &[])];
        let consults = vec![consult(40, "about exams", None)];
        let result = classifier.classify("s1", &history, &consults, now());
        assert_eq!(result.tier, Tier::None);
    }

    #[test]
    fn test_empty_history_is_none() {
        let result = classify(&[], &[consult(0, "help me", Some(RiskHint::Urgent))]);
        assert_eq!(result, RiskClassification::none("s1"));
    }

    #[test]
    fn test_calm_full_sleep_is_none() {
        let result = classify(&[checkin(0, Mood::Calm, Some(7.0), &[])], &[]);
        assert_eq!(result.tier, Tier::None);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_urgent_short_circuits_lower_tiers() {
        let history = vec![
            checkin(0, Mood::Low, Some(7.0), &["headache"]),
            checkin(1, Mood::Low, Some(7.0), &[]),
            checkin(2, Mood::Low, Some(7.0), &[]),
        ];
        let consults = vec![consult(0, "I want to disappear", None)];

        let result = classify(&history, &consults);
        assert_eq!(result.tier, Tier::Urgent);
        assert_eq!(
            result.reasons,
            vec!["danger phrase in latest consult".to_string()]
        );
    }

    #[test]
    fn test_only_latest_consult_is_checked() {
        let history = vec![checkin(0, Mood::Calm, Some(7.0), &[])];
        let consults = vec![
            consult(1, "thanks, feeling better", Some(RiskHint::Low)),
            consult(2, "help me", Some(RiskHint::Urgent)),
        ];

        let result = classify(&history, &consults);
        assert_eq!(result.tier, Tier::None);
    }

    #[test]
    fn test_stale_consult() {
        let history = vec![checkin(0, Mood::Calm, Some(7.0), &[])];

        let result = classify(&history, &[consult(3, "about exams", None)]);
        assert_eq!(result.tier, Tier::Caution);
        assert_eq!(result.reasons, vec!["consult unanswered ≥3 days".to_string()]);

        let result = classify(&history, &[consult(2, "about exams", None)]);
        assert_eq!(result.tier, Tier::None);
    }

    #[test]
    fn test_caution_collects_every_matching_reason() {
        let history = vec![
            checkin(0, Mood::Neutral, Some(4.5), &["headache", "back_pain"]),
            checkin(1, Mood::Calm, Some(4.0), &[]),
            checkin(2, Mood::Calm, Some(3.5), &[]),
        ];

        let result = classify(&history, &[]);
        assert_eq!(result.tier, Tier::Caution);
        assert_eq!(
            result.reasons,
            vec![
                "3 consecutive nights sleep<5".to_string(),
                "mood=neutral+sleep 4-5h".to_string(),
                "2 symptoms".to_string(),
            ]
        );
    }

    #[test]
    fn test_frequency_rules_use_calendar_window() {
        let history: Vec<MoodEvent> = (0..5)
            .map(|d| checkin(d, if d == 1 { Mood::Calm } else { Mood::Low }, None, &[]))
            .chain(std::iter::once(checkin(6, Mood::Low, None, &[])))
            .collect();

        let result = classify(&history, &[]);
        assert_eq!(result.tier, Tier::Caution);
        assert_eq!(result.reasons, vec!["low mood ≥5 times in 7 days".to_string()]);

        let old: Vec<MoodEvent> = [0, 8, 9, 10, 11]
            .iter()
            .map(|d| checkin(*d, Mood::Calm, Some(11.0), &[]))
            .collect();
        let result = classify(&old, &[]);
        assert_eq!(result.tier, Tier::None);
    }

    #[test]
    fn test_missing_sleep_never_matches_sleep_rules() {
        let result = classify(&[checkin(0, Mood::Neutral, None, &[])], &[]);
        assert_eq!(result.tier, Tier::None);
    }

    #[test]
    fn test_all_canonical_symptoms_without_low_mood() {
        let history = vec![checkin(
            0,
            Mood::Calm,
            Some(7.0),
            &["headache", "abdominal_pain", "back_pain", "dizziness"],
        )];

        let result = classify(&history, &[]);
        assert_eq!(result.tier, Tier::Urgent);
        assert_eq!(result.reasons, vec!["all canonical symptoms present".to_string()]);
    }

    #[test]
    fn test_reasons_follow_thresholds() {
        let mut thresholds = RiskThresholds::default();
        thresholds.critical_sleep_hours = 4.5;
        let config = EngineConfig::default().with_thresholds(thresholds);

        let result = RiskClassifier::new(&config).classify(
            "s1",
            &[checkin(0, Mood::Low, Some(4.2), &[])],
            &[],
            now(),
        );
        assert_eq!(result.reasons, vec!["mood=low+sleep<4.5".to_string()]);
    }

    #[test]
    fn test_single_rule_in_isolation() {
        let classifier = classifier();
        let history = vec![checkin(0, Mood::Neutral, Some(9.0), &[])];
        let ctx = classifier.context(&history, &[], now()).unwrap();

        let rule = classifier.rule_table().get("watch.neutral_long_sleep").unwrap();
        assert!(rule.matches(&ctx));
        assert!(!classifier.rule_table().get("watch.low_mood").unwrap().matches(&ctx));
    }

    #[test]
    fn test_custom_rule_table() {
        let table = RuleTable::new(vec![Rule {
            id: "watch.any_checkin",
            tier: Tier::Watch,
            predicate: |_| true,
            reason: |_| "checked in".to_string(),
        }]);
        let classifier = classifier().with_rule_table(table);

        let result = classifier.classify("s1", &[checkin(0, Mood::Calm, None, &[])], &[], now());
        assert_eq!(result.tier, Tier::Watch);
        assert_eq!(result.reasons, vec!["checked in".to_string()]);
    }
}
