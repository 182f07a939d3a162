//! Class-level aggregation
//!
//! Each student contributes their latest check-in in the window and their
//! classification to exactly one class. Counts and sums are carried in a
//! [`ClassTally`], which merges by plain addition; rates are derived from the
//! reduced tally and never averaged.

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::repository::TimeRange;
use crate::symptoms::SymptomCounter;
use crate::types::{
    ClassAggregate, DailyPoint, HeatmapCell, MoodEvent, RiskClassification, Tier, TierCounts,
};

/// A student's latest check-in in the window and their classification
#[derive(Debug, Clone, PartialEq)]
pub struct StudentResult {
    pub latest: MoodEvent,
    pub classification: RiskClassification,
}

impl StudentResult {
    pub fn user_id(&self) -> &str {
        &self.classification.user_id
    }

    pub fn tier(&self) -> Tier {
        self.classification.tier
    }
}

/// Associative reduction unit behind class and cohort figures
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassTally {
    pub record_count: usize,
    pub low_mood_count: usize,
    pub symptomatic_count: usize,
    pub sleep_samples: usize,
    pub sleep_hours_total: f64,
    pub tier_counts: TierCounts,
}

impl ClassTally {
    /// Add one student
    pub fn observe(&mut self, latest: &MoodEvent, tier: Tier, symptomatic: bool) {
        self.record_count += 1;
        if latest.is_low_mood() {
            self.low_mood_count += 1;
        }
        if symptomatic {
            self.symptomatic_count += 1;
        }
        if let Some(hours) = latest.countable_sleep() {
            self.sleep_samples += 1;
            self.sleep_hours_total += hours;
        }
        self.tier_counts.record(tier);
    }

    pub fn merge(self, other: ClassTally) -> ClassTally {
        ClassTally {
            record_count: self.record_count + other.record_count,
            low_mood_count: self.low_mood_count + other.low_mood_count,
            symptomatic_count: self.symptomatic_count + other.symptomatic_count,
            sleep_samples: self.sleep_samples + other.sleep_samples,
            sleep_hours_total: self.sleep_hours_total + other.sleep_hours_total,
            tier_counts: self.tier_counts.merge(other.tier_counts),
        }
    }

    pub fn low_mood_rate(&self) -> f64 {
        rate(self.low_mood_count, self.record_count)
    }

    pub fn symptom_rate(&self) -> f64 {
        rate(self.symptomatic_count, self.record_count)
    }

    pub fn avg_sleep_hours(&self) -> Option<f64> {
        if self.sleep_samples == 0 {
            None
        } else {
            Some(self.sleep_hours_total / self.sleep_samples as f64)
        }
    }
}

impl From<&ClassAggregate> for ClassTally {
    fn from(class: &ClassAggregate) -> Self {
        ClassTally {
            record_count: class.record_count,
            low_mood_count: class.low_mood_count,
            symptomatic_count: class.symptomatic_count,
            sleep_samples: class.sleep_samples,
            sleep_hours_total: class.sleep_hours_total,
            tier_counts: class.tier_counts,
        }
    }
}

/// `count / total`, 0 for an empty denominator
pub(crate) fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Class id to aggregate under; blank ids go to `unknown`
pub fn class_bucket<'a>(class_id: &'a str, unknown: &'a str) -> &'a str {
    if class_id.trim().is_empty() {
        unknown
    } else {
        class_id
    }
}

/// Heatmap order: highest low-mood rate first, then class id
pub fn heatmap_cmp(a: &ClassAggregate, b: &ClassAggregate) -> Ordering {
    b.low_mood_rate
        .total_cmp(&a.low_mood_rate)
        .then_with(|| a.class_id.cmp(&b.class_id))
}

/// Roster order: display name by codepoint, then class id.
///
/// No locale collation is applied; "1年B組" sorts after "1年A組" but kana and
/// kanji follow Unicode order rather than reading order.
pub fn roster_cmp(a: &ClassAggregate, b: &ClassAggregate) -> Ordering {
    a.display_name
        .cmp(&b.display_name)
        .then_with(|| a.class_id.cmp(&b.class_id))
}

fn follow_cmp(a: &RiskClassification, b: &RiskClassification) -> Ordering {
    b.tier.cmp(&a.tier).then_with(|| a.user_id.cmp(&b.user_id))
}

#[derive(Default)]
struct ClassBuilder<'a> {
    tally: ClassTally,
    newest: Option<&'a MoodEvent>,
    follow: Vec<RiskClassification>,
}

/// Groups per-student results into class aggregates
#[derive(Debug, Clone)]
pub struct ClassAggregator {
    class_names: BTreeMap<String, String>,
    unknown_class_id: String,
    symptoms: SymptomCounter,
}

impl ClassAggregator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            class_names: config.class_names.clone(),
            unknown_class_id: config.unknown_class_id.clone(),
            symptoms: config.symptom_counter(),
        }
    }

    fn display_name(&self, class_id: &str) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }

    /// Aggregate results by class, returned in heatmap order.
    ///
    /// A student listed more than once is counted once, with their newest
    /// check-in. The outcome does not depend on the order of `results`.
    pub fn aggregate(&self, results: &[StudentResult]) -> Vec<ClassAggregate> {
        let mut by_user: BTreeMap<&str, &StudentResult> = BTreeMap::new();
        for result in results {
            by_user
                .entry(result.user_id())
                .and_modify(|kept| {
                    if result.latest.recency_cmp(&kept.latest) == Ordering::Less {
                        *kept = result;
                    }
                })
                .or_insert(result);
        }

        let mut classes: BTreeMap<&str, ClassBuilder<'_>> = BTreeMap::new();
        for result in by_user.values() {
            let class_id = class_bucket(&result.latest.class_id, &self.unknown_class_id);
            let builder = classes.entry(class_id).or_default();

            let symptomatic = self.symptoms.count(&result.latest.symptoms) > 0;
            builder.tally.observe(&result.latest, result.tier(), symptomatic);

            let is_newer = builder
                .newest
                .map_or(true, |n| result.latest.recency_cmp(n) == Ordering::Less);
            if is_newer {
                builder.newest = Some(&result.latest);
            }
            if result.classification.is_flagged() {
                builder.follow.push(result.classification.clone());
            }
        }

        let mut aggregates: Vec<ClassAggregate> = classes
            .into_iter()
            .map(|(class_id, mut builder)| {
                builder.follow.sort_by(follow_cmp);
                let tally = builder.tally;
                ClassAggregate {
                    class_id: class_id.to_string(),
                    display_name: self.display_name(class_id),
                    record_count: tally.record_count,
                    low_mood_count: tally.low_mood_count,
                    low_mood_rate: tally.low_mood_rate(),
                    symptomatic_count: tally.symptomatic_count,
                    symptom_rate: tally.symptom_rate(),
                    sleep_samples: tally.sleep_samples,
                    sleep_hours_total: tally.sleep_hours_total,
                    avg_sleep_hours: tally.avg_sleep_hours(),
                    latest_mood: builder.newest.map(|e| e.mood),
                    tier_counts: tally.tier_counts,
                    follow_students: builder.follow,
                }
            })
            .collect();

        aggregates.sort_by(heatmap_cmp);
        aggregates
    }

    /// Per class, per UTC day low-mood share over every check-in in `range`.
    ///
    /// Every class with a check-in in the range gets one cell per calendar day,
    /// including days without records. Cells are ordered by class id, then date.
    pub fn daily_heatmap<'a, I>(&self, events: I, range: &TimeRange) -> Vec<HeatmapCell>
    where
        I: IntoIterator<Item = &'a MoodEvent>,
    {
        let mut counts: BTreeMap<&str, BTreeMap<NaiveDate, (usize, usize)>> = BTreeMap::new();
        for event in events.into_iter().filter(|e| range.contains(e.timestamp)) {
            let class_id = class_bucket(&event.class_id, &self.unknown_class_id);
            let day = counts
                .entry(class_id)
                .or_default()
                .entry(event.timestamp.date_naive())
                .or_default();
            day.0 += 1;
            if event.is_low_mood() {
                day.1 += 1;
            }
        }

        let days = calendar_days(range);
        counts
            .into_iter()
            .flat_map(|(class_id, per_day)| {
                days.iter()
                    .map(|date| {
                        let (records, low_count) = per_day.get(date).copied().unwrap_or_default();
                        HeatmapCell {
                            class_id: class_id.to_string(),
                            date: *date,
                            records,
                            low_count,
                            low_mood_rate: rate(low_count, records),
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Cohort-wide daily check-in series over `range`, one point per UTC day
    pub fn daily_trend<'a, I>(&self, events: I, range: &TimeRange) -> Vec<DailyPoint>
    where
        I: IntoIterator<Item = &'a MoodEvent>,
    {
        let mut per_day: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
        for event in events.into_iter().filter(|e| range.contains(e.timestamp)) {
            let day = per_day.entry(event.timestamp.date_naive()).or_default();
            day.0 += 1;
            if event.is_low_mood() {
                day.1 += 1;
            }
        }

        calendar_days(range)
            .into_iter()
            .map(|date| {
                let (records, low_count) = per_day.get(&date).copied().unwrap_or_default();
                DailyPoint {
                    date,
                    records,
                    low_count,
                    low_mood_rate: rate(low_count, records),
                }
            })
            .collect()
    }
}

fn calendar_days(range: &TimeRange) -> Vec<NaiveDate> {
    let last = range.end.date_naive();
    range
        .start
        .date_naive()
        .iter_days()
        .take_while(|date| *date <= last)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Mood;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 14, 8, 30, 0).unwrap()
    }

    fn result(user: &str, class: &str, mood: Mood, sleep: Option<f64>, tier: Tier) -> StudentResult {
        let reasons = if tier == Tier::None {
            Vec::new()
        } else {
            vec![format!("{} reason", tier.as_str())]
        };
        StudentResult {
            latest: MoodEvent {
                timestamp: now(),
                user_id: user.to_string(),
                class_id: class.to_string(),
                mood,
                sleep_hours: sleep,
                symptoms: BTreeSet::new(),
                memo: None,
                urgent_flag: false,
            },
            classification: RiskClassification {
                user_id: user.to_string(),
                tier,
                reasons,
            },
        }
    }

    fn class_of(n: usize, low: usize, class: &str) -> Vec<StudentResult> {
        (0..n)
            .map(|i| {
                let mood = if i < low { Mood::Low } else { Mood::Calm };
                let tier = if i < low { Tier::Watch } else { Tier::None };
                result(&format!("{class}-{i:02}"), class, mood, Some(7.0), tier)
            })
            .collect()
    }

    fn aggregator() -> ClassAggregator {
        ClassAggregator::new(&EngineConfig::default())
    }

    #[test]
    fn test_low_mood_rate_for_class() {
        let classes = aggregator().aggregate(&class_of(10, 3, "1A"));
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].record_count, 10);
        assert_eq!(classes[0].low_mood_count, 3);
        assert_eq!(classes[0].low_mood_rate, 0.3);
        assert_eq!(classes[0].tier_counts.watch, 3);
        assert_eq!(classes[0].follow_students.len(), 3);
    }

    #[test]
    fn test_sleep_average_excludes_missing_and_zero() {
        let results = vec![
            result("a", "1A", Mood::Calm, Some(6.0), Tier::None),
            result("b", "1A", Mood::Calm, Some(8.0), Tier::None),
            result("c", "1A", Mood::Calm, None, Tier::None),
            result("d", "1A", Mood::Calm, Some(0.0), Tier::None),
        ];
        let classes = aggregator().aggregate(&results);
        assert_eq!(classes[0].sleep_samples, 2);
        assert_eq!(classes[0].avg_sleep_hours, Some(7.0));

        let classes = aggregator().aggregate(&[result("c", "1A", Mood::Calm, None, Tier::None)]);
        assert_eq!(classes[0].avg_sleep_hours, None);
    }

    #[test]
    fn test_blank_class_goes_to_unknown() {
        let classes = aggregator().aggregate(&[result("a", "  ", Mood::Low, None, Tier::Watch)]);
        assert_eq!(classes[0].class_id, "unknown");
    }

    #[test]
    fn test_heatmap_and_roster_order() {
        let config = EngineConfig::default()
            .with_class_name("1A", "Class B")
            .with_class_name("1B", "Class A");
        let mut results = class_of(4, 1, "1A");
        results.extend(class_of(4, 1, "1B"));
        results.extend(class_of(2, 2, "2A"));

        let classes = ClassAggregator::new(&config).aggregate(&results);
        let heatmap: Vec<&str> = classes.iter().map(|c| c.class_id.as_str()).collect();
        assert_eq!(heatmap, vec!["2A", "1A", "1B"]);

        let mut roster: Vec<&ClassAggregate> = classes.iter().collect();
        roster.sort_by(|a, b| roster_cmp(a, b));
        let names: Vec<&str> = roster.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["2A", "Class A", "Class B"]);
    }

    #[test]
    fn test_follow_students_highest_tier_first() {
        let results = vec![
            result("a", "1A", Mood::Low, None, Tier::Watch),
            result("b", "1A", Mood::Low, None, Tier::Urgent),
            result("c", "1A", Mood::Calm, None, Tier::None),
            result("d", "1A", Mood::Low, None, Tier::Caution),
        ];
        let classes = aggregator().aggregate(&results);
        let order: Vec<&str> = classes[0]
            .follow_students
            .iter()
            .map(|c| c.user_id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "d", "a"]);
    }

    #[test]
    fn test_duplicate_student_counted_once() {
        let older = {
            let mut r = result("a", "1A", Mood::Low, None, Tier::Watch);
            r.latest.timestamp = now() - Duration::days(1);
            r
        };
        let newer = result("a", "1A", Mood::Calm, None, Tier::None);

        let classes = aggregator().aggregate(&[older, newer]);
        assert_eq!(classes[0].record_count, 1);
        assert_eq!(classes[0].low_mood_count, 0);
        assert_eq!(classes[0].latest_mood, Some(Mood::Calm));
    }

    #[test]
    fn test_tally_merge_sums_counts() {
        let a = ClassTally {
            record_count: 10,
            low_mood_count: 3,
            ..Default::default()
        };
        let b = ClassTally {
            record_count: 2,
            low_mood_count: 2,
            ..Default::default()
        };
        let merged = a.merge(b);
        assert_eq!(merged.low_mood_rate(), 5.0 / 12.0);
        assert_eq!(ClassTally::default().low_mood_rate(), 0.0);
    }

    #[test]
    fn test_daily_heatmap_cells() {
        let range = TimeRange::trailing(now(), 2);
        let mut events: Vec<MoodEvent> = class_of(2, 1, "1A").into_iter().map(|r| r.latest).collect();
        let mut old = events[0].clone();
        old.timestamp = now() - Duration::days(5);
        events.push(old);

        let cells = aggregator().daily_heatmap(&events, &range);
        assert_eq!(cells.len(), 3);
        let today = cells.last().unwrap();
        assert_eq!(today.date, now().date_naive());
        assert_eq!(today.records, 2);
        assert_eq!(today.low_mood_rate, 0.5);
        assert_eq!(cells[0].records, 0);
        assert_eq!(cells[0].low_mood_rate, 0.0);

        let trend = aggregator().daily_trend(&events, &range);
        assert_eq!(trend.len(), 3);
        assert_eq!(trend.iter().map(|p| p.records).sum::<usize>(), 2);
    }
}
