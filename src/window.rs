//! Temporal window evaluation
//!
//! Streaks and windowed counts over a student's history, all anchored to one
//! evaluation instant. The instant is captured once per run and shared by
//! every rule so no two rules can disagree about "today".

use chrono::{DateTime, Duration, Utc};

use crate::repository::days_before;
use crate::types::{ConsultMessage, MoodEvent};

/// Anything positioned on the evaluation timeline
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for MoodEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for ConsultMessage {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Window computations over histories ordered newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalWindowEvaluator {
    now: DateTime<Utc>,
}

impl TemporalWindowEvaluator {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Start of a trailing window of `days` calendar days
    pub fn window_start(&self, days: i64) -> DateTime<Utc> {
        days_before(self.now, days)
    }

    /// True only if `history` holds at least `n` entries and the `n` most
    /// recent all satisfy `predicate`. Short histories fail closed.
    pub fn consecutive<T, P>(&self, history: &[T], n: usize, predicate: P) -> bool
    where
        P: Fn(&T) -> bool,
    {
        history.len() >= n && history[..n].iter().all(predicate)
    }

    /// Entries with `timestamp >= now - days` satisfying `predicate`
    pub fn count_within<T, P>(&self, history: &[T], days: i64, predicate: P) -> usize
    where
        T: Timestamped,
        P: Fn(&T) -> bool,
    {
        let start = self.window_start(days);
        history
            .iter()
            .filter(|entry| entry.timestamp() >= start)
            .filter(|entry| predicate(*entry))
            .count()
    }

    pub fn frequency_at_least<T, P>(
        &self,
        history: &[T],
        days: i64,
        predicate: P,
        min_count: usize,
    ) -> bool
    where
        T: Timestamped,
        P: Fn(&T) -> bool,
    {
        self.count_within(history, days, predicate) >= min_count
    }

    /// Elapsed time between `timestamp` and the evaluation instant
    pub fn age(&self, timestamp: DateTime<Utc>) -> Duration {
        self.now - timestamp
    }

    /// Whether at least `days` have elapsed since `timestamp`
    pub fn elapsed_days(&self, timestamp: DateTime<Utc>, days: i64) -> bool {
        Duration::try_days(days).is_some_and(|span| self.age(timestamp) >= span)
    }
}
