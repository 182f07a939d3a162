//! Event repository abstraction
//!
//! The engine never talks to a backing store directly. Callers inject an
//! `EventRepository`; tests and the CLI use `InMemoryRepository`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{document_class_id, document_group_id, document_timestamp};

pub use crate::schema::RawDocument;

/// Cohort/group and optional class filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub group_id: Option<String>,
    pub class_id: Option<String>,
}

impl Scope {
    /// Every record in the store
    pub fn all() -> Self {
        Self::default()
    }

    pub fn group(group_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            class_id: None,
        }
    }

    pub fn with_class(mut self, class_id: impl Into<String>) -> Self {
        self.class_id = Some(class_id.into());
        self
    }

    /// Whether a raw document falls inside this scope
    pub fn admits(&self, doc: &RawDocument) -> bool {
        let group_ok = match &self.group_id {
            Some(group) => document_group_id(doc) == Some(group.as_str()),
            None => true,
        };
        let class_ok = match &self.class_id {
            Some(class) => document_class_id(doc) == Some(class.as_str()),
            None => true,
        };
        group_ok && class_ok
    }
}

/// Inclusive time range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Everything up to and including `end`
    pub fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: DateTime::<Utc>::MIN_UTC,
            end,
        }
    }

    /// The `days`-long range ending at `end`, clamped at the earliest
    /// representable instant
    pub fn trailing(end: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: days_before(end, days),
            end,
        }
    }

    /// Equal-length range ending immediately before this one starts
    pub fn preceding(&self) -> Self {
        let length = self.end - self.start;
        let end = self
            .start
            .checked_sub_signed(Duration::nanoseconds(1))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            start: self
                .start
                .checked_sub_signed(length)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// `instant - days`, saturating instead of overflowing
pub(crate) fn days_before(instant: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days)
        .and_then(|span| instant.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Failures of the backing store. These abort the whole run.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),
}

/// Source of raw check-in and consult documents.
///
/// Implementations filter by scope and inclusive time range but guarantee no
/// ordering; the engine sorts and groups.
pub trait EventRepository {
    fn fetch_checkins(
        &self,
        scope: &Scope,
        range: &TimeRange,
    ) -> Result<Vec<RawDocument>, RepositoryError>;

    fn fetch_consults(
        &self,
        scope: &Scope,
        range: &TimeRange,
    ) -> Result<Vec<RawDocument>, RepositoryError>;
}

impl<T: EventRepository + ?Sized> EventRepository for &T {
    fn fetch_checkins(
        &self,
        scope: &Scope,
        range: &TimeRange,
    ) -> Result<Vec<RawDocument>, RepositoryError> {
        (**self).fetch_checkins(scope, range)
    }

    fn fetch_consults(
        &self,
        scope: &Scope,
        range: &TimeRange,
    ) -> Result<Vec<RawDocument>, RepositoryError> {
        (**self).fetch_consults(scope, range)
    }
}

/// Repository over documents held in memory.
///
/// Documents without a parseable timestamp are passed through so the
/// ingestion boundary can report them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    checkins: Vec<RawDocument>,
    consults: Vec<RawDocument>,
}

impl InMemoryRepository {
    pub fn new(checkins: Vec<RawDocument>, consults: Vec<RawDocument>) -> Self {
        Self { checkins, consults }
    }

    pub fn push_checkin(&mut self, doc: RawDocument) {
        self.checkins.push(doc);
    }

    pub fn push_consult(&mut self, doc: RawDocument) {
        self.consults.push(doc);
    }

    pub fn len(&self) -> usize {
        self.checkins.len() + self.consults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(docs: &[RawDocument], scope: &Scope, range: &TimeRange) -> Vec<RawDocument> {
        docs.iter()
            .filter(|doc| scope.admits(doc))
            .filter(|doc| document_timestamp(doc).map_or(true, |ts| range.contains(ts)))
            .cloned()
            .collect()
    }
}

impl EventRepository for InMemoryRepository {
    fn fetch_checkins(
        &self,
        scope: &Scope,
        range: &TimeRange,
    ) -> Result<Vec<RawDocument>, RepositoryError> {
        Ok(Self::select(&self.checkins, scope, range))
    }

    fn fetch_consults(
        &self,
        scope: &Scope,
        range: &TimeRange,
    ) -> Result<Vec<RawDocument>, RepositoryError> {
        Ok(Self::select(&self.consults, scope, range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 14, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_preceding_range_does_not_overlap() {
        let current = TimeRange::trailing(now(), 7);
        let previous = current.preceding();

        assert_eq!(previous.start, now() - Duration::days(14));
        assert!(!previous.contains(current.start));
        assert!(previous.contains(current.start - Duration::seconds(1)));
    }

    #[test]
    fn test_huge_day_counts_clamp_to_earliest_instant() {
        let range = TimeRange::trailing(now(), i64::MAX);
        assert_eq!(range.start, DateTime::<Utc>::MIN_UTC);
        assert!(range.contains(Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap()));

        let previous = range.preceding();
        assert_eq!(previous.start, DateTime::<Utc>::MIN_UTC);
        assert_eq!(previous.end, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_until_has_no_lower_bound() {
        let repo = InMemoryRepository::new(
            vec![
                json!({"ts": "2019-04-01T08:00:00Z"}),
                json!({"ts": "2025-11-13T08:00:00Z"}),
                json!({"ts": "2025-11-20T08:00:00Z"}),
            ],
            vec![],
        );
        let docs = repo.fetch_checkins(&Scope::all(), &TimeRange::until(now())).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_in_memory_filters_scope_and_range() {
        let repo = InMemoryRepository::new(
            vec![
                json!({"ts": "2025-11-13T08:00:00Z", "group_id": "g1", "class_id": "1A"}),
                json!({"ts": "2025-11-13T08:00:00Z", "group_id": "g2", "class_id": "1A"}),
                json!({"ts": "2025-10-01T08:00:00Z", "group_id": "g1", "class_id": "1A"}),
                json!({"group_id": "g1", "class_id": "1A"}),
            ],
            vec![],
        );

        let range = TimeRange::trailing(now(), 7);
        let docs = repo.fetch_checkins(&Scope::group("g1"), &range).unwrap();
        assert_eq!(docs.len(), 2);

        let docs = repo
            .fetch_checkins(&Scope::group("g1").with_class("1B"), &range)
            .unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_repository_by_reference() {
        fn count<R: EventRepository>(repo: R) -> usize {
            repo.fetch_consults(&Scope::all(), &TimeRange::trailing(now(), 1))
                .map(|d| d.len())
                .unwrap_or(0)
        }

        let repo = InMemoryRepository::new(vec![], vec![json!({"ts": "2025-11-14T00:00:00Z"})]);
        assert_eq!(count(&repo), 1);
    }
}
