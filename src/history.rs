//! Per-student histories
//!
//! Histories are rebuilt from the fetched snapshot on every run and ordered
//! newest first. A student appears only once all of their events are in hand;
//! partial histories are never classified.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::repository::TimeRange;
use crate::types::{ConsultMessage, MoodEvent};

/// One student's check-ins, newest first
#[derive(Debug, Clone, PartialEq)]
pub struct UserHistory {
    user_id: String,
    events: Vec<MoodEvent>,
}

impl UserHistory {
    /// Build a history, sorting `events` newest first
    pub fn new(user_id: impl Into<String>, mut events: Vec<MoodEvent>) -> Self {
        events.sort_by(|a, b| a.recency_cmp(b));
        Self {
            user_id: user_id.into(),
            events,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn events(&self) -> &[MoodEvent] {
        &self.events
    }

    pub fn latest(&self) -> Option<&MoodEvent> {
        self.events.first()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events at or before `instant`, still newest first
    pub fn as_of(&self, instant: DateTime<Utc>) -> &[MoodEvent] {
        let skip = self
            .events
            .iter()
            .take_while(|e| e.timestamp > instant)
            .count();
        &self.events[skip..]
    }

    /// Whether the student checked in at least once inside `range`
    pub fn active_in(&self, range: &TimeRange) -> bool {
        self.events.iter().any(|e| range.contains(e.timestamp))
    }
}

/// Group check-ins by student. Students with no events never get an entry.
pub fn build_histories(events: Vec<MoodEvent>) -> BTreeMap<String, UserHistory> {
    let mut grouped: BTreeMap<String, Vec<MoodEvent>> = BTreeMap::new();
    for event in events {
        grouped.entry(event.user_id.clone()).or_default().push(event);
    }

    grouped
        .into_iter()
        .map(|(user_id, events)| {
            let history = UserHistory::new(user_id.clone(), events);
            (user_id, history)
        })
        .collect()
}

/// Consult messages grouped by sender, newest first.
///
/// Anonymous messages cannot be attributed and are left out; they still count
/// toward cohort totals.
pub fn group_consults(consults: &[ConsultMessage]) -> BTreeMap<String, Vec<ConsultMessage>> {
    let mut grouped: BTreeMap<String, Vec<ConsultMessage>> = BTreeMap::new();
    for consult in consults {
        if let Some(user_id) = &consult.user_id {
            grouped.entry(user_id.clone()).or_default().push(consult.clone());
        }
    }
    for messages in grouped.values_mut() {
        messages.sort_by(|a, b| a.recency_cmp(b));
    }
    grouped
}

/// Consults at or before `instant` from a newest-first list
pub fn consults_as_of(consults: &[ConsultMessage], instant: DateTime<Utc>) -> &[ConsultMessage] {
    let skip = consults
        .iter()
        .take_while(|c| c.timestamp > instant)
        .count();
    &consults[skip..]
}
