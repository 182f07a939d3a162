//! Ingestion boundary: raw documents to validated entities
//!
//! Every document is converted on its own. A document that fails validation is
//! dropped and reported, the rest of the batch carries on.

use std::collections::BTreeSet;

use tracing::warn;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::schema::raw_record::*;
use crate::types::{ConsultMessage, Mood, MoodEvent, RiskHint};

/// Converts raw store documents into `MoodEvent`s and `ConsultMessage`s
pub struct RecordAdapter<'a> {
    config: &'a EngineConfig,
}

/// A rejected document
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// Position of the document in its batch
    pub index: usize,
    pub error: ValidationError,
}

/// Result of ingesting one batch
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested<T> {
    pub records: Vec<T>,
    pub issues: Vec<ValidationIssue>,
}

impl<T> Ingested<T> {
    pub fn dropped(&self) -> usize {
        self.issues.len()
    }
}

impl<'a> RecordAdapter<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Parse a JSON array of documents
    pub fn parse_array(json: &str) -> Result<Vec<RawDocument>, EngineError> {
        let documents: Vec<RawDocument> = serde_json::from_str(json)?;
        Ok(documents)
    }

    /// Parse NDJSON (one document per line)
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawDocument>, EngineError> {
        let mut documents = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawDocument>(trimmed) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    return Err(EngineError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(documents)
    }

    /// Validate a batch of check-in documents, dropping malformed ones
    pub fn ingest_checkins(&self, documents: &[RawDocument]) -> Ingested<MoodEvent> {
        ingest(documents, "checkin", |doc| self.to_mood_event(doc))
    }

    /// Validate a batch of consult documents, dropping malformed ones
    pub fn ingest_consults(&self, documents: &[RawDocument]) -> Ingested<ConsultMessage> {
        ingest(documents, "consult", |doc| self.to_consult(doc))
    }

    pub fn to_mood_event(&self, doc: &RawDocument) -> Result<MoodEvent, ValidationError> {
        let raw: RawCheckin = serde_json::from_value(doc.clone())
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let timestamp = raw
            .timestamp
            .as_ref()
            .ok_or(ValidationError::MissingField("timestamp"))?
            .to_datetime()?;

        let user_id = non_blank(raw.user_id.as_deref()).ok_or(ValidationError::MissingField("user_id"))?;

        let mood = match (raw.mood(), raw.mood_level()) {
            (Some(RawMood::Label(label)), _) => {
                Mood::from_label(label).ok_or_else(|| ValidationError::UnknownMood(label.clone()))?
            }
            (Some(RawMood::Level(level)), _) => mood_from_level(*level)?,
            (None, Some(level)) => mood_from_level(level)?,
            (None, None) => return Err(ValidationError::MissingField("mood")),
        };

        let sleep_hours = match raw.sleep_hours() {
            Some(hours) if hours.is_finite() && hours >= 0.0 => Some(hours),
            Some(hours) => {
                warn!(sleep_hours = hours, "discarding out-of-range sleep value");
                None
            }
            None => None,
        };

        let symptoms: BTreeSet<String> = raw
            .symptoms()
            .iter()
            .map(|s| self.config.resolve_symptom(s))
            .filter(|s| !s.is_empty())
            .collect();

        Ok(MoodEvent {
            timestamp,
            user_id: user_id.to_string(),
            class_id: self.class_bucket(raw.class_id()),
            mood,
            sleep_hours,
            symptoms,
            memo: non_blank(raw.memo()).map(str::to_string),
            urgent_flag: raw.is_urgent(),
        })
    }

    pub fn to_consult(&self, doc: &RawDocument) -> Result<ConsultMessage, ValidationError> {
        let raw: RawConsult = serde_json::from_value(doc.clone())
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let timestamp = raw
            .timestamp
            .as_ref()
            .ok_or(ValidationError::MissingField("timestamp"))?
            .to_datetime()?;

        let message = match raw.message.as_deref() {
            None => return Err(ValidationError::MissingField("message")),
            Some(text) if text.trim().is_empty() => return Err(ValidationError::EmptyMessage),
            Some(text) => text.to_string(),
        };

        Ok(ConsultMessage {
            timestamp,
            user_id: non_blank(raw.user_id.as_deref()).map(str::to_string),
            class_id: self.class_bucket(raw.class_id()),
            message,
            risk_hint: raw.risk_level.as_deref().and_then(RiskHint::from_label),
            topics: raw
                .topics
                .unwrap_or_default()
                .into_iter()
                .filter(|t| !t.trim().is_empty())
                .collect(),
        })
    }

    /// Blank or missing class ids go to the reserved unknown bucket
    pub fn class_bucket(&self, class_id: Option<&str>) -> String {
        non_blank(class_id)
            .unwrap_or(self.config.unknown_class_id.as_str())
            .to_string()
    }

    /// Validate without keeping the records
    pub fn validate_checkins(&self, documents: &[RawDocument]) -> Vec<ValidationIssue> {
        collect_issues(documents, |doc| self.to_mood_event(doc).map(|_| ()))
    }

    pub fn validate_consults(&self, documents: &[RawDocument]) -> Vec<ValidationIssue> {
        collect_issues(documents, |doc| self.to_consult(doc).map(|_| ()))
    }
}

fn ingest<T, F>(documents: &[RawDocument], kind: &'static str, convert: F) -> Ingested<T>
where
    F: Fn(&RawDocument) -> Result<T, ValidationError>,
{
    let mut records = Vec::with_capacity(documents.len());
    let mut issues = Vec::new();

    for (index, doc) in documents.iter().enumerate() {
        match convert(doc) {
            Ok(record) => records.push(record),
            Err(error) => {
                warn!(kind, index, error = %error, "dropping malformed record");
                issues.push(ValidationIssue { index, error });
            }
        }
    }

    Ingested { records, issues }
}

fn collect_issues<F>(documents: &[RawDocument], check: F) -> Vec<ValidationIssue>
where
    F: Fn(&RawDocument) -> Result<(), ValidationError>,
{
    documents
        .iter()
        .enumerate()
        .filter_map(|(index, doc)| check(doc).err().map(|error| ValidationIssue { index, error }))
        .collect()
}

fn mood_from_level(level: i64) -> Result<Mood, ValidationError> {
    Mood::from_level(level).ok_or_else(|| ValidationError::UnknownMood(level.to_string()))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
