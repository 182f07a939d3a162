//! Loosely-typed store records
//!
//! Check-ins and consult messages arrive as schemaless documents written by
//! several client versions. The shapes below accept every field spelling seen
//! in the store; nothing here is trusted until the adapter validates it.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A raw document as read from the event store
pub type RawDocument = serde_json::Value;

/// Timestamp encodings found in stored documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Epoch milliseconds
    Millis(i64),
    /// RFC 3339 text
    Text(String),
    /// Exported store timestamp object
    Seconds {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
}

impl RawTimestamp {
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, ValidationError> {
        match self {
            RawTimestamp::Millis(ms) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .ok_or_else(|| ValidationError::InvalidTimestamp(ms.to_string())),
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(text.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| ValidationError::InvalidTimestamp(text.clone())),
            RawTimestamp::Seconds {
                seconds,
                nanoseconds,
            } => Utc
                .timestamp_opt(*seconds, *nanoseconds)
                .single()
                .ok_or_else(|| ValidationError::InvalidTimestamp(seconds.to_string())),
        }
    }
}

/// Mood as either a label/emoji or a 1-5 level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMood {
    Level(i64),
    Label(String),
}

/// Nested class information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawClassInfo {
    #[serde(default, alias = "classId")]
    pub class_id: Option<String>,
}

/// Check-in fields nested under `payload`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCheckinPayload {
    pub mood: Option<RawMood>,
    #[serde(alias = "moodLevel")]
    pub mood_level: Option<i64>,
    #[serde(alias = "sleepHours", alias = "sleep")]
    pub sleep_hours: Option<f64>,
    pub symptoms: Option<Vec<String>>,
    pub memo: Option<String>,
    #[serde(alias = "isUrgent")]
    pub is_urgent: Option<bool>,
}

/// Raw mood/sleep/symptom check-in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCheckin {
    #[serde(alias = "ts")]
    pub timestamp: Option<RawTimestamp>,
    #[serde(alias = "userId", alias = "uid")]
    pub user_id: Option<String>,
    #[serde(alias = "classId")]
    pub class_id: Option<String>,
    #[serde(alias = "classInfo")]
    pub class_info: Option<RawClassInfo>,
    pub mood: Option<RawMood>,
    #[serde(alias = "moodLevel")]
    pub mood_level: Option<i64>,
    #[serde(alias = "sleepHours", alias = "sleep")]
    pub sleep_hours: Option<f64>,
    pub symptoms: Option<Vec<String>>,
    pub memo: Option<String>,
    #[serde(alias = "isUrgent")]
    pub is_urgent: Option<bool>,
    pub payload: Option<RawCheckinPayload>,
}

impl RawCheckin {
    pub fn class_id(&self) -> Option<&str> {
        self.class_id
            .as_deref()
            .or_else(|| self.class_info.as_ref().and_then(|c| c.class_id.as_deref()))
    }

    pub fn mood(&self) -> Option<&RawMood> {
        self.mood
            .as_ref()
            .or_else(|| self.payload.as_ref().and_then(|p| p.mood.as_ref()))
    }

    pub fn mood_level(&self) -> Option<i64> {
        self.mood_level
            .or_else(|| self.payload.as_ref().and_then(|p| p.mood_level))
    }

    pub fn sleep_hours(&self) -> Option<f64> {
        self.sleep_hours
            .or_else(|| self.payload.as_ref().and_then(|p| p.sleep_hours))
    }

    pub fn symptoms(&self) -> &[String] {
        self.symptoms
            .as_deref()
            .or_else(|| self.payload.as_ref().and_then(|p| p.symptoms.as_deref()))
            .unwrap_or(&[])
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo
            .as_deref()
            .or_else(|| self.payload.as_ref().and_then(|p| p.memo.as_deref()))
    }

    pub fn is_urgent(&self) -> bool {
        self.is_urgent
            .or_else(|| self.payload.as_ref().and_then(|p| p.is_urgent))
            .unwrap_or(false)
    }
}

/// Raw consultation message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConsult {
    #[serde(alias = "ts")]
    pub timestamp: Option<RawTimestamp>,
    #[serde(alias = "userId", alias = "uid")]
    pub user_id: Option<String>,
    #[serde(alias = "classId")]
    pub class_id: Option<String>,
    #[serde(alias = "classInfo")]
    pub class_info: Option<RawClassInfo>,
    #[serde(alias = "text")]
    pub message: Option<String>,
    #[serde(alias = "riskLevel", alias = "risk_hint", alias = "riskHint")]
    pub risk_level: Option<String>,
    pub topics: Option<Vec<String>>,
}

impl RawConsult {
    pub fn class_id(&self) -> Option<&str> {
        self.class_id
            .as_deref()
            .or_else(|| self.class_info.as_ref().and_then(|c| c.class_id.as_deref()))
    }
}

/// Timestamp of a raw document, when present and parseable
pub fn document_timestamp(doc: &RawDocument) -> Option<DateTime<Utc>> {
    let value = doc.get("timestamp").or_else(|| doc.get("ts"))?;
    let raw: RawTimestamp = serde_json::from_value(value.clone()).ok()?;
    raw.to_datetime().ok()
}

/// Class id of a raw document (top-level or nested `class_info`)
pub fn document_class_id(doc: &RawDocument) -> Option<&str> {
    document_str(doc, &["class_id", "classId"]).or_else(|| {
        let info = doc.get("class_info").or_else(|| doc.get("classInfo"))?;
        document_str(info, &["class_id", "classId"])
    })
}

/// Group (cohort) id of a raw document
pub fn document_group_id(doc: &RawDocument) -> Option<&str> {
    document_str(doc, &["group_id", "groupId"])
}

fn document_str<'a>(doc: &'a RawDocument, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| doc.get(*key).and_then(|v| v.as_str()))
}

/// Reasons a raw record is rejected at the ingestion boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Unknown mood value: {0}")]
    UnknownMood(String),

    #[error("Consult message is empty")]
    EmptyMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_encodings() {
        let text: RawTimestamp = serde_json::from_value(json!("2025-11-14T08:30:00+09:00")).unwrap();
        let millis: RawTimestamp = serde_json::from_value(json!(1763076600000i64)).unwrap();
        let seconds: RawTimestamp =
            serde_json::from_value(json!({"_seconds": 1763076600, "_nanoseconds": 0})).unwrap();

        let expected = Utc.with_ymd_and_hms(2025, 11, 13, 23, 30, 0).unwrap();
        assert_eq!(text.to_datetime().unwrap(), expected);
        assert_eq!(millis.to_datetime().unwrap(), expected);
        assert_eq!(seconds.to_datetime().unwrap(), expected);
    }

    #[test]
    fn test_invalid_timestamp_text() {
        let raw = RawTimestamp::Text("yesterday".to_string());
        assert!(matches!(
            raw.to_datetime(),
            Err(ValidationError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_checkin_field_aliases_and_payload() {
        let raw: RawCheckin = serde_json::from_value(json!({
            "ts": "2025-11-14T08:30:00Z",
            "userId": "anon-1",
            "class_info": {"class_id": "2A"},
            "payload": {"mood": "😟", "sleepHours": 4.5, "symptoms": ["headache"]}
        }))
        .unwrap();

        assert_eq!(raw.user_id.as_deref(), Some("anon-1"));
        assert_eq!(raw.class_id(), Some("2A"));
        assert_eq!(raw.mood(), Some(&RawMood::Label("😟".to_string())));
        assert_eq!(raw.sleep_hours(), Some(4.5));
        assert_eq!(raw.symptoms(), &["headache".to_string()]);
    }

    #[test]
    fn test_document_helpers() {
        let doc = json!({
            "ts": "2025-11-14T08:30:00Z",
            "group_id": "school-1",
            "classInfo": {"classId": "1B"}
        });
        assert!(document_timestamp(&doc).is_some());
        assert_eq!(document_class_id(&doc), Some("1B"));
        assert_eq!(document_group_id(&doc), Some("school-1"));
        assert_eq!(document_timestamp(&json!({"ts": "nope"})), None);
    }
}
