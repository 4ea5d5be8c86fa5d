// Q&A history records and the read-side response shape
//
// A QaRecord is what both the recency cache and the durable store hold for
// one exchange. Ordering is by the producer timestamp, which is a string on
// the wire and is only parsed when sorting.

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// One stored question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    pub timestamp: String,
}

impl QaRecord {
    /// Parse a recency cache entry
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Encode as a recency cache entry
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parsed timestamp, `None` when the producer value is not a recognised format
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// Parse a producer timestamp.
///
/// Accepts RFC 3339 and naive ISO-8601 date-times (`2024-05-01T10:00:00.123456`),
/// the latter interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Sort key of a producer timestamp.
///
/// Variants order as declared: full date-times, then day-less times of day,
/// then everything unparseable (all equal to each other).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimestampKey {
    DateTime(DateTime<Utc>),
    TimeOfDay(NaiveTime),
    Unparseable,
}

impl TimestampKey {
    pub fn parse(raw: &str) -> Self {
        if let Some(ts) = parse_timestamp(raw) {
            return TimestampKey::DateTime(ts);
        }
        parse_time_of_day(raw)
            .map(TimestampKey::TimeOfDay)
            .unwrap_or(TimestampKey::Unparseable)
    }
}

/// Parse a bare time of day (`09:00`, `09:00:30`, `09:00:30.25`)
pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// Stable sort by timestamp, ascending.
///
/// Records whose timestamp does not parse are never placed before a parseable
/// one; they trail the list in their original relative order.
pub fn sort_chronologically(records: &mut [QaRecord]) {
    records.sort_by_cached_key(|record| TimestampKey::parse(&record.timestamp));
}

/// One entry of a chat history response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub answer: String,
    pub timestamp: String,
}

impl From<QaRecord> for HistoryEntry {
    fn from(record: QaRecord) -> Self {
        Self {
            question: record.question,
            answer: record.answer,
            timestamp: record.timestamp,
        }
    }
}

/// Reconciled history of one document
#[derive(Debug, Clone, Serialize)]
pub struct ChatHistory {
    pub chat_id: Uuid,

    /// Display name of the document
    #[serde(rename = "docsname")]
    pub document_name: String,

    /// Deduplicated entries, oldest first
    #[serde(rename = "history")]
    pub entries: Vec<HistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(question: &str, timestamp: &str) -> QaRecord {
        QaRecord {
            id: Uuid::now_v7(),
            question: question.to_string(),
            answer: format!("answer to {}", question),
            timestamp: timestamp.to_string(),
        }
    }

    fn questions(records: &[QaRecord]) -> Vec<&str> {
        records.iter().map(|r| r.question.as_str()).collect()
    }

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_timestamp("2024-05-01T10:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T08:00:00+00:00");
    }

    #[test]
    fn test_parse_naive_iso_as_utc() {
        let ts = parse_timestamp("2024-05-01T10:00:00.123456").unwrap();
        assert_eq!(ts.timestamp(), 1714557600);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
        assert_eq!(TimestampKey::parse("25:99"), TimestampKey::Unparseable);
    }

    #[test]
    fn test_time_of_day_key() {
        assert_eq!(
            TimestampKey::parse("09:00"),
            TimestampKey::TimeOfDay(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
        );
        assert_eq!(
            TimestampKey::parse("09:00:30.5"),
            TimestampKey::TimeOfDay(NaiveTime::from_hms_milli_opt(9, 0, 30, 500).unwrap())
        );
        assert!(matches!(
            TimestampKey::parse("2024-05-01T10:00:00Z"),
            TimestampKey::DateTime(_)
        ));
    }

    #[test]
    fn test_sort_time_of_day() {
        let mut records = vec![record("a", "10:00"), record("b", "09:00")];

        sort_chronologically(&mut records);

        assert_eq!(questions(&records), vec!["b", "a"]);
    }

    #[test]
    fn test_sort_classes() {
        let mut records = vec![
            record("bad", "soon"),
            record("clock", "08:00"),
            record("dated", "2024-05-01T10:00:00Z"),
        ];

        sort_chronologically(&mut records);

        assert_eq!(questions(&records), vec!["dated", "clock", "bad"]);
    }

    #[test]
    fn test_sort_ascending() {
        let mut records = vec![
            record("a", "2024-05-01T10:00:00Z"),
            record("b", "2024-05-01T09:00:00Z"),
            record("c", "2024-05-01T09:30:00Z"),
        ];

        sort_chronologically(&mut records);

        assert_eq!(questions(&records), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_mixed_offsets() {
        let mut records = vec![
            record("later", "2024-05-01T10:00:00+00:00"),
            record("earlier", "2024-05-01T11:00:00+02:00"),
        ];

        sort_chronologically(&mut records);

        assert_eq!(questions(&records), vec!["earlier", "later"]);
    }

    #[test]
    fn test_unparseable_timestamps_trail_in_merge_order() {
        let mut records = vec![
            record("bad-1", "yesterday"),
            record("late", "2024-05-01T10:00:00Z"),
            record("bad-2", ""),
            record("early", "2024-05-01T09:00:00Z"),
        ];

        sort_chronologically(&mut records);

        assert_eq!(questions(&records), vec!["early", "late", "bad-1", "bad-2"]);
    }

    #[test]
    fn test_equal_timestamps_keep_order() {
        let mut records = vec![
            record("first", "2024-05-01T10:00:00Z"),
            record("second", "2024-05-01T10:00:00Z"),
        ];

        sort_chronologically(&mut records);

        assert_eq!(questions(&records), vec!["first", "second"]);
    }

    #[test]
    fn test_history_serializes_response_shape() {
        let history = ChatHistory {
            chat_id: Uuid::now_v7(),
            document_name: "report.pdf".to_string(),
            entries: vec![record("q", "2024-05-01T10:00:00Z").into()],
        };

        let json = serde_json::to_value(&history).unwrap();

        assert_eq!(json["docsname"], "report.pdf");
        assert_eq!(json["history"][0]["question"], "q");
        assert_eq!(json["history"][0]["timestamp"], "2024-05-01T10:00:00Z");
        assert!(json["history"][0].get("id").is_none());
    }
}
