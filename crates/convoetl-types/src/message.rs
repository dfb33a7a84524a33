//! Conversational message record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{Platform, SourceId};

/// A single message as produced by an extractor.
///
/// Identity is `(message_id, source_id, platform)`. `message_id` increases
/// monotonically within one source on one platform. Records are written once
/// by the store and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub source_id: SourceId,
    pub platform: Platform,
    pub author_id: i64,
    #[serde(default)]
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<i64>,
    /// When the extractor pulled this record. Defaults to "now" for exports
    /// that predate the field.
    #[serde(default = "Utc::now")]
    pub extracted_at: DateTime<Utc>,
}

/// Highest `message_id` in a batch, or `None` for an empty batch.
///
/// Extractors do not guarantee ordering, so this scans the whole slice.
#[must_use]
pub fn max_message_id(messages: &[Message]) -> Option<i64> {
    messages.iter().map(|m| m.message_id).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: i64) -> Message {
        Message {
            message_id: id,
            source_id: SourceId::new("42"),
            platform: Platform::new("telegram"),
            author_id: 7,
            text: format!("hello {id}"),
            timestamp: Utc::now(),
            reply_to_id: None,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn max_id_scans_unordered_batch() {
        let batch = vec![msg(5), msg(12), msg(3)];
        assert_eq!(max_message_id(&batch), Some(12));
    }

    #[test]
    fn max_id_of_empty_batch_is_none() {
        assert_eq!(max_message_id(&[]), None);
    }

    #[test]
    fn deserializes_minimal_export_line() {
        let line = r#"{"message_id":1,"source_id":"42","platform":"telegram","author_id":9,"timestamp":"2024-03-01T10:00:00Z"}"#;
        let m: Message = serde_json::from_str(line).unwrap();
        assert_eq!(m.message_id, 1);
        assert_eq!(m.source_id.as_str(), "42");
        assert!(m.text.is_empty());
        assert!(m.reply_to_id.is_none());
    }
}
