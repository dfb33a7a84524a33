//! Extractor over newline-delimited JSON message exports.

use std::path::PathBuf;

use async_trait::async_trait;
use convoetl_types::{ConnectorError, Message, Platform, SourceId};

use crate::extractor::Extractor;

/// Reads `<dir>/<source_id>.jsonl`, one [`Message`] object per line.
///
/// The whole export is read on every call; it is meant for platform dumps
/// and tests, not for very large archives.
pub struct NdjsonExtractor {
    dir: PathBuf,
    platform: Platform,
}

impl NdjsonExtractor {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, platform: impl Into<Platform>) -> Self {
        Self {
            dir: dir.into(),
            platform: platform.into(),
        }
    }

    fn export_path(&self, source_id: &SourceId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", source_id.as_str()))
    }
}

#[async_trait]
impl Extractor for NdjsonExtractor {
    fn platform(&self) -> &Platform {
        &self.platform
    }

    async fn extract(
        &self,
        source_id: &SourceId,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<Message>, ConnectorError> {
        let path = self.export_path(source_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConnectorError::not_found(
                    "UNKNOWN_SOURCE",
                    format!("no export for source {source_id} at {}", path.display()),
                ));
            }
            Err(e) => {
                return Err(ConnectorError::transient_network(
                    "EXPORT_READ_FAILED",
                    format!("failed to read {}: {e}", path.display()),
                ));
            }
        };

        let mut messages = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message: Message = serde_json::from_str(line).map_err(|e| {
                ConnectorError::data(
                    "MALFORMED_LINE",
                    format!("{}:{}: {e}", path.display(), idx + 1),
                )
                .with_details(serde_json::json!({ "line": idx + 1 }))
            })?;
            if message.message_id > after_id {
                messages.push(message);
            }
        }

        messages.sort_by_key(|m| m.message_id);
        messages.truncate(limit);

        tracing::debug!(
            source = source_id.as_str(),
            platform = self.platform.as_str(),
            after_id,
            limit,
            returned = messages.len(),
            "Read NDJSON export"
        );
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoetl_types::ErrorCategory;
    use std::io::Write;
    use std::path::Path;

    fn write_export(dir: &Path, source: &str, ids: &[i64]) {
        let mut file = std::fs::File::create(dir.join(format!("{source}.jsonl"))).unwrap();
        for id in ids {
            writeln!(
                file,
                r#"{{"message_id":{id},"source_id":"{source}","platform":"telegram","author_id":{},"text":"m{id}","timestamp":"2024-03-01T10:00:00Z"}}"#,
                id % 3
            )
            .unwrap();
        }
    }

    #[tokio::test]
    async fn filters_sorts_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        write_export(dir.path(), "42", &[5, 1, 4, 2, 3]);
        let ex = NdjsonExtractor::new(dir.path(), "telegram");

        let batch = ex.extract(&SourceId::new("42"), 1, 2).await.unwrap();
        let ids: Vec<i64> = batch.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn after_last_id_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_export(dir.path(), "42", &[1, 2, 3]);
        let ex = NdjsonExtractor::new(dir.path(), "telegram");
        assert!(ex
            .extract(&SourceId::new("42"), 3, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn missing_export_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ex = NdjsonExtractor::new(dir.path(), "telegram");
        let err = ex.extract(&SourceId::new("nope"), 0, 10).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::NotFound);
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn malformed_line_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("42.jsonl"), "{\"message_id\": oops}\n").unwrap();
        let ex = NdjsonExtractor::new(dir.path(), "telegram");
        let err = ex.extract(&SourceId::new("42"), 0, 10).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Data);
        assert_eq!(err.code, "MALFORMED_LINE");
        assert_eq!(err.details.unwrap()["line"], 1);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_export(dir.path(), "42", &[1]);
        let path = dir.path().join("42.jsonl");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("\n\n");
        std::fs::write(&path, content).unwrap();

        let ex = NdjsonExtractor::new(dir.path(), "telegram");
        assert_eq!(ex.extract(&SourceId::new("42"), 0, 10).await.unwrap().len(), 1);
    }
}
