//! Extractor contract: fetches one bounded page of messages from a source.

use async_trait::async_trait;
use convoetl_types::{ConnectorError, Message, Platform, SourceId};

/// Platform-specific message source.
///
/// Implementations must treat `after_id = 0` as "from the beginning" and
/// return at most `limit` messages with `message_id > after_id`. Ordering of
/// the returned batch is not relied upon.
///
/// Errors are classified: an unknown source is fatal (`not_found`),
/// connectivity and rate limiting are retryable.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Platform every message from this extractor belongs to.
    fn platform(&self) -> &Platform;

    /// Fetch up to `limit` messages newer than `after_id`.
    async fn extract(
        &self,
        source_id: &SourceId,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<Message>, ConnectorError>;
}
