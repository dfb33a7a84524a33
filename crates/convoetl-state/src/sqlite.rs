//! `SQLite`-backed implementation of [`StateBackend`] and [`MessageStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use convoetl_types::{
    Checkpoint, Message, Platform, RunRecord, RunStats, RunStatus, SourceId, SourceKey,
    StoreStatistics, SyncMode,
};
use rusqlite::{Connection, OptionalExtension};

use crate::backend::{MessageStore, StateBackend};
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for state and message tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS messages (
    message_id INTEGER NOT NULL,
    source_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    author_id INTEGER NOT NULL,
    text TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL,
    reply_to_id INTEGER,
    extracted_at TEXT NOT NULL,
    PRIMARY KEY (message_id, source_id, platform)
);

CREATE INDEX IF NOT EXISTS idx_messages_source ON messages (source_id, platform);
CREATE INDEX IF NOT EXISTS idx_messages_author ON messages (author_id, platform);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages (timestamp);

CREATE TABLE IF NOT EXISTS authors (
    author_id INTEGER NOT NULL,
    platform TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    total_messages INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (author_id, platform)
);

CREATE TABLE IF NOT EXISTS checkpoints (
    source_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    last_message_id INTEGER NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (source_id, platform)
);

CREATE TABLE IF NOT EXISTS sync_runs (
    run_id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    mode TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    completed_at TEXT,
    start_message_id INTEGER,
    end_message_id INTEGER,
    messages_processed INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_sync_runs_source ON sync_runs (source_id, platform);
";

/// `SQLite`-backed state and message storage.
///
/// Create with [`SqliteStateBackend::open`] for file-backed persistence
/// or [`SqliteStateBackend::in_memory`] for tests.
pub struct SqliteStateBackend {
    conn: Mutex<Connection>,
}

/// Raw `sync_runs` row before decoding enum columns.
struct RunRow {
    run_id: i64,
    source_id: String,
    platform: String,
    mode: String,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    start_message_id: Option<i64>,
    end_message_id: Option<i64>,
    messages_processed: i64,
    error: Option<String>,
}

/// Per-author tally for one stored batch.
struct AuthorTally {
    first_seen: String,
    last_seen: String,
    count: i64,
}

impl SqliteStateBackend {
    /// Open or create a `SQLite` database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::SqliteContext`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| StateError::backend_context("open", e))?;
        Self::init(conn)
    }

    /// Create an in-memory `SQLite` backend (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::SqliteContext`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StateError::backend_context("open_in_memory", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> error::Result<Self> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StateError::backend_context("create_tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Format current UTC time for `SQLite` storage.
    fn now_sqlite() -> String {
        Utc::now().format(SQLITE_DATETIME_FMT).to_string()
    }

    /// Convert a `SQLite` datetime string to ISO-8601.
    fn sqlite_to_iso8601(raw: &str) -> String {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
            |_| raw.to_string(),
            |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
        )
    }

    fn parse_sqlite_datetime(raw: &str) -> error::Result<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT)
            .map(|ndt| ndt.and_utc())
            .map_err(|e| StateError::Corrupt(format!("bad datetime '{raw}': {e}")))
    }

    /// Message timestamps are stored as fixed-width RFC 3339 so that text
    /// comparison orders them chronologically.
    fn message_ts(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn decode_run(row: RunRow) -> error::Result<RunRecord> {
        let mode: SyncMode = row.mode.parse().map_err(StateError::Corrupt)?;
        let status = RunStatus::parse(&row.status)
            .ok_or_else(|| StateError::Corrupt(format!("unknown run status '{}'", row.status)))?;
        Ok(RunRecord {
            run_id: row.run_id,
            source_id: SourceId::new(row.source_id),
            platform: Platform::new(row.platform),
            mode,
            status,
            started_at: Self::parse_sqlite_datetime(&row.started_at)?,
            completed_at: row
                .completed_at
                .as_deref()
                .map(Self::parse_sqlite_datetime)
                .transpose()?,
            start_message_id: row.start_message_id,
            end_message_id: row.end_message_id,
            messages_processed: u64::try_from(row.messages_processed).unwrap_or(0),
            error: row.error,
        })
    }

    #[cfg(test)]
    fn count_messages(&self, key: &SourceKey) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE source_id = ?1 AND platform = ?2",
            rusqlite::params![key.source_id.as_str(), key.platform.as_str()],
            |row| row.get(0),
        )
        .map_err(StateError::from)
    }

    #[cfg(test)]
    fn author_total(&self, author_id: i64, platform: &str) -> error::Result<Option<i64>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT total_messages FROM authors WHERE author_id = ?1 AND platform = ?2",
            rusqlite::params![author_id, platform],
            |row| row.get(0),
        )
        .optional()
        .map_err(StateError::from)
    }
}

impl StateBackend for SqliteStateBackend {
    fn get_checkpoint(&self, key: &SourceKey) -> error::Result<Option<Checkpoint>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT last_message_id, updated_at FROM checkpoints \
                 WHERE source_id = ?1 AND platform = ?2",
                rusqlite::params![key.source_id.as_str(), key.platform.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(|e| StateError::backend_context("get_checkpoint", e))?;

        Ok(row.map(|(last_message_id, updated_at)| Checkpoint {
            source_id: key.source_id.clone(),
            platform: key.platform.clone(),
            last_message_id,
            updated_at: Self::sqlite_to_iso8601(&updated_at),
        }))
    }

    fn advance_checkpoint(&self, key: &SourceKey, last_message_id: i64) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let now = Self::now_sqlite();

        // The WHERE clause on the upsert makes the monotonic check atomic.
        let applied = conn
            .execute(
                "INSERT INTO checkpoints (source_id, platform, last_message_id, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(source_id, platform) DO UPDATE \
                 SET last_message_id = excluded.last_message_id, updated_at = excluded.updated_at \
                 WHERE excluded.last_message_id >= checkpoints.last_message_id",
                rusqlite::params![
                    key.source_id.as_str(),
                    key.platform.as_str(),
                    last_message_id,
                    now
                ],
            )
            .map_err(|e| StateError::backend_context("advance_checkpoint", e))?;

        if applied > 0 {
            return Ok(());
        }

        let current: i64 = conn
            .query_row(
                "SELECT last_message_id FROM checkpoints WHERE source_id = ?1 AND platform = ?2",
                rusqlite::params![key.source_id.as_str(), key.platform.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| StateError::backend_context("advance_checkpoint: read current", e))?;

        Err(StateError::CheckpointRegression {
            key: key.clone(),
            current,
            attempted: last_message_id,
        })
    }

    fn start_run(
        &self,
        key: &SourceKey,
        mode: SyncMode,
        start_message_id: Option<i64>,
    ) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO sync_runs (source_id, platform, mode, status, started_at, start_message_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                key.source_id.as_str(),
                key.platform.as_str(),
                mode.as_str(),
                RunStatus::Running.as_str(),
                Self::now_sqlite(),
                start_message_id,
            ],
        )
        .map_err(|e| StateError::backend_context("start_run", e))?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn
            .execute(
                "UPDATE sync_runs SET status = ?1, completed_at = ?2, messages_processed = ?3, \
                 end_message_id = ?4, error_message = ?5 \
                 WHERE run_id = ?6 AND status = ?7",
                rusqlite::params![
                    status.as_str(),
                    Self::now_sqlite(),
                    stats.messages_processed as i64,
                    stats.end_message_id,
                    stats.error_message,
                    run_id,
                    RunStatus::Running.as_str(),
                ],
            )
            .map_err(|e| StateError::backend_context("complete_run", e))?;

        if updated == 0 {
            return Err(StateError::RunNotOpen(run_id));
        }
        Ok(())
    }

    fn recent_runs(&self, key: Option<&SourceKey>, limit: usize) -> error::Result<Vec<RunRecord>> {
        const COLUMNS: &str = "run_id, source_id, platform, mode, status, started_at, \
             completed_at, start_message_id, end_message_id, messages_processed, error_message";

        let conn = self.lock_conn()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(RunRow {
                run_id: row.get(0)?,
                source_id: row.get(1)?,
                platform: row.get(2)?,
                mode: row.get(3)?,
                status: row.get(4)?,
                started_at: row.get(5)?,
                completed_at: row.get(6)?,
                start_message_id: row.get(7)?,
                end_message_id: row.get(8)?,
                messages_processed: row.get(9)?,
                error: row.get(10)?,
            })
        };

        let rows: Vec<RunRow> = match key {
            Some(key) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {COLUMNS} FROM sync_runs \
                         WHERE source_id = ?1 AND platform = ?2 ORDER BY run_id DESC LIMIT ?3"
                    ))
                    .map_err(|e| StateError::backend_context("recent_runs: prepare", e))?;
                let mapped = stmt
                    .query_map(
                        rusqlite::params![key.source_id.as_str(), key.platform.as_str(), limit],
                        map_row,
                    )
                    .map_err(|e| StateError::backend_context("recent_runs: query", e))?;
                mapped.collect::<Result<_, _>>()?
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {COLUMNS} FROM sync_runs ORDER BY run_id DESC LIMIT ?1"
                    ))
                    .map_err(|e| StateError::backend_context("recent_runs: prepare", e))?;
                let mapped = stmt
                    .query_map(rusqlite::params![limit], map_row)
                    .map_err(|e| StateError::backend_context("recent_runs: query", e))?;
                mapped.collect::<Result<_, _>>()?
            }
        };

        rows.into_iter().map(Self::decode_run).collect()
    }
}

impl MessageStore for SqliteStateBackend {
    fn store(&self, messages: &[Message]) -> error::Result<u64> {
        if messages.is_empty() {
            return Ok(0);
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("store_messages: begin tx", e))?;

        let mut inserted = 0u64;
        let mut authors: HashMap<(i64, String), AuthorTally> = HashMap::new();
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO messages \
                     (message_id, source_id, platform, author_id, text, timestamp, reply_to_id, extracted_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(|e| StateError::backend_context("store_messages: prepare", e))?;

            for message in messages {
                let ts = Self::message_ts(&message.timestamp);
                let changed = stmt
                    .execute(rusqlite::params![
                        message.message_id,
                        message.source_id.as_str(),
                        message.platform.as_str(),
                        message.author_id,
                        message.text,
                        ts,
                        message.reply_to_id,
                        Self::message_ts(&message.extracted_at),
                    ])
                    .map_err(|e| StateError::backend_context("store_messages: execute", e))?;
                if changed == 0 {
                    continue;
                }
                inserted += 1;
                let tally = authors
                    .entry((message.author_id, message.platform.as_str().to_string()))
                    .or_insert_with(|| AuthorTally {
                        first_seen: ts.clone(),
                        last_seen: ts.clone(),
                        count: 0,
                    });
                if ts < tally.first_seen {
                    tally.first_seen.clone_from(&ts);
                }
                if ts > tally.last_seen {
                    tally.last_seen = ts;
                }
                tally.count += 1;
            }

            let mut upsert = tx
                .prepare(
                    "INSERT INTO authors (author_id, platform, first_seen_at, last_seen_at, total_messages) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(author_id, platform) DO UPDATE SET \
                     first_seen_at = MIN(authors.first_seen_at, excluded.first_seen_at), \
                     last_seen_at = MAX(authors.last_seen_at, excluded.last_seen_at), \
                     total_messages = authors.total_messages + excluded.total_messages",
                )
                .map_err(|e| StateError::backend_context("store_messages: prepare authors", e))?;
            for ((author_id, platform), tally) in &authors {
                upsert
                    .execute(rusqlite::params![
                        author_id,
                        platform,
                        tally.first_seen,
                        tally.last_seen,
                        tally.count
                    ])
                    .map_err(|e| StateError::backend_context("store_messages: upsert author", e))?;
            }
        }
        tx.commit()
            .map_err(|e| StateError::backend_context("store_messages: commit", e))?;

        tracing::debug!(
            batch = messages.len(),
            inserted,
            skipped = messages.len() as u64 - inserted,
            "Stored message batch"
        );
        Ok(inserted)
    }

    fn get_last_id(&self, key: &SourceKey) -> error::Result<Option<i64>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT MAX(message_id) FROM messages WHERE source_id = ?1 AND platform = ?2",
            rusqlite::params![key.source_id.as_str(), key.platform.as_str()],
            |row| row.get::<_, Option<i64>>(0),
        )
        .map_err(|e| StateError::backend_context("get_last_id", e))
    }

    fn statistics(&self, key: Option<&SourceKey>) -> error::Result<StoreStatistics> {
        const SELECT: &str = "SELECT COUNT(*), COUNT(DISTINCT platform || '/' || author_id), \
             COUNT(DISTINCT source_id || '/' || platform), MIN(timestamp), MAX(timestamp) \
             FROM messages";

        let conn = self.lock_conn()?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        };
        let (messages, authors, sources, first, last) = match key {
            Some(key) => conn.query_row(
                &format!("{SELECT} WHERE source_id = ?1 AND platform = ?2"),
                rusqlite::params![key.source_id.as_str(), key.platform.as_str()],
                map_row,
            ),
            None => conn.query_row(SELECT, [], map_row),
        }
        .map_err(|e| StateError::backend_context("statistics", e))?;

        Ok(StoreStatistics {
            total_messages: u64::try_from(messages).unwrap_or(0),
            total_authors: u64::try_from(authors).unwrap_or(0),
            total_sources: u64::try_from(sources).unwrap_or(0),
            first_message_at: first,
            last_message_at: last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(source: &str) -> SourceKey {
        SourceKey::new(source, "telegram")
    }

    fn msg(source: &str, id: i64, author: i64) -> Message {
        Message {
            message_id: id,
            source_id: SourceId::new(source),
            platform: Platform::new("telegram"),
            author_id: author,
            text: format!("message {id}"),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
                + chrono::Duration::minutes(id),
            reply_to_id: None,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn checkpoint_absent_then_created() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        assert!(backend.get_checkpoint(&key("42")).unwrap().is_none());

        backend.advance_checkpoint(&key("42"), 1000).unwrap();

        let cp = backend.get_checkpoint(&key("42")).unwrap().unwrap();
        assert_eq!(cp.last_message_id, 1000);
        assert_eq!(cp.source_id.as_str(), "42");
        assert!(cp.updated_at.ends_with('Z'));
    }

    #[test]
    fn checkpoint_advances_and_accepts_same_value() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        backend.advance_checkpoint(&key("42"), 100).unwrap();
        backend.advance_checkpoint(&key("42"), 200).unwrap();
        backend.advance_checkpoint(&key("42"), 200).unwrap();
        let cp = backend.get_checkpoint(&key("42")).unwrap().unwrap();
        assert_eq!(cp.last_message_id, 200);
    }

    #[test]
    fn checkpoint_regression_rejected_and_unchanged() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        backend.advance_checkpoint(&key("42"), 2500).unwrap();

        let err = backend.advance_checkpoint(&key("42"), 100).unwrap_err();
        match err {
            StateError::CheckpointRegression {
                current, attempted, ..
            } => {
                assert_eq!(current, 2500);
                assert_eq!(attempted, 100);
            }
            other => panic!("expected regression, got {other:?}"),
        }

        let cp = backend.get_checkpoint(&key("42")).unwrap().unwrap();
        assert_eq!(cp.last_message_id, 2500);
    }

    #[test]
    fn checkpoints_keyed_by_source_and_platform() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        backend.advance_checkpoint(&key("a"), 10).unwrap();
        backend
            .advance_checkpoint(&SourceKey::new("a", "youtube"), 99)
            .unwrap();
        backend.advance_checkpoint(&key("b"), 5).unwrap();

        assert_eq!(
            backend.get_checkpoint(&key("a")).unwrap().unwrap().last_message_id,
            10
        );
        assert_eq!(
            backend
                .get_checkpoint(&SourceKey::new("a", "youtube"))
                .unwrap()
                .unwrap()
                .last_message_id,
            99
        );
        assert_eq!(
            backend.get_checkpoint(&key("b")).unwrap().unwrap().last_message_id,
            5
        );
    }

    #[test]
    fn run_lifecycle() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        let run_id = backend
            .start_run(&key("42"), SyncMode::Backfill, Some(0))
            .unwrap();
        assert!(run_id > 0);

        backend
            .complete_run(
                run_id,
                RunStatus::Completed,
                &RunStats {
                    messages_processed: 2500,
                    end_message_id: Some(2500),
                    error_message: None,
                },
            )
            .unwrap();

        let runs = backend.recent_runs(Some(&key("42")), 10).unwrap();
        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        assert_eq!(run.run_id, run_id);
        assert_eq!(run.mode, SyncMode::Backfill);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.messages_processed, 2500);
        assert_eq!(run.start_message_id, Some(0));
        assert_eq!(run.end_message_id, Some(2500));
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn run_failure_keeps_error_text() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        let run_id = backend
            .start_run(&key("42"), SyncMode::Incremental, None)
            .unwrap();
        backend
            .complete_run(
                run_id,
                RunStatus::Failed,
                &RunStats {
                    messages_processed: 50,
                    end_message_id: None,
                    error_message: Some("connection reset".into()),
                },
            )
            .unwrap();

        let run = backend.recent_runs(None, 1).unwrap().remove(0);
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn completed_run_is_never_rewritten() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        let run_id = backend
            .start_run(&key("42"), SyncMode::Incremental, None)
            .unwrap();
        backend
            .complete_run(run_id, RunStatus::Completed, &RunStats::default())
            .unwrap();

        let err = backend
            .complete_run(run_id, RunStatus::Failed, &RunStats::default())
            .unwrap_err();
        assert!(matches!(err, StateError::RunNotOpen(id) if id == run_id));

        let run = backend.recent_runs(None, 1).unwrap().remove(0);
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[test]
    fn recent_runs_newest_first_and_filtered() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        let r1 = backend.start_run(&key("a"), SyncMode::Backfill, None).unwrap();
        let r2 = backend.start_run(&key("b"), SyncMode::Backfill, None).unwrap();
        let r3 = backend
            .start_run(&key("a"), SyncMode::Incremental, Some(10))
            .unwrap();

        let all: Vec<i64> = backend
            .recent_runs(None, 10)
            .unwrap()
            .iter()
            .map(|r| r.run_id)
            .collect();
        assert_eq!(all, vec![r3, r2, r1]);

        let only_a: Vec<i64> = backend
            .recent_runs(Some(&key("a")), 10)
            .unwrap()
            .iter()
            .map(|r| r.run_id)
            .collect();
        assert_eq!(only_a, vec![r3, r1]);
        assert_eq!(backend.recent_runs(None, 2).unwrap().len(), 2);
    }

    #[test]
    fn store_skips_duplicates() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        let first: Vec<Message> = (1..=5).map(|id| msg("42", id, 1)).collect();
        assert_eq!(backend.store(&first).unwrap(), 5);

        let overlapping: Vec<Message> = (4..=8).map(|id| msg("42", id, 1)).collect();
        assert_eq!(backend.store(&overlapping).unwrap(), 3);
        assert_eq!(backend.count_messages(&key("42")).unwrap(), 8);
    }

    #[test]
    fn store_empty_batch_is_noop() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        assert_eq!(backend.store(&[]).unwrap(), 0);
    }

    #[test]
    fn author_totals_count_new_rows_only() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        backend
            .store(&[msg("42", 1, 7), msg("42", 2, 7), msg("42", 3, 8)])
            .unwrap();
        backend.store(&[msg("42", 2, 7), msg("42", 4, 7)]).unwrap();

        assert_eq!(backend.author_total(7, "telegram").unwrap(), Some(3));
        assert_eq!(backend.author_total(8, "telegram").unwrap(), Some(1));
        assert_eq!(backend.author_total(9, "telegram").unwrap(), None);
    }

    #[test]
    fn last_id_is_max_stored() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        assert_eq!(backend.get_last_id(&key("42")).unwrap(), None);
        backend
            .store(&[msg("42", 30, 1), msg("42", 10, 1), msg("other", 99, 1)])
            .unwrap();
        assert_eq!(backend.get_last_id(&key("42")).unwrap(), Some(30));
    }

    #[test]
    fn statistics_overall_and_per_source() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        backend
            .store(&[msg("a", 1, 1), msg("a", 2, 2), msg("b", 1, 1)])
            .unwrap();

        let all = backend.statistics(None).unwrap();
        assert_eq!(all.total_messages, 3);
        assert_eq!(all.total_authors, 2);
        assert_eq!(all.total_sources, 2);
        assert!(all.first_message_at.is_some());

        let a = backend.statistics(Some(&key("a"))).unwrap();
        assert_eq!(a.total_messages, 2);
        assert_eq!(a.total_sources, 1);

        let empty = backend.statistics(Some(&key("zzz"))).unwrap();
        assert_eq!(empty.total_messages, 0);
        assert!(empty.last_message_at.is_none());
    }

    #[test]
    fn same_author_id_on_two_platforms_counts_twice() {
        let backend = SqliteStateBackend::in_memory().unwrap();
        let mut discord = msg("general", 1, 7);
        discord.platform = Platform::new("discord");
        backend.store(&[msg("general", 1, 7), discord]).unwrap();

        let all = backend.statistics(None).unwrap();
        assert_eq!(all.total_messages, 2);
        assert_eq!(all.total_authors, 2);
        assert_eq!(all.total_sources, 2);

        let telegram = backend.statistics(Some(&key("general"))).unwrap();
        assert_eq!(telegram.total_authors, 1);
    }

    #[test]
    fn file_backed_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/convoetl.db");
        {
            let backend = SqliteStateBackend::open(&path).unwrap();
            backend.store(&[msg("42", 1, 1)]).unwrap();
            backend.advance_checkpoint(&key("42"), 1).unwrap();
        }
        let reopened = SqliteStateBackend::open(&path).unwrap();
        assert_eq!(
            reopened
                .get_checkpoint(&key("42"))
                .unwrap()
                .unwrap()
                .last_message_id,
            1
        );
        assert_eq!(reopened.get_last_id(&key("42")).unwrap(), Some(1));
    }

    #[test]
    fn sqlite_to_iso8601_conversion() {
        let iso = SqliteStateBackend::sqlite_to_iso8601("2024-01-15 10:00:00");
        assert_eq!(iso, "2024-01-15T10:00:00Z");
    }
}
