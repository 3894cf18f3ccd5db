use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::record::{FileRecord, StreamCounts};

/// Error from a catalog store operation.
///
/// `transient` marks outages (busy/locked/unreachable database) that the
/// caller recovers from by skipping the current tick; everything else is a
/// logic or data error and should be surfaced.
#[derive(Debug, thiserror::Error)]
#[error("store error: {message}")]
pub struct StoreError {
    message: String,
    transient: bool,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        StoreError {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        StoreError {
            message: message.into(),
            transient: true,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        let transient = matches!(
            &e,
            rusqlite::Error::SqliteFailure(err, _) if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
        );
        StoreError {
            message: e.to_string(),
            transient,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// How `claim_next` orders the backlog before taking the head.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimPolicy {
    /// Claim the smallest file first instead of the highest container bit rate.
    pub prefer_smallest: bool,
    /// Restrict claiming to records whose path starts with this prefix.
    pub path_prefix: Option<String>,
}

/// Aggregate catalog counters for the statistics log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub tracked: u64,
    pub pending: u64,
    pub converted: u64,
    pub errored: u64,
    pub bytes_saved: u64,
}

/// The persistent catalog shared by all worker processes.
///
/// `claim_next` is the only synchronization primitive between workers: it
/// must select and mark a record in a single atomic round trip. Everything
/// else is plain keyed reads and writes.
pub trait CatalogStore: Send + Sync {
    /// Insert a record, or refresh the probe-derived fields of an existing
    /// one. Conversion state flags are never touched by an upsert.
    fn upsert(&self, record: &FileRecord) -> StoreResult<()>;

    fn get(&self, path: &str) -> StoreResult<Option<FileRecord>>;

    /// Paths of all non-deleted records.
    fn active_paths(&self) -> StoreResult<Vec<String>>;

    /// Move a record to a new path (rename detected by inode) and clear its
    /// deleted flag.
    fn rename(&self, from: &str, to: &str) -> StoreResult<()>;

    /// Soft-delete: the record stays for statistics but leaves the backlog.
    fn mark_deleted(&self, path: &str) -> StoreResult<()>;

    /// Atomically pick the best eligible record and mark it claimed by
    /// `worker`. Returns `None` when the backlog is empty.
    fn claim_next(
        &self,
        policy: &ClaimPolicy,
        worker: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<FileRecord>>;

    /// Release a claim without completing it; progress resets to 0.
    fn release_claim(&self, path: &str) -> StoreResult<()>;

    /// Best-effort progress telemetry for a converting record.
    fn update_progress(&self, path: &str, percent: f64, speed: f64) -> StoreResult<()>;

    /// Terminal success: converted, 100% progress, final size recorded.
    fn finish_converted(
        &self,
        path: &str,
        size_after_bytes: u64,
        finished_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Terminal failure: claim released and the error flag set.
    fn mark_error(&self, path: &str, finished_at: DateTime<Utc>) -> StoreResult<()>;

    /// Release claims started before `older_than` (worker died without
    /// cleanup). Returns how many records went back to pending.
    fn release_stale_claims(&self, older_than: DateTime<Utc>) -> StoreResult<usize>;

    fn stats(&self) -> StoreResult<CatalogStats>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS media_files (
    path                  TEXT PRIMARY KEY,
    inode                 INTEGER NOT NULL,
    deleted               INTEGER NOT NULL DEFAULT 0,
    probe                 TEXT NOT NULL,
    conversion_required   INTEGER NOT NULL,
    video_streams         INTEGER NOT NULL,
    audio_streams         INTEGER NOT NULL,
    subtitle_streams      INTEGER NOT NULL,
    first_video_stream    INTEGER NOT NULL,
    first_audio_stream    INTEGER NOT NULL,
    first_subtitle_stream INTEGER,
    size_before           INTEGER NOT NULL,
    size_after            INTEGER NOT NULL,
    converting            INTEGER NOT NULL DEFAULT 0,
    converted             INTEGER NOT NULL DEFAULT 0,
    conversion_error      INTEGER NOT NULL DEFAULT 0,
    progress_percent      REAL NOT NULL DEFAULT 0,
    speed_factor          REAL NOT NULL DEFAULT 0,
    started_at            TEXT,
    finished_at           TEXT,
    worker_name           TEXT,
    container_bit_rate    INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_media_files_inode ON media_files (inode);
CREATE INDEX IF NOT EXISTS idx_media_files_backlog
    ON media_files (conversion_required, converting, converted, conversion_error, deleted);
";

const COLUMNS: &str = "path, inode, deleted, probe, conversion_required, \
     video_streams, audio_streams, subtitle_streams, \
     first_video_stream, first_audio_stream, first_subtitle_stream, \
     size_before, size_after, converting, converted, conversion_error, \
     progress_percent, speed_factor, started_at, finished_at, worker_name";

/// SQLite-backed catalog store.
///
/// Worker processes share one database file; the claim statement is a single
/// `UPDATE ... WHERE path = (SELECT ... LIMIT 1) RETURNING`, which SQLite
/// executes under its write lock, so two racing workers can never both
/// receive the same record. A short busy timeout turns contention into a
/// transient error instead of a hung tick.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::new("store connection poisoned"))
    }
}

fn parse_timestamp(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match value {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let probe_json: String = row.get(3)?;
    let probe = serde_json::from_str(&probe_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(FileRecord {
        path: row.get(0)?,
        inode: row.get::<_, i64>(1)? as u64,
        deleted: row.get(2)?,
        probe,
        conversion_required: row.get(4)?,
        streams: StreamCounts {
            video_streams: row.get(5)?,
            audio_streams: row.get(6)?,
            subtitle_streams: row.get(7)?,
            first_video_stream: row.get(8)?,
            first_audio_stream: row.get(9)?,
            first_subtitle_stream: row.get(10)?,
        },
        size_before_bytes: row.get::<_, i64>(11)? as u64,
        size_after_bytes: row.get::<_, i64>(12)? as u64,
        converting: row.get(13)?,
        converted: row.get(14)?,
        conversion_error: row.get(15)?,
        progress_percent: row.get(16)?,
        speed_factor: row.get(17)?,
        started_at: parse_timestamp(18, row.get(18)?)?,
        finished_at: parse_timestamp(19, row.get(19)?)?,
        worker_name: row.get(20)?,
    })
}

impl CatalogStore for SqliteStore {
    fn upsert(&self, record: &FileRecord) -> StoreResult<()> {
        let probe_json = serde_json::to_string(&record.probe)
            .map_err(|e| StoreError::new(format!("unserializable probe data: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO media_files (
                path, inode, deleted, probe, conversion_required,
                video_streams, audio_streams, subtitle_streams,
                first_video_stream, first_audio_stream, first_subtitle_stream,
                size_before, size_after, container_bit_rate
             ) VALUES (?1, ?2, 0, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(path) DO UPDATE SET
                inode = excluded.inode,
                deleted = 0,
                probe = excluded.probe,
                conversion_required = excluded.conversion_required,
                video_streams = excluded.video_streams,
                audio_streams = excluded.audio_streams,
                subtitle_streams = excluded.subtitle_streams,
                first_video_stream = excluded.first_video_stream,
                first_audio_stream = excluded.first_audio_stream,
                first_subtitle_stream = excluded.first_subtitle_stream,
                size_before = excluded.size_before,
                container_bit_rate = excluded.container_bit_rate",
            params![
                record.path,
                record.inode as i64,
                probe_json,
                record.conversion_required,
                record.streams.video_streams,
                record.streams.audio_streams,
                record.streams.subtitle_streams,
                record.streams.first_video_stream,
                record.streams.first_audio_stream,
                record.streams.first_subtitle_stream,
                record.size_before_bytes as i64,
                record.size_after_bytes as i64,
                record.container_bit_rate() as i64,
            ],
        )?;
        Ok(())
    }

    fn get(&self, path: &str) -> StoreResult<Option<FileRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM media_files WHERE path = ?1"),
                [path],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn active_paths(&self) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT path FROM media_files WHERE deleted = 0")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE media_files SET path = ?2, deleted = 0 WHERE path = ?1",
            params![from, to],
        )?;
        Ok(())
    }

    fn mark_deleted(&self, path: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("UPDATE media_files SET deleted = 1 WHERE path = ?1", [path])?;
        Ok(())
    }

    fn claim_next(
        &self,
        policy: &ClaimPolicy,
        worker: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<FileRecord>> {
        let order = if policy.prefer_smallest {
            "size_before ASC, path ASC"
        } else {
            "container_bit_rate DESC, path ASC"
        };
        let sql = format!(
            "UPDATE media_files
                SET converting = 1,
                    worker_name = ?1,
                    started_at = ?2,
                    progress_percent = 0,
                    speed_factor = 0,
                    finished_at = NULL
              WHERE path = (
                    SELECT path FROM media_files
                     WHERE conversion_required = 1
                       AND converting = 0
                       AND converted = 0
                       AND conversion_error = 0
                       AND deleted = 0
                       AND (?3 IS NULL OR path LIKE ?3 || '%')
                     ORDER BY {order}
                     LIMIT 1)
              RETURNING {COLUMNS}"
        );
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &sql,
                params![worker, now.to_rfc3339(), policy.path_prefix],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn release_claim(&self, path: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE media_files
                SET converting = 0, started_at = NULL,
                    progress_percent = 0, speed_factor = 0
              WHERE path = ?1",
            [path],
        )?;
        Ok(())
    }

    fn update_progress(&self, path: &str, percent: f64, speed: f64) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE media_files SET progress_percent = ?2, speed_factor = ?3
              WHERE path = ?1 AND converting = 1",
            params![path, percent, speed],
        )?;
        Ok(())
    }

    fn finish_converted(
        &self,
        path: &str,
        size_after_bytes: u64,
        finished_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE media_files
                SET converting = 0, converted = 1, conversion_error = 0,
                    progress_percent = 100, size_after = ?2, finished_at = ?3
              WHERE path = ?1",
            params![path, size_after_bytes as i64, finished_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn mark_error(&self, path: &str, finished_at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE media_files
                SET converting = 0, conversion_error = 1,
                    progress_percent = 0, speed_factor = 0, finished_at = ?2
              WHERE path = ?1",
            params![path, finished_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn release_stale_claims(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.lock()?;
        let released = conn.execute(
            "UPDATE media_files
                SET converting = 0, started_at = NULL, worker_name = NULL,
                    progress_percent = 0, speed_factor = 0
              WHERE converting = 1 AND converted = 0
                AND started_at IS NOT NULL AND started_at < ?1",
            [older_than.to_rfc3339()],
        )?;
        Ok(released)
    }

    fn stats(&self) -> StoreResult<CatalogStats> {
        let conn = self.lock()?;
        let stats = conn.query_row(
            "SELECT
                COUNT(*) FILTER (WHERE deleted = 0),
                COUNT(*) FILTER (WHERE deleted = 0 AND conversion_required = 1
                                   AND converting = 0 AND converted = 0
                                   AND conversion_error = 0),
                COUNT(*) FILTER (WHERE converted = 1),
                COUNT(*) FILTER (WHERE conversion_error = 1),
                COALESCE(SUM(CASE WHEN converted = 1
                                  THEN size_before - size_after ELSE 0 END), 0)
             FROM media_files",
            [],
            |row| {
                Ok(CatalogStats {
                    tracked: row.get::<_, i64>(0)? as u64,
                    pending: row.get::<_, i64>(1)? as u64,
                    converted: row.get::<_, i64>(2)? as u64,
                    errored: row.get::<_, i64>(3)? as u64,
                    bytes_saved: row.get::<_, i64>(4)?.max(0) as u64,
                })
            },
        )?;
        Ok(stats)
    }
}

/// In-memory store used by tests and available as a throwaway backend.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, FileRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogStore for MemoryStore {
    fn upsert(&self, record: &FileRecord) -> StoreResult<()> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&record.path) {
            Some(existing) => {
                existing.inode = record.inode;
                existing.deleted = false;
                existing.probe = record.probe.clone();
                existing.conversion_required = record.conversion_required;
                existing.streams = record.streams.clone();
                existing.size_before_bytes = record.size_before_bytes;
            }
            None => {
                records.insert(record.path.clone(), record.clone());
            }
        }
        Ok(())
    }

    fn get(&self, path: &str) -> StoreResult<Option<FileRecord>> {
        Ok(self.records.lock().unwrap().get(path).cloned())
    }

    fn active_paths(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| !r.deleted)
            .map(|r| r.path.clone())
            .collect())
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let mut records = self.records.lock().unwrap();
        if let Some(mut record) = records.remove(from) {
            record.path = to.to_string();
            record.deleted = false;
            records.insert(to.to_string(), record);
        }
        Ok(())
    }

    fn mark_deleted(&self, path: &str) -> StoreResult<()> {
        if let Some(record) = self.records.lock().unwrap().get_mut(path) {
            record.deleted = true;
        }
        Ok(())
    }

    fn claim_next(
        &self,
        policy: &ClaimPolicy,
        worker: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<FileRecord>> {
        let mut records = self.records.lock().unwrap();
        let mut eligible: Vec<&FileRecord> = records
            .values()
            .filter(|r| r.is_pending())
            .filter(|r| match &policy.path_prefix {
                Some(prefix) => r.path.starts_with(prefix.as_str()),
                None => true,
            })
            .collect();

        if policy.prefer_smallest {
            eligible.sort_by(|a, b| {
                a.size_before_bytes
                    .cmp(&b.size_before_bytes)
                    .then_with(|| a.path.cmp(&b.path))
            });
        } else {
            eligible.sort_by(|a, b| {
                b.container_bit_rate()
                    .cmp(&a.container_bit_rate())
                    .then_with(|| a.path.cmp(&b.path))
            });
        }

        let Some(path) = eligible.first().map(|r| r.path.clone()) else {
            return Ok(None);
        };
        let record = records.get_mut(&path).unwrap();
        record.converting = true;
        record.worker_name = Some(worker.to_string());
        record.started_at = Some(now);
        record.finished_at = None;
        record.progress_percent = 0.0;
        record.speed_factor = 0.0;
        Ok(Some(record.clone()))
    }

    fn release_claim(&self, path: &str) -> StoreResult<()> {
        if let Some(record) = self.records.lock().unwrap().get_mut(path) {
            record.converting = false;
            record.started_at = None;
            record.progress_percent = 0.0;
            record.speed_factor = 0.0;
        }
        Ok(())
    }

    fn update_progress(&self, path: &str, percent: f64, speed: f64) -> StoreResult<()> {
        if let Some(record) = self.records.lock().unwrap().get_mut(path) {
            if record.converting {
                record.progress_percent = percent;
                record.speed_factor = speed;
            }
        }
        Ok(())
    }

    fn finish_converted(
        &self,
        path: &str,
        size_after_bytes: u64,
        finished_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if let Some(record) = self.records.lock().unwrap().get_mut(path) {
            record.converting = false;
            record.converted = true;
            record.conversion_error = false;
            record.progress_percent = 100.0;
            record.size_after_bytes = size_after_bytes;
            record.finished_at = Some(finished_at);
        }
        Ok(())
    }

    fn mark_error(&self, path: &str, finished_at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(record) = self.records.lock().unwrap().get_mut(path) {
            record.converting = false;
            record.conversion_error = true;
            record.progress_percent = 0.0;
            record.speed_factor = 0.0;
            record.finished_at = Some(finished_at);
        }
        Ok(())
    }

    fn release_stale_claims(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        let mut released = 0;
        for record in self.records.lock().unwrap().values_mut() {
            if record.converting
                && !record.converted
                && record.started_at.map(|t| t < older_than).unwrap_or(false)
            {
                record.converting = false;
                record.started_at = None;
                record.worker_name = None;
                record.progress_percent = 0.0;
                record.speed_factor = 0.0;
                released += 1;
            }
        }
        Ok(released)
    }

    fn stats(&self) -> StoreResult<CatalogStats> {
        let records = self.records.lock().unwrap();
        let mut stats = CatalogStats::default();
        for record in records.values() {
            if !record.deleted {
                stats.tracked += 1;
            }
            if record.is_pending() {
                stats.pending += 1;
            }
            if record.converted {
                stats.converted += 1;
                stats.bytes_saved += record.bytes_saved();
            }
            if record.conversion_error {
                stats.errored += 1;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffprobe::{ProbeData, ProbeFormat, ProbeStream};
    use std::sync::Arc;

    fn record(path: &str, inode: u64, size: u64, bit_rate: u64) -> FileRecord {
        let probe = ProbeData {
            streams: vec![ProbeStream::test_stream(0, "video", "h264")],
            format: ProbeFormat::test_format(3600.0, Some(bit_rate)),
        };
        FileRecord::new(path.to_string(), inode, size, probe)
    }

    fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("catalog.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn upsert_is_idempotent_and_preserves_state() {
        let (_dir, store) = open_store();
        let rec = record("/media/a.mkv", 1, 1000, 800);
        store.upsert(&rec).unwrap();
        store.upsert(&rec).unwrap();

        assert_eq!(store.active_paths().unwrap().len(), 1);

        // A converted record keeps its terminal state across a re-upsert.
        store.finish_converted("/media/a.mkv", 600, Utc::now()).unwrap();
        store.upsert(&rec).unwrap();
        let reloaded = store.get("/media/a.mkv").unwrap().unwrap();
        assert!(reloaded.converted);
        assert_eq!(reloaded.size_after_bytes, 600);
    }

    #[test]
    fn claim_prefers_highest_bit_rate() {
        let (_dir, store) = open_store();
        store.upsert(&record("/media/low.mkv", 1, 1000, 2_000_000)).unwrap();
        store.upsert(&record("/media/high.mkv", 2, 1000, 9_000_000)).unwrap();

        let claimed = store
            .claim_next(&ClaimPolicy::default(), "w1", Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(claimed.path, "/media/high.mkv");
        assert!(claimed.converting);
        assert_eq!(claimed.worker_name.as_deref(), Some("w1"));
    }

    #[test]
    fn claim_policy_smallest_and_prefix() {
        let (_dir, store) = open_store();
        store.upsert(&record("/tv/big.mkv", 1, 9000, 1)).unwrap();
        store.upsert(&record("/tv/small.mkv", 2, 100, 1)).unwrap();
        store.upsert(&record("/films/tiny.mkv", 3, 10, 1)).unwrap();

        let policy = ClaimPolicy {
            prefer_smallest: true,
            path_prefix: Some("/tv/".to_string()),
        };
        let claimed = store.claim_next(&policy, "w1", Utc::now()).unwrap().unwrap();
        assert_eq!(claimed.path, "/tv/small.mkv");
    }

    #[test]
    fn claimed_records_leave_the_backlog_until_released() {
        let (_dir, store) = open_store();
        store.upsert(&record("/media/a.mkv", 1, 1000, 800)).unwrap();

        let first = store.claim_next(&ClaimPolicy::default(), "w1", Utc::now()).unwrap();
        assert!(first.is_some());
        let second = store.claim_next(&ClaimPolicy::default(), "w2", Utc::now()).unwrap();
        assert!(second.is_none());

        store.release_claim("/media/a.mkv").unwrap();
        let third = store.claim_next(&ClaimPolicy::default(), "w2", Utc::now()).unwrap();
        assert!(third.is_some());
        let reloaded = store.get("/media/a.mkv").unwrap().unwrap();
        assert_eq!(reloaded.worker_name.as_deref(), Some("w2"));
    }

    #[test]
    fn racing_workers_never_claim_the_same_record() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("catalog.db");

        {
            let store = SqliteStore::open(&db_path).unwrap();
            for i in 0..4u64 {
                store
                    .upsert(&record(&format!("/media/{i}.mkv"), i + 1, 1000, 1000 + i))
                    .unwrap();
            }
        }

        let mut handles = Vec::new();
        for worker in 0..8 {
            let db_path = db_path.clone();
            handles.push(std::thread::spawn(move || {
                let store = SqliteStore::open(&db_path).unwrap();
                store
                    .claim_next(&ClaimPolicy::default(), &format!("w{worker}"), Utc::now())
                    .unwrap()
                    .map(|r| r.path)
            }));
        }

        let mut claimed: Vec<String> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        claimed.sort();
        let before_dedup = claimed.len();
        claimed.dedup();

        // 8 workers raced a backlog of 4: exactly 4 claims, no duplicates.
        assert_eq!(before_dedup, 4);
        assert_eq!(claimed.len(), 4);
    }

    #[test]
    fn rename_and_mark_deleted() {
        let (_dir, store) = open_store();
        store.upsert(&record("/media/old.mkv", 9, 1000, 800)).unwrap();

        store.rename("/media/old.mkv", "/media/new.mkv").unwrap();
        assert!(store.get("/media/old.mkv").unwrap().is_none());
        let renamed = store.get("/media/new.mkv").unwrap().unwrap();
        assert_eq!(renamed.inode, 9);
        assert!(!renamed.deleted);

        store.mark_deleted("/media/new.mkv").unwrap();
        assert!(store.get("/media/new.mkv").unwrap().unwrap().deleted);
        assert!(store.active_paths().unwrap().is_empty());
    }

    #[test]
    fn stale_claims_are_released() {
        let (_dir, store) = open_store();
        store.upsert(&record("/media/a.mkv", 1, 1000, 800)).unwrap();
        store.upsert(&record("/media/b.mkv", 2, 1000, 700)).unwrap();

        let long_ago = Utc::now() - chrono::Duration::hours(24);
        store.claim_next(&ClaimPolicy::default(), "dead", long_ago).unwrap();
        store.claim_next(&ClaimPolicy::default(), "alive", Utc::now()).unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(12);
        assert_eq!(store.release_stale_claims(cutoff).unwrap(), 1);

        let released = store.get("/media/a.mkv").unwrap().unwrap();
        assert!(!released.converting);
        assert_eq!(released.progress_percent, 0.0);
        let live = store.get("/media/b.mkv").unwrap().unwrap();
        assert!(live.converting);
    }

    #[test]
    fn progress_updates_only_apply_while_converting() {
        let (_dir, store) = open_store();
        store.upsert(&record("/media/a.mkv", 1, 1000, 800)).unwrap();

        store.update_progress("/media/a.mkv", 50.0, 1.5).unwrap();
        assert_eq!(store.get("/media/a.mkv").unwrap().unwrap().progress_percent, 0.0);

        store.claim_next(&ClaimPolicy::default(), "w1", Utc::now()).unwrap();
        store.update_progress("/media/a.mkv", 50.0, 1.5).unwrap();
        let reloaded = store.get("/media/a.mkv").unwrap().unwrap();
        assert_eq!(reloaded.progress_percent, 50.0);
        assert_eq!(reloaded.speed_factor, 1.5);
    }

    #[test]
    fn stats_sum_bytes_saved_over_converted_records() {
        let (_dir, store) = open_store();
        store.upsert(&record("/media/a.mkv", 1, 1000, 800)).unwrap();
        store.upsert(&record("/media/b.mkv", 2, 2000, 700)).unwrap();
        store.upsert(&record("/media/c.mkv", 3, 500, 600)).unwrap();

        store.finish_converted("/media/a.mkv", 600, Utc::now()).unwrap();
        store.mark_error("/media/c.mkv", Utc::now()).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.tracked, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.converted, 1);
        assert_eq!(stats.errored, 1);
        assert_eq!(stats.bytes_saved, 400);
    }

    #[test]
    fn memory_store_mirrors_claim_semantics() {
        let store = Arc::new(MemoryStore::new());
        store.upsert(&record("/media/low.mkv", 1, 1000, 2_000_000)).unwrap();
        store.upsert(&record("/media/high.mkv", 2, 1000, 9_000_000)).unwrap();

        let claimed = store
            .claim_next(&ClaimPolicy::default(), "w1", Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(claimed.path, "/media/high.mkv");
        assert!(store
            .claim_next(&ClaimPolicy::default(), "w2", Utc::now())
            .unwrap()
            .map(|r| r.path != claimed.path)
            .unwrap_or(true));
    }
}
