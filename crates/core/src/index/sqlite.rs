//! SQLite-backed conversion index.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::error::IndexError;
use super::naming::{planned_output, with_suffix};
use super::types::{AppendOutcome, EntryStatus, IndexEntry, JobKey, StatusCounts, VerifyReport};
use crate::config::{IndexConfig, JobOptions};
use crate::discovery::{Candidate, EntryKind};
use crate::metrics;

/// Bumped whenever the table layout changes. Older files are refused.
const SCHEMA_VERSION: &str = "1";

/// Upper bound on entries listed in a [`VerifyReport`].
const REPORT_LIST_LIMIT: usize = 100;

const ENTRY_COLUMNS: &str =
    "id, source_path, relative_path, kind, output_path, status, attempt_count, last_error, updated_at";

const META_SCHEMA_VERSION: &str = "schema_version";
const META_JOB_KEY: &str = "job_key";
const META_JOB: &str = "job";
const META_CREATED_AT: &str = "created_at";
const META_DISCOVERY_COMPLETE: &str = "discovery_complete";

/// Durable per-job ledger of discovered files and their status.
pub struct ConversionIndex {
    conn: Mutex<Connection>,
    path: PathBuf,
    job: JobOptions,
    key: JobKey,
    chunk_size: usize,
    max_collision_suffix: u32,
}

impl ConversionIndex {
    /// Opens the index for `job` inside `location`, creating it if needed.
    ///
    /// `job` should already be absolutized so that equivalent invocations
    /// from different working directories share one index.
    pub fn open_or_create(
        location: &Path,
        job: &JobOptions,
        config: &IndexConfig,
    ) -> Result<Self, IndexError> {
        let key = JobKey::for_job(job);
        std::fs::create_dir_all(location).map_err(IndexError::write)?;

        let path = Self::file_path(location, &key);
        let existed = path.exists();

        let conn = Connection::open(&path).map_err(|e| {
            if existed {
                IndexError::corrupt(&path, e)
            } else {
                IndexError::write(e)
            }
        })?;

        let index = Self {
            conn: Mutex::new(conn),
            path,
            job: job.clone(),
            key,
            chunk_size: config.chunk_size.max(1),
            max_collision_suffix: config.max_collision_suffix,
        };
        index.initialize(existed)?;

        info!(
            path = %index.path.display(),
            job_key = %index.key.short(),
            resumed = existed,
            "conversion index ready"
        );
        Ok(index)
    }

    /// Deletes the index file for `job`, if any. Returns whether one existed.
    pub fn discard(location: &Path, job: &JobOptions) -> Result<bool, IndexError> {
        let path = Self::file_path(location, &JobKey::for_job(job));
        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(&path).map_err(IndexError::write)?;
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = path.clone().into_os_string();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                std::fs::remove_file(&sidecar).map_err(IndexError::write)?;
            }
        }

        info!(path = %path.display(), "discarded conversion index");
        Ok(true)
    }

    /// Index file for a job key inside `location`.
    pub fn file_path(location: &Path, key: &JobKey) -> PathBuf {
        location.join(format!("index-{}.db", key.short()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn job(&self) -> &JobOptions {
        &self.job
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, IndexError> {
        self.conn
            .lock()
            .map_err(|_| IndexError::read("index connection lock poisoned"))
    }

    fn initialize(&self, existed: bool) -> Result<(), IndexError> {
        let mut conn = self.lock()?;

        // On an existing file every failure up to the key check means the
        // file cannot be trusted.
        let fail = |e: rusqlite::Error| {
            if existed {
                IndexError::corrupt(&self.path, e)
            } else {
                IndexError::write(e)
            }
        };

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(fail)?;
        conn.pragma_update(None, "synchronous", "FULL").map_err(fail)?;

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .map_err(fail)?;

        // A file without tables holds no progress: the previous run died
        // before its first commit.
        if tables == 0 {
            return self.create_schema(&mut conn);
        }

        let meta = Self::read_meta(&conn).map_err(fail)?;
        match meta.get(META_SCHEMA_VERSION).map(String::as_str) {
            Some(SCHEMA_VERSION) => {}
            Some(other) => {
                return Err(IndexError::corrupt(
                    &self.path,
                    format!("unsupported schema version {}", other),
                ))
            }
            None => return Err(IndexError::corrupt(&self.path, "missing schema version")),
        }

        match meta.get(META_JOB_KEY) {
            Some(stored) if JobKey::from_hex(stored.clone()) == self.key => {}
            Some(stored) => {
                return Err(IndexError::corrupt(
                    &self.path,
                    format!("belongs to job {} not {}", stored, self.key),
                ))
            }
            None => return Err(IndexError::corrupt(&self.path, "missing job key")),
        }

        conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get::<_, i64>(0))
            .map_err(fail)?;

        Ok(())
    }

    fn create_schema(&self, conn: &mut Connection) -> Result<(), IndexError> {
        let job_json = serde_json::to_string(&self.job).map_err(IndexError::write)?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction().map_err(IndexError::write)?;
        tx.execute_batch(
            r#"
            CREATE TABLE job_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_path TEXT NOT NULL UNIQUE,
                relative_path TEXT NOT NULL,
                kind TEXT NOT NULL,
                output_path TEXT UNIQUE,
                status TEXT NOT NULL,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX idx_entries_status ON entries(status, id);
            "#,
        )
        .map_err(IndexError::write)?;

        for (key, value) in [
            (META_SCHEMA_VERSION, SCHEMA_VERSION.to_string()),
            (META_JOB_KEY, self.key.to_string()),
            (META_JOB, job_json),
            (META_CREATED_AT, now),
            (META_DISCOVERY_COMPLETE, "false".to_string()),
        ] {
            tx.execute(
                "INSERT INTO job_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(IndexError::write)?;
        }

        tx.commit().map_err(IndexError::write)
    }

    fn read_meta(conn: &Connection) -> rusqlite::Result<HashMap<String, String>> {
        let mut stmt = conn.prepare("SELECT key, value FROM job_meta")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<(), IndexError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(IndexError::write)?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>, IndexError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM job_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(IndexError::read)
    }

    /// When the index was first created.
    pub fn created_at(&self) -> Result<Option<DateTime<Utc>>, IndexError> {
        Ok(self
            .get_meta(META_CREATED_AT)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Records that every candidate of the target has been appended.
    pub fn mark_discovery_complete(&self) -> Result<(), IndexError> {
        self.set_meta(META_DISCOVERY_COMPLETE, "true")
    }

    pub fn is_discovery_complete(&self) -> Result<bool, IndexError> {
        Ok(self.get_meta(META_DISCOVERY_COMPLETE)?.as_deref() == Some("true"))
    }

    /// Persists one chunk of candidates in a single transaction.
    ///
    /// Sources already in the index are left untouched. Each new entry gets
    /// its planned output path, or the first free `name (N).ext` when that
    /// path is taken by an earlier entry (this batch included) or is the
    /// source itself. If no suffix up to `max_collision_suffix` is free the
    /// entry is recorded as failed without an output path.
    pub fn append_entries(&self, batch: Vec<Candidate>) -> Result<AppendOutcome, IndexError> {
        if batch.len() > self.chunk_size {
            return Err(IndexError::ChunkTooLarge {
                len: batch.len(),
                max: self.chunk_size,
            });
        }

        let mut outcome = AppendOutcome::default();
        if batch.is_empty() {
            return Ok(outcome);
        }

        let now = Utc::now().to_rfc3339();
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(IndexError::write)?;

        {
            let mut source_known = tx
                .prepare_cached("SELECT 1 FROM entries WHERE source_path = ?1")
                .map_err(IndexError::write)?;
            let mut output_taken = tx
                .prepare_cached("SELECT 1 FROM entries WHERE output_path = ?1")
                .map_err(IndexError::write)?;
            let mut insert = tx
                .prepare_cached(
                    "INSERT INTO entries (source_path, relative_path, kind, output_path, status, attempt_count, last_error, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                )
                .map_err(IndexError::write)?;

            for candidate in batch {
                let source = path_to_text(&candidate.source);
                if source_known
                    .exists(params![source])
                    .map_err(IndexError::write)?
                {
                    outcome.already_present += 1;
                    continue;
                }

                let planned = planned_output(&self.job, &candidate);
                let mut assigned = None;
                for n in 0..=self.max_collision_suffix {
                    let path = with_suffix(&planned, n);
                    if path == candidate.source {
                        continue;
                    }
                    if !output_taken
                        .exists(params![path_to_text(&path)])
                        .map_err(IndexError::write)?
                    {
                        assigned = Some((n, path));
                        break;
                    }
                }

                let (output, status, error) = match assigned {
                    Some((n, path)) => {
                        if n > 0 {
                            debug!(
                                source = %candidate.source.display(),
                                output = %path.display(),
                                "output name taken, using suffix"
                            );
                            outcome.renamed += 1;
                        }
                        (Some(path_to_text(&path)), EntryStatus::Pending, None)
                    }
                    None => {
                        warn!(
                            source = %candidate.source.display(),
                            planned = %planned.display(),
                            "no free output name, recording as failed"
                        );
                        outcome.unresolvable += 1;
                        (
                            None,
                            EntryStatus::Failed,
                            Some(format!(
                                "no free output name for {} up to suffix ({})",
                                planned.display(),
                                self.max_collision_suffix
                            )),
                        )
                    }
                };

                insert
                    .execute(params![
                        source,
                        path_to_text(&candidate.relative_path),
                        candidate.kind.as_str(),
                        output,
                        status.as_str(),
                        error,
                        now,
                    ])
                    .map_err(IndexError::write)?;
                outcome.inserted += 1;
            }
        }

        tx.commit().map_err(IndexError::write)?;

        metrics::ENTRIES_DISCOVERED.inc_by(outcome.inserted as u64);
        debug!(
            inserted = outcome.inserted,
            already_present = outcome.already_present,
            "chunk committed"
        );
        Ok(outcome)
    }

    /// Appends every batch in order, then marks discovery complete.
    ///
    /// If this fails part way, the committed chunks stay and discovery stays
    /// incomplete, so the next run walks the target again.
    pub fn append_all<I>(&self, batches: I) -> Result<AppendOutcome, IndexError>
    where
        I: IntoIterator<Item = Vec<Candidate>>,
    {
        let mut total = AppendOutcome::default();
        for batch in batches {
            total.absorb(self.append_entries(batch)?);
        }
        self.mark_discovery_complete()?;

        info!(
            inserted = total.inserted,
            already_present = total.already_present,
            renamed = total.renamed,
            unresolvable = total.unresolvable,
            "discovery recorded"
        );
        Ok(total)
    }

    /// Lazily yields pending entries in insertion order, one page of
    /// `chunk_size` rows at a time.
    pub fn iterate_pending(&self) -> PendingEntries<'_> {
        PendingEntries {
            index: self,
            after_id: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn pending_page(&self, after_id: i64) -> Result<Vec<IndexEntry>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {} FROM entries WHERE status = ?1 AND id > ?2 ORDER BY id LIMIT ?3",
                ENTRY_COLUMNS
            ))
            .map_err(IndexError::read)?;
        let rows = stmt
            .query_map(
                params![EntryStatus::Pending.as_str(), after_id, self.chunk_size as i64],
                row_to_entry,
            )
            .map_err(IndexError::read)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(IndexError::read)
    }

    /// Moves an entry to `status` and commits before returning.
    ///
    /// A move to `Failed` bumps `attempt_count`. `error` replaces
    /// `last_error`. Done and skipped entries refuse any change.
    pub fn mark(
        &self,
        id: i64,
        status: EntryStatus,
        error: Option<&str>,
    ) -> Result<IndexEntry, IndexError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(IndexError::write)?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM entries WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(IndexError::read)?;
        let current = current
            .ok_or(IndexError::EntryNotFound(id))?
            .parse::<EntryStatus>()
            .map_err(IndexError::read)?;

        if current.is_terminal() && current != status {
            return Err(IndexError::InvalidTransition {
                id,
                from: current.to_string(),
                to: status.to_string(),
            });
        }

        let increment = i64::from(status == EntryStatus::Failed);
        tx.execute(
            "UPDATE entries SET status = ?1, attempt_count = attempt_count + ?2, last_error = ?3, updated_at = ?4 WHERE id = ?5",
            params![status.as_str(), increment, error, Utc::now().to_rfc3339(), id],
        )
        .map_err(IndexError::write)?;

        let entry = tx
            .query_row(
                &format!("SELECT {} FROM entries WHERE id = ?1", ENTRY_COLUMNS),
                params![id],
                row_to_entry,
            )
            .map_err(IndexError::read)?;

        tx.commit().map_err(IndexError::write)?;
        Ok(entry)
    }

    /// Puts failed entries with fewer than `max_attempts` attempts back to
    /// pending. Entries without an output path stay failed.
    pub fn requeue_failed(&self, max_attempts: u32) -> Result<usize, IndexError> {
        let conn = self.lock()?;
        let requeued = conn
            .execute(
                "UPDATE entries SET status = ?1, updated_at = ?2
                 WHERE status = ?3 AND attempt_count < ?4 AND output_path IS NOT NULL",
                params![
                    EntryStatus::Pending.as_str(),
                    Utc::now().to_rfc3339(),
                    EntryStatus::Failed.as_str(),
                    max_attempts,
                ],
            )
            .map_err(IndexError::write)?;

        if requeued > 0 {
            info!(requeued, max_attempts, "requeued failed entries");
        }
        Ok(requeued)
    }

    pub fn entry(&self, id: i64) -> Result<Option<IndexEntry>, IndexError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM entries WHERE id = ?1", ENTRY_COLUMNS),
            params![id],
            row_to_entry,
        )
        .optional()
        .map_err(IndexError::read)
    }

    pub fn entry_by_source(&self, source: &Path) -> Result<Option<IndexEntry>, IndexError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM entries WHERE source_path = ?1", ENTRY_COLUMNS),
            params![path_to_text(source)],
            row_to_entry,
        )
        .optional()
        .map_err(IndexError::read)
    }

    /// Number of recorded entries.
    pub fn len(&self) -> Result<u64, IndexError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(IndexError::read)?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }

    /// Number of entries in each status.
    pub fn status_counts(&self) -> Result<StatusCounts, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached("SELECT status, COUNT(*) FROM entries GROUP BY status")
            .map_err(IndexError::read)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(IndexError::read)?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row.map_err(IndexError::read)?;
            let count = count as u64;
            counts.total += count;
            match status.parse::<EntryStatus>().map_err(IndexError::read)? {
                EntryStatus::Pending => counts.pending = count,
                EntryStatus::Done => counts.done = count,
                EntryStatus::Failed => counts.failed = count,
                EntryStatus::Skipped => counts.skipped = count,
            }
        }
        Ok(counts)
    }

    /// Checks that every entry reached a final state and that done entries
    /// still have their output on disk.
    pub fn verify_complete(&self) -> Result<VerifyReport, IndexError> {
        let counts = self.status_counts()?;
        let mut report = VerifyReport {
            total: counts.total,
            pending: counts.pending,
            done: counts.done,
            failed: counts.failed,
            skipped: counts.skipped,
            ..VerifyReport::default()
        };

        {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM entries WHERE status IN (?1, ?2) ORDER BY id LIMIT ?3",
                    ENTRY_COLUMNS
                ))
                .map_err(IndexError::read)?;
            report.stragglers = stmt
                .query_map(
                    params![
                        EntryStatus::Failed.as_str(),
                        EntryStatus::Pending.as_str(),
                        REPORT_LIST_LIMIT as i64
                    ],
                    row_to_entry,
                )
                .map_err(IndexError::read)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(IndexError::read)?;
            report.straggler_count = report.failed + report.pending;
        }

        // Done entries are checked page by page so the lock is not held
        // across the whole scan.
        let mut after_id = 0;
        loop {
            let page = self.done_page(after_id)?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = last.id;

            for entry in page {
                let present = entry.output_path.as_deref().is_some_and(Path::exists);
                if !present {
                    report.missing_output_count += 1;
                    if report.missing_outputs.len() < REPORT_LIST_LIMIT {
                        report.missing_outputs.push(entry);
                    }
                }
            }
        }

        Ok(report)
    }

    fn done_page(&self, after_id: i64) -> Result<Vec<IndexEntry>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {} FROM entries WHERE status = ?1 AND id > ?2 ORDER BY id LIMIT ?3",
                ENTRY_COLUMNS
            ))
            .map_err(IndexError::read)?;
        let rows = stmt
            .query_map(
                params![EntryStatus::Done.as_str(), after_id, self.chunk_size as i64],
                row_to_entry,
            )
            .map_err(IndexError::read)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(IndexError::read)
    }
}

/// Iterator over pending entries, see [`ConversionIndex::iterate_pending`].
///
/// Pages are fetched after the last id seen, so entries marked while
/// iterating neither repeat nor shift the sequence. A read error is yielded
/// once and ends the iteration.
pub struct PendingEntries<'a> {
    index: &'a ConversionIndex,
    after_id: i64,
    buffer: VecDeque<IndexEntry>,
    exhausted: bool,
}

impl Iterator for PendingEntries<'_> {
    type Item = Result<IndexEntry, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.index.pending_page(self.after_id) {
                Ok(page) => {
                    if page.len() < self.index.chunk_size {
                        self.exhausted = true;
                    }
                    if let Some(last) = page.last() {
                        self.after_id = last.id;
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}

fn path_to_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<IndexEntry> {
    let kind: String = row.get(3)?;
    let status: String = row.get(5)?;
    let updated_at: String = row.get(8)?;

    let kind = kind.parse::<EntryKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let status = status.parse::<EntryStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
    })?;

    // Timestamps are informational, a bad one is not worth failing a read
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(IndexEntry {
        id: row.get(0)?,
        source_path: PathBuf::from(row.get::<_, String>(1)?),
        relative_path: PathBuf::from(row.get::<_, String>(2)?),
        kind,
        output_path: row.get::<_, Option<String>>(4)?.map(PathBuf::from),
        status,
        attempt_count: row.get(6)?,
        last_error: row.get(7)?,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use tempfile::TempDir;

    fn job() -> JobOptions {
        JobOptions::new("/music", "/out", OutputFormat::Mp3).recursive(true)
    }

    fn config(chunk_size: usize) -> IndexConfig {
        IndexConfig {
            chunk_size,
            ..IndexConfig::default()
        }
    }

    fn convert(relative: &str) -> Candidate {
        Candidate::new(Path::new("/music").join(relative), relative, EntryKind::Convert)
    }

    fn open(dir: &TempDir, job: &JobOptions, chunk_size: usize) -> ConversionIndex {
        ConversionIndex::open_or_create(dir.path(), job, &config(chunk_size)).unwrap()
    }

    fn pending_ids(index: &ConversionIndex) -> Vec<i64> {
        index.iterate_pending().map(|e| e.unwrap().id).collect()
    }

    #[test]
    fn test_create_and_append() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir, &job(), 10);
        assert!(index.is_empty().unwrap());
        assert!(index
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("index-"));

        let outcome = index
            .append_entries(vec![convert("a.wav"), convert("sub/b.flac")])
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(index.len().unwrap(), 2);

        let b = index
            .entry_by_source(Path::new("/music/sub/b.flac"))
            .unwrap()
            .unwrap();
        assert_eq!(b.status, EntryStatus::Pending);
        assert_eq!(b.output_path, Some(PathBuf::from("/out/sub/b.mp3")));
        assert_eq!(b.relative_path, PathBuf::from("sub/b.flac"));
        assert_eq!(b.attempt_count, 0);
    }

    #[test]
    fn test_rediscovery_is_noop() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir, &job(), 10);
        index.append_entries(vec![convert("a.wav")]).unwrap();

        let outcome = index
            .append_entries(vec![convert("a.wav"), convert("b.wav")])
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.already_present, 1);
        assert_eq!(index.len().unwrap(), 2);
    }

    #[test]
    fn test_chunk_too_large_is_rejected() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir, &job(), 2);
        let err = index
            .append_entries(vec![convert("a.wav"), convert("b.wav"), convert("c.wav")])
            .unwrap_err();
        assert!(matches!(err, IndexError::ChunkTooLarge { len: 3, max: 2 }));
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn test_failed_insert_rolls_back_whole_chunk() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir, &job(), 10);
        index.append_entries(vec![convert("earlier.wav")]).unwrap();

        // Reject the third row of the next chunk from outside the index.
        let other = Connection::open(index.path()).unwrap();
        other
            .execute_batch(
                "CREATE TRIGGER reject_c BEFORE INSERT ON entries
                 WHEN NEW.source_path LIKE '%c.wav'
                 BEGIN SELECT RAISE(ABORT, 'x'); END;",
            )
            .unwrap();
        drop(other);

        let err = index
            .append_entries(vec![convert("a.wav"), convert("b.wav"), convert("c.wav")])
            .unwrap_err();
        assert!(matches!(err, IndexError::IoWrite(_)));
        drop(index);

        let index = open(&dir, &job(), 10);
        assert_eq!(index.len().unwrap(), 1);
        for source in ["/music/a.wav", "/music/b.wav", "/music/c.wav"] {
            assert!(index.entry_by_source(Path::new(source)).unwrap().is_none());
        }
        assert!(index
            .entry_by_source(Path::new("/music/earlier.wav"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_collisions_get_deterministic_suffixes() {
        let dir = TempDir::new().unwrap();
        let job = JobOptions::new("/music", "/out", OutputFormat::Mp3).flatten(true);
        let index = open(&dir, &job, 10);

        index
            .append_entries(vec![convert("x/track.wav"), convert("y/track.wav")])
            .unwrap();
        let outcome = index.append_entries(vec![convert("z/track.flac")]).unwrap();
        assert_eq!(outcome.renamed, 1);

        let outputs: Vec<PathBuf> = ["x/track.wav", "y/track.wav", "z/track.flac"]
            .iter()
            .map(|r| {
                index
                    .entry_by_source(&Path::new("/music").join(r))
                    .unwrap()
                    .unwrap()
                    .output_path
                    .unwrap()
            })
            .collect();
        assert_eq!(
            outputs,
            vec![
                PathBuf::from("/out/track.mp3"),
                PathBuf::from("/out/track (1).mp3"),
                PathBuf::from("/out/track (2).mp3"),
            ]
        );
    }

    #[test]
    fn test_exhausted_suffixes_record_failure() {
        let dir = TempDir::new().unwrap();
        let job = JobOptions::new("/music", "/out", OutputFormat::Mp3).flatten(true);
        let config = IndexConfig {
            chunk_size: 10,
            max_collision_suffix: 1,
            ..IndexConfig::default()
        };
        let index = ConversionIndex::open_or_create(dir.path(), &job, &config).unwrap();

        let outcome = index
            .append_entries(vec![
                convert("a/song.wav"),
                convert("b/song.wav"),
                convert("c/song.wav"),
            ])
            .unwrap();
        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.unresolvable, 1);

        let c = index
            .entry_by_source(Path::new("/music/c/song.wav"))
            .unwrap()
            .unwrap();
        assert_eq!(c.status, EntryStatus::Failed);
        assert!(c.output_path.is_none());
        assert!(c.last_error.unwrap().contains("no free output name"));
    }

    #[test]
    fn test_output_never_overwrites_source() {
        let dir = TempDir::new().unwrap();
        let job = JobOptions::new("/music", "/music", OutputFormat::Mp3);
        let index = open(&dir, &job, 10);
        index.append_entries(vec![convert("song.mp3")]).unwrap();

        let entry = index
            .entry_by_source(Path::new("/music/song.mp3"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.output_path, Some(PathBuf::from("/music/song (1).mp3")));
    }

    #[test]
    fn test_iterate_pending_pages_in_order() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir, &job(), 2);
        index
            .append_entries(vec![convert("a.wav"), convert("b.wav")])
            .unwrap();
        index
            .append_entries(vec![convert("c.wav"), convert("d.wav")])
            .unwrap();
        index.append_entries(vec![convert("e.wav")]).unwrap();

        let ids = pending_ids(&index);
        assert_eq!(ids.len(), 5);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_marking_during_iteration() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir, &job(), 2);
        index
            .append_entries(vec![convert("a.wav"), convert("b.wav")])
            .unwrap();
        index
            .append_entries(vec![convert("c.wav"), convert("d.wav")])
            .unwrap();

        let mut seen = 0;
        for entry in index.iterate_pending() {
            let entry = entry.unwrap();
            index.mark(entry.id, EntryStatus::Done, None).unwrap();
            seen += 1;
        }
        assert_eq!(seen, 4);
        assert!(pending_ids(&index).is_empty());
    }

    #[test]
    fn test_mark_transitions() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir, &job(), 10);
        index.append_entries(vec![convert("a.wav")]).unwrap();
        let id = pending_ids(&index)[0];

        let failed = index
            .mark(id, EntryStatus::Failed, Some("bad header"))
            .unwrap();
        assert_eq!(failed.attempt_count, 1);
        assert_eq!(failed.last_error.as_deref(), Some("bad header"));

        let pending = index.mark(id, EntryStatus::Pending, None).unwrap();
        assert_eq!(pending.attempt_count, 1);
        assert!(pending.last_error.is_none());

        index.mark(id, EntryStatus::Done, None).unwrap();
        let err = index.mark(id, EntryStatus::Pending, None).unwrap_err();
        assert!(matches!(err, IndexError::InvalidTransition { .. }));

        let err = index.mark(9999, EntryStatus::Done, None).unwrap_err();
        assert!(matches!(err, IndexError::EntryNotFound(9999)));
    }

    #[test]
    fn test_reopen_keeps_progress() {
        let dir = TempDir::new().unwrap();
        let job = job();
        {
            let index = open(&dir, &job, 10);
            index
                .append_entries(vec![convert("a.wav"), convert("b.wav")])
                .unwrap();
            let first = pending_ids(&index)[0];
            index.mark(first, EntryStatus::Done, None).unwrap();
            index.mark_discovery_complete().unwrap();
        }

        let index = open(&dir, &job, 10);
        assert_eq!(index.len().unwrap(), 2);
        assert_eq!(pending_ids(&index).len(), 1);
        assert!(index.is_discovery_complete().unwrap());
        assert!(index.created_at().unwrap().is_some());
    }

    #[test]
    fn test_different_jobs_use_different_files() {
        let dir = TempDir::new().unwrap();
        let a = open(&dir, &job(), 10);
        let b = open(&dir, &job().flatten(true), 10);
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let job = job();
        let path = ConversionIndex::file_path(dir.path(), &JobKey::for_job(&job));
        std::fs::write(&path, b"this is not a database, just some bytes").unwrap();

        let err = ConversionIndex::open_or_create(dir.path(), &job, &config(10))
            .err()
            .unwrap();
        assert!(matches!(err, IndexError::IndexCorrupt { .. }));
        // Left untouched
        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"this is not a database, just some bytes"
        );
    }

    #[test]
    fn test_foreign_job_key_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let job = job();
        let other = job.clone().copy_all(true);
        drop(open(&dir, &other, 10));

        // Put the other job's file where this job looks for its own
        let from = ConversionIndex::file_path(dir.path(), &JobKey::for_job(&other));
        let to = ConversionIndex::file_path(dir.path(), &JobKey::for_job(&job));
        std::fs::rename(from, to).unwrap();

        let err = ConversionIndex::open_or_create(dir.path(), &job, &config(10))
            .err()
            .unwrap();
        assert!(matches!(err, IndexError::IndexCorrupt { .. }));
    }

    #[test]
    fn test_discard() {
        let dir = TempDir::new().unwrap();
        let job = job();
        {
            let index = open(&dir, &job, 10);
            index.append_entries(vec![convert("a.wav")]).unwrap();
        }

        assert!(ConversionIndex::discard(dir.path(), &job).unwrap());
        assert!(!ConversionIndex::discard(dir.path(), &job).unwrap());
        assert!(open(&dir, &job, 10).is_empty().unwrap());
    }

    #[test]
    fn test_requeue_failed_respects_attempts() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir, &job(), 10);
        index
            .append_entries(vec![convert("a.wav"), convert("b.wav")])
            .unwrap();
        let ids = pending_ids(&index);

        index.mark(ids[0], EntryStatus::Failed, Some("x")).unwrap();
        index.mark(ids[1], EntryStatus::Failed, Some("x")).unwrap();
        index.mark(ids[1], EntryStatus::Pending, None).unwrap();
        index.mark(ids[1], EntryStatus::Failed, Some("x")).unwrap();

        assert_eq!(index.requeue_failed(2).unwrap(), 1);
        assert_eq!(pending_ids(&index), vec![ids[0]]);
    }

    #[test]
    fn test_verify_complete() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        let job = JobOptions::new("/music", &out, OutputFormat::Mp3);
        let index = ConversionIndex::open_or_create(&dir.path().join("idx"), &job, &config(10))
            .unwrap();
        index
            .append_entries(vec![convert("a.wav"), convert("b.wav"), convert("c.wav")])
            .unwrap();
        let ids = pending_ids(&index);

        let report = index.verify_complete().unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.pending, 3);
        assert_eq!(report.straggler_count, 3);
        assert!(!report.is_complete());

        std::fs::write(out.join("a.mp3"), b"mp3").unwrap();
        index.mark(ids[0], EntryStatus::Done, None).unwrap();
        index.mark(ids[1], EntryStatus::Skipped, None).unwrap();
        index.mark(ids[2], EntryStatus::Done, None).unwrap();

        let report = index.verify_complete().unwrap();
        assert_eq!(report.done, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.missing_output_count, 1);
        assert_eq!(
            index.status_counts().unwrap(),
            StatusCounts {
                total: 3,
                done: 2,
                skipped: 1,
                ..StatusCounts::default()
            }
        );
        assert_eq!(report.missing_outputs[0].id, ids[2]);
        assert!(!report.is_complete());

        std::fs::write(out.join("c.mp3"), b"mp3").unwrap();
        assert!(index.verify_complete().unwrap().is_complete());
    }
}
