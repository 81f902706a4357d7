//! SQLite-backed ledger implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use super::{
    DocumentMetadata, LedgerEntry, LedgerError, LedgerStats, LedgerStatus, LedgerStore,
    RunRecord, UpsertOutcome,
};
use crate::delta::{DeltaItem, RunDelta};

const ENTRY_COLUMNS: &str = "remote_id, checksum, local_path, status, recorded_at, agency_id, \
     agency_name, title, created_date, file_extension, content_body_id";

/// SQLite-backed ledger.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Open (or create) the ledger database at `path`, creating parent
    /// directories and tables if needed.
    ///
    /// Fails if the file exists but is not a readable ledger.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LedgerError::Database(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        debug!(path = %path.display(), "Ledger opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory ledger (useful for testing).
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- One row per remote document id
            CREATE TABLE IF NOT EXISTS ledger (
                remote_id TEXT PRIMARY KEY,
                checksum TEXT,
                local_path TEXT,
                status TEXT NOT NULL
                    CHECK (status IN ('pending', 'downloaded', 'backfilled_from_disk')),
                recorded_at TEXT NOT NULL,
                agency_id TEXT,
                agency_name TEXT,
                title TEXT,
                created_date TEXT,
                file_extension TEXT,
                content_body_id TEXT,
                CHECK ((checksum IS NULL) = (status = 'pending'))
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_checksum ON ledger(checksum);
            CREATE INDEX IF NOT EXISTS idx_ledger_status ON ledger(status);

            -- Finished runs
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                download_limit INTEGER,
                downloaded INTEGER NOT NULL,
                backfilled INTEGER NOT NULL,
                failed INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_finished_at ON runs(finished_at);

            -- Newly satisfied documents per run, in delta order
            CREATE TABLE IF NOT EXISTS run_deltas (
                run_id TEXT NOT NULL REFERENCES runs(run_id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                remote_id TEXT NOT NULL,
                status TEXT NOT NULL,
                local_path TEXT NOT NULL,
                checksum TEXT NOT NULL,
                PRIMARY KEY (run_id, position)
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Database("ledger connection lock poisoned".to_string()))
    }

    fn select_entry(conn: &Connection, remote_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM ledger WHERE remote_id = ?", ENTRY_COLUMNS),
                params![remote_id],
                RawEntry::from_row,
            )
            .optional()?;
        raw.map(RawEntry::into_entry).transpose()
    }

    fn insert_entry(conn: &Connection, entry: &LedgerEntry) -> Result<(), LedgerError> {
        conn.execute(
            &format!(
                "INSERT INTO ledger ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                ENTRY_COLUMNS
            ),
            params![
                entry.remote_id,
                entry.checksum,
                entry.local_path.as_deref().map(path_to_sql),
                entry.status.as_str(),
                entry.recorded_at.to_rfc3339(),
                entry.metadata.agency_id,
                entry.metadata.agency_name,
                entry.metadata.title,
                entry.metadata.created_date,
                entry.metadata.file_extension,
                entry.metadata.content_body_id,
            ],
        )?;
        Ok(())
    }

    fn update_entry(conn: &Connection, entry: &LedgerEntry) -> Result<(), LedgerError> {
        conn.execute(
            "UPDATE ledger SET checksum = ?, local_path = ?, status = ?, recorded_at = ?, \
             agency_id = ?, agency_name = ?, title = ?, created_date = ?, file_extension = ?, \
             content_body_id = ? WHERE remote_id = ?",
            params![
                entry.checksum,
                entry.local_path.as_deref().map(path_to_sql),
                entry.status.as_str(),
                entry.recorded_at.to_rfc3339(),
                entry.metadata.agency_id,
                entry.metadata.agency_name,
                entry.metadata.title,
                entry.metadata.created_date,
                entry.metadata.file_extension,
                entry.metadata.content_body_id,
                entry.remote_id,
            ],
        )?;
        Ok(())
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn get(&self, remote_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let conn = self.lock()?;
        Self::select_entry(&conn, remote_id)
    }

    fn upsert(&self, entry: &LedgerEntry) -> Result<UpsertOutcome, LedgerError> {
        entry.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = match Self::select_entry(&tx, &entry.remote_id)? {
            None => {
                Self::insert_entry(&tx, entry)?;
                UpsertOutcome::Inserted
            }
            Some(existing) => match merge_entry(&existing, entry)? {
                Some(merged) => {
                    Self::update_entry(&tx, &merged)?;
                    UpsertOutcome::Updated
                }
                None => UpsertOutcome::Unchanged,
            },
        };

        tx.commit()?;
        debug!(remote_id = %entry.remote_id, status = %entry.status, ?outcome, "Ledger upsert");
        Ok(outcome)
    }

    fn all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM ledger ORDER BY remote_id",
            ENTRY_COLUMNS
        ))?;

        let rows = stmt.query_map([], RawEntry::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM ledger GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut stats = LedgerStats::default();
        for row in rows {
            let (status, count) = row?;
            let count = count.max(0) as u64;
            match LedgerStatus::parse(&status) {
                Some(LedgerStatus::Pending) => stats.pending += count,
                Some(LedgerStatus::Downloaded) => stats.downloaded += count,
                Some(LedgerStatus::BackfilledFromDisk) => stats.backfilled += count,
                None => {
                    return Err(LedgerError::Corrupt(format!(
                        "unknown status '{}' in ledger",
                        status
                    )))
                }
            }
            stats.total += count;
        }
        Ok(stats)
    }

    fn record_run(&self, run: &RunRecord) -> Result<(), LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO runs (run_id, started_at, finished_at, download_limit, downloaded, backfilled, failed) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                run.run_id,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.download_limit,
                run.delta.downloaded_count() as i64,
                run.delta.backfilled_count() as i64,
                run.failed_downloads,
            ],
        )?;

        for (position, item) in run.delta.items().iter().enumerate() {
            tx.execute(
                "INSERT INTO run_deltas (run_id, position, remote_id, status, local_path, checksum) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    run.run_id,
                    position as i64,
                    item.remote_id,
                    item.status.as_str(),
                    path_to_sql(&item.local_path),
                    item.checksum,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn latest_run(&self) -> Result<Option<RunRecord>, LedgerError> {
        let conn = self.lock()?;

        let header = conn
            .query_row(
                "SELECT run_id, started_at, finished_at, download_limit, failed \
                 FROM runs ORDER BY finished_at DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<u32>>(3)?,
                        row.get::<_, u32>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((run_id, started_at, finished_at, download_limit, failed_downloads)) = header
        else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT remote_id, status, local_path, checksum FROM run_deltas \
             WHERE run_id = ? ORDER BY position",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut delta = RunDelta::new();
        for row in rows {
            let (remote_id, status, local_path, checksum) = row?;
            let status = LedgerStatus::parse(&status).ok_or_else(|| {
                LedgerError::Corrupt(format!("unknown status '{}' in run_deltas", status))
            })?;
            delta.push(DeltaItem {
                remote_id,
                status,
                local_path: PathBuf::from(local_path),
                checksum,
            });
        }

        Ok(Some(RunRecord {
            run_id,
            started_at: parse_timestamp(&started_at)?,
            finished_at: parse_timestamp(&finished_at)?,
            download_limit,
            failed_downloads,
            delta,
        }))
    }
}

/// Compare-and-set merge of `incoming` onto `existing`.
///
/// Returns `Ok(None)` when nothing would change.
fn merge_entry(
    existing: &LedgerEntry,
    incoming: &LedgerEntry,
) -> Result<Option<LedgerEntry>, LedgerError> {
    if let (Some(recorded), Some(computed)) = (&existing.checksum, &incoming.checksum) {
        if recorded != computed {
            return Err(LedgerError::IntegrityConflict {
                remote_id: existing.remote_id.clone(),
                recorded: recorded.clone(),
                computed: computed.clone(),
            });
        }
    }

    let mut merged = existing.clone();

    if !existing.status.is_satisfied() && incoming.status.is_satisfied() {
        merged.status = incoming.status;
        merged.checksum = incoming.checksum.clone();
        merged.recorded_at = incoming.recorded_at;
        // a pending path was never verified; the satisfying file replaces it
        if incoming.local_path.is_some() {
            merged.local_path = incoming.local_path.clone();
        }
    }

    if merged.local_path.is_none() {
        merged.local_path = incoming.local_path.clone();
    }
    merged.metadata.fill_missing(&incoming.metadata);

    if &merged == existing {
        Ok(None)
    } else {
        Ok(Some(merged))
    }
}

fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::Corrupt(format!("bad timestamp '{}': {}", s, e)))
}

/// Row as stored, before status and timestamp are interpreted.
struct RawEntry {
    remote_id: String,
    checksum: Option<String>,
    local_path: Option<String>,
    status: String,
    recorded_at: String,
    metadata: DocumentMetadata,
}

impl RawEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            remote_id: row.get(0)?,
            checksum: row.get(1)?,
            local_path: row.get(2)?,
            status: row.get(3)?,
            recorded_at: row.get(4)?,
            metadata: DocumentMetadata {
                agency_id: row.get(5)?,
                agency_name: row.get(6)?,
                title: row.get(7)?,
                created_date: row.get(8)?,
                file_extension: row.get(9)?,
                content_body_id: row.get(10)?,
            },
        })
    }

    fn into_entry(self) -> Result<LedgerEntry, LedgerError> {
        let status = LedgerStatus::parse(&self.status).ok_or_else(|| {
            LedgerError::Corrupt(format!(
                "unknown status '{}' for {}",
                self.status, self.remote_id
            ))
        })?;

        let entry = LedgerEntry {
            recorded_at: parse_timestamp(&self.recorded_at)?,
            remote_id: self.remote_id,
            checksum: self.checksum,
            local_path: self.local_path.map(PathBuf::from),
            status,
            metadata: self.metadata,
        };

        entry
            .validate()
            .map_err(|e| LedgerError::Corrupt(e.to_string()))?;
        Ok(entry)
    }
}
