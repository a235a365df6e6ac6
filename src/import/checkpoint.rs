use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use super::outcome::Counters;
use crate::reader::RowPosition;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("checkpoint I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Progress of an interrupted import: where to resume and the totals so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub file_id: String,
    pub file_path: String,
    #[serde(skip)]
    pub next: RowPosition,
    pub next_offset: u64,
    pub totals: Counters,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(file_id: &str, file_path: &Path, next: RowPosition, totals: Counters) -> Self {
        Self {
            file_id: file_id.to_string(),
            file_path: file_path.display().to_string(),
            next,
            next_offset: next.index,
            totals,
            updated_at: Utc::now(),
        }
    }
}

/// SQLite-backed checkpoint table, one row per input file.
pub struct CheckpointStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS import_checkpoints (
        file_id      TEXT PRIMARY KEY,
        file_path    TEXT NOT NULL,
        next_offset  INTEGER NOT NULL,
        next_line    INTEGER NOT NULL,
        next_byte    INTEGER NOT NULL,
        total        INTEGER NOT NULL,
        success      INTEGER NOT NULL,
        failed       INTEGER NOT NULL,
        skipped      INTEGER NOT NULL,
        updated_at   TEXT NOT NULL
    );
"#;

const SELECT_COLUMNS: &str = "SELECT file_id, file_path, next_offset, next_line, next_byte, \
     total, success, failed, skipped, updated_at FROM import_checkpoints";

impl CheckpointStore {
    /// Opens (or creates) `checkpoints.db` under `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, CheckpointError> {
        std::fs::create_dir_all(dir.as_ref())?;
        let conn = Connection::open(dir.as_ref().join("checkpoints.db"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self, CheckpointError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn load(&self, file_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{} WHERE file_id = ?1", SELECT_COLUMNS))?;
        let mut rows = stmt.query(params![file_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(checkpoint_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Writes the checkpoint in a single transaction so a crash leaves either
    /// the previous row or the new one.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO import_checkpoints
                (file_id, file_path, next_offset, next_line, next_byte, total, success, failed, skipped, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(file_id) DO UPDATE SET
                file_path=excluded.file_path,
                next_offset=excluded.next_offset,
                next_line=excluded.next_line,
                next_byte=excluded.next_byte,
                total=excluded.total,
                success=excluded.success,
                failed=excluded.failed,
                skipped=excluded.skipped,
                updated_at=excluded.updated_at",
            params![
                checkpoint.file_id,
                checkpoint.file_path,
                checkpoint.next.index as i64,
                checkpoint.next.line as i64,
                checkpoint.next.byte as i64,
                checkpoint.totals.total as i64,
                checkpoint.totals.success as i64,
                checkpoint.totals.failed as i64,
                checkpoint.totals.skipped as i64,
                checkpoint.updated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Removes the checkpoint; returns whether one existed.
    pub fn clear(&self, file_id: &str) -> Result<bool, CheckpointError> {
        let removed = self
            .lock()
            .execute("DELETE FROM import_checkpoints WHERE file_id = ?1", params![file_id])?;
        Ok(removed > 0)
    }

    pub fn list(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{} ORDER BY updated_at DESC", SELECT_COLUMNS))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(checkpoint_from_row(row)?);
        }
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn checkpoint_from_row(row: &Row<'_>) -> Result<Checkpoint, rusqlite::Error> {
    let int = |idx: usize| -> Result<u64, rusqlite::Error> { Ok(row.get::<_, i64>(idx)? as u64) };
    let next = RowPosition { index: int(2)?, line: int(3)?, byte: int(4)? };
    let updated_at: String = row.get(9)?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    Ok(Checkpoint {
        file_id: row.get(0)?,
        file_path: row.get(1)?,
        next,
        next_offset: next.index,
        totals: Counters { total: int(5)?, success: int(6)?, failed: int(7)?, skipped: int(8)? },
        updated_at,
    })
}

/// Content hash identifying an input file across runs, hex encoded.
pub fn file_identity(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
