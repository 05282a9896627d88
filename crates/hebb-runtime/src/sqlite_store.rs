//! SQLite-backed implementation of the store contract.
//!
//! One `records` table keyed by the rendered composite key, with the record
//! body stored as JSON. Prefix scans compare the leading characters of the
//! key, which the key rendering guarantees are unambiguous.

#![cfg(feature = "sqlite")]

use hebb_core::error::StoreError;
use hebb_core::store::{AssociationStore, KeyPrefix, Record, RecordKey};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;

/// SQLite record store. Supports both in-memory and file-backed databases.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl SqliteStore {
    /// Create a new in-memory SQLite store.
    pub fn new_in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_with_connection(conn)
    }

    /// Create or open a file-backed SQLite store.
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> SqlResult<Self> {
        // WAL for concurrent readers while the engines write through
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored records per kind.
    pub fn stats(&self) -> SqlResult<Vec<(String, usize)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM records GROUP BY kind ORDER BY kind")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))?;
        rows.collect()
    }

    fn decode(key: &str, body: &str) -> Result<(RecordKey, Record), StoreError> {
        let parsed = RecordKey::parse(key)
            .ok_or_else(|| StoreError::Codec(format!("malformed key {:?}", key)))?;
        let record: Record =
            serde_json::from_str(body).map_err(|e| StoreError::Codec(e.to_string()))?;
        Ok((parsed, record))
    }
}

impl AssociationStore for SqliteStore {
    fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        let rendered = key.render();
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM records WHERE key = ?1",
                params![rendered],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;

        match body {
            Some(body) => Ok(Some(Self::decode(&rendered, &body)?.1)),
            None => Ok(None),
        }
    }

    fn upsert(&self, key: &RecordKey, record: Record) -> Result<(), StoreError> {
        if record.kind() != key.kind() {
            return Err(StoreError::Backend(format!(
                "record of kind {} cannot be stored under {}",
                record.kind().as_str(),
                key
            )));
        }
        let body = serde_json::to_string(&record).map_err(|e| StoreError::Codec(e.to_string()))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO records (key, kind, body, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                key.render(),
                key.kind().as_str(),
                body,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(backend)?;
        Ok(())
    }

    fn delete(&self, key: &RecordKey) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM records WHERE key = ?1", params![key.render()])
            .map_err(backend)?;
        Ok(removed > 0)
    }

    fn scan_prefix(&self, prefix: &KeyPrefix) -> Result<Vec<(RecordKey, Record)>, StoreError> {
        let rendered = prefix.render();
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key, body FROM records WHERE substr(key, 1, ?1) = ?2")
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![rendered.chars().count() as i64, rendered], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(backend)?;

        let mut out = Vec::new();
        for row in rows {
            let (key, body) = row.map_err(backend)?;
            out.push(Self::decode(&key, &body)?);
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
