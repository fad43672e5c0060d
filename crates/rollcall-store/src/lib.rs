//! rollcall-store — SQLite-backed enrollment storage.
//!
//! One row per label; descriptors are stored as a JSON array of 128-d
//! vectors and validated on the way back in, so a corrupt row surfaces
//! as a distinct error instead of poisoning the matcher.

use chrono::{DateTime, Utc};
use rollcall_core::store::{EnrollmentRecord, EnrollmentStore, StoreError};
use rollcall_core::Descriptor;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS enrollments (
    label       TEXT PRIMARY KEY,
    descriptors TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";

/// Enrollment store on a single SQLite file.
///
/// The connection sits behind a mutex so the store can be shared with
/// the engine thread; all access is short-lived and serialized.
pub struct SqliteEnrollmentStore {
    conn: Mutex<Connection>,
}

impl SqliteEnrollmentStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::init(conn, &path.display().to_string())
    }

    /// In-memory store for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, location: &str) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        tracing::info!(db = location, "enrollment store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection mutex poisoned".into()))
    }
}

impl EnrollmentStore for SqliteEnrollmentStore {
    fn load(&self) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT label, descriptors, created_at, updated_at
                 FROM enrollments ORDER BY created_at, label",
            )
            .map_err(backend)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(backend)?;

        let mut records = Vec::new();
        for row in rows {
            let (label, descriptors_json, created_at, updated_at) = row.map_err(backend)?;
            records.push(parse_record(label, &descriptors_json, &created_at, &updated_at)?);
        }
        Ok(records)
    }

    fn save_all(&self, records: &[EnrollmentRecord]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(backend)?;

        tx.execute("DELETE FROM enrollments", []).map_err(backend)?;
        for record in records {
            let descriptors_json =
                serde_json::to_string(&record.descriptors).map_err(|e| StoreError::Corrupt {
                    label: record.label.clone(),
                    reason: e.to_string(),
                })?;
            tx.execute(
                "INSERT INTO enrollments (label, descriptors, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (
                    &record.label,
                    &descriptors_json,
                    &record.created_at.to_rfc3339(),
                    &record.updated_at.to_rfc3339(),
                ),
            )
            .map_err(backend)?;
        }

        tx.commit().map_err(backend)?;
        tracing::debug!(count = records.len(), "saved enrollment collection");
        Ok(())
    }

    fn delete_one(&self, label: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM enrollments WHERE label = ?1", [label])
            .map_err(backend)?;
        Ok(deleted > 0)
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM enrollments", [])
            .map_err(backend)?;
        Ok(())
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn parse_record(
    label: String,
    descriptors_json: &str,
    created_at: &str,
    updated_at: &str,
) -> Result<EnrollmentRecord, StoreError> {
    let descriptors: Vec<Descriptor> =
        serde_json::from_str(descriptors_json).map_err(|e| StoreError::Corrupt {
            label: label.clone(),
            reason: e.to_string(),
        })?;
    let created_at = parse_timestamp(&label, created_at)?;
    let updated_at = parse_timestamp(&label, updated_at)?;
    Ok(EnrollmentRecord {
        label,
        descriptors,
        created_at,
        updated_at,
    })
}

fn parse_timestamp(label: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            label: label.to_string(),
            reason: format!("bad timestamp '{raw}': {e}"),
        })
}
