//! SQLite-backed persistence port.
//!
//! # Responsibility
//! - Store every record kind in the single `records` table as JSON payload.
//! - Translate SQLite constraint failures into `RepoError::RejectedWrite`.
//!
//! # Invariants
//! - The row id is the record id; the payload's own `id` is ignored on read.
//! - Read paths reject payloads whose shape does not fit their `kind` column
//!   instead of masking them.

use crate::db::migrations::{current_user_version, latest_version};
use crate::model::record::{EntityId, Record, RecordKind};
use crate::repo::port::{PersistencePort, RepoError, RepoResult};
use log::warn;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

/// Record store over a migrated SQLite connection.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    /// Constructs a store from a migrated connection.
    ///
    /// Rejects connections opened without `db::open_db*` bootstrap.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let actual_version = current_user_version(conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }

        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = 'records'
            );",
            [],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable("records"));
        }

        Ok(Self { conn })
    }
}

impl PersistencePort for SqliteStore<'_> {
    fn save(&self, kind: RecordKind, record: &Record) -> RepoResult<EntityId> {
        if !record.fits(kind) {
            return Err(RepoError::KindMismatch { kind });
        }
        let payload = serde_json::to_string(record)?;

        let result = match record.id() {
            None => self
                .conn
                .execute(
                    "INSERT INTO records (kind, payload) VALUES (?1, ?2);",
                    params![kind.as_str(), payload],
                )
                .map(|_| self.conn.last_insert_rowid()),
            Some(id) => self
                .conn
                .execute(
                    "INSERT INTO records (id, kind, payload) VALUES (?1, ?2, ?3)
                     ON CONFLICT (id) DO UPDATE SET
                        payload = excluded.payload,
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE records.kind = excluded.kind;",
                    params![id, kind.as_str(), payload],
                )
                .and_then(|changed| {
                    if changed == 0 {
                        Err(kind_conflict(id, kind))
                    } else {
                        Ok(id)
                    }
                }),
        };

        result.map_err(|err| match err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                warn!(
                    "event=record_save module=repo status=rejected kind={kind} extended_code={}",
                    failure.extended_code
                );
                RepoError::RejectedWrite(message.unwrap_or_else(|| failure.to_string()))
            }
            other => RepoError::from(other),
        })
    }

    fn load(&self, kind: RecordKind, id: EntityId) -> RepoResult<Record> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM records WHERE id = ?1 AND kind = ?2;",
                params![id, kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(payload) => decode_payload(kind, id, &payload),
            None => Err(RepoError::NotFound { kind, id }),
        }
    }

    fn delete(&self, kind: RecordKind, id: EntityId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM records WHERE id = ?1 AND kind = ?2;",
            params![id, kind.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound { kind, id });
        }
        Ok(())
    }

    fn list_all(&self, kind: RecordKind) -> RepoResult<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, payload FROM records WHERE kind = ?1 ORDER BY id ASC;")?;
        let mut rows = stmt.query([kind.as_str()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let id: EntityId = row.get("id")?;
            let payload: String = row.get("payload")?;
            records.push(decode_payload(kind, id, &payload)?);
        }
        Ok(records)
    }
}

/// Upsert skipped because `id` already lives under another kind.
fn kind_conflict(id: EntityId, kind: RecordKind) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
        Some(format!("record {id} is stored under another kind than {kind}")),
    )
}

fn decode_payload(kind: RecordKind, id: EntityId, payload: &str) -> RepoResult<Record> {
    let mut record: Record = serde_json::from_str(payload)?;
    if !record.fits(kind) {
        return Err(RepoError::InvalidData(format!(
            "payload of record {id} does not fit collection `{kind}`"
        )));
    }
    record.set_id(id);
    Ok(record)
}
