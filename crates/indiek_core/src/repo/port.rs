//! Persistence port contract.
//!
//! # Responsibility
//! - Define the only boundary between the core and a storage backend.
//! - Define backend-agnostic error semantics (`NotFound`, `RejectedWrite`).
//!
//! # Invariants
//! - `save` with `id = None` allocates a fresh id; with `Some(id)` it upserts.
//! - `load`/`delete` on a missing id (or an id stored under another kind)
//!   return `RepoError::NotFound`.
//! - Each call is atomic on its own; nothing spans calls.

use crate::db::DbError;
use crate::model::record::{EntityId, Record, RecordKind};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub type RepoResult<T> = Result<T, RepoError>;

/// Port-level error shared by every backend.
#[derive(Debug)]
pub enum RepoError {
    /// SQLite transport or bootstrap error.
    Db(DbError),
    /// No record with this id in the requested collection.
    NotFound { kind: RecordKind, id: EntityId },
    /// Backend refused the write (constraint or validation failure).
    RejectedWrite(String),
    /// Record shape does not belong to the requested collection.
    KindMismatch { kind: RecordKind },
    /// Stored payload could not be encoded or decoded.
    Serialization(serde_json::Error),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} record not found: {id}"),
            Self::RejectedWrite(reason) => write!(f, "backend rejected write: {reason}"),
            Self::KindMismatch { kind } => {
                write!(f, "record shape does not belong to collection `{kind}`")
            }
            Self::Serialization(err) => write!(f, "record serialization failed: {err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "record store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "record store requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted record: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Backend-facing interface consumed by the core.
pub trait PersistencePort {
    /// Stores `record` in `kind`, returning its (possibly new) id.
    fn save(&self, kind: RecordKind, record: &Record) -> RepoResult<EntityId>;
    /// Fetches one record with its id filled in.
    fn load(&self, kind: RecordKind, id: EntityId) -> RepoResult<Record>;
    /// Removes one record.
    fn delete(&self, kind: RecordKind, id: EntityId) -> RepoResult<()>;
    /// Returns every record of `kind`, ordered by id.
    fn list_all(&self, kind: RecordKind) -> RepoResult<Vec<Record>>;
}

impl<P: PersistencePort + ?Sized> PersistencePort for &P {
    fn save(&self, kind: RecordKind, record: &Record) -> RepoResult<EntityId> {
        (**self).save(kind, record)
    }

    fn load(&self, kind: RecordKind, id: EntityId) -> RepoResult<Record> {
        (**self).load(kind, id)
    }

    fn delete(&self, kind: RecordKind, id: EntityId) -> RepoResult<()> {
        (**self).delete(kind, id)
    }

    fn list_all(&self, kind: RecordKind) -> RepoResult<Vec<Record>> {
        (**self).list_all(kind)
    }
}

impl<P: PersistencePort + ?Sized> PersistencePort for Rc<P> {
    fn save(&self, kind: RecordKind, record: &Record) -> RepoResult<EntityId> {
        (**self).save(kind, record)
    }

    fn load(&self, kind: RecordKind, id: EntityId) -> RepoResult<Record> {
        (**self).load(kind, id)
    }

    fn delete(&self, kind: RecordKind, id: EntityId) -> RepoResult<()> {
        (**self).delete(kind, id)
    }

    fn list_all(&self, kind: RecordKind) -> RepoResult<Vec<Record>> {
        (**self).list_all(kind)
    }
}
