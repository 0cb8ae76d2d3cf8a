//! Core domain logic for IndieK.
//! This crate is the single source of truth for knowledge-object invariants:
//! acyclic note nesting, mention propagation and pointer validity.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{ConfigError, CoreConfig, DatabaseLocation};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::item::{Item, ItemKey, ItemKind};
pub use model::note::{
    parse_pointer_marker, pointer_marker, Entry, Lifecycle, Note, NoteKey, NoteKind,
    POINTER_PREFIX,
};
pub use model::record::{EntityId, EntryRecord, ItemRecord, NoteRecord, Record, RecordKind};
pub use model::snapshot::{EntrySnapshot, ItemSnapshot, NoteSnapshot};
pub use repo::memory_store::MemoryStore;
pub use repo::port::{PersistencePort, RepoError, RepoResult};
pub use repo::sqlite_store::SqliteStore;
pub use search::listing::{list_all_items, list_items, ItemListing};
pub use service::item_service::NoteInput;
pub use service::knowledge_base::{KbError, KbResult, KnowledgeBase, NucleusRef};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
