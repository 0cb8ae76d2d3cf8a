//! In-memory persistence port.
//!
//! # Responsibility
//! - Provide a dependency-free backend for tests and scratch sessions.
//! - Emulate a backend schema length constraint via `with_max_text_len`.
//!
//! # Invariants
//! - Ids come from one monotonically increasing sequence across all kinds and
//!   are never reused, even after delete.
//! - An id is stored under exactly one kind at a time.

use crate::model::record::{EntityId, Record, RecordKind};
use crate::repo::port::{PersistencePort, RepoError, RepoResult};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// `RefCell`-backed record store.
#[derive(Debug)]
pub struct MemoryStore {
    records: RefCell<BTreeMap<EntityId, (RecordKind, Record)>>,
    next_id: Cell<EntityId>,
    max_text_len: Option<usize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(1),
            max_text_len: None,
        }
    }

    /// Rejects writes whose literal text entries exceed `max_chars`.
    pub fn with_max_text_len(max_chars: usize) -> Self {
        Self {
            max_text_len: Some(max_chars),
            ..Self::new()
        }
    }

    /// Number of stored records across all kinds.
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    fn check_policy(&self, record: &Record) -> RepoResult<()> {
        let Some(max_chars) = self.max_text_len else {
            return Ok(());
        };
        if let Some(text) = record.texts().find(|text| text.chars().count() > max_chars) {
            return Err(RepoError::RejectedWrite(format!(
                "text entry of {} chars exceeds limit {max_chars}",
                text.chars().count()
            )));
        }
        Ok(())
    }
}

impl PersistencePort for MemoryStore {
    fn save(&self, kind: RecordKind, record: &Record) -> RepoResult<EntityId> {
        if !record.fits(kind) {
            return Err(RepoError::KindMismatch { kind });
        }
        self.check_policy(record)?;

        let id = match record.id() {
            Some(id) => {
                if let Some((stored_kind, _)) = self.records.borrow().get(&id) {
                    if *stored_kind != kind {
                        return Err(RepoError::RejectedWrite(format!(
                            "record {id} is stored as {stored_kind}, not {kind}"
                        )));
                    }
                }
                if id >= self.next_id.get() {
                    self.next_id.set(id + 1);
                }
                id
            }
            None => {
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                id
            }
        };

        let mut stored = record.clone();
        stored.set_id(id);
        self.records.borrow_mut().insert(id, (kind, stored));
        Ok(id)
    }

    fn load(&self, kind: RecordKind, id: EntityId) -> RepoResult<Record> {
        match self.records.borrow().get(&id) {
            Some((stored_kind, record)) if *stored_kind == kind => Ok(record.clone()),
            _ => Err(RepoError::NotFound { kind, id }),
        }
    }

    fn delete(&self, kind: RecordKind, id: EntityId) -> RepoResult<()> {
        let mut records = self.records.borrow_mut();
        match records.get(&id) {
            Some((stored_kind, _)) if *stored_kind == kind => {
                records.remove(&id);
                Ok(())
            }
            _ => Err(RepoError::NotFound { kind, id }),
        }
    }

    fn list_all(&self, kind: RecordKind) -> RepoResult<Vec<Record>> {
        Ok(self
            .records
            .borrow()
            .values()
            .filter(|(stored_kind, _)| *stored_kind == kind)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::model::record::{EntryRecord, ItemRecord, NoteRecord, Record, RecordKind};
    use crate::repo::port::{PersistencePort, RepoError};

    fn text_note(text: &str) -> Record {
        Record::Note(NoteRecord {
            id: None,
            entries: vec![EntryRecord::Text(text.to_string())],
            mentions: Vec::new(),
            pointer: false,
        })
    }

    #[test]
    fn save_allocates_then_upserts() {
        let store = MemoryStore::new();
        let id = store.save(RecordKind::Note, &text_note("a")).unwrap();

        let mut updated = text_note("b");
        updated.set_id(id);
        assert_eq!(store.save(RecordKind::Note, &updated).unwrap(), id);
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(RecordKind::Note, id).unwrap(), updated);
    }

    #[test]
    fn ids_are_shared_across_kinds_and_never_reused() {
        let store = MemoryStore::new();
        let note_id = store.save(RecordKind::Note, &text_note("a")).unwrap();
        let item = Record::Item(ItemRecord {
            id: None,
            kind: RecordKind::Proof,
            name: note_id,
            content: note_id,
        });
        let item_id = store.save(RecordKind::Proof, &item).unwrap();
        assert_ne!(note_id, item_id);

        store.delete(RecordKind::Proof, item_id).unwrap();
        let next = store.save(RecordKind::Note, &text_note("c")).unwrap();
        assert!(next > item_id);
    }

    #[test]
    fn load_under_wrong_kind_is_not_found() {
        let store = MemoryStore::new();
        let id = store.save(RecordKind::Note, &text_note("a")).unwrap();
        let err = store.load(RecordKind::Theorem, id).unwrap_err();
        assert!(matches!(err, RepoError::NotFound { id: missing, .. } if missing == id));
        assert!(store.delete(RecordKind::Theorem, id).is_err());
    }

    #[test]
    fn length_policy_rejects_long_text() {
        let store = MemoryStore::with_max_text_len(3);
        store.save(RecordKind::Note, &text_note("abc")).unwrap();
        let err = store.save(RecordKind::Note, &text_note("abcd")).unwrap_err();
        assert!(matches!(err, RepoError::RejectedWrite(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_never_moves_an_id_to_another_kind() {
        let store = MemoryStore::new();
        let id = store.save(RecordKind::Note, &text_note("a")).unwrap();
        let item = Record::Item(ItemRecord {
            id: Some(id),
            kind: RecordKind::Theorem,
            name: id,
            content: id,
        });

        let err = store.save(RecordKind::Theorem, &item).unwrap_err();
        assert!(matches!(err, RepoError::RejectedWrite(_)));
        assert_eq!(store.load(RecordKind::Note, id).unwrap(), {
            let mut stored = text_note("a");
            stored.set_id(id);
            stored
        });
    }

    #[test]
    fn mismatched_shape_is_refused() {
        let store = MemoryStore::new();
        let err = store.save(RecordKind::Definition, &text_note("a")).unwrap_err();
        assert!(matches!(
            err,
            RepoError::KindMismatch {
                kind: RecordKind::Definition
            }
        ));
    }
}
