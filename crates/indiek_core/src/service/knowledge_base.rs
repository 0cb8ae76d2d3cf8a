//! Knowledge-base session: arenas, identity maps and nucleus dispatch.
//!
//! # Responsibility
//! - Own the injected `PersistencePort` and every live note/item slot.
//! - Maintain the child → parents back-reference index and the pointer
//!   registry (target id → pointer notes).
//! - Route nucleus operations (`exists_in_db`, `save`, `delete`) by kind.
//!
//! # Invariants
//! - Each persisted id maps to at most one live slot per session, so loading
//!   an already-live id returns the shared slot.
//! - `parents[child][parent]` equals the number of times `child` occurs in
//!   `parent`'s entries.
//! - Every live, non-dead pointer note is registered under its target id.
//!
//! Note and item operations live in `note_service` and `item_service`.

use crate::model::item::{Item, ItemKey, ItemKind};
use crate::model::note::{Lifecycle, Note, NoteKey};
use crate::model::record::{EntityId, RecordKind};
use crate::repo::port::{PersistencePort, RepoError};
use log::info;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type KbResult<T> = Result<T, KbError>;

/// Errors surfaced by knowledge-base operations.
#[derive(Debug)]
pub enum KbError {
    /// Adding `child` under `parent` would close a loop; nothing changed.
    CycleRejected { parent: NoteKey, child: NoteKey },
    /// Pointer notes never accept entry mutation.
    ContentMutationForbidden(NoteKey),
    /// Pointer note's target was deleted.
    DeadReferenceSave(NoteKey),
    /// Pointer target has no persisted identity yet.
    UnpersistedReference,
    /// Backend refused the write.
    RejectedWrite(String),
    /// Backend has no such record.
    NotFound { kind: RecordKind, id: EntityId },
    /// Requested item kind is not known.
    UnknownKind(String),
    /// Handle does not belong to this session.
    UnknownNote(NoteKey),
    UnknownItem(ItemKey),
    EntryOutOfRange {
        note: NoteKey,
        index: usize,
        len: usize,
    },
    /// A record was requested for an entity whose note has no identity.
    UnpersistedChild { parent: NucleusRef, child: NoteKey },
    /// Backend data cannot be rebuilt into a consistent object graph.
    InvalidData(String),
    /// Backend transport failure.
    Repo(RepoError),
}

impl Display for KbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleRejected { parent, child } => {
                write!(f, "adding {child} to {parent} would create a cycle")
            }
            Self::ContentMutationForbidden(key) => {
                write!(f, "pointer note {key} does not accept content changes")
            }
            Self::DeadReferenceSave(key) => {
                write!(f, "pointer note {key} refers to a deleted entity")
            }
            Self::UnpersistedReference => write!(f, "cannot point to an unsaved entity"),
            Self::RejectedWrite(reason) => write!(f, "write rejected: {reason}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::UnknownKind(kind) => write!(f, "unknown item kind: `{kind}`"),
            Self::UnknownNote(key) => write!(f, "{key} does not belong to this session"),
            Self::UnknownItem(key) => write!(f, "{key} does not belong to this session"),
            Self::EntryOutOfRange { note, index, len } => {
                write!(f, "entry {index} out of range for {note} with {len} entries")
            }
            Self::UnpersistedChild { parent, child } => {
                write!(f, "{parent} references unsaved {child}")
            }
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for KbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for KbError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { kind, id } => Self::NotFound { kind, id },
            RepoError::RejectedWrite(reason) => Self::RejectedWrite(reason),
            RepoError::InvalidData(message) => Self::InvalidData(message),
            other => Self::Repo(other),
        }
    }
}

/// Handle to any persistable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NucleusRef {
    Item(ItemKey),
    Note(NoteKey),
}

impl Display for NucleusRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Item(key) => write!(f, "{key}"),
            Self::Note(key) => write!(f, "{key}"),
        }
    }
}

impl From<ItemKey> for NucleusRef {
    fn from(value: ItemKey) -> Self {
        Self::Item(value)
    }
}

impl From<NoteKey> for NucleusRef {
    fn from(value: NoteKey) -> Self {
        Self::Note(value)
    }
}

/// In-memory session over one persistence port.
pub struct KnowledgeBase<P: PersistencePort> {
    pub(crate) port: P,
    pub(crate) notes: Vec<Note>,
    pub(crate) items: Vec<Item>,
    pub(crate) parents: HashMap<NoteKey, BTreeMap<NoteKey, usize>>,
    pub(crate) pointers: HashMap<EntityId, BTreeSet<NoteKey>>,
    pub(crate) note_ids: HashMap<EntityId, NoteKey>,
    pub(crate) item_ids: HashMap<EntityId, ItemKey>,
}

impl<P: PersistencePort> KnowledgeBase<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            notes: Vec::new(),
            items: Vec::new(),
            parents: HashMap::new(),
            pointers: HashMap::new(),
            note_ids: HashMap::new(),
            item_ids: HashMap::new(),
        }
    }

    /// Backend this session writes through.
    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn note(&self, key: NoteKey) -> KbResult<&Note> {
        self.notes.get(key.0).ok_or(KbError::UnknownNote(key))
    }

    pub fn item(&self, key: ItemKey) -> KbResult<&Item> {
        self.items.get(key.0).ok_or(KbError::UnknownItem(key))
    }

    pub(crate) fn note_mut(&mut self, key: NoteKey) -> KbResult<&mut Note> {
        self.notes.get_mut(key.0).ok_or(KbError::UnknownNote(key))
    }

    pub(crate) fn item_mut(&mut self, key: ItemKey) -> KbResult<&mut Item> {
        self.items.get_mut(key.0).ok_or(KbError::UnknownItem(key))
    }

    pub(crate) fn alloc_note(&mut self, note: Note) -> NoteKey {
        self.notes.push(note);
        NoteKey(self.notes.len() - 1)
    }

    pub(crate) fn alloc_item(&mut self, item: Item) -> ItemKey {
        self.items.push(item);
        ItemKey(self.items.len() - 1)
    }

    /// Persisted id of any nucleus, if it has one.
    pub fn id_of(&self, nucleus: NucleusRef) -> KbResult<Option<EntityId>> {
        match nucleus {
            NucleusRef::Item(key) => Ok(self.item(key)?.id),
            NucleusRef::Note(key) => Ok(self.note(key)?.id),
        }
    }

    /// Local identity check; never queries the backend.
    pub fn exists_in_db(&self, nucleus: NucleusRef) -> KbResult<bool> {
        Ok(self.id_of(nucleus)?.is_some())
    }

    pub fn save(&mut self, nucleus: NucleusRef) -> KbResult<EntityId> {
        match nucleus {
            NucleusRef::Item(key) => self.save_item(key),
            NucleusRef::Note(key) => self.save_note(key),
        }
    }

    pub fn delete(&mut self, nucleus: NucleusRef) -> KbResult<()> {
        match nucleus {
            NucleusRef::Item(key) => self.delete_item(key),
            NucleusRef::Note(key) => self.delete_note(key),
        }
    }

    /// Live slot for a persisted id, loading it from the backend if needed.
    ///
    /// Used to inspect what a note mentions.
    pub fn resolve_mention(&mut self, id: EntityId) -> KbResult<NucleusRef> {
        if let Some(key) = self.note_ids.get(&id) {
            return Ok(NucleusRef::Note(*key));
        }
        if let Some(key) = self.item_ids.get(&id) {
            return Ok(NucleusRef::Item(*key));
        }

        match self.load_note(id) {
            Ok(key) => return Ok(NucleusRef::Note(key)),
            Err(KbError::NotFound { .. }) => {}
            Err(err) => return Err(err),
        }
        for kind in ItemKind::ALL {
            match self.load_item(kind, id) {
                Ok(key) => return Ok(NucleusRef::Item(key)),
                Err(KbError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Err(KbError::NotFound {
            kind: RecordKind::Note,
            id,
        })
    }

    /// Notes that hold `key` as a direct entry.
    pub fn parents_of(&self, key: NoteKey) -> Vec<NoteKey> {
        self.parents
            .get(&key)
            .map(|parents| parents.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Pointer notes currently targeting `target`.
    pub fn pointers_to(&self, target: EntityId) -> Vec<NoteKey> {
        self.pointers
            .get(&target)
            .map(|pointers| pointers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Kills every pointer targeting a just-deleted entity.
    ///
    /// A killed pointer loses its own record and identity and is dropped from
    /// its parents and from any item naming it; pointers to that pointer are
    /// killed in turn. Pointer records not live in this session are caught
    /// when they are next loaded.
    pub(crate) fn invalidate_pointers_to(&mut self, target: EntityId) -> KbResult<()> {
        let pointers = self.pointers.remove(&target).unwrap_or_default();
        for key in pointers {
            let own_id = {
                let note = self.note_mut(key)?;
                note.kill_pointer();
                note.id.take()
            };

            if let Some(own_id) = own_id {
                self.note_ids.remove(&own_id);
                self.note_mut(key)?.lifecycle = Lifecycle::Deleted;
                match self.port.delete(RecordKind::Note, own_id) {
                    Ok(()) | Err(RepoError::NotFound { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
            }

            info!(
                "event=pointer_invalidate module=kb status=ok target_id={} pointer={} pointer_id={:?}",
                target, key, own_id
            );

            self.detach_from_parents(key)?;
            self.detach_from_items(key)?;
            if let Some(own_id) = own_id {
                self.invalidate_pointers_to(own_id)?;
            }
        }
        Ok(())
    }
}
