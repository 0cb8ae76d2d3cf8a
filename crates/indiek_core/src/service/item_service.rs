//! Item operations on a knowledge-base session.
//!
//! # Responsibility
//! - Build items of the four kinds with name/content notes.
//! - Pair items with their backend records through save/load/delete.
//!
//! # Invariants
//! - Saving an item saves its name and content notes first.
//! - Deleting an item never deletes its notes; it invalidates pointers that
//!   target the item.
//! - An item never names a deleted note: when its name or content note goes
//!   away, a fresh empty note takes the slot and a persisted item is re-saved.

use crate::model::item::{Item, ItemKey, ItemKind};
use crate::model::note::{Lifecycle, NoteKey};
use crate::model::record::{EntityId, ItemRecord, Record, RecordKind};
use crate::model::snapshot::ItemSnapshot;
use crate::repo::port::PersistencePort;
use crate::service::knowledge_base::{KbError, KbResult, KnowledgeBase, NucleusRef};
use log::{debug, info, warn};

/// Source for an item's name or content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NoteInput {
    /// Fresh note without entries.
    #[default]
    Empty,
    /// Raw text, wrapped into a single-entry note.
    Text(String),
    /// Existing note, shared by reference.
    Note(NoteKey),
}

impl From<&str> for NoteInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for NoteInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NoteKey> for NoteInput {
    fn from(value: NoteKey) -> Self {
        Self::Note(value)
    }
}

impl<P: PersistencePort> KnowledgeBase<P> {
    /// Creates an unsaved item.
    pub fn create_item(
        &mut self,
        kind: ItemKind,
        name: impl Into<NoteInput>,
        content: impl Into<NoteInput>,
    ) -> KbResult<ItemKey> {
        let name = self.note_from_input(name.into())?;
        let content = self.note_from_input(content.into())?;
        Ok(self.alloc_item(Item {
            id: None,
            kind,
            name,
            content,
            lifecycle: Lifecycle::Unsaved,
        }))
    }

    /// Exports `{id, kind, name, content}`.
    ///
    /// # Errors
    /// - `UnpersistedChild` when the name or content note has no identity.
    pub fn item_to_record(&self, key: ItemKey) -> KbResult<ItemRecord> {
        let item = self.item(key)?;
        let note_id = |note: NoteKey| -> KbResult<EntityId> {
            self.note(note)?.id.ok_or(KbError::UnpersistedChild {
                parent: NucleusRef::Item(key),
                child: note,
            })
        };
        Ok(ItemRecord {
            id: item.id,
            kind: item.kind.record_kind(),
            name: note_id(item.name)?,
            content: note_id(item.content)?,
        })
    }

    /// Rebuilds an item from a backend record, resolving its notes by id.
    pub fn item_from_record(&mut self, record: ItemRecord) -> KbResult<ItemKey> {
        let kind = ItemKind::from_record_kind(record.kind)
            .ok_or_else(|| KbError::UnknownKind(record.kind.to_string()))?;
        if let Some(key) = record.id.and_then(|id| self.item_ids.get(&id).copied()) {
            return Ok(key);
        }

        let mut repaired = false;
        let name = self.load_item_note(record.name, &mut repaired)?;
        let content = self.load_item_note(record.content, &mut repaired)?;
        let key = self.alloc_item(Item {
            id: record.id,
            kind,
            name,
            content,
            lifecycle: if record.id.is_some() {
                Lifecycle::Saved
            } else {
                Lifecycle::Unsaved
            },
        });
        if let Some(id) = record.id {
            self.item_ids.insert(id, key);
            if repaired {
                self.save_item(key)?;
            }
        }
        Ok(key)
    }

    /// Saves name and content notes, then the item record.
    ///
    /// The first save assigns the identity; later saves overwrite the record.
    pub fn save_item(&mut self, key: ItemKey) -> KbResult<EntityId> {
        let (name, content) = {
            let item = self.item(key)?;
            (item.name, item.content)
        };
        self.save_note(name)?;
        self.save_note(content)?;

        let record = self.item_to_record(key)?;
        let kind = record.kind;
        let is_new = record.id.is_none();
        let id = self.port.save(kind, &Record::Item(record))?;

        let item = self.item_mut(key)?;
        item.id = Some(id);
        item.lifecycle = Lifecycle::Saved;
        self.item_ids.insert(id, key);
        info!("event=item_save module=item status=ok kind={kind} item_id={id} created={is_new}");
        Ok(id)
    }

    /// Loads an item of `kind` by id.
    pub fn load_item(&mut self, kind: ItemKind, id: EntityId) -> KbResult<ItemKey> {
        if let Some(key) = self.item_ids.get(&id).copied() {
            if self.item(key)?.kind == kind {
                return Ok(key);
            }
            return Err(KbError::NotFound {
                kind: kind.record_kind(),
                id,
            });
        }

        let key = match self.port.load(kind.record_kind(), id)? {
            Record::Item(record) => self.item_from_record(record)?,
            Record::Note(_) => {
                return Err(KbError::InvalidData(format!(
                    "record {id} in {kind} collection is not an item"
                )))
            }
        };
        debug!("event=item_load module=item status=ok kind={kind} item_id={id}");
        Ok(key)
    }

    /// Deletes the item record and invalidates pointers to it.
    ///
    /// An unsaved item is left untouched.
    pub fn delete_item(&mut self, key: ItemKey) -> KbResult<()> {
        let (id, kind) = {
            let item = self.item(key)?;
            (item.id, item.kind)
        };
        let Some(id) = id else {
            return Ok(());
        };

        self.port.delete(kind.record_kind(), id)?;
        self.item_ids.remove(&id);
        let item = self.item_mut(key)?;
        item.id = None;
        item.lifecycle = Lifecycle::Deleted;
        info!("event=item_delete module=item status=ok kind={kind} item_id={id}");

        self.invalidate_pointers_to(id)
    }

    /// Detached value of an item, for equality checks.
    pub fn item_snapshot(&self, key: ItemKey) -> KbResult<ItemSnapshot> {
        let item = self.item(key)?;
        Ok(ItemSnapshot {
            kind: item.kind,
            id: item.id,
            name: self.note_snapshot(item.name)?,
            content: self.note_snapshot(item.content)?,
        })
    }

    /// Replaces `note` with a fresh empty note in every item that names it.
    pub(crate) fn detach_from_items(&mut self, note: NoteKey) -> KbResult<()> {
        let holders: Vec<ItemKey> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.name == note || item.content == note)
            .map(|(index, _)| ItemKey(index))
            .collect();

        for key in holders {
            let replacement = self.create_note();
            let item = self.item_mut(key)?;
            if item.name == note {
                item.name = replacement;
            }
            if item.content == note {
                item.content = replacement;
            }
            let persisted = item.id.is_some();
            debug!("event=item_detach module=item status=ok item={key} note={note}");
            if persisted {
                self.save_item(key)?;
            }
        }
        Ok(())
    }

    /// Loads a name or content note; a missing or dead one becomes a fresh
    /// empty note and flags the item record for re-save.
    fn load_item_note(&mut self, id: EntityId, repaired: &mut bool) -> KbResult<NoteKey> {
        match self.load_note(id) {
            Ok(key) if self.notes[key.0].lifecycle != Lifecycle::Deleted => Ok(key),
            Ok(_) => {
                *repaired = true;
                Ok(self.create_note())
            }
            Err(KbError::NotFound {
                kind: RecordKind::Note,
                id: missing,
            }) if missing == id => {
                warn!("event=item_load module=item status=repaired reason=missing_note note_id={id}");
                *repaired = true;
                Ok(self.create_note())
            }
            Err(err) => Err(err),
        }
    }

    fn note_from_input(&mut self, input: NoteInput) -> KbResult<NoteKey> {
        match input {
            NoteInput::Empty => Ok(self.create_note()),
            NoteInput::Text(text) => Ok(self.create_text_note(text)),
            NoteInput::Note(key) => {
                self.note(key)?;
                Ok(key)
            }
        }
    }
}
