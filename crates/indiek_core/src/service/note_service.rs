//! Note operations on a knowledge-base session.
//!
//! # Responsibility
//! - Build plain and pointer notes, and mutate note entries.
//! - Enforce acyclicity before any structural mutation.
//! - Keep `mentions` and the back-reference index in step with entries.
//! - Pair notes with their backend records through save/load/delete.
//!
//! # Invariants
//! - The nested-note graph is a DAG at all times.
//! - For a plain note, `mentions` is the union of its note children's
//!   `mentions`; a child's own id is never added.
//! - Deleting a note drops every occurrence of it from every parent; the
//!   note's own children are untouched.
//! - A stored pointer whose target no longer exists loads dead and loses its
//!   record, exactly as if the target had been deleted in this session.
//! - A loaded note whose stored entries or mentions are out of date is
//!   re-saved before it is returned. Children whose records are gone, and
//!   pointers that load dead, are dropped from it.

use crate::model::item::ItemKind;
use crate::model::note::{parse_pointer_marker, Entry, Lifecycle, Note, NoteKey, NoteKind};
use crate::model::record::{EntityId, EntryRecord, NoteRecord, Record, RecordKind};
use crate::model::snapshot::{EntrySnapshot, NoteSnapshot};
use crate::repo::port::{PersistencePort, RepoError};
use crate::service::knowledge_base::{KbError, KbResult, KnowledgeBase, NucleusRef};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap, HashSet};

impl<P: PersistencePort> KnowledgeBase<P> {
    /// Creates an empty, unsaved note.
    pub fn create_note(&mut self) -> NoteKey {
        self.alloc_note(Note::plain())
    }

    /// Creates an unsaved note holding one text entry.
    pub fn create_text_note(&mut self, text: impl Into<String>) -> NoteKey {
        let mut note = Note::plain();
        note.entries.push(Entry::Text(text.into()));
        self.alloc_note(note)
    }

    /// Creates a pointer note aliasing a persisted entity.
    ///
    /// # Errors
    /// - `UnpersistedReference` when `target` has no identity.
    pub fn create_pointer(&mut self, target: impl Into<NucleusRef>) -> KbResult<NoteKey> {
        let target_id = self
            .id_of(target.into())?
            .ok_or(KbError::UnpersistedReference)?;
        let key = self.alloc_note(Note::pointer(target_id));
        self.pointers.entry(target_id).or_default().insert(key);
        debug!("event=pointer_create module=note status=ok target_id={target_id} pointer={key}");
        Ok(key)
    }

    /// Appends one entry.
    ///
    /// # Errors
    /// - `ContentMutationForbidden` for pointer notes.
    /// - `CycleRejected` when `entry` is a note that already reaches `key`.
    pub fn add_content(&mut self, key: NoteKey, entry: impl Into<Entry>) -> KbResult<()> {
        let entry = entry.into();
        self.check_mutable(key)?;
        if let Entry::Note(child) = entry {
            self.check_acyclic(key, child)?;
        }

        self.note_mut(key)?.entries.push(entry.clone());
        if let Entry::Note(child) = entry {
            self.link_child(key, child);
            self.refresh_mentions(vec![key])?;
        }
        Ok(())
    }

    /// Replaces the entry at `index`, returning the previous one.
    pub fn set_entry(
        &mut self,
        key: NoteKey,
        index: usize,
        entry: impl Into<Entry>,
    ) -> KbResult<Entry> {
        let entry = entry.into();
        self.check_mutable(key)?;
        self.check_index(key, index)?;
        if let Entry::Note(child) = entry {
            self.check_acyclic(key, child)?;
        }

        let previous = std::mem::replace(&mut self.note_mut(key)?.entries[index], entry.clone());
        if let Entry::Note(old_child) = previous {
            self.unlink_child(key, old_child);
        }
        if let Entry::Note(child) = entry {
            self.link_child(key, child);
        }
        self.refresh_mentions(vec![key])?;
        Ok(previous)
    }

    /// Removes and returns the entry at `index`.
    pub fn remove_entry(&mut self, key: NoteKey, index: usize) -> KbResult<Entry> {
        self.check_mutable(key)?;
        self.check_index(key, index)?;

        let removed = self.note_mut(key)?.entries.remove(index);
        if let Entry::Note(child) = removed {
            self.unlink_child(key, child);
            self.refresh_mentions(vec![key])?;
        }
        Ok(removed)
    }

    /// Renders entries in order, nested notes recursively, joined by one space.
    ///
    /// # Panics
    /// Panics if the note graph contains a cycle; mutations never create one,
    /// so reaching it means the arena is corrupt.
    pub fn render_note(&self, key: NoteKey) -> KbResult<String> {
        self.note(key)?;
        let mut path = Vec::new();
        Ok(self.render_inner(key, &mut path))
    }

    /// `1 + max(depth(child))` over note children; text-only notes have depth 1.
    pub fn depth(&self, key: NoteKey) -> KbResult<usize> {
        self.note(key)?;
        let mut memo = HashMap::new();
        Ok(self.depth_inner(key, &mut memo))
    }

    pub fn mentions(&self, key: NoteKey) -> KbResult<&BTreeSet<EntityId>> {
        Ok(&self.note(key)?.mentions)
    }

    /// Detached value tree of a note.
    pub fn note_snapshot(&self, key: NoteKey) -> KbResult<NoteSnapshot> {
        let note = self.note(key)?;
        let mut entries = Vec::with_capacity(note.entries.len());
        for entry in &note.entries {
            entries.push(match entry {
                Entry::Text(text) => EntrySnapshot::Text(text.clone()),
                Entry::Note(child) => EntrySnapshot::Note(self.note_snapshot(*child)?),
            });
        }
        Ok(NoteSnapshot {
            id: note.id,
            pointer: note.is_pointer(),
            entries,
            mentions: note.mentions.clone(),
        })
    }

    /// Exports the backend-shaped record of one note.
    ///
    /// # Errors
    /// - `UnpersistedChild` when a nested note has no identity yet.
    pub fn note_to_record(&self, key: NoteKey) -> KbResult<NoteRecord> {
        let note = self.note(key)?;
        let mut entries = Vec::with_capacity(note.entries.len());
        for entry in &note.entries {
            entries.push(match entry {
                Entry::Text(text) => EntryRecord::Text(text.clone()),
                Entry::Note(child) => EntryRecord::Note(
                    self.note(*child)?
                        .id
                        .ok_or(KbError::UnpersistedChild {
                            parent: NucleusRef::Note(key),
                            child: *child,
                        })?,
                ),
            });
        }
        Ok(NoteRecord {
            id: note.id,
            entries,
            mentions: note.mentions.iter().copied().collect(),
            pointer: note.is_pointer(),
        })
    }

    /// Saves a note and, first, every note nested in it.
    ///
    /// # Errors
    /// - `DeadReferenceSave` when the note (or a nested one) is a dead pointer.
    /// - `RejectedWrite` when the backend refuses a record. Records already
    ///   written for nested notes are kept.
    pub fn save_note(&mut self, key: NoteKey) -> KbResult<EntityId> {
        let mut saved = HashMap::new();
        self.save_note_tree(key, &mut saved)
    }

    /// Rebuilds a note tree from the backend.
    ///
    /// Ids already live in this session resolve to their shared slot.
    pub fn load_note(&mut self, id: EntityId) -> KbResult<NoteKey> {
        let mut in_progress = HashSet::new();
        self.load_note_tree(id, &mut in_progress)
    }

    /// Deletes a note record and drops the note from every parent.
    ///
    /// An unsaved note makes no backend call but is still detached. Persisted
    /// parents are re-saved, items naming the note get a fresh empty note in
    /// its place, and pointers to the note are invalidated.
    pub fn delete_note(&mut self, key: NoteKey) -> KbResult<()> {
        let (id, kind) = {
            let note = self.note(key)?;
            (note.id, note.kind)
        };

        if let Some(id) = id {
            self.port.delete(RecordKind::Note, id)?;
            self.note_ids.remove(&id);
            let note = self.note_mut(key)?;
            note.id = None;
            note.lifecycle = Lifecycle::Deleted;
            info!("event=note_delete module=note status=ok note_id={id} note={key}");
        }

        if let NoteKind::Pointer { target, .. } = kind {
            if let Some(pointers) = self.pointers.get_mut(&target) {
                pointers.remove(&key);
                if pointers.is_empty() {
                    self.pointers.remove(&target);
                }
            }
        }

        self.detach_from_parents(key)?;
        self.detach_from_items(key)?;
        if let Some(id) = id {
            self.invalidate_pointers_to(id)?;
        }
        Ok(())
    }

    /// Removes every occurrence of `key` from its parents.
    ///
    /// Every persisted note whose entries or mentions changed is re-saved.
    pub(crate) fn detach_from_parents(&mut self, key: NoteKey) -> KbResult<()> {
        let parents: Vec<NoteKey> = self
            .parents
            .remove(&key)
            .map(|parents| parents.into_keys().collect())
            .unwrap_or_default();
        if parents.is_empty() {
            return Ok(());
        }

        for parent in &parents {
            self.note_mut(*parent)?
                .entries
                .retain(|entry| *entry != Entry::Note(key));
        }
        let mut stale: BTreeSet<NoteKey> = self.refresh_mentions(parents.clone())?;
        stale.extend(parents);

        for note in stale {
            if self.note(note)?.id.is_some() {
                self.save_note(note)?;
            }
        }
        Ok(())
    }

    fn check_mutable(&self, key: NoteKey) -> KbResult<()> {
        if self.note(key)?.is_pointer() {
            warn!("event=note_mutate module=note status=rejected reason=pointer note={key}");
            return Err(KbError::ContentMutationForbidden(key));
        }
        Ok(())
    }

    fn check_index(&self, key: NoteKey, index: usize) -> KbResult<()> {
        let len = self.note(key)?.entries.len();
        if index >= len {
            return Err(KbError::EntryOutOfRange {
                note: key,
                index,
                len,
            });
        }
        Ok(())
    }

    fn check_acyclic(&self, parent: NoteKey, child: NoteKey) -> KbResult<()> {
        self.note(child)?;
        if self.reaches(child, parent) {
            warn!("event=note_mutate module=note status=rejected reason=cycle parent={parent} child={child}");
            return Err(KbError::CycleRejected { parent, child });
        }
        Ok(())
    }

    /// Depth-first search over note children, each slot visited once.
    fn reaches(&self, from: NoteKey, target: NoteKey) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(note) = self.notes.get(current.0) {
                stack.extend(note.child_keys());
            }
        }
        false
    }

    fn link_child(&mut self, parent: NoteKey, child: NoteKey) {
        *self
            .parents
            .entry(child)
            .or_default()
            .entry(parent)
            .or_insert(0) += 1;
    }

    fn unlink_child(&mut self, parent: NoteKey, child: NoteKey) {
        let Some(parents) = self.parents.get_mut(&child) else {
            return;
        };
        if let Some(count) = parents.get_mut(&parent) {
            *count -= 1;
            if *count == 0 {
                parents.remove(&parent);
            }
        }
        if parents.is_empty() {
            self.parents.remove(&child);
        }
    }

    /// Recomputes `mentions` from `start` upwards until nothing changes.
    ///
    /// Returns the notes whose mentions changed.
    fn refresh_mentions(&mut self, start: Vec<NoteKey>) -> KbResult<BTreeSet<NoteKey>> {
        let mut changed = BTreeSet::new();
        let mut pending = start;
        while let Some(key) = pending.pop() {
            let fresh = {
                let note = self.note(key)?;
                match note.kind {
                    NoteKind::Pointer { target, alive } => {
                        if alive {
                            BTreeSet::from([target])
                        } else {
                            BTreeSet::new()
                        }
                    }
                    NoteKind::Plain => {
                        let mut union = BTreeSet::new();
                        for child in note.child_keys() {
                            union.extend(self.note(child)?.mentions.iter().copied());
                        }
                        union
                    }
                }
            };

            let note = self.note_mut(key)?;
            if note.mentions != fresh {
                note.mentions = fresh;
                changed.insert(key);
                pending.extend(self.parents_of(key));
            }
        }
        Ok(changed)
    }

    fn render_inner(&self, key: NoteKey, path: &mut Vec<NoteKey>) -> String {
        assert!(
            !path.contains(&key),
            "note graph contains a cycle through {key}"
        );
        path.push(key);
        let rendered = self.notes[key.0]
            .entries
            .iter()
            .map(|entry| match entry {
                Entry::Text(text) => text.clone(),
                Entry::Note(child) => self.render_inner(*child, path),
            })
            .collect::<Vec<_>>()
            .join(" ");
        path.pop();
        rendered
    }

    fn depth_inner(&self, key: NoteKey, memo: &mut HashMap<NoteKey, usize>) -> usize {
        if let Some(depth) = memo.get(&key) {
            return *depth;
        }
        let deepest_child = self.notes[key.0]
            .child_keys()
            .map(|child| self.depth_inner(child, memo))
            .max()
            .unwrap_or(0);
        let depth = 1 + deepest_child;
        memo.insert(key, depth);
        depth
    }

    fn save_note_tree(
        &mut self,
        key: NoteKey,
        saved: &mut HashMap<NoteKey, EntityId>,
    ) -> KbResult<EntityId> {
        if let Some(id) = saved.get(&key) {
            return Ok(*id);
        }

        let note = self.note(key)?;
        if note.is_dead_pointer() {
            warn!("event=note_save module=note status=rejected reason=dead_pointer note={key}");
            return Err(KbError::DeadReferenceSave(key));
        }
        let children: Vec<NoteKey> = note.child_keys().collect();
        for child in children {
            self.save_note_tree(child, saved)?;
        }

        let record = self.note_to_record(key)?;
        let is_new = record.id.is_none();
        let id = self.port.save(RecordKind::Note, &Record::Note(record))?;

        let note = self.note_mut(key)?;
        note.id = Some(id);
        note.lifecycle = Lifecycle::Saved;
        self.note_ids.insert(id, key);
        saved.insert(key, id);
        debug!("event=note_save module=note status=ok note_id={id} note={key} created={is_new}");
        Ok(id)
    }

    fn load_note_tree(
        &mut self,
        id: EntityId,
        in_progress: &mut HashSet<EntityId>,
    ) -> KbResult<NoteKey> {
        if let Some(key) = self.note_ids.get(&id) {
            return Ok(*key);
        }
        let record = match self.port.load(RecordKind::Note, id)? {
            Record::Note(record) => record,
            Record::Item(_) => {
                return Err(KbError::InvalidData(format!(
                    "record {id} in note collection is not a note"
                )))
            }
        };
        if !in_progress.insert(id) {
            return Err(KbError::InvalidData(format!(
                "stored note graph contains a cycle through note {id}"
            )));
        }

        let mut stale = false;
        let key = if record.pointer {
            let target = pointer_target(id, &record)?;
            if !self.target_alive(target, in_progress)? {
                in_progress.remove(&id);
                return self.load_dead_pointer(id, target);
            }
            let key = self.alloc_note(Note::pointer(target));
            self.pointers.entry(target).or_default().insert(key);
            key
        } else {
            let stored_mentions: BTreeSet<EntityId> = record.mentions.iter().copied().collect();
            let mut entries = Vec::with_capacity(record.entries.len());
            let mut missing_child = false;
            for entry in record.entries {
                let entry = match entry {
                    EntryRecord::Text(text) => Entry::Text(text),
                    EntryRecord::Note(child_id) => {
                        match self.load_note_tree(child_id, in_progress) {
                            Ok(child) => Entry::Note(child),
                            Err(KbError::NotFound {
                                kind: RecordKind::Note,
                                id: missing,
                            }) if missing == child_id => {
                                warn!("event=note_load module=note status=repaired reason=missing_child note_id={id} child_id={child_id}");
                                missing_child = true;
                                continue;
                            }
                            Err(err) => return Err(err),
                        }
                    }
                };
                entries.push(entry);
            }
            let loaded = entries.len();
            entries.retain(|entry| match entry {
                Entry::Note(child) => !self.notes[child.0].is_dead_pointer(),
                Entry::Text(_) => true,
            });
            let pruned = missing_child || entries.len() != loaded;
            let key = self.alloc_note(Note::plain());
            for child in entries.iter().filter_map(|entry| match entry {
                Entry::Note(child) => Some(*child),
                Entry::Text(_) => None,
            }) {
                self.link_child(key, child);
            }
            self.note_mut(key)?.entries = entries;
            self.refresh_mentions(vec![key])?;
            stale = pruned || self.note(key)?.mentions != stored_mentions;
            key
        };

        let note = self.note_mut(key)?;
        note.id = Some(id);
        note.lifecycle = Lifecycle::Saved;
        self.note_ids.insert(id, key);
        in_progress.remove(&id);
        debug!("event=note_load module=note status=ok note_id={id} note={key}");
        if stale {
            self.save_note(key)?;
        }
        Ok(key)
    }

    /// Whether a pointer target still exists, in this session or the backend.
    ///
    /// A target that is itself a stored pointer is followed to its own target.
    fn target_alive(&self, target: EntityId, in_progress: &HashSet<EntityId>) -> KbResult<bool> {
        let mut seen = HashSet::new();
        let mut current = target;
        loop {
            if !seen.insert(current) {
                return Err(KbError::InvalidData(format!(
                    "pointer chain loops through record {current}"
                )));
            }
            if in_progress.contains(&current) || self.item_ids.contains_key(&current) {
                return Ok(true);
            }
            if let Some(key) = self.note_ids.get(&current) {
                return Ok(!self.note(*key)?.is_dead_pointer());
            }

            match self.port.load(RecordKind::Note, current) {
                Ok(Record::Note(record)) if record.pointer => {
                    current = pointer_target(current, &record)?;
                    continue;
                }
                Ok(_) => return Ok(true),
                Err(RepoError::NotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }
            for kind in ItemKind::ALL {
                match self.port.load(kind.record_kind(), current) {
                    Ok(_) => return Ok(true),
                    Err(RepoError::NotFound { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            return Ok(false);
        }
    }

    /// Materializes a stored pointer whose target is gone: dead, without
    /// identity, and with its record removed.
    fn load_dead_pointer(&mut self, id: EntityId, target: EntityId) -> KbResult<NoteKey> {
        let key = self.alloc_note(Note::pointer(target));
        let note = self.note_mut(key)?;
        note.kill_pointer();
        note.lifecycle = Lifecycle::Deleted;

        match self.port.delete(RecordKind::Note, id) {
            Ok(()) | Err(RepoError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        info!(
            "event=pointer_invalidate module=note status=ok source=load target_id={target} pointer={key} pointer_id={id}"
        );
        self.invalidate_pointers_to(id)?;
        Ok(key)
    }
}

fn pointer_target(id: EntityId, record: &NoteRecord) -> KbResult<EntityId> {
    let target = match record.entries.as_slice() {
        [EntryRecord::Text(marker)] => parse_pointer_marker(marker),
        _ => None,
    };
    match (target, record.mentions.as_slice()) {
        (Some(target), [mentioned]) if *mentioned == target => Ok(target),
        _ => Err(KbError::InvalidData(format!(
            "pointer note {id} does not hold a single marker matching its mention"
        ))),
    }
}
