//! Detached value trees for value equality.
//!
//! Arena keys compare slot identity; snapshots compare values. Two notes
//! loaded into different sessions have different keys but equal snapshots.

use crate::model::item::ItemKind;
use crate::model::record::EntityId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySnapshot {
    Text(String),
    Note(NoteSnapshot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSnapshot {
    pub id: Option<EntityId>,
    pub pointer: bool,
    pub entries: Vec<EntrySnapshot>,
    pub mentions: BTreeSet<EntityId>,
}

/// Value of an item: kind, identity, name and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub kind: ItemKind,
    pub id: Option<EntityId>,
    pub name: NoteSnapshot,
    pub content: NoteSnapshot,
}
