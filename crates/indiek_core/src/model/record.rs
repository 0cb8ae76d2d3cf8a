//! Backend-shaped record model.
//!
//! # Responsibility
//! - Define the logical record shapes exchanged with a `PersistencePort`.
//! - Route every record to one `RecordKind` collection.
//!
//! # Invariants
//! - Item records reference their name/content notes by id only.
//! - A pointer note record carries exactly one text entry (the marker) and
//!   exactly one mention.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Persisted identity assigned by the backend.
///
/// One sequence is shared by every record kind, so an id alone names an
/// entity unambiguously.
pub type EntityId = i64;

/// Backend collection a record is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Definition,
    Theorem,
    Proof,
    Question,
    Note,
}

impl RecordKind {
    /// Stable collection name used by storage backends.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Theorem => "theorem",
            Self::Proof => "proof",
            Self::Question => "question",
            Self::Note => "note",
        }
    }

    /// Parses a stable collection name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "definition" => Some(Self::Definition),
            "theorem" => Some(Self::Theorem),
            "proof" => Some(Self::Proof),
            "question" => Some(Self::Question),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item record: `{id, kind, name, content}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: Option<EntityId>,
    pub kind: RecordKind,
    /// Id of the name note.
    pub name: EntityId,
    /// Id of the content note.
    pub content: EntityId,
}

/// One stored note entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EntryRecord {
    Text(String),
    Note(EntityId),
}

/// Note record: `{id, entries, mentions}` plus the pointer flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: Option<EntityId>,
    pub entries: Vec<EntryRecord>,
    pub mentions: Vec<EntityId>,
    #[serde(default)]
    pub pointer: bool,
}

/// Any record accepted by a persistence port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    Item(ItemRecord),
    Note(NoteRecord),
}

impl Record {
    pub fn id(&self) -> Option<EntityId> {
        match self {
            Self::Item(record) => record.id,
            Self::Note(record) => record.id,
        }
    }

    pub fn set_id(&mut self, id: EntityId) {
        match self {
            Self::Item(record) => record.id = Some(id),
            Self::Note(record) => record.id = Some(id),
        }
    }

    /// Returns whether this record shape belongs in the `kind` collection.
    pub fn fits(&self, kind: RecordKind) -> bool {
        match self {
            Self::Item(record) => record.kind == kind && kind != RecordKind::Note,
            Self::Note(_) => kind == RecordKind::Note,
        }
    }

    /// Iterates over literal text carried by this record.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        let entries: &[EntryRecord] = match self {
            Self::Item(_) => &[],
            Self::Note(record) => &record.entries,
        };
        entries.iter().filter_map(|entry| match entry {
            EntryRecord::Text(text) => Some(text.as_str()),
            EntryRecord::Note(_) => None,
        })
    }
}
