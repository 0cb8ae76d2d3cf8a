//! Item domain model.
//!
//! # Responsibility
//! - Define the closed set of item kinds and their record routing.
//! - Define the arena slot held for every live item.
//!
//! # Invariants
//! - Every item owns exactly one name note and one content note.
//! - `kind` never changes after construction.

use crate::model::note::{Lifecycle, NoteKey};
use crate::model::record::{EntityId, RecordKind};
use std::fmt::{Display, Formatter};

/// Closed set of item kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKind {
    Definition,
    Theorem,
    Proof,
    Question,
}

impl ItemKind {
    /// All kinds, in listing order.
    pub const ALL: [ItemKind; 4] = [
        ItemKind::Definition,
        ItemKind::Theorem,
        ItemKind::Proof,
        ItemKind::Question,
    ];

    /// Backend collection this kind is routed to.
    pub fn record_kind(self) -> RecordKind {
        match self {
            Self::Definition => RecordKind::Definition,
            Self::Theorem => RecordKind::Theorem,
            Self::Proof => RecordKind::Proof,
            Self::Question => RecordKind::Question,
        }
    }

    pub fn from_record_kind(kind: RecordKind) -> Option<Self> {
        match kind {
            RecordKind::Definition => Some(Self::Definition),
            RecordKind::Theorem => Some(Self::Theorem),
            RecordKind::Proof => Some(Self::Proof),
            RecordKind::Question => Some(Self::Question),
            RecordKind::Note => None,
        }
    }

    /// Parses a kind name; `note` is not an item kind.
    pub fn parse(value: &str) -> Option<Self> {
        RecordKind::parse(value.trim()).and_then(Self::from_record_kind)
    }

    pub fn as_str(self) -> &'static str {
        self.record_kind().as_str()
    }
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-local handle of an item slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey(pub(crate) usize);

impl Display for ItemKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Arena slot for one item.
#[derive(Debug, Clone)]
pub struct Item {
    pub(crate) id: Option<EntityId>,
    pub(crate) kind: ItemKind,
    pub(crate) name: NoteKey,
    pub(crate) content: NoteKey,
    pub(crate) lifecycle: Lifecycle,
}

impl Item {
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn exists_in_db(&self) -> bool {
        self.id.is_some()
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn name(&self) -> NoteKey {
        self.name
    }

    pub fn content(&self) -> NoteKey {
        self.content
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
}
