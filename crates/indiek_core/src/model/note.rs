//! Note domain model.
//!
//! # Responsibility
//! - Define the arena slot held for every live note.
//! - Own the pointer marker format (`iKiD<id>`).
//!
//! # Invariants
//! - A pointer note has exactly one text entry, its marker.
//! - A dead pointer note has no mentions.
//! - `id` is `Some` only while the note is persisted.
//!
//! Graph-level invariants (acyclicity, mention propagation) are enforced by
//! `KnowledgeBase`, which is the only writer of these slots.

use crate::model::record::EntityId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Sentinel prefix of a pointer marker.
pub const POINTER_PREFIX: &str = "iKiD";

static POINTER_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^iKiD(-?[0-9]+)$").expect("valid pointer marker regex"));

/// Session-local handle of a note slot.
///
/// Distinct from the persisted `EntityId`: unsaved notes have a key but no id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteKey(pub(crate) usize);

impl std::fmt::Display for NoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "note#{}", self.0)
    }
}

/// One note entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Text(String),
    /// Shared reference to another live note.
    Note(NoteKey),
}

impl From<&str> for Entry {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Entry {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NoteKey> for Entry {
    fn from(value: NoteKey) -> Self {
        Self::Note(value)
    }
}

/// Persistence lifecycle shared by notes and items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unsaved,
    Saved,
    Deleted,
}

/// Plain note or pointer note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    Plain,
    Pointer {
        target: EntityId,
        /// Cleared once the target is deleted.
        alive: bool,
    },
}

/// Arena slot for one note.
#[derive(Debug, Clone)]
pub struct Note {
    pub(crate) id: Option<EntityId>,
    pub(crate) kind: NoteKind,
    pub(crate) entries: Vec<Entry>,
    pub(crate) mentions: BTreeSet<EntityId>,
    pub(crate) lifecycle: Lifecycle,
}

impl Note {
    pub(crate) fn plain() -> Self {
        Self {
            id: None,
            kind: NoteKind::Plain,
            entries: Vec::new(),
            mentions: BTreeSet::new(),
            lifecycle: Lifecycle::Unsaved,
        }
    }

    pub(crate) fn pointer(target: EntityId) -> Self {
        Self {
            id: None,
            kind: NoteKind::Pointer {
                target,
                alive: true,
            },
            entries: vec![Entry::Text(pointer_marker(target))],
            mentions: BTreeSet::from([target]),
            lifecycle: Lifecycle::Unsaved,
        }
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn exists_in_db(&self) -> bool {
        self.id.is_some()
    }

    pub fn kind(&self) -> NoteKind {
        self.kind
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn mentions(&self) -> &BTreeSet<EntityId> {
        &self.mentions
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, NoteKind::Pointer { .. })
    }

    /// Returns whether this is a pointer whose target was deleted.
    pub fn is_dead_pointer(&self) -> bool {
        matches!(self.kind, NoteKind::Pointer { alive: false, .. })
    }

    /// Keys of direct note children, in entry order (duplicates kept).
    pub fn child_keys(&self) -> impl Iterator<Item = NoteKey> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Note(key) => Some(*key),
            Entry::Text(_) => None,
        })
    }

    pub(crate) fn kill_pointer(&mut self) {
        if let NoteKind::Pointer { target, .. } = self.kind {
            self.kind = NoteKind::Pointer {
                target,
                alive: false,
            };
            self.mentions.clear();
        }
    }
}

/// Builds the marker text a pointer note renders as.
pub fn pointer_marker(target: EntityId) -> String {
    format!("{POINTER_PREFIX}{target}")
}

/// Parses a pointer marker back into the target id.
pub fn parse_pointer_marker(value: &str) -> Option<EntityId> {
    POINTER_MARKER_RE
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::{parse_pointer_marker, pointer_marker, Entry, Note, NoteKind};

    #[test]
    fn marker_is_prefix_plus_decimal_id() {
        assert_eq!(pointer_marker(42), "iKiD42");
        assert_eq!(parse_pointer_marker("iKiD42"), Some(42));
    }

    #[test]
    fn marker_parser_rejects_foreign_text() {
        assert_eq!(parse_pointer_marker("ikid42"), None);
        assert_eq!(parse_pointer_marker("iKiD42 "), None);
        assert_eq!(parse_pointer_marker("iKiD"), None);
    }

    #[test]
    fn killing_a_pointer_clears_mentions_but_keeps_marker() {
        let mut note = Note::pointer(7);
        assert_eq!(note.mentions().len(), 1);

        note.kill_pointer();
        assert!(note.is_dead_pointer());
        assert!(note.mentions().is_empty());
        assert_eq!(note.entries(), &[Entry::Text("iKiD7".to_string())]);
        assert_eq!(
            note.kind(),
            NoteKind::Pointer {
                target: 7,
                alive: false
            }
        );
    }
}
