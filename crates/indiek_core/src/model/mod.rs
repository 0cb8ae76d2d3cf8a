//! Domain model for items, notes and their backend records.
//!
//! # Responsibility
//! - Define arena slots for notes and items.
//! - Define the record shapes exchanged with persistence ports.
//!
//! # Invariants
//! - Persisted identity (`EntityId`) is assigned by the backend only.
//! - Session handles (`NoteKey`, `ItemKey`) never leave the owning
//!   `KnowledgeBase`.

pub mod item;
pub mod note;
pub mod record;
pub mod snapshot;
