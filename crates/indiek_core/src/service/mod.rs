//! Knowledge-base session and its use-case operations.
//!
//! # Responsibility
//! - Keep the in-memory object graph and backend records paired.
//! - Keep callers decoupled from storage details.

pub mod item_service;
pub mod knowledge_base;
pub mod note_service;
