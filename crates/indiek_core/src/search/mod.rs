//! Search and listing entry points.
//!
//! # Responsibility
//! - Rebuild stored items into a session, grouped by kind.
//! - Keep kind parsing and result shaping inside core.

pub mod listing;
