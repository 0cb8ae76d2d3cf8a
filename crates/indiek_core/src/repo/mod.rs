//! Persistence port contract and bundled backends.
//!
//! # Responsibility
//! - Define the `PersistencePort` boundary consumed by the core.
//! - Isolate SQLite details from knowledge-base orchestration.
//!
//! # Invariants
//! - Backends return semantic errors (`NotFound`, `RejectedWrite`) in
//!   addition to transport errors.
//! - The core never assumes a specific backend.

pub mod memory_store;
pub mod port;
pub mod sqlite_store;
