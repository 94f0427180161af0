//! Storage layer
//!
//! # Architecture
//!
//! Snippets are stored as one key per identifier, each key holding a small
//! field map:
//!
//! ```text
//! <ident>  (optional TTL)
//!   ├─ code        → snippet text
//!   ├─ views_left  → decimal counter, 0 = unlimited
//!   ├─ parentid    → identifier of the original, or ""
//!   └─ token       → admin token (field absent when unset)
//! ```
//!
//! ## Backend
//!
//! The `KeyValueBackend` trait is the only capability the snippet store
//! consumes: existence checks, field-map reads and writes, numeric field
//! increments, key deletion and per-key TTL, plus two atomic primitives
//! (`insert_if_absent`, `read_and_mutate`) with non-atomic defaults.
//!
//! ## Implementations
//!
//! - **MemoryBackend**: `DashMap` keyed store with lazy and background expiry
//! - **MockBackend**: fault-injecting test double using the default primitives

pub mod engine;
pub mod memory;
pub mod mock;

pub use engine::{FieldMap, FieldMutation, KeyValueBackend, MutationFn};
pub use memory::MemoryBackend;
pub use mock::MockBackend;
