//! # Shared Types Crate
//!
//! Value types exchanged between the execution layer and the atomic
//! operation indexing subsystem (qc-18).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: chain identifiers and atomic operation
//!   batches are defined once here and reused by every consumer.
//! - **Deterministic Ordering**: every collection that ends up hashed or
//!   serialized is ordered (`BTreeMap`, `Vec`), never a `HashMap`.

pub mod entities;

pub use entities::*;
