//! Domain model for tracked sleep nights.
//!
//! # Responsibility
//! - Define the single record type persisted by the night store.
//! - Provide the quality scale shared by the store callers.
//!
//! # Invariants
//! - Every persisted night is identified by a store-assigned `NightId`.
//! - The store treats every non-key field as opaque payload.

pub mod sleep_night;
