//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the data access contract for sleep nights.
//! - Isolate SQLite query details from services and the live store.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.
//! - Reads report a missing row as `None`, never as an error.

pub mod night_repo;
