//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into tracking use-cases.
//! - Keep callers decoupled from storage details.

pub mod tracker_service;
