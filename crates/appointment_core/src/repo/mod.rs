//! Record store abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the appointment record store and pending-reminder contracts.
//! - Isolate SQLite query details from lifecycle orchestration.
//! - Provide an in-memory backend with identical semantics for tests.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `InvalidTransition`)
//!   in addition to storage transport errors.

pub mod appointment_repo;
pub mod memory_repo;
pub mod reminder_repo;
