//! Appointment domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Encode the appointment status state machine in one place.
//!
//! # Invariants
//! - Every appointment is identified by a stable `AppointmentId`.
//! - Cancellation is a status change, never a physical delete.

pub mod appointment;
pub mod reminder;
