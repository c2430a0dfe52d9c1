//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate record store, notifier and scheduler calls into the
//!   appointment lifecycle API.
//! - Keep front ends (CLI, future transports) decoupled from storage details.

pub mod appointment_service;
