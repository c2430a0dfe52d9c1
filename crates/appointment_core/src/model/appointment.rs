//! Appointment record and status lifecycle.
//!
//! # Responsibility
//! - Define the persisted appointment record and its request shape.
//! - Provide the only allowed status transition (`scheduled -> canceled`).
//!
//! # Invariants
//! - `id` is generated once at creation and never reused or derived from content.
//! - Status never moves from `canceled` back to `scheduled`.
//! - `canceled -> canceled` is rejected, not treated as a no-op success.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for an appointment record.
pub type AppointmentId = Uuid;

/// Combined `date` + `time` layout accepted for scheduling (`2025-06-01T10:00`).
pub const APPOINTMENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Appointment lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    /// Booked and upcoming.
    Scheduled,
    /// Terminal state.
    Canceled,
}

impl AppointmentStatus {
    /// Stable string id used in storage and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Canceled => "canceled",
        }
    }

    /// Parses a stored status value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Returns whether `self -> next` is an allowed transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!((self, next), (Self::Scheduled, Self::Canceled))
    }
}

impl Display for AppointmentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-level validation failures for appointment input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentValidationError {
    EmptyField(&'static str),
}

impl Display for AppointmentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "appointment field `{field}` must not be empty"),
        }
    }
}

impl Error for AppointmentValidationError {}

/// Create request for a new appointment.
///
/// All fields are required free text. `phone` is expected to be dialable
/// (`+15551234567`) but is not structurally validated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub name: String,
    pub phone: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// Time of day, `HH:MM`.
    pub time: String,
    pub reason: String,
}

impl NewAppointment {
    /// Rejects requests with blank fields.
    pub fn validate(&self) -> Result<(), AppointmentValidationError> {
        for (field, value) in [
            ("name", &self.name),
            ("phone", &self.phone),
            ("date", &self.date),
            ("time", &self.time),
            ("reason", &self.reason),
        ] {
            if value.trim().is_empty() {
                return Err(AppointmentValidationError::EmptyField(field));
            }
        }
        Ok(())
    }
}

/// Canonical persisted appointment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub name: String,
    pub phone: String,
    pub date: String,
    pub time: String,
    pub reason: String,
    pub status: AppointmentStatus,
}

impl Appointment {
    /// Builds a `scheduled` appointment with a freshly generated ID.
    ///
    /// Field values are stored trimmed.
    pub fn new(request: &NewAppointment) -> Result<Self, AppointmentValidationError> {
        request.validate()?;
        Ok(Self::with_id(Uuid::new_v4(), request))
    }

    /// Builds a `scheduled` appointment with a caller-provided ID.
    ///
    /// Used by storage read-back and tests; does not validate.
    pub fn with_id(id: AppointmentId, request: &NewAppointment) -> Self {
        Self {
            id,
            name: request.name.trim().to_string(),
            phone: request.phone.trim().to_string(),
            date: request.date.trim().to_string(),
            time: request.time.trim().to_string(),
            reason: request.reason.trim().to_string(),
            status: AppointmentStatus::Scheduled,
        }
    }

    /// Validates a record before it is written or after it is read back.
    pub fn validate(&self) -> Result<(), AppointmentValidationError> {
        if self.name.trim().is_empty() {
            return Err(AppointmentValidationError::EmptyField("name"));
        }
        Ok(())
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == AppointmentStatus::Scheduled
    }

    /// Resolves `date` + `time` to a point on the canonical UTC clock.
    ///
    /// # Errors
    /// - Returns the chrono parse error when the combined value does not
    ///   match [`APPOINTMENT_TIME_FORMAT`].
    pub fn scheduled_at(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        let combined = format!("{}T{}", self.date, self.time);
        NaiveDateTime::parse_from_str(&combined, APPOINTMENT_TIME_FORMAT)
            .map(|naive| naive.and_utc())
    }
}
