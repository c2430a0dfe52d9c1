//! Deferred reminder work item.

use crate::model::appointment::AppointmentId;
use chrono::{DateTime, Utc};

/// A pending reminder for one appointment.
///
/// At most one task exists per appointment; re-scheduling replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderTask {
    pub appointment_id: AppointmentId,
    /// Dialable recipient, copied from the appointment at scheduling time.
    pub recipient: String,
    pub requester_name: String,
    /// Point on the canonical (UTC) clock at which the reminder fires.
    pub fire_at: DateTime<Utc>,
}
