//! Durable queue of pending reminders.
//!
//! Pending reminders are persisted next to their appointments so a restarted
//! process can re-arm them instead of silently losing them.

use crate::model::appointment::AppointmentId;
use crate::model::reminder::ReminderTask;
use crate::repo::appointment_repo::RepoResult;

/// Storage contract for pending reminder tasks, keyed by appointment id.
pub trait ReminderRepository: Send + Sync {
    /// Inserts or replaces the pending reminder for `task.appointment_id`.
    ///
    /// Fails with `NotFound` when the appointment does not exist.
    fn save_reminder(&self, task: &ReminderTask) -> RepoResult<()>;
    /// Removes the pending reminder; returns whether one existed.
    fn delete_reminder(&self, appointment_id: AppointmentId) -> RepoResult<bool>;
    /// Returns pending reminders ordered by fire time.
    fn list_reminders(&self) -> RepoResult<Vec<ReminderTask>>;
}
