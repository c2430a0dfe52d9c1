//! Deferred pre-appointment reminders.
//!
//! # Responsibility
//! - Compute reminder fire times relative to appointment times.
//! - Arm one timer task per appointment without blocking the caller.
//! - Persist pending reminders so they survive a process restart.
//!
//! # Invariants
//! - Fire time is appointment time minus [`REMINDER_LEAD_MINUTES`].
//! - A fire time already in the past fires immediately while the appointment
//!   itself is still upcoming; reminders for past appointments are dropped.
//! - A reminder never fires for an appointment that is canceled or gone by the
//!   time its timer expires.
//! - At most one live timer exists per appointment id.
//! - A reminder armed for an appointment that was canceled meanwhile is
//!   withdrawn before `schedule` returns.

use crate::model::appointment::{Appointment, AppointmentId};
use crate::model::reminder::ReminderTask;
use crate::notify::messages::reminder_message;
use crate::notify::{mask_recipient, NotificationDispatcher, NotificationKind};
use crate::repo::appointment_repo::{AppointmentRepository, RepoError, RepoResult};
use crate::repo::reminder_repo::ReminderRepository;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Lead interval between a reminder and its appointment.
pub const REMINDER_LEAD_MINUTES: i64 = 60;

/// Outcome of planning a reminder for one appointment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderPlan {
    /// Fire at the given instant.
    At(DateTime<Utc>),
    /// Lead window already entered; fire now.
    Immediately,
    /// Appointment time has passed; nothing to remind about.
    Skip,
}

/// Decides when (and whether) to remind about an appointment at
/// `appointment_time`, as seen at `now`.
pub fn plan_reminder(appointment_time: DateTime<Utc>, now: DateTime<Utc>) -> ReminderPlan {
    if appointment_time <= now {
        return ReminderPlan::Skip;
    }
    let fire_at = appointment_time - ChronoDuration::minutes(REMINDER_LEAD_MINUTES);
    if fire_at <= now {
        ReminderPlan::Immediately
    } else {
        ReminderPlan::At(fire_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// `date`/`time` could not be resolved to a point in time.
    InvalidTimeFormat { value: String, reason: String },
}

impl Display for ScheduleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTimeFormat { value, reason } => {
                write!(f, "invalid appointment time `{value}`: {reason}")
            }
        }
    }
}

impl Error for ScheduleError {}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct SchedulerInner<R> {
    repo: Arc<R>,
    dispatcher: NotificationDispatcher,
    timers: DashMap<AppointmentId, Timer>,
    next_generation: AtomicU64,
}

/// Timer-task reminder scheduler backed by a durable reminder queue.
///
/// Cheap to clone; clones share timers. Methods that arm timers must run
/// inside a Tokio runtime.
pub struct ReminderScheduler<R> {
    inner: Arc<SchedulerInner<R>>,
}

impl<R> Clone for ReminderScheduler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> ReminderScheduler<R>
where
    R: AppointmentRepository + ReminderRepository + 'static,
{
    pub fn new(repo: Arc<R>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                repo,
                dispatcher,
                timers: DashMap::new(),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Arranges a reminder for `appointment` and returns the applied plan.
    ///
    /// Returns without waiting for the reminder; the timer runs on its own
    /// task. A failure to persist the reminder is logged and the in-memory
    /// timer is still armed.
    ///
    /// # Errors
    /// - `InvalidTimeFormat` when `date`/`time` do not parse; nothing is
    ///   scheduled in that case.
    pub async fn schedule(&self, appointment: &Appointment) -> Result<ReminderPlan, ScheduleError> {
        let appointment_time = appointment.scheduled_at().map_err(|err| {
            let error = ScheduleError::InvalidTimeFormat {
                value: format!("{}T{}", appointment.date, appointment.time),
                reason: err.to_string(),
            };
            warn!(
                "event=reminder_schedule module=scheduler status=error id={} error_code=invalid_time_format error={}",
                appointment.id, error
            );
            error
        })?;

        let now = Utc::now();
        let plan = plan_reminder(appointment_time, now);
        let fire_at = match plan {
            ReminderPlan::At(fire_at) => fire_at,
            ReminderPlan::Immediately => now,
            ReminderPlan::Skip => {
                info!(
                    "event=reminder_schedule module=scheduler status=skipped id={} reason=appointment_in_past",
                    appointment.id
                );
                return Ok(plan);
            }
        };

        let task = ReminderTask {
            appointment_id: appointment.id,
            recipient: appointment.phone.clone(),
            requester_name: appointment.name.clone(),
            fire_at,
        };
        if let Err(err) = self.inner.repo.save_reminder(&task) {
            warn!(
                "event=reminder_persist module=scheduler status=error id={} error={}",
                appointment.id, err
            );
        }
        self.arm(task);

        // Cancel flips the status before it stops timers, so a cancel that ran
        // ahead of this job is visible here and its timer is ours to stop.
        let still_scheduled = match self.inner.repo.get(appointment.id) {
            Ok(current) => current.is_scheduled(),
            Err(RepoError::NotFound(_)) => false,
            Err(_) => true,
        };
        if !still_scheduled {
            self.cancel(appointment.id);
            info!(
                "event=reminder_schedule module=scheduler status=withdrawn id={} reason=canceled",
                appointment.id
            );
            return Ok(ReminderPlan::Skip);
        }

        info!(
            "event=reminder_schedule module=scheduler status=ok id={} fire_at={} immediate={}",
            appointment.id,
            fire_at.to_rfc3339(),
            plan == ReminderPlan::Immediately
        );
        Ok(plan)
    }

    /// Stops the reminder for `id` and drops it from the durable queue.
    ///
    /// Returns whether a timer that had not fired yet was aborted.
    pub fn cancel(&self, id: AppointmentId) -> bool {
        let aborted = match self.inner.timers.remove(&id) {
            Some((_, timer)) => {
                let live = !timer.handle.is_finished();
                timer.handle.abort();
                live
            }
            None => false,
        };
        if let Err(err) = self.inner.repo.delete_reminder(id) {
            warn!(
                "event=reminder_cancel module=scheduler status=error id={} error={}",
                id, err
            );
        }
        debug!(
            "event=reminder_cancel module=scheduler status=ok id={} aborted={}",
            id, aborted
        );
        aborted
    }

    /// Arms every persisted reminder that has no live timer in this process;
    /// returns how many were armed.
    ///
    /// Safe to call repeatedly: running timers are left alone, so rows queued
    /// by other processes are picked up without resetting existing ones.
    /// Reminders whose fire time passed while nobody was watching fire
    /// immediately (subject to the checks made at fire time).
    pub async fn restore(&self) -> RepoResult<usize> {
        let tasks = self.inner.repo.list_reminders()?;
        let mut armed = 0usize;
        for task in tasks {
            if self.is_pending(task.appointment_id) {
                continue;
            }
            self.arm(task);
            armed += 1;
        }
        if armed > 0 {
            info!(
                "event=reminder_restore module=scheduler status=ok restored={}",
                armed
            );
        } else {
            debug!("event=reminder_restore module=scheduler status=ok restored=0");
        }
        Ok(armed)
    }

    /// Number of armed timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.inner
            .timers
            .iter()
            .filter(|entry| !entry.value().handle.is_finished())
            .count()
    }

    pub fn is_pending(&self, id: AppointmentId) -> bool {
        self.inner
            .timers
            .get(&id)
            .map(|timer| !timer.handle.is_finished())
            .unwrap_or(false)
    }

    /// Aborts all live timers. Persisted reminders stay queued for `restore`.
    pub fn shutdown(&self) {
        let ids: Vec<AppointmentId> = self.inner.timers.iter().map(|entry| *entry.key()).collect();
        let mut aborted = 0usize;
        for id in ids {
            if let Some((_, timer)) = self.inner.timers.remove(&id) {
                timer.handle.abort();
                aborted += 1;
            }
        }
        info!(
            "event=reminder_shutdown module=scheduler status=ok aborted={}",
            aborted
        );
    }

    fn arm(&self, task: ReminderTask) {
        let id = task.appointment_id;
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let delay = (task.fire_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let inner = Arc::clone(&self.inner);
        // The entry keeps the shard locked until the timer is stored, so the
        // task's own cleanup cannot run ahead of the insert.
        let entry = self.inner.timers.entry(id);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(task).await;
            inner
                .timers
                .remove_if(&id, |_, timer| timer.generation == generation);
        });

        let timer = Timer { generation, handle };
        match entry {
            Entry::Occupied(mut occupied) => occupied.insert(timer).handle.abort(),
            Entry::Vacant(vacant) => {
                vacant.insert(timer);
            }
        }
    }
}

impl<R> SchedulerInner<R>
where
    R: AppointmentRepository + ReminderRepository,
{
    async fn fire(&self, task: ReminderTask) {
        let id = task.appointment_id;
        let appointment = match self.repo.get(id) {
            Ok(appointment) => appointment,
            Err(RepoError::NotFound(_)) => {
                warn!(
                    "event=reminder_fire module=scheduler status=skipped id={} reason=not_found",
                    id
                );
                self.forget(id);
                return;
            }
            Err(err) => {
                // Keep the queued row so a later restore can retry.
                error!(
                    "event=reminder_fire module=scheduler status=error id={} error={}",
                    id, err
                );
                return;
            }
        };

        if !appointment.is_scheduled() {
            info!(
                "event=reminder_fire module=scheduler status=skipped id={} reason=canceled",
                id
            );
            self.forget(id);
            return;
        }
        if let Ok(appointment_time) = appointment.scheduled_at() {
            if appointment_time <= Utc::now() {
                info!(
                    "event=reminder_fire module=scheduler status=skipped id={} reason=appointment_in_past",
                    id
                );
                self.forget(id);
                return;
            }
        }

        let body = reminder_message(
            &task.requester_name,
            &appointment.date,
            &appointment.time,
            id,
        );
        // Outcome is logged by the dispatcher; no retry.
        let delivered = self
            .dispatcher
            .dispatch(NotificationKind::Reminder, &task.recipient, &body)
            .await
            .is_ok();
        info!(
            "event=reminder_fire module=scheduler status=ok id={} recipient={} delivered={}",
            id,
            mask_recipient(&task.recipient),
            delivered
        );
        self.forget(id);
    }

    fn forget(&self, id: AppointmentId) {
        if let Err(err) = self.repo.delete_reminder(id) {
            warn!(
                "event=reminder_forget module=scheduler status=error id={} error={}",
                id, err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_reminder, ReminderPlan};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn plan_fires_one_hour_before_appointment() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap();
        let appointment = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(
            plan_reminder(appointment, now),
            ReminderPlan::At(appointment - Duration::hours(1))
        );
    }

    #[test]
    fn plan_fires_immediately_inside_lead_window() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        let appointment = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(plan_reminder(appointment, now), ReminderPlan::Immediately);
    }

    #[test]
    fn plan_fires_immediately_exactly_at_lead_boundary() {
        let appointment = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let now = appointment - Duration::hours(1);
        assert_eq!(plan_reminder(appointment, now), ReminderPlan::Immediately);
    }

    #[test]
    fn plan_skips_past_appointments() {
        let appointment = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(plan_reminder(appointment, appointment), ReminderPlan::Skip);
        assert_eq!(
            plan_reminder(appointment, appointment + Duration::minutes(5)),
            ReminderPlan::Skip
        );
    }
}
