//! Appointment lifecycle service.
//!
//! # Responsibility
//! - Implement create/get/list/cancel over the record store.
//! - Couple state changes with confirmation/cancellation messages.
//! - Hand reminder scheduling to background tasks.
//!
//! # Invariants
//! - A record mutation that committed is never reported as failed because a
//!   notification or reminder step failed afterwards.
//! - `create` returns after persistence and confirmation dispatch; it never
//!   waits for reminder scheduling.
//! - Status changes go through `update_status` only.

use crate::model::appointment::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentValidationError, NewAppointment,
};
use crate::notify::messages::{cancellation_message, confirmation_message};
use crate::notify::{DeliveryStats, NotificationDispatcher, NotificationKind};
use crate::repo::appointment_repo::{AppointmentRepository, RepoError, RepoResult};
use crate::repo::reminder_repo::ReminderRepository;
use crate::scheduler::ReminderScheduler;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;

pub const CREATED_MESSAGE: &str = "Appointment created successfully!";
pub const CANCELED_MESSAGE: &str = "Appointment canceled successfully.";

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Lifecycle operation error.
#[derive(Debug)]
pub enum ServiceError {
    /// Request fields failed validation.
    InvalidInput(AppointmentValidationError),
    /// No appointment with this id exists.
    NotFound(AppointmentId),
    /// Cancel requested on an appointment that is already canceled.
    AlreadyCanceled(AppointmentId),
    /// Backing store failure; the operation did not take effect.
    Storage(RepoError),
}

impl ServiceError {
    /// Whether the caller caused this error (as opposed to a server-side fault).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "appointment not found: {id}"),
            Self::AlreadyCanceled(id) => write!(f, "appointment is already canceled: {id}"),
            Self::Storage(err) => write!(f, "appointment storage failure: {err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::NotFound(_) | Self::AlreadyCanceled(_) => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::InvalidTransition { id, .. } => Self::AlreadyCanceled(id),
            RepoError::Validation(err) => Self::InvalidInput(err),
            other => Self::Storage(other),
        }
    }
}

/// Result of a successful `create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedAppointment {
    pub appointment: Appointment,
    pub message: String,
    /// Whether the confirmation message reached the channel.
    pub confirmation_sent: bool,
}

/// Result of a successful `cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanceledAppointment {
    pub appointment: Appointment,
    pub message: String,
    /// Whether the cancellation message reached the channel.
    pub cancellation_sent: bool,
}

/// Lifecycle manager over a record store, a notifier and the reminder scheduler.
pub struct AppointmentService<R> {
    repo: Arc<R>,
    dispatcher: NotificationDispatcher,
    scheduler: ReminderScheduler<R>,
    background: TaskTracker,
}

impl<R> AppointmentService<R>
where
    R: AppointmentRepository + ReminderRepository + 'static,
{
    /// Creates a service owning a scheduler over the same store.
    pub fn new(repo: Arc<R>, dispatcher: NotificationDispatcher) -> Self {
        let scheduler = ReminderScheduler::new(Arc::clone(&repo), dispatcher.clone());
        Self {
            repo,
            dispatcher,
            scheduler,
            background: TaskTracker::new(),
        }
    }

    /// Books a new appointment.
    ///
    /// # Contract
    /// - Persists a `scheduled` record with a fresh id.
    /// - Sends the confirmation message and reports whether it was delivered.
    /// - Schedules the reminder on a background task; an unparseable
    ///   date/time is logged there and does not fail this call.
    pub async fn create(&self, request: &NewAppointment) -> ServiceResult<CreatedAppointment> {
        let appointment = Appointment::new(request).map_err(ServiceError::InvalidInput)?;
        self.repo.put(&appointment).map_err(|err| {
            error!(
                "event=appointment_create module=service status=error id={} error={}",
                appointment.id, err
            );
            ServiceError::from(err)
        })?;
        info!(
            "event=appointment_create module=service status=ok id={}",
            appointment.id
        );

        let confirmation_sent = self
            .dispatcher
            .dispatch(
                NotificationKind::Confirmation,
                &appointment.phone,
                &confirmation_message(&appointment),
            )
            .await
            .is_ok();

        let scheduler = self.scheduler.clone();
        let pending = appointment.clone();
        self.background.spawn(async move {
            // Failures are logged by the scheduler.
            let _ = scheduler.schedule(&pending).await;
        });

        Ok(CreatedAppointment {
            appointment,
            message: CREATED_MESSAGE.to_string(),
            confirmation_sent,
        })
    }

    /// Gets one appointment by id, whatever its status.
    pub fn get(&self, id: AppointmentId) -> ServiceResult<Appointment> {
        Ok(self.repo.get(id)?)
    }

    /// Lists every appointment, canceled ones included.
    pub fn list(&self) -> ServiceResult<Vec<Appointment>> {
        Ok(self.repo.list()?)
    }

    /// Cancels a scheduled appointment.
    ///
    /// # Contract
    /// - `NotFound` for unknown ids, `AlreadyCanceled` on repeat calls; status
    ///   is left unchanged in both cases.
    /// - Stops the pending reminder, then sends the cancellation message.
    pub async fn cancel(&self, id: AppointmentId) -> ServiceResult<CanceledAppointment> {
        let appointment = self
            .repo
            .update_status(id, AppointmentStatus::Canceled)
            .map_err(|err| {
                if err.is_storage_failure() {
                    error!(
                        "event=appointment_cancel module=service status=error id={} error={}",
                        id, err
                    );
                } else {
                    info!(
                        "event=appointment_cancel module=service status=rejected id={} reason={}",
                        id, err
                    );
                }
                ServiceError::from(err)
            })?;
        info!(
            "event=appointment_cancel module=service status=ok id={}",
            id
        );

        self.scheduler.cancel(id);

        let cancellation_sent = self
            .dispatcher
            .dispatch(
                NotificationKind::Cancellation,
                &appointment.phone,
                &cancellation_message(&appointment),
            )
            .await
            .is_ok();

        Ok(CanceledAppointment {
            appointment,
            message: CANCELED_MESSAGE.to_string(),
            cancellation_sent,
        })
    }

    /// Arms queued reminders that have no live timer in this process.
    pub async fn restore_reminders(&self) -> RepoResult<usize> {
        self.scheduler.restore().await
    }

    /// Re-scans the reminder queue every `every` until `stop` resolves, then
    /// returns its output.
    ///
    /// Picks up reminders queued by other processes sharing the store. A
    /// failed scan is logged and retried on the next tick.
    pub async fn run_reminder_loop<F>(&self, every: Duration, stop: F) -> F::Output
    where
        F: Future,
    {
        let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                output = &mut stop => {
                    debug!("event=reminder_loop module=service status=stopped");
                    return output;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.scheduler.restore().await {
                        warn!(
                            "event=reminder_rescan module=service status=error error={}",
                            err
                        );
                    }
                }
            }
        }
    }

    /// Waits until reminder scheduling jobs spawned so far have finished.
    pub async fn flush_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    /// Finishes in-flight scheduling jobs, then stops all reminder timers.
    ///
    /// Persisted reminders stay queued for the next `restore_reminders`.
    pub async fn shutdown(&self) {
        self.flush_background().await;
        self.scheduler.shutdown();
    }

    pub fn scheduler(&self) -> &ReminderScheduler<R> {
        &self.scheduler
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        self.dispatcher.stats()
    }
}
