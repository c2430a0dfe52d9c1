//! Core appointment lifecycle logic.
//! Record store, notifications and reminder scheduling live here; front ends
//! only parse input and render results.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod scheduler;
pub mod service;

pub use config::{AppConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{
    default_log_level, init_logging, init_stderr_logging, logging_status, LoggingError,
};
pub use model::appointment::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentValidationError, NewAppointment,
};
pub use model::reminder::ReminderTask;
pub use notify::{
    DeliveryError, DeliveryStats, LogNotifier, MessageChannel, NotificationDispatcher,
    Notifier, TwilioConfig, TwilioNotifier,
};
pub use repo::appointment_repo::{
    AppointmentRepository, RepoError, RepoResult, SqliteAppointmentRepository,
};
pub use repo::memory_repo::InMemoryAppointmentRepository;
pub use repo::reminder_repo::ReminderRepository;
pub use scheduler::{plan_reminder, ReminderPlan, ReminderScheduler, ScheduleError};
pub use service::appointment_service::{
    AppointmentService, CanceledAppointment, CreatedAppointment, ServiceError, ServiceResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
