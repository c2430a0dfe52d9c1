//! Appointment record store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide get/list/put/update-status over canonical `appointments` storage.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `Appointment::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - `update_status` is one atomic read-modify-write per appointment id.

use crate::db::migrations::{latest_version, schema_version};
use crate::db::DbError;
use crate::model::appointment::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentValidationError,
};
use crate::model::reminder::ReminderTask;
use crate::repo::reminder_repo::ReminderRepository;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const APPOINTMENT_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    phone,
    date,
    time,
    reason,
    status
FROM appointments";

pub type RepoResult<T> = Result<T, RepoError>;

/// Record store error.
#[derive(Debug)]
pub enum RepoError {
    Validation(AppointmentValidationError),
    Db(DbError),
    NotFound(AppointmentId),
    /// Requested status change is not allowed from the current status.
    InvalidTransition {
        id: AppointmentId,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    InvalidData(String),
    /// Connection has not been migrated to the schema this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// A writer panicked while holding the store lock.
    LockPoisoned,
}

impl RepoError {
    /// Whether this error means the backing store itself is unusable,
    /// as opposed to a rejected request.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Db(_)
                | Self::InvalidData(_)
                | Self::UninitializedConnection { .. }
                | Self::LockPoisoned
        )
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "appointment not found: {id}"),
            Self::InvalidTransition { id, from, to } => {
                write!(f, "appointment {id} cannot move from {from} to {to}")
            }
            Self::InvalidData(message) => {
                write!(f, "invalid persisted appointment data: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::LockPoisoned => write!(f, "appointment store lock poisoned"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AppointmentValidationError> for RepoError {
    fn from(value: AppointmentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable mapping from appointment id to appointment record.
pub trait AppointmentRepository: Send + Sync {
    /// Inserts or overwrites the record at `appointment.id`.
    fn put(&self, appointment: &Appointment) -> RepoResult<()>;
    /// Fails with `NotFound` when `id` is absent.
    fn get(&self, id: AppointmentId) -> RepoResult<Appointment>;
    /// Returns every record regardless of status, in a stable order.
    fn list(&self) -> RepoResult<Vec<Appointment>>;
    /// Atomically moves `id` to `new_status` and returns the updated record.
    ///
    /// Fails with `NotFound` or `InvalidTransition`; no writer can interleave
    /// between the status check and the write for the same `id`.
    fn update_status(
        &self,
        id: AppointmentId,
        new_status: AppointmentStatus,
    ) -> RepoResult<Appointment>;
}

/// SQLite-backed appointment store.
///
/// Owns its connection behind a mutex so one instance can be shared across
/// request tasks and reminder timers.
pub struct SqliteAppointmentRepository {
    conn: Mutex<Connection>,
}

impl SqliteAppointmentRepository {
    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        let actual_version = schema_version(&conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RepoError::LockPoisoned)
    }
}

impl AppointmentRepository for SqliteAppointmentRepository {
    fn put(&self, appointment: &Appointment) -> RepoResult<()> {
        appointment.validate()?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO appointments (uuid, name, phone, date, time, reason, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (uuid) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                date = excluded.date,
                time = excluded.time,
                reason = excluded.reason,
                status = excluded.status,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                appointment.id.to_string(),
                appointment.name.as_str(),
                appointment.phone.as_str(),
                appointment.date.as_str(),
                appointment.time.as_str(),
                appointment.reason.as_str(),
                appointment.status.as_str(),
            ],
        )?;

        Ok(())
    }

    fn get(&self, id: AppointmentId) -> RepoResult<Appointment> {
        let conn = self.lock()?;
        select_appointment(&conn, id)?.ok_or(RepoError::NotFound(id))
    }

    fn list(&self) -> RepoResult<Vec<Appointment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{APPOINTMENT_SELECT_SQL} ORDER BY created_at ASC, rowid ASC"
        ))?;
        let mut rows = stmt.query([])?;
        let mut appointments = Vec::new();

        while let Some(row) = rows.next()? {
            appointments.push(parse_appointment_row(row)?);
        }

        Ok(appointments)
    }

    fn update_status(
        &self,
        id: AppointmentId,
        new_status: AppointmentStatus,
    ) -> RepoResult<Appointment> {
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front, so another process sharing
        // the file cannot slip a write between the read and the update.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = select_appointment(&tx, id)?.ok_or(RepoError::NotFound(id))?;
        if !current.status.can_transition_to(new_status) {
            return Err(RepoError::InvalidTransition {
                id,
                from: current.status,
                to: new_status,
            });
        }

        let changed = tx.execute(
            "UPDATE appointments
             SET
                status = ?1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2 AND status = ?3;",
            params![
                new_status.as_str(),
                id.to_string(),
                current.status.as_str()
            ],
        )?;
        if changed != 1 {
            return Err(RepoError::InvalidData(format!(
                "status of appointment {id} changed during update"
            )));
        }
        tx.commit()?;

        Ok(Appointment {
            status: new_status,
            ..current
        })
    }
}

impl ReminderRepository for SqliteAppointmentRepository {
    fn save_reminder(&self, task: &ReminderTask) -> RepoResult<()> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO reminders (appointment_id, recipient, requester_name, fire_at)
             SELECT ?1, ?2, ?3, ?4
             WHERE EXISTS (SELECT 1 FROM appointments WHERE uuid = ?1)
             ON CONFLICT (appointment_id) DO UPDATE SET
                recipient = excluded.recipient,
                requester_name = excluded.requester_name,
                fire_at = excluded.fire_at;",
            params![
                task.appointment_id.to_string(),
                task.recipient.as_str(),
                task.requester_name.as_str(),
                task.fire_at.timestamp_millis(),
            ],
        )?;
        if inserted == 0 {
            return Err(RepoError::NotFound(task.appointment_id));
        }
        Ok(())
    }

    fn delete_reminder(&self, appointment_id: AppointmentId) -> RepoResult<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM reminders WHERE appointment_id = ?1;",
            [appointment_id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    fn list_reminders(&self) -> RepoResult<Vec<ReminderTask>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT appointment_id, recipient, requester_name, fire_at
             FROM reminders
             ORDER BY fire_at ASC, appointment_id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut tasks = Vec::new();

        while let Some(row) = rows.next()? {
            tasks.push(parse_reminder_row(row)?);
        }

        Ok(tasks)
    }
}

fn select_appointment(conn: &Connection, id: AppointmentId) -> RepoResult<Option<Appointment>> {
    let mut stmt = conn.prepare(&format!("{APPOINTMENT_SELECT_SQL} WHERE uuid = ?1;"))?;
    let row = stmt
        .query_row([id.to_string()], |row| Ok(parse_appointment_row(row)))
        .optional()?;
    row.transpose()
}

fn parse_appointment_row(row: &Row<'_>) -> RepoResult<Appointment> {
    let id = parse_uuid_column(row, "uuid", "appointments.uuid")?;

    let status_text: String = row.get("status")?;
    let status = AppointmentStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in appointments.status"
        ))
    })?;

    let appointment = Appointment {
        id,
        name: row.get("name")?,
        phone: row.get("phone")?,
        date: row.get("date")?,
        time: row.get("time")?,
        reason: row.get("reason")?,
        status,
    };
    appointment.validate()?;
    Ok(appointment)
}

fn parse_reminder_row(row: &Row<'_>) -> RepoResult<ReminderTask> {
    let appointment_id = parse_uuid_column(row, "appointment_id", "reminders.appointment_id")?;
    let fire_at_ms: i64 = row.get("fire_at")?;
    let fire_at = DateTime::<Utc>::from_timestamp_millis(fire_at_ms).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid timestamp `{fire_at_ms}` in reminders.fire_at"))
    })?;

    Ok(ReminderTask {
        appointment_id,
        recipient: row.get("recipient")?,
        requester_name: row.get("requester_name")?,
        fire_at,
    })
}

fn parse_uuid_column(row: &Row<'_>, column: &str, label: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{text}` in {label}")))
}
