//! In-memory record store.
//!
//! Same contract as the SQLite store, without durability. Intended for tests
//! and for embedding where persistence is handled elsewhere.

use crate::model::appointment::{Appointment, AppointmentId, AppointmentStatus};
use crate::model::reminder::ReminderTask;
use crate::repo::appointment_repo::{AppointmentRepository, RepoError, RepoResult};
use crate::repo::reminder_repo::ReminderRepository;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct MemoryState {
    /// Insertion sequence keeps `list` ordering stable across overwrites.
    appointments: HashMap<AppointmentId, (u64, Appointment)>,
    next_seq: u64,
    reminders: HashMap<AppointmentId, ReminderTask>,
}

/// `RwLock`-guarded appointment and reminder maps.
#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| RepoError::LockPoisoned)
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| RepoError::LockPoisoned)
    }
}

impl AppointmentRepository for InMemoryAppointmentRepository {
    fn put(&self, appointment: &Appointment) -> RepoResult<()> {
        appointment.validate()?;

        let mut state = self.write()?;
        let existing = state.appointments.get(&appointment.id).map(|(seq, _)| *seq);
        let seq = match existing {
            Some(seq) => seq,
            None => {
                state.next_seq += 1;
                state.next_seq
            }
        };
        state
            .appointments
            .insert(appointment.id, (seq, appointment.clone()));
        Ok(())
    }

    fn get(&self, id: AppointmentId) -> RepoResult<Appointment> {
        self.read()?
            .appointments
            .get(&id)
            .map(|(_, appointment)| appointment.clone())
            .ok_or(RepoError::NotFound(id))
    }

    fn list(&self) -> RepoResult<Vec<Appointment>> {
        let state = self.read()?;
        let mut entries: Vec<_> = state.appointments.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries
            .into_iter()
            .map(|(_, appointment)| appointment.clone())
            .collect())
    }

    fn update_status(
        &self,
        id: AppointmentId,
        new_status: AppointmentStatus,
    ) -> RepoResult<Appointment> {
        // The write guard spans check and write.
        let mut state = self.write()?;
        let (_, appointment) = state
            .appointments
            .get_mut(&id)
            .ok_or(RepoError::NotFound(id))?;

        if !appointment.status.can_transition_to(new_status) {
            return Err(RepoError::InvalidTransition {
                id,
                from: appointment.status,
                to: new_status,
            });
        }
        appointment.status = new_status;
        Ok(appointment.clone())
    }
}

impl ReminderRepository for InMemoryAppointmentRepository {
    fn save_reminder(&self, task: &ReminderTask) -> RepoResult<()> {
        let mut state = self.write()?;
        if !state.appointments.contains_key(&task.appointment_id) {
            return Err(RepoError::NotFound(task.appointment_id));
        }
        state.reminders.insert(task.appointment_id, task.clone());
        Ok(())
    }

    fn delete_reminder(&self, appointment_id: AppointmentId) -> RepoResult<bool> {
        Ok(self.write()?.reminders.remove(&appointment_id).is_some())
    }

    fn list_reminders(&self) -> RepoResult<Vec<ReminderTask>> {
        let state = self.read()?;
        let mut tasks: Vec<_> = state.reminders.values().cloned().collect();
        tasks.sort_by(|a, b| {
            a.fire_at
                .cmp(&b.fire_at)
                .then_with(|| a.appointment_id.cmp(&b.appointment_id))
        });
        Ok(tasks)
    }
}
