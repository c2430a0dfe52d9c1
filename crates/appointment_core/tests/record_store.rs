use appointment_core::db::{open_db, open_db_in_memory};
use appointment_core::{
    Appointment, AppointmentId, AppointmentRepository, AppointmentStatus, InMemoryAppointmentRepository,
    NewAppointment, RepoError, ReminderRepository, ReminderTask, SqliteAppointmentRepository,
};
use chrono::{Duration, TimeZone, Utc};
use rusqlite::Connection;
use std::sync::Arc;
use std::thread;

fn appointment(name: &str) -> Appointment {
    Appointment::new(&NewAppointment {
        name: name.to_string(),
        phone: "+15550100".to_string(),
        date: "2030-01-15".to_string(),
        time: "14:30".to_string(),
        reason: "Checkup".to_string(),
    })
    .unwrap()
}

fn sqlite_repo() -> SqliteAppointmentRepository {
    SqliteAppointmentRepository::try_new(open_db_in_memory().unwrap()).unwrap()
}

fn assert_put_get_roundtrip(repo: &impl AppointmentRepository) {
    let stored = appointment("Ana");
    repo.put(&stored).unwrap();

    let loaded = repo.get(stored.id).unwrap();
    assert_eq!(loaded, stored);
    assert_eq!(loaded.status, AppointmentStatus::Scheduled);
}

fn assert_get_unknown_is_not_found(repo: &impl AppointmentRepository) {
    let id = AppointmentId::new_v4();
    assert!(matches!(repo.get(id), Err(RepoError::NotFound(missing)) if missing == id));
    assert!(matches!(
        repo.update_status(id, AppointmentStatus::Canceled),
        Err(RepoError::NotFound(_))
    ));
}

fn assert_put_overwrites_in_place(repo: &impl AppointmentRepository) {
    let first = appointment("First");
    let mut second = appointment("Second");
    repo.put(&first).unwrap();
    repo.put(&second).unwrap();

    second.reason = "Follow-up".to_string();
    repo.put(&second).unwrap();

    let listed = repo.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, first.id);
    assert_eq!(listed[1].id, second.id);
    assert_eq!(listed[1].reason, "Follow-up");
}

fn assert_update_status_enforces_transitions(repo: &impl AppointmentRepository) {
    let stored = appointment("Ana");
    repo.put(&stored).unwrap();

    let updated = repo
        .update_status(stored.id, AppointmentStatus::Canceled)
        .unwrap();
    assert_eq!(updated.status, AppointmentStatus::Canceled);
    assert_eq!(updated.name, stored.name);
    assert_eq!(updated.date, stored.date);

    let err = repo
        .update_status(stored.id, AppointmentStatus::Canceled)
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::InvalidTransition {
            from: AppointmentStatus::Canceled,
            to: AppointmentStatus::Canceled,
            ..
        }
    ));
    assert!(!err.is_storage_failure());

    let err = repo
        .update_status(stored.id, AppointmentStatus::Scheduled)
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidTransition { .. }));
    assert_eq!(repo.get(stored.id).unwrap().status, AppointmentStatus::Canceled);
}

fn assert_put_rejects_blank_name(repo: &impl AppointmentRepository) {
    let mut stored = appointment("Ana");
    stored.name = "  ".to_string();
    assert!(matches!(repo.put(&stored), Err(RepoError::Validation(_))));
    assert!(repo.list().unwrap().is_empty());
}

fn assert_reminder_queue_contract<R>(repo: &R)
where
    R: AppointmentRepository + ReminderRepository,
{
    let early = appointment("Early");
    let late = appointment("Late");
    repo.put(&early).unwrap();
    repo.put(&late).unwrap();

    let base = Utc.with_ymd_and_hms(2030, 1, 15, 13, 30, 0).unwrap();
    let late_task = ReminderTask {
        appointment_id: late.id,
        recipient: late.phone.clone(),
        requester_name: late.name.clone(),
        fire_at: base + Duration::hours(2),
    };
    let early_task = ReminderTask {
        appointment_id: early.id,
        recipient: early.phone.clone(),
        requester_name: early.name.clone(),
        fire_at: base,
    };
    repo.save_reminder(&late_task).unwrap();
    repo.save_reminder(&early_task).unwrap();
    assert_eq!(repo.list_reminders().unwrap(), vec![early_task.clone(), late_task]);

    let moved = ReminderTask {
        fire_at: base + Duration::hours(3),
        ..early_task
    };
    repo.save_reminder(&moved).unwrap();
    let queued = repo.list_reminders().unwrap();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[1], moved);

    assert!(repo.delete_reminder(early.id).unwrap());
    assert!(!repo.delete_reminder(early.id).unwrap());
    assert_eq!(repo.list_reminders().unwrap().len(), 1);

    let orphan = ReminderTask {
        appointment_id: AppointmentId::new_v4(),
        recipient: "+15550199".to_string(),
        requester_name: "Nobody".to_string(),
        fire_at: base,
    };
    assert!(matches!(
        repo.save_reminder(&orphan),
        Err(RepoError::NotFound(_))
    ));
}

#[test]
fn sqlite_store_contract() {
    assert_put_get_roundtrip(&sqlite_repo());
    assert_get_unknown_is_not_found(&sqlite_repo());
    assert_put_overwrites_in_place(&sqlite_repo());
    assert_update_status_enforces_transitions(&sqlite_repo());
    assert_put_rejects_blank_name(&sqlite_repo());
    assert_reminder_queue_contract(&sqlite_repo());
}

#[test]
fn memory_store_contract() {
    assert_put_get_roundtrip(&InMemoryAppointmentRepository::new());
    assert_get_unknown_is_not_found(&InMemoryAppointmentRepository::new());
    assert_put_overwrites_in_place(&InMemoryAppointmentRepository::new());
    assert_update_status_enforces_transitions(&InMemoryAppointmentRepository::new());
    assert_put_rejects_blank_name(&InMemoryAppointmentRepository::new());
    assert_reminder_queue_contract(&InMemoryAppointmentRepository::new());
}

#[test]
fn sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("appointments.db");
    let stored = appointment("Ana");

    {
        let repo = SqliteAppointmentRepository::try_new(open_db(&path).unwrap()).unwrap();
        repo.put(&stored).unwrap();
        repo.update_status(stored.id, AppointmentStatus::Canceled)
            .unwrap();
    }

    let repo = SqliteAppointmentRepository::try_new(open_db(&path).unwrap()).unwrap();
    let loaded = repo.get(stored.id).unwrap();
    assert_eq!(loaded.status, AppointmentStatus::Canceled);
    assert_eq!(loaded.phone, stored.phone);
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteAppointmentRepository::try_new(conn)
        .err()
        .expect("unmigrated connection must be rejected");
    assert!(matches!(
        err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
    assert!(err.is_storage_failure());
}

fn assert_single_winner<R>(repo: Arc<R>)
where
    R: AppointmentRepository + 'static,
{
    let stored = appointment("Ana");
    repo.put(&stored).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || repo.update_status(stored.id, AppointmentStatus::Canceled))
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results.iter().all(|result| match result {
        Ok(_) => true,
        Err(err) => matches!(err, RepoError::InvalidTransition { .. }),
    }));
}

#[test]
fn concurrent_status_updates_have_single_winner() {
    assert_single_winner(Arc::new(sqlite_repo()));
    assert_single_winner(Arc::new(InMemoryAppointmentRepository::new()));
}

#[test]
fn separate_connections_to_one_file_have_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let stored = appointment("Ana");
    SqliteAppointmentRepository::try_new(open_db(&path).unwrap())
        .unwrap()
        .put(&stored)
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let repo = SqliteAppointmentRepository::try_new(open_db(&path).unwrap()).unwrap();
                repo.update_status(stored.id, AppointmentStatus::Canceled)
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(winners, 1);
}
