#![allow(dead_code)]

use appointment_core::{
    Appointment, AppointmentId, AppointmentRepository, AppointmentService, AppointmentStatus,
    DeliveryError, InMemoryAppointmentRepository, NewAppointment, NotificationDispatcher,
    Notifier, ReminderRepository, ReminderTask, RepoError, RepoResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

pub const TEST_TIMEOUT: StdDuration = StdDuration::from_secs(2);

/// One message captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub body: String,
}

/// Accepts every message and keeps a copy.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn bodies_containing(&self, needle: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|message| message.body)
            .filter(|body| body.contains(needle))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel_name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, recipient: &str, body: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(SentMessage {
            recipient: recipient.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Rejects every message.
#[derive(Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn channel_name(&self) -> &'static str {
        "failing"
    }

    async fn send(&self, _recipient: &str, _body: &str) -> Result<(), DeliveryError> {
        Err(DeliveryError::Rejected {
            status: 400,
            detail: "invalid destination".to_string(),
        })
    }
}

/// Store whose every call fails as if the database were unusable.
#[derive(Default)]
pub struct BrokenStore;

impl AppointmentRepository for BrokenStore {
    fn put(&self, _appointment: &Appointment) -> RepoResult<()> {
        Err(RepoError::LockPoisoned)
    }

    fn get(&self, _id: AppointmentId) -> RepoResult<Appointment> {
        Err(RepoError::LockPoisoned)
    }

    fn list(&self) -> RepoResult<Vec<Appointment>> {
        Err(RepoError::InvalidData("status column holds `pending`".to_string()))
    }

    fn update_status(
        &self,
        _id: AppointmentId,
        _new_status: AppointmentStatus,
    ) -> RepoResult<Appointment> {
        Err(RepoError::LockPoisoned)
    }
}

impl ReminderRepository for BrokenStore {
    fn save_reminder(&self, _task: &ReminderTask) -> RepoResult<()> {
        Err(RepoError::LockPoisoned)
    }

    fn delete_reminder(&self, _appointment_id: AppointmentId) -> RepoResult<bool> {
        Err(RepoError::LockPoisoned)
    }

    fn list_reminders(&self) -> RepoResult<Vec<ReminderTask>> {
        Err(RepoError::LockPoisoned)
    }
}

pub fn dispatcher(notifier: Arc<dyn Notifier>) -> NotificationDispatcher {
    NotificationDispatcher::new(notifier, TEST_TIMEOUT)
}

pub fn memory_service(
    notifier: Arc<dyn Notifier>,
) -> (
    Arc<InMemoryAppointmentRepository>,
    AppointmentService<InMemoryAppointmentRepository>,
) {
    let repo = Arc::new(InMemoryAppointmentRepository::new());
    let service = AppointmentService::new(Arc::clone(&repo), dispatcher(notifier));
    (repo, service)
}

pub fn request(name: &str, date: &str, time: &str) -> NewAppointment {
    NewAppointment {
        name: name.to_string(),
        phone: "+15550100".to_string(),
        date: date.to_string(),
        time: time.to_string(),
        reason: "Checkup".to_string(),
    }
}

/// Request for an appointment `offset` away from now, at minute precision.
pub fn request_in(name: &str, offset: Duration) -> NewAppointment {
    let at: DateTime<Utc> = Utc::now() + offset;
    request(
        name,
        &at.format("%Y-%m-%d").to_string(),
        &at.format("%H:%M").to_string(),
    )
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    condition()
}
