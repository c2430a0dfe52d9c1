//! Message bodies sent to requesters.

use crate::model::appointment::{Appointment, AppointmentId};

pub fn confirmation_message(appointment: &Appointment) -> String {
    format!(
        "Hello {}, your appointment is confirmed for {} at {} for {}. Your Appointment ID is {}.",
        appointment.name, appointment.date, appointment.time, appointment.reason, appointment.id
    )
}

pub fn cancellation_message(appointment: &Appointment) -> String {
    format!(
        "Hello {}, your appointment with ID {} has been canceled.",
        appointment.name, appointment.id
    )
}

/// Reminder text; `date`/`time` come from the record reloaded at fire time.
pub fn reminder_message(name: &str, date: &str, time: &str, id: AppointmentId) -> String {
    format!(
        "Hello {name}, this is a reminder that your appointment is scheduled for {date} at {time}. Your Appointment ID is {id}."
    )
}
