//! Out-of-band notification delivery.
//!
//! # Responsibility
//! - Define the `Notifier` capability used by lifecycle operations.
//! - Bound delivery latency and record every outcome in logs.
//!
//! # Invariants
//! - Delivery failures are reported to callers as values, never as faults of
//!   the lifecycle operation that triggered them.
//! - Recipient numbers are masked before they reach logs.

pub mod log_notifier;
pub mod messages;
pub mod twilio;

use async_trait::async_trait;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use log_notifier::LogNotifier;
pub use twilio::{TwilioConfig, TwilioNotifier};

/// Delivery channel used to address a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageChannel {
    WhatsApp,
    Sms,
}

impl MessageChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Sms => "sms",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "whatsapp" => Some(Self::WhatsApp),
            "sms" => Some(Self::Sms),
            _ => None,
        }
    }
}

/// Why a message could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The channel answered but refused the message.
    Rejected { status: u16, detail: String },
    /// The channel could not be reached.
    Transport(String),
    /// No answer within the dispatcher timeout.
    Timeout(Duration),
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { status, detail } => {
                write!(f, "message rejected with status {status}: {detail}")
            }
            Self::Transport(message) => write!(f, "message transport failed: {message}"),
            Self::Timeout(timeout) => {
                write!(f, "message delivery timed out after {}ms", timeout.as_millis())
            }
        }
    }
}

impl Error for DeliveryError {}

/// Capability that delivers a text message to a phone-number-shaped recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel label used in logs.
    fn channel_name(&self) -> &'static str;

    async fn send(&self, recipient: &str, body: &str) -> Result<(), DeliveryError>;
}

/// What a message is about; used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Confirmation,
    Cancellation,
    Reminder,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::Cancellation => "cancellation",
            Self::Reminder => "reminder",
        }
    }
}

/// Delivery counters since dispatcher creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub failed: u64,
}

#[derive(Default)]
struct DeliveryCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Timeout-bounded, logging front for a `Notifier`.
///
/// Cheap to clone; clones share the notifier and counters.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    counters: Arc<DeliveryCounters>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            notifier,
            timeout,
            counters: Arc::new(DeliveryCounters::default()),
        }
    }

    /// Sends one message and reports the outcome.
    ///
    /// A slow channel is cut off after the configured timeout.
    pub async fn dispatch(
        &self,
        kind: NotificationKind,
        recipient: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let started_at = Instant::now();
        let outcome =
            match tokio::time::timeout(self.timeout, self.notifier.send(recipient, body)).await {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(self.timeout)),
            };

        match &outcome {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                info!(
                    "event=notify module=notify status=ok kind={} channel={} recipient={} duration_ms={}",
                    kind.as_str(),
                    self.notifier.channel_name(),
                    mask_recipient(recipient),
                    started_at.elapsed().as_millis()
                );
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "event=notify module=notify status=error kind={} channel={} recipient={} duration_ms={} error={}",
                    kind.as_str(),
                    self.notifier.channel_name(),
                    mask_recipient(recipient),
                    started_at.elapsed().as_millis(),
                    err
                );
            }
        }

        outcome
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

/// Keeps a leading `+` and the last four characters, masks the rest.
pub fn mask_recipient(recipient: &str) -> String {
    let chars: Vec<char> = recipient.trim().chars().collect();
    let keep_from = chars.len().saturating_sub(4);
    chars
        .iter()
        .enumerate()
        .map(|(index, ch)| {
            if index >= keep_from || (index == 0 && *ch == '+') {
                *ch
            } else {
                '*'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        mask_recipient, DeliveryError, MessageChannel, NotificationDispatcher, NotificationKind,
        Notifier,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct StalledNotifier;

    #[async_trait]
    impl Notifier for StalledNotifier {
        fn channel_name(&self) -> &'static str {
            "stalled"
        }

        async fn send(&self, _recipient: &str, _body: &str) -> Result<(), DeliveryError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[test]
    fn mask_recipient_keeps_prefix_and_suffix() {
        assert_eq!(mask_recipient("+15551234567"), "+*******4567");
        assert_eq!(mask_recipient("123"), "123");
    }

    #[test]
    fn channel_parse_is_case_insensitive() {
        assert_eq!(MessageChannel::parse(" WhatsApp "), Some(MessageChannel::WhatsApp));
        assert_eq!(MessageChannel::parse("sms"), Some(MessageChannel::Sms));
        assert_eq!(MessageChannel::parse("pager"), None);
    }

    #[tokio::test]
    async fn dispatch_times_out_slow_channel() {
        let dispatcher =
            NotificationDispatcher::new(Arc::new(StalledNotifier), Duration::from_millis(20));

        let err = dispatcher
            .dispatch(NotificationKind::Reminder, "+15551234567", "hi")
            .await
            .unwrap_err();

        assert_eq!(err, DeliveryError::Timeout(Duration::from_millis(20)));
        assert_eq!(dispatcher.stats().failed, 1);
        assert_eq!(dispatcher.stats().delivered, 0);
    }
}
