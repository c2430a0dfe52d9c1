//! Dry-run channel that writes messages to the log instead of sending them.

use crate::notify::{mask_recipient, DeliveryError, Notifier};
use async_trait::async_trait;
use log::info;

/// Used when no messaging provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel_name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, recipient: &str, body: &str) -> Result<(), DeliveryError> {
        info!(
            "event=notify_dry_run module=notify status=ok recipient={} body_chars={}",
            mask_recipient(recipient),
            body.chars().count()
        );
        Ok(())
    }
}
