//! Twilio Messages API channel (WhatsApp or SMS).

use crate::notify::{DeliveryError, MessageChannel, Notifier};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::fmt::{Debug, Formatter};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
const MAX_ERROR_DETAIL_CHARS: usize = 200;

/// Account credentials and sender identity.
#[derive(Clone, PartialEq, Eq)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number, with or without the `whatsapp:` prefix.
    pub from_number: String,
    pub channel: MessageChannel,
}

impl Debug for TwilioConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .field("channel", &self.channel)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

pub struct TwilioNotifier {
    client: reqwest::Client,
    config: TwilioConfig,
    api_base: String,
}

impl TwilioNotifier {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            api_base: TWILIO_API_BASE.to_string(),
        }
    }

    /// Points the client at a different API host (staging, local stub).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base, self.config.account_sid
        )
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    fn channel_name(&self) -> &'static str {
        self.config.channel.as_str()
    }

    async fn send(&self, recipient: &str, body: &str) -> Result<(), DeliveryError> {
        let form = message_form(self.config.channel, &self.config.from_number, recipient, body);
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form[..])
            .send()
            .await
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                detail: detail.chars().take(MAX_ERROR_DETAIL_CHARS).collect(),
            });
        }

        // Accepted at this point; the body only feeds diagnostics.
        match response.json::<MessageResource>().await {
            Ok(resource) => debug!(
                "event=twilio_accept module=notify status=ok sid={} message_status={}",
                resource.sid,
                resource.status.as_deref().unwrap_or("unknown")
            ),
            Err(err) => debug!(
                "event=twilio_accept module=notify status=unparsed error={}",
                err
            ),
        }
        Ok(())
    }
}

/// Builds the `From`/`To`/`Body` form for one message.
pub(crate) fn message_form(
    channel: MessageChannel,
    from: &str,
    to: &str,
    body: &str,
) -> [(&'static str, String); 3] {
    [
        ("From", address(channel, from)),
        ("To", address(channel, to)),
        ("Body", body.to_string()),
    ]
}

fn address(channel: MessageChannel, number: &str) -> String {
    let bare = number.trim();
    let bare = bare.strip_prefix("whatsapp:").unwrap_or(bare);
    match channel {
        MessageChannel::WhatsApp => format!("whatsapp:{bare}"),
        MessageChannel::Sms => bare.to_string(),
    }
}
