//! Runtime configuration from environment variables.
//!
//! # Invariants
//! - Twilio credentials are all-or-nothing; a partial set is an error rather
//!   than a silent fall back to the dry-run channel.
//! - Notification timeout and reminder rescan interval are strictly positive.

use crate::logging::default_log_level;
use crate::notify::{MessageChannel, TwilioConfig};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "APPOINTMENT_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "APPOINTMENT_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "APPOINTMENT_LOG_DIR";
pub const ENV_NOTIFY_TIMEOUT_SECS: &str = "APPOINTMENT_NOTIFY_TIMEOUT_SECS";
pub const ENV_REMINDER_RESCAN_SECS: &str = "APPOINTMENT_REMINDER_RESCAN_SECS";
pub const ENV_TWILIO_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";
pub const ENV_TWILIO_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";
pub const ENV_TWILIO_FROM_NUMBER: &str = "TWILIO_WHATSAPP_NUMBER";
pub const ENV_TWILIO_CHANNEL: &str = "TWILIO_CHANNEL";

const DEFAULT_DB_PATH: &str = "appointments.sqlite3";
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REMINDER_RESCAN_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable required by the current configuration is unset.
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing required environment variable `{key}`"),
            Self::Invalid { key, value } => {
                write!(f, "invalid value `{value}` for environment variable `{key}`")
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub log_level: String,
    /// Rolling log file directory; `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
    pub notify_timeout: Duration,
    /// How often `run` re-reads the reminder queue for rows written by
    /// other processes.
    pub reminder_rescan: Duration,
    /// `None` selects the dry-run log channel.
    pub twilio: Option<TwilioConfig>,
}

impl AppConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_path = get(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        let log_level = get(ENV_LOG_LEVEL).unwrap_or_else(|| default_log_level().to_string());
        let log_dir = get(ENV_LOG_DIR).map(PathBuf::from);

        let notify_timeout = positive_secs(
            get(ENV_NOTIFY_TIMEOUT_SECS),
            ENV_NOTIFY_TIMEOUT_SECS,
            DEFAULT_NOTIFY_TIMEOUT_SECS,
        )?;
        let reminder_rescan = positive_secs(
            get(ENV_REMINDER_RESCAN_SECS),
            ENV_REMINDER_RESCAN_SECS,
            DEFAULT_REMINDER_RESCAN_SECS,
        )?;

        let twilio = twilio_from(&get)?;

        Ok(Self {
            database_path,
            log_level,
            log_dir,
            notify_timeout,
            reminder_rescan,
            twilio,
        })
    }
}

fn positive_secs(
    value: Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => match value.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::Invalid { key, value }),
        },
        None => Ok(Duration::from_secs(default)),
    }
}

fn twilio_from(get: &impl Fn(&str) -> Option<String>) -> Result<Option<TwilioConfig>, ConfigError> {
    let sid = get(ENV_TWILIO_ACCOUNT_SID);
    let token = get(ENV_TWILIO_AUTH_TOKEN);
    let from = get(ENV_TWILIO_FROM_NUMBER);

    let (account_sid, auth_token, from_number) = match (sid, token, from) {
        (None, None, None) => return Ok(None),
        (Some(sid), Some(token), Some(from)) => (sid, token, from),
        (sid, token, _) => {
            let missing = if sid.is_none() {
                ENV_TWILIO_ACCOUNT_SID
            } else if token.is_none() {
                ENV_TWILIO_AUTH_TOKEN
            } else {
                ENV_TWILIO_FROM_NUMBER
            };
            return Err(ConfigError::Missing(missing));
        }
    };

    let channel = match get(ENV_TWILIO_CHANNEL) {
        Some(value) => MessageChannel::parse(&value).ok_or(ConfigError::Invalid {
            key: ENV_TWILIO_CHANNEL,
            value,
        })?,
        None => MessageChannel::WhatsApp,
    };

    Ok(Some(TwilioConfig {
        account_sid,
        auth_token,
        from_number,
        channel,
    }))
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ConfigError, ENV_TWILIO_AUTH_TOKEN};
    use crate::notify::MessageChannel;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_select_dry_run_channel() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_path, PathBuf::from("appointments.sqlite3"));
        assert_eq!(config.notify_timeout, Duration::from_secs(10));
        assert_eq!(config.reminder_rescan, Duration::from_secs(30));
        assert!(config.log_dir.is_none());
        assert!(config.twilio.is_none());
    }

    #[test]
    fn full_twilio_set_is_accepted() {
        let config = config_from(&[
            ("TWILIO_ACCOUNT_SID", "AC1"),
            ("TWILIO_AUTH_TOKEN", "token"),
            ("TWILIO_WHATSAPP_NUMBER", "whatsapp:+14155238886"),
            ("TWILIO_CHANNEL", "sms"),
            ("APPOINTMENT_NOTIFY_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        let twilio = config.twilio.unwrap();
        assert_eq!(twilio.account_sid, "AC1");
        assert_eq!(twilio.channel, MessageChannel::Sms);
        assert_eq!(config.notify_timeout, Duration::from_secs(3));
    }

    #[test]
    fn partial_twilio_set_is_rejected() {
        let err = config_from(&[
            ("TWILIO_ACCOUNT_SID", "AC1"),
            ("TWILIO_WHATSAPP_NUMBER", "+14155238886"),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_TWILIO_AUTH_TOKEN));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = config_from(&[("APPOINTMENT_NOTIFY_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rescan_interval_is_read_and_checked() {
        let config = config_from(&[("APPOINTMENT_REMINDER_RESCAN_SECS", "5")]).unwrap();
        assert_eq!(config.reminder_rescan, Duration::from_secs(5));

        let err = config_from(&[("APPOINTMENT_REMINDER_RESCAN_SECS", "soon")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "APPOINTMENT_REMINDER_RESCAN_SECS",
                value: "soon".to_string(),
            }
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[("APPOINTMENT_DB_PATH", "  ")]).unwrap();
        assert_eq!(config.database_path, PathBuf::from("appointments.sqlite3"));
    }
}
