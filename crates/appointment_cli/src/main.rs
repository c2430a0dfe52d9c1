//! `appointment` command-line front end.
//!
//! # Responsibility
//! - Wire configuration, logging, storage and the notifier into an
//!   `AppointmentService`.
//! - Render results as JSON on stdout and errors on stderr.
//!
//! # Exit codes
//! - `0` success, `1` caller error (bad arguments, unknown id, repeat cancel),
//!   `2` configuration, storage or runtime failure.

mod args;

use appointment_core::{
    init_logging, init_stderr_logging, open_db, AppConfig, AppointmentId, AppointmentService,
    ConfigError, DbError, LogNotifier, LoggingError, NotificationDispatcher, Notifier, RepoError,
    ServiceError, SqliteAppointmentRepository, TwilioNotifier,
};
use args::{parse_args, ArgsError, Command, USAGE};
use log::{info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

type Service = AppointmentService<SqliteAppointmentRepository>;

#[derive(Debug)]
enum CliError {
    Args(ArgsError),
    InvalidId(String),
    Config(ConfigError),
    Logging(LoggingError),
    Db(DbError),
    Repo(RepoError),
    Service(ServiceError),
    Output(serde_json::Error),
    Signal(std::io::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Args(_) | Self::InvalidId(_) => 1,
            Self::Service(err) if err.is_client_error() => 1,
            _ => 2,
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Args(err) => write!(f, "{err}\n\n{USAGE}"),
            Self::InvalidId(raw) => write!(f, "appointment not found: `{raw}` is not a valid id"),
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Logging(err) => write!(f, "logging setup failed: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Service(err) => write!(f, "{err}"),
            Self::Output(err) => write!(f, "failed to render output: {err}"),
            Self::Signal(err) => write!(f, "failed to wait for shutdown signal: {err}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Args(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Service(err) => Some(err),
            Self::Output(err) => Some(err),
            Self::Signal(err) => Some(err),
            Self::InvalidId(_) => None,
        }
    }
}

impl From<ArgsError> for CliError {
    fn from(value: ArgsError) -> Self {
        Self::Args(value)
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for CliError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ServiceError> for CliError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Output(value)
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match run(&args).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    };

    log::logger().flush();
    std::process::exit(code);
}

async fn run(args: &[String]) -> Result<(), CliError> {
    let command = parse_args(args)?;
    match command {
        Command::Version => {
            println!("appointment {}", appointment_core::core_version());
            return Ok(());
        }
        Command::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        _ => {}
    }

    let config = AppConfig::from_env()?;
    match &config.log_dir {
        Some(dir) => init_logging(&config.log_level, Some(dir.as_path()))?,
        None => init_stderr_logging(&config.log_level)?,
    }

    let service = build_service(&config)?;
    let result = execute(&service, &config, command).await;
    // Lets queued scheduling jobs persist their reminders before exit.
    service.shutdown().await;
    result
}

fn build_service(config: &AppConfig) -> Result<Service, CliError> {
    let conn = open_db(&config.database_path)?;
    let repo = Arc::new(SqliteAppointmentRepository::try_new(conn)?);

    let notifier: Arc<dyn Notifier> = match &config.twilio {
        Some(twilio) => Arc::new(TwilioNotifier::new(twilio.clone())),
        None => {
            warn!("event=notifier_select module=cli status=ok channel=log reason=twilio_not_configured");
            Arc::new(LogNotifier)
        }
    };
    info!(
        "event=service_start module=cli status=ok db_path={} channel={}",
        config.database_path.display(),
        notifier.channel_name()
    );

    let dispatcher = NotificationDispatcher::new(notifier, config.notify_timeout);
    Ok(AppointmentService::new(repo, dispatcher))
}

async fn execute(
    service: &Service,
    config: &AppConfig,
    command: Command,
) -> Result<(), CliError> {
    match command {
        Command::Create(request) => print_json(&service.create(&request).await?),
        Command::List => print_json(&service.list()?),
        Command::Get(raw) => print_json(&service.get(parse_id(&raw)?)?),
        Command::Cancel(raw) => print_json(&service.cancel(parse_id(&raw)?).await?),
        Command::Run => run_until_signal(service, config.reminder_rescan).await,
        Command::Version | Command::Help => Ok(()),
    }
}

async fn run_until_signal(service: &Service, rescan: Duration) -> Result<(), CliError> {
    let restored = service.restore_reminders().await?;
    print_json(&serde_json::json!({ "restored_reminders": restored }))?;
    info!(
        "event=run_wait module=cli status=ok restored={} rescan_secs={}",
        restored,
        rescan.as_secs()
    );

    // Rows queued by other processes (`create` runs) are armed on the next tick.
    service
        .run_reminder_loop(rescan, tokio::signal::ctrl_c())
        .await
        .map_err(CliError::Signal)?;

    let stats = service.delivery_stats();
    info!(
        "event=run_stop module=cli status=ok delivered={} failed={}",
        stats.delivered, stats.failed
    );
    Ok(())
}

fn parse_id(raw: &str) -> Result<AppointmentId, CliError> {
    AppointmentId::parse_str(raw.trim()).map_err(|_| CliError::InvalidId(raw.to_string()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
