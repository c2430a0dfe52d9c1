//! Appointment database files.
//!
//! One SQLite file holds the `appointments` table and the `reminders` queue.
//! `create`/`cancel` CLI runs and a long-lived `run` process open it at the
//! same time, so every connection handed out here is set up for sharing
//! (WAL journal, busy timeout) and is migrated before it is returned.
//!
//! # Invariants
//! - Schema version lives in `PRAGMA user_version`.
//! - A file written by a newer binary is refused rather than downgraded.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failure to open or migrate the appointment database.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Folder meant to hold the database file could not be created.
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file's schema is ahead of every migration this binary knows.
    SchemaFromNewerBinary { found: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "appointment database error: {err}"),
            Self::CreateDir { path, source } => write!(
                f,
                "cannot create database folder `{}`: {source}",
                path.display()
            ),
            Self::SchemaFromNewerBinary { found, supported } => write!(
                f,
                "appointment database is at schema {found} but this build only knows up to {supported}; upgrade the binary"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::CreateDir { source, .. } => Some(source),
            Self::SchemaFromNewerBinary { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::DbError;
    use std::error::Error;
    use std::path::PathBuf;

    #[test]
    fn create_dir_error_names_the_folder_and_keeps_the_cause() {
        let err = DbError::CreateDir {
            path: PathBuf::from("/srv/appointments"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/srv/appointments"));
        assert!(err.source().is_some());
    }

    #[test]
    fn newer_schema_message_reports_both_versions() {
        let err = DbError::SchemaFromNewerBinary {
            found: 7,
            supported: 2,
        };
        let message = err.to_string();
        assert!(message.contains("schema 7"));
        assert!(message.contains("up to 2"));
        assert!(err.source().is_none());
    }
}
