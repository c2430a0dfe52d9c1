//! Schema migrations for the appointment store.
//!
//! # Invariants
//! - `version` values are strictly increasing.
//! - The applied version is mirrored to `PRAGMA user_version`.
//! - All pending migrations commit in one transaction or not at all.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "appointments",
        sql: include_str!("0001_appointments.sql"),
    },
    Migration {
        version: 2,
        name: "reminders",
        sql: include_str!("0002_reminders.sql"),
    },
];

/// Returns the latest schema version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings `conn` up to [`latest_version`].
///
/// # Errors
/// - `SchemaFromNewerBinary` when the file was written by a newer binary.
/// - `Sqlite` when a migration statement fails; nothing is committed then.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = schema_version(conn)?;
    let latest = latest_version();

    if from_version > latest {
        return Err(DbError::SchemaFromNewerBinary {
            found: from_version,
            supported: latest,
        });
    }
    if from_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > from_version) {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        info!(
            "event=db_migrate module=db status=applied version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::MIGRATIONS;

    #[test]
    fn versions_are_strictly_increasing_from_one() {
        let mut expected = 1;
        for migration in MIGRATIONS {
            assert_eq!(migration.version, expected, "gap before {}", migration.name);
            expected += 1;
        }
    }
}
