//! SQLite storage bootstrap, schema migrations and transactional scopes.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the auction store.
//! - Apply schema migrations in deterministic order.
//! - Provide the unit-of-work scope every repository call runs inside.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Repositories must not read/write auction data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;
mod unit_of_work;

pub use open::{open_db, open_db_at, open_db_in_memory};
pub use unit_of_work::{run_in_unit_of_work, UnitOfWork};

/// Environment variable consulted by [`DbLocation::from_env`].
pub const DB_PATH_ENV: &str = "AUCTION_DB_PATH";

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// A registered migration failed; the schema stays at its prior version.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    /// Beginning, committing or rolling back a unit of work failed.
    UnitOfWork {
        action: &'static str,
        source: rusqlite::Error,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Migration { version, source } => {
                write!(f, "migration {version} failed: {source}")
            }
            Self::UnitOfWork { action, source } => {
                write!(f, "unit of work {action} failed: {source}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Migration { source, .. } | Self::UnitOfWork { source, .. } => Some(source),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Where the auction store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    /// SQLite database file; created on first open.
    File(PathBuf),
    /// Private in-memory database, discarded with its connection.
    Memory,
}

impl DbLocation {
    /// Resolves the location from `AUCTION_DB_PATH`.
    ///
    /// Unset or blank values fall back to [`DbLocation::Memory`].
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var_os(DB_PATH_ENV).map(PathBuf::from))
    }

    fn from_env_value(value: Option<PathBuf>) -> Self {
        match value {
            Some(path) if !path.as_os_str().is_empty() => Self::File(path),
            _ => Self::Memory,
        }
    }

    /// Short label used in log events.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DbLocation;
    use std::path::PathBuf;

    #[test]
    fn missing_or_blank_env_value_means_memory() {
        assert_eq!(DbLocation::from_env_value(None), DbLocation::Memory);
        assert_eq!(
            DbLocation::from_env_value(Some(PathBuf::new())),
            DbLocation::Memory
        );
    }

    #[test]
    fn env_value_selects_file() {
        let location = DbLocation::from_env_value(Some(PathBuf::from("/tmp/auctions.db")));
        assert_eq!(location, DbLocation::File(PathBuf::from("/tmp/auctions.db")));
        assert_eq!(location.mode(), "file");
    }
}
