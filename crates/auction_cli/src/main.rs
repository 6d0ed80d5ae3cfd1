//! CLI probe for the auction store.
//!
//! Usage: `auction_cli [DB_PATH]`. Without an argument the location comes
//! from `AUCTION_DB_PATH`, falling back to an in-memory database. File
//! logging starts when `AUCTION_LOG_DIR` names an absolute directory.

use auction_core::db::open_db_at;
use auction_core::{
    core_version, init_logging, AuctionRepository, DbLocation, LoggingConfig,
    SqliteAuctionRepository, SqliteUserRepository, UserRepository,
};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(err) = LoggingConfig::from_env().and_then(|config| start_logging(config.as_ref())) {
        eprintln!("auction_cli: {err}");
        return ExitCode::FAILURE;
    }

    let location = match std::env::args_os().nth(1) {
        Some(path) => DbLocation::File(PathBuf::from(path)),
        None => DbLocation::from_env(),
    };

    match summarize(&location) {
        Ok(summary) => {
            println!("auction_core version={}", core_version());
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("auction_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Starts file logging when configured. Returns whether it is active.
fn start_logging(config: Option<&LoggingConfig>) -> Result<bool, String> {
    match config {
        Some(config) => init_logging(config).map(|()| true),
        None => Ok(false),
    }
}

fn summarize(location: &DbLocation) -> Result<String, Box<dyn std::error::Error>> {
    let conn = open_db_at(location)?;
    let users = SqliteUserRepository::try_new(&conn)?.all()?;
    let open_auctions = SqliteAuctionRepository::try_new(&conn)?.count_open()?;
    Ok(format!(
        "mode={} users={} auctions_open={}",
        location.mode(),
        users.len(),
        open_auctions
    ))
}

#[cfg(test)]
mod tests {
    use super::{start_logging, summarize};
    use auction_core::{logging_status, DbLocation, LoggingConfig};

    #[test]
    fn logging_stays_off_without_config() {
        assert!(!start_logging(None).unwrap());
    }

    #[test]
    fn configured_logging_is_active_before_the_store_opens() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig::with_default_level(dir.path()).unwrap();

        assert!(start_logging(Some(&config)).unwrap());
        assert_eq!(logging_status(), Some(config));

        let summary = summarize(&DbLocation::Memory).unwrap();
        assert_eq!(summary, "mode=memory users=0 auctions_open=0");
    }
}
