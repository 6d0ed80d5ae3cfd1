//! Persistence layer for the auction domain.
//!
//! Users, auctions and bids are stored in SQLite and accessed through
//! repositories that run inside an explicit [`UnitOfWork`].

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use db::{run_in_unit_of_work, DbError, DbLocation, UnitOfWork};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LOG_DIR_ENV};
pub use model::auction::{
    Auction, AuctionBuilder, AuctionId, AuctionValidationError, Bid, BidId,
};
pub use model::user::{User, UserId, UserValidationError};
pub use repo::auction_repo::{
    AuctionRepository, SqliteAuctionRepository, CONTESTED_MIN_BIDS, OLD_AUCTION_THRESHOLD_DAYS,
};
pub use repo::user_repo::{SqliteUserRepository, UserRepository};
pub use repo::{RepoError, RepoResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
