//! Auction repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist auctions together with their ordered bids.
//! - Answer the listing/aggregate queries over auctions.
//!
//! # Invariants
//! - `save`/`update` call `Auction::validate()` before SQL mutations and run
//!   inside one savepoint, so a failed write leaves no partial rows.
//! - A stored bid is never inserted twice or moved to another auction. A bid
//!   id already stored under another auction fails the write.
//! - Time bounds keep their meaning at millisecond storage resolution: lower
//!   bounds round up, upper bounds round down.
//! - "Open" means `closed = 0`. Listings are ordered `opened_at ASC, id ASC`.
//! - Bids within an auction keep insertion order.

use super::{
    bool_to_int, ceil_millis, ensure_connection_ready, parse_flag, parse_millis, parse_uuid,
    RepoError, RepoResult,
};
use crate::model::auction::{Auction, AuctionId, AuctionValidationError, Bid};
use crate::model::user::UserId;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use std::collections::HashSet;

/// Auctions opened at or before `now - OLD_AUCTION_THRESHOLD_DAYS` are old.
pub const OLD_AUCTION_THRESHOLD_DAYS: i64 = 7;

/// An auction is contested when it has strictly more bids than this.
pub const CONTESTED_MIN_BIDS: i64 = 3;

const AUCTION_SELECT_SQL: &str = "SELECT
    a.id AS id,
    a.name AS name,
    a.starting_value AS starting_value,
    a.owner_id AS owner_id,
    a.used AS used,
    a.opened_at AS opened_at,
    a.closed AS closed
FROM auctions a";

const AUCTION_ORDER_SQL: &str = "ORDER BY a.opened_at ASC, a.id ASC";

/// Repository interface for auction persistence and queries.
pub trait AuctionRepository {
    /// Persists a new auction and its bids.
    fn save(&self, auction: &Auction) -> RepoResult<()>;
    /// Rewrites auction columns and stores bids not persisted yet.
    ///
    /// Stored bids are immutable: changes to their value or time are ignored.
    fn update(&self, auction: &Auction) -> RepoResult<()>;
    /// Removes the auction and its bids.
    fn delete(&self, id: AuctionId) -> RepoResult<()>;
    fn by_id(&self, id: AuctionId) -> RepoResult<Option<Auction>>;
    /// Open auctions opened within `[start, end]`, both bounds inclusive.
    fn by_period(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepoResult<Vec<Auction>>;
    /// Open auctions valued within `[min_value, max_value]` with more than
    /// `CONTESTED_MIN_BIDS` bids.
    fn contested_between(&self, min_value: f64, max_value: f64) -> RepoResult<Vec<Auction>>;
    /// Auctions the user owns or bid on, each listed once.
    fn auctions_for_user(&self, user_id: UserId) -> RepoResult<Vec<Auction>>;
    fn count_open(&self) -> RepoResult<u64>;
    /// Mean starting value of the user's auctions, `None` when they own none.
    fn average_starting_value_for_user(&self, user_id: UserId) -> RepoResult<Option<f64>>;
    /// Auctions opened at or before `now - OLD_AUCTION_THRESHOLD_DAYS`.
    fn old_as_of(&self, now: DateTime<Utc>) -> RepoResult<Vec<Auction>>;
    /// Auctions whose item is not used.
    fn new_ones(&self) -> RepoResult<Vec<Auction>>;

    /// [`AuctionRepository::old_as_of`] evaluated against the current time.
    fn old(&self) -> RepoResult<Vec<Auction>> {
        self.old_as_of(Utc::now())
    }
}

/// SQLite-backed auction repository.
pub struct SqliteAuctionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuctionRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "auctions",
            &[
                "id",
                "name",
                "starting_value",
                "owner_id",
                "used",
                "opened_at",
                "closed",
            ],
        )?;
        ensure_connection_ready(
            conn,
            "bids",
            &[
                "id",
                "auction_id",
                "bidder_id",
                "value",
                "placed_at",
                "position",
            ],
        )?;
        Ok(Self { conn })
    }

    fn query_auctions<P: Params>(&self, filter: &str, params: P) -> RepoResult<Vec<Auction>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{AUCTION_SELECT_SQL} {filter} {AUCTION_ORDER_SQL};"))?;
        let mut rows = stmt.query(params)?;

        let mut seen = HashSet::new();
        let mut auctions = Vec::new();
        while let Some(row) = rows.next()? {
            let auction = parse_auction_row(row)?;
            if seen.insert(auction.id) {
                auctions.push(auction);
            }
        }

        for auction in &mut auctions {
            auction.bids = load_bids(self.conn, auction.id)?;
            auction.validate()?;
        }
        Ok(auctions)
    }
}

impl AuctionRepository for SqliteAuctionRepository<'_> {
    fn save(&self, auction: &Auction) -> RepoResult<()> {
        auction.validate()?;

        let inserted = with_savepoint(self.conn, "auction_save", || {
            self.conn.execute(
                "INSERT INTO auctions (
                    id,
                    name,
                    starting_value,
                    owner_id,
                    used,
                    opened_at,
                    closed
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    auction.id.to_string(),
                    auction.name.as_str(),
                    auction.starting_value,
                    auction.owner_id.to_string(),
                    bool_to_int(auction.used),
                    auction.opened_at.timestamp_millis(),
                    bool_to_int(auction.closed),
                ],
            )?;
            insert_new_bids(self.conn, auction)
        })?;

        debug!(
            "event=auction_save module=repo status=ok bids_inserted={inserted} bids_total={}",
            auction.bid_count()
        );
        Ok(())
    }

    fn update(&self, auction: &Auction) -> RepoResult<()> {
        auction.validate()?;

        let inserted = with_savepoint(self.conn, "auction_update", || {
            let changed = self.conn.execute(
                "UPDATE auctions
                 SET
                    name = ?2,
                    starting_value = ?3,
                    owner_id = ?4,
                    used = ?5,
                    opened_at = ?6,
                    closed = ?7
                 WHERE id = ?1;",
                params![
                    auction.id.to_string(),
                    auction.name.as_str(),
                    auction.starting_value,
                    auction.owner_id.to_string(),
                    bool_to_int(auction.used),
                    auction.opened_at.timestamp_millis(),
                    bool_to_int(auction.closed),
                ],
            )?;
            if changed == 0 {
                return Err(RepoError::AuctionNotFound(auction.id));
            }
            insert_new_bids(self.conn, auction)
        })?;

        debug!("event=auction_update module=repo status=ok bids_inserted={inserted}");
        Ok(())
    }

    fn delete(&self, id: AuctionId) -> RepoResult<()> {
        with_savepoint(self.conn, "auction_delete", || {
            self.conn
                .execute("DELETE FROM bids WHERE auction_id = ?1;", [id.to_string()])?;
            let changed = self
                .conn
                .execute("DELETE FROM auctions WHERE id = ?1;", [id.to_string()])?;
            if changed == 0 {
                return Err(RepoError::AuctionNotFound(id));
            }
            Ok(())
        })?;

        debug!("event=auction_delete module=repo status=ok");
        Ok(())
    }

    fn by_id(&self, id: AuctionId) -> RepoResult<Option<Auction>> {
        let mut auctions = self.query_auctions("WHERE a.id = ?1", [id.to_string()])?;
        Ok(auctions.pop())
    }

    fn by_period(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepoResult<Vec<Auction>> {
        self.query_auctions(
            "WHERE a.closed = 0
               AND a.opened_at BETWEEN ?1 AND ?2",
            params![ceil_millis(start), end.timestamp_millis()],
        )
    }

    fn contested_between(&self, min_value: f64, max_value: f64) -> RepoResult<Vec<Auction>> {
        self.query_auctions(
            "WHERE a.closed = 0
               AND a.starting_value BETWEEN ?1 AND ?2
               AND (SELECT COUNT(*) FROM bids b WHERE b.auction_id = a.id) > ?3",
            params![min_value, max_value, CONTESTED_MIN_BIDS],
        )
    }

    fn auctions_for_user(&self, user_id: UserId) -> RepoResult<Vec<Auction>> {
        // EXISTS keeps one row per auction however many bids the user placed.
        self.query_auctions(
            "WHERE a.owner_id = ?1
               OR EXISTS (
                 SELECT 1
                 FROM bids b
                 WHERE b.auction_id = a.id
                   AND b.bidder_id = ?1
               )",
            [user_id.to_string()],
        )
    }

    fn count_open(&self) -> RepoResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM auctions WHERE closed = 0;", [], |row| {
                    row.get(0)
                })?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative auction count `{count}`")))
    }

    fn average_starting_value_for_user(&self, user_id: UserId) -> RepoResult<Option<f64>> {
        let average: Option<f64> = self.conn.query_row(
            "SELECT AVG(starting_value) FROM auctions WHERE owner_id = ?1;",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(average)
    }

    fn old_as_of(&self, now: DateTime<Utc>) -> RepoResult<Vec<Auction>> {
        // Upper bound: flooring keeps `<= cutoff` exact.
        let cutoff = now - Duration::days(OLD_AUCTION_THRESHOLD_DAYS);
        self.query_auctions("WHERE a.opened_at <= ?1", [cutoff.timestamp_millis()])
    }

    fn new_ones(&self) -> RepoResult<Vec<Auction>> {
        self.query_auctions("WHERE a.used = 0", [])
    }
}

/// Inserts bids of `auction` that are not stored yet. Returns how many.
///
/// Fails with `ForeignBid` when a bid id is already stored under another
/// auction.
fn insert_new_bids(conn: &Connection, auction: &Auction) -> RepoResult<usize> {
    let mut owner_stmt = conn.prepare("SELECT auction_id FROM bids WHERE id = ?1;")?;
    let mut stmt = conn.prepare(
        "INSERT INTO bids (
            id,
            auction_id,
            bidder_id,
            value,
            placed_at,
            position
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
    )?;

    let mut inserted = 0;
    for (position, bid) in auction.bids.iter().enumerate() {
        let stored_owner: Option<String> = owner_stmt
            .query_row([bid.id.to_string()], |row| row.get(0))
            .optional()?;
        if let Some(owner_text) = stored_owner {
            let stored_auction = parse_uuid(&owner_text, "bids.auction_id")?;
            if stored_auction != auction.id {
                return Err(AuctionValidationError::ForeignBid {
                    bid_id: bid.id,
                    auction_id: stored_auction,
                }
                .into());
            }
            continue;
        }

        inserted += stmt.execute(params![
            bid.id.to_string(),
            bid.auction_id.to_string(),
            bid.bidder_id.to_string(),
            bid.value,
            bid.placed_at.timestamp_millis(),
            position as i64,
        ])?;
    }
    Ok(inserted)
}

fn load_bids(conn: &Connection, auction_id: AuctionId) -> RepoResult<Vec<Bid>> {
    let mut stmt = conn.prepare(
        "SELECT id, auction_id, bidder_id, value, placed_at
         FROM bids
         WHERE auction_id = ?1
         ORDER BY position ASC, id ASC;",
    )?;
    let mut rows = stmt.query([auction_id.to_string()])?;
    let mut bids = Vec::new();
    while let Some(row) = rows.next()? {
        bids.push(parse_bid_row(row)?);
    }
    Ok(bids)
}

/// Runs `work` inside a named savepoint.
///
/// Savepoints nest inside an enclosing unit of work and start their own
/// transaction when there is none.
fn with_savepoint<T>(
    conn: &Connection,
    name: &'static str,
    work: impl FnOnce() -> RepoResult<T>,
) -> RepoResult<T> {
    conn.execute_batch(&format!("SAVEPOINT {name};"))?;
    match work() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE SAVEPOINT {name};"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.execute_batch(&format!(
                "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};"
            )) {
                warn!(
                    "event=savepoint_rollback module=repo status=error savepoint={name} error={rollback_err}"
                );
            }
            Err(err)
        }
    }
}

fn parse_auction_row(row: &Row<'_>) -> RepoResult<Auction> {
    let id_text: String = row.get("id")?;
    let owner_text: String = row.get("owner_id")?;

    Ok(Auction {
        id: parse_uuid(&id_text, "auctions.id")?,
        name: row.get("name")?,
        starting_value: row.get("starting_value")?,
        owner_id: parse_uuid(&owner_text, "auctions.owner_id")?,
        used: parse_flag(row.get("used")?, "auctions.used")?,
        opened_at: parse_millis(row.get("opened_at")?, "auctions.opened_at")?,
        closed: parse_flag(row.get("closed")?, "auctions.closed")?,
        bids: Vec::new(),
    })
}

fn parse_bid_row(row: &Row<'_>) -> RepoResult<Bid> {
    let id_text: String = row.get("id")?;
    let auction_text: String = row.get("auction_id")?;
    let bidder_text: String = row.get("bidder_id")?;

    let bid = Bid {
        id: parse_uuid(&id_text, "bids.id")?,
        auction_id: parse_uuid(&auction_text, "bids.auction_id")?,
        bidder_id: parse_uuid(&bidder_text, "bids.bidder_id")?,
        value: row.get("value")?,
        placed_at: parse_millis(row.get("placed_at")?, "bids.placed_at")?,
    };
    bid.validate()?;
    Ok(bid)
}
