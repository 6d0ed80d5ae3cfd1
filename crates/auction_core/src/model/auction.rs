//! Auction and bid domain model.
//!
//! # Responsibility
//! - Define the auction record with its ordered bid list.
//! - Provide lifecycle helpers (`close`, `add_bid`) and a fluent builder.
//!
//! # Invariants
//! - An auction is open while `closed` is false.
//! - `starting_value` is finite and not negative.
//! - Bid values are finite and strictly positive.
//! - Every bid in `bids` carries this auction's id.
//! - Timestamps set through this API are truncated to millisecond precision,
//!   the resolution they are stored with.

use crate::model::user::{User, UserId};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of an auction.
pub type AuctionId = Uuid;

/// Stable identifier of a bid.
pub type BidId = Uuid;

/// Validation errors for auction and bid invariants.
#[derive(Debug, Clone, PartialEq)]
pub enum AuctionValidationError {
    BlankName,
    InvalidStartingValue(f64),
    InvalidBidValue { bid_id: BidId, value: f64 },
    /// The bid points at another auction.
    ForeignBid { bid_id: BidId, auction_id: AuctionId },
    DuplicateBid(BidId),
}

impl Display for AuctionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "auction name must not be blank"),
            Self::InvalidStartingValue(value) => {
                write!(f, "auction starting value must be finite and >= 0, got {value}")
            }
            Self::InvalidBidValue { bid_id, value } => {
                write!(f, "bid {bid_id} value must be finite and > 0, got {value}")
            }
            Self::ForeignBid { bid_id, auction_id } => {
                write!(f, "bid {bid_id} belongs to auction {auction_id}")
            }
            Self::DuplicateBid(bid_id) => write!(f, "bid {bid_id} listed twice"),
        }
    }
}

impl Error for AuctionValidationError {}

/// A monetary offer placed by a user against one auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    /// Back-reference to the owning auction. Fixed at creation.
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub value: f64,
    /// Stored at millisecond precision. Assign through [`Auction::add_bid`]
    /// or pre-truncate with `trunc_subsecs(3)`, or a reload will not
    /// compare equal.
    pub placed_at: DateTime<Utc>,
}

impl Bid {
    pub fn validate(&self) -> Result<(), AuctionValidationError> {
        if !self.value.is_finite() || self.value <= 0.0 {
            return Err(AuctionValidationError::InvalidBidValue {
                bid_id: self.id,
                value: self.value,
            });
        }
        Ok(())
    }
}

/// A listing users bid on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub name: String,
    pub starting_value: f64,
    pub owner_id: UserId,
    /// Second-hand item when true.
    pub used: bool,
    /// Stored at millisecond precision. Direct assignment is not truncated;
    /// prefer [`Auction::set_opened_at`].
    pub opened_at: DateTime<Utc>,
    pub closed: bool,
    /// Bids in placement order.
    pub bids: Vec<Bid>,
}

impl Auction {
    /// Creates an open auction opened now.
    pub fn new(name: impl Into<String>, starting_value: f64, owner: &User, used: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            starting_value,
            owner_id: owner.id,
            used,
            opened_at: now_millis(),
            closed: false,
            bids: Vec::new(),
        }
    }

    /// Moves the opening date, truncated to millisecond precision.
    pub fn set_opened_at(&mut self, opened_at: DateTime<Utc>) {
        self.opened_at = opened_at.trunc_subsecs(3);
    }

    /// Appends a bid from `bidder` and returns its id.
    pub fn add_bid(&mut self, bidder: &User, value: f64, placed_at: DateTime<Utc>) -> BidId {
        let bid = Bid {
            id: Uuid::new_v4(),
            auction_id: self.id,
            bidder_id: bidder.id,
            value,
            placed_at: placed_at.trunc_subsecs(3),
        };
        let bid_id = bid.id;
        self.bids.push(bid);
        bid_id
    }

    /// Closes the auction. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    pub fn validate(&self) -> Result<(), AuctionValidationError> {
        if self.name.trim().is_empty() {
            return Err(AuctionValidationError::BlankName);
        }
        if !self.starting_value.is_finite() || self.starting_value < 0.0 {
            return Err(AuctionValidationError::InvalidStartingValue(
                self.starting_value,
            ));
        }

        let mut seen = HashSet::with_capacity(self.bids.len());
        for bid in &self.bids {
            if bid.auction_id != self.id {
                return Err(AuctionValidationError::ForeignBid {
                    bid_id: bid.id,
                    auction_id: bid.auction_id,
                });
            }
            if !seen.insert(bid.id) {
                return Err(AuctionValidationError::DuplicateBid(bid.id));
            }
            bid.validate()?;
        }
        Ok(())
    }
}

/// Fluent construction of auctions, mostly for fixtures.
///
/// Defaults: name `Xbox`, starting value `1500.0`, opened now, new, open.
#[derive(Debug, Clone)]
pub struct AuctionBuilder {
    owner_id: UserId,
    name: String,
    starting_value: f64,
    opened_at: DateTime<Utc>,
    used: bool,
    closed: bool,
}

impl AuctionBuilder {
    pub fn new(owner: &User) -> Self {
        Self {
            owner_id: owner.id,
            name: "Xbox".to_string(),
            starting_value: 1500.0,
            opened_at: now_millis(),
            used: false,
            closed: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn valued(mut self, starting_value: f64) -> Self {
        self.starting_value = starting_value;
        self
    }

    /// Opens the auction `days` whole days before now.
    pub fn days_ago(mut self, days: i64) -> Self {
        self.opened_at = now_millis() - Duration::days(days);
        self
    }

    pub fn opened_at(mut self, opened_at: DateTime<Utc>) -> Self {
        self.opened_at = opened_at.trunc_subsecs(3);
        self
    }

    pub fn used(mut self) -> Self {
        self.used = true;
        self
    }

    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    pub fn build(self) -> Auction {
        Auction {
            id: Uuid::new_v4(),
            name: self.name,
            starting_value: self.starting_value,
            owner_id: self.owner_id,
            used: self.used,
            opened_at: self.opened_at,
            closed: self.closed,
            bids: Vec::new(),
        }
    }
}

fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
