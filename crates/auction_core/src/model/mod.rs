//! Auction domain model.
//!
//! # Responsibility
//! - Define the records persisted by the repositories: users, auctions, bids.
//! - Keep invariants checkable in memory before any SQL runs.
//!
//! # Invariants
//! - Every record is identified by a stable UUID generated at construction.
//! - A bid belongs to exactly one auction and is never reassigned.

pub mod auction;
pub mod user;
