use auction_core::{Auction, AuctionBuilder, AuctionValidationError, User};
use chrono::{Duration, TimeZone, Utc};

#[test]
fn new_auction_is_open_and_owned() {
    let owner = User::new("David", "dvd@x.com");
    let auction = Auction::new("Geladeira", 1500.0, &owner, false);

    assert!(auction.is_open());
    assert_eq!(auction.owner_id, owner.id);
    assert_eq!(auction.bid_count(), 0);
    assert!(auction.validate().is_ok());
}

#[test]
fn close_is_idempotent() {
    let owner = User::new("David", "dvd@x.com");
    let mut auction = Auction::new("Geladeira", 1500.0, &owner, false);

    auction.close();
    auction.close();
    assert!(!auction.is_open());
}

#[test]
fn add_bid_links_bid_to_auction_and_bidder() {
    let owner = User::new("Mauricio", "m@a.com");
    let buyer = User::new("Victor", "v@v.com");
    let mut auction = AuctionBuilder::new(&owner).build();

    let bid_id = auction.add_bid(&buyer, 100.0, Utc::now());

    let bid = &auction.bids[0];
    assert_eq!(bid.id, bid_id);
    assert_eq!(bid.auction_id, auction.id);
    assert_eq!(bid.bidder_id, buyer.id);
}

#[test]
fn timestamps_are_truncated_to_milliseconds() {
    let owner = User::new("David", "dvd@x.com");
    let precise = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        + Duration::nanoseconds(123_456_789);

    let mut auction = AuctionBuilder::new(&owner).opened_at(precise).build();
    auction.add_bid(&owner, 10.0, precise);

    assert_eq!(auction.opened_at.timestamp_subsec_nanos(), 123_000_000);
    assert_eq!(auction.bids[0].placed_at.timestamp_subsec_nanos(), 123_000_000);
}

#[test]
fn set_opened_at_truncates_direct_field_does_not() {
    let owner = User::new("David", "dvd@x.com");
    let precise = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        + Duration::microseconds(1_500);

    let mut auction = Auction::new("PC", 10.0, &owner, false);
    auction.set_opened_at(precise);
    assert_eq!(auction.opened_at.timestamp_subsec_nanos(), 1_000_000);

    auction.opened_at = precise;
    assert_eq!(auction.opened_at.timestamp_subsec_nanos(), 1_500_000);
}

#[test]
fn builder_defaults_and_overrides() {
    let owner = User::new("David", "dvd@x.com");

    let default = AuctionBuilder::new(&owner).build();
    assert_eq!(default.name, "Xbox");
    assert_eq!(default.starting_value, 1500.0);
    assert!(!default.used);
    assert!(default.is_open());

    let custom = AuctionBuilder::new(&owner)
        .named("PC")
        .valued(700.0)
        .days_ago(3)
        .used()
        .closed()
        .build();
    assert_eq!(custom.name, "PC");
    assert_eq!(custom.starting_value, 700.0);
    assert!(custom.used);
    assert!(custom.closed);
    let age = Utc::now() - custom.opened_at;
    assert!(age >= Duration::days(3) && age < Duration::days(3) + Duration::minutes(1));
}

#[test]
fn validation_rejects_bad_values() {
    let owner = User::new("David", "dvd@x.com");

    let blank = Auction::new("  ", 10.0, &owner, false);
    assert_eq!(blank.validate(), Err(AuctionValidationError::BlankName));

    let negative = Auction::new("PC", -1.0, &owner, false);
    assert!(matches!(
        negative.validate(),
        Err(AuctionValidationError::InvalidStartingValue(_))
    ));

    let not_a_number = Auction::new("PC", f64::NAN, &owner, false);
    assert!(not_a_number.validate().is_err());

    let mut negative_bid = Auction::new("PC", 10.0, &owner, false);
    negative_bid.add_bid(&owner, -5.0, Utc::now());
    assert!(matches!(
        negative_bid.validate(),
        Err(AuctionValidationError::InvalidBidValue { .. })
    ));
}

#[test]
fn validation_rejects_duplicated_bid() {
    let owner = User::new("David", "dvd@x.com");
    let mut auction = Auction::new("PC", 10.0, &owner, false);
    auction.add_bid(&owner, 5.0, Utc::now());
    let copy = auction.bids[0].clone();
    auction.bids.push(copy);

    assert!(matches!(
        auction.validate(),
        Err(AuctionValidationError::DuplicateBid(_))
    ));
}

#[test]
fn auction_serializes_with_bids() {
    let owner = User::new("David", "dvd@x.com");
    let mut auction = Auction::new("PC", 10.0, &owner, true);
    auction.add_bid(&owner, 5.0, Utc::now());

    let json = serde_json::to_value(&auction).unwrap();
    assert_eq!(json["name"], "PC");
    assert_eq!(json["used"], true);
    assert_eq!(json["bids"].as_array().unwrap().len(), 1);

    let back: Auction = serde_json::from_value(json).unwrap();
    assert_eq!(back, auction);
}
