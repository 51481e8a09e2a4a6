//! Market tick data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Code, Timestamp};

/// Market phase reported with each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    /// Phase not known (e.g. before the first status tick of the day).
    #[default]
    Unknown,
    /// Call-auction order collection.
    AuctionOrdering,
    /// Call-auction matching.
    AuctionMatched,
    /// Continuous double-auction trading.
    ContinuousMatching,
    /// Trading halted within the session.
    StopTrading,
    /// Market closed.
    Closed,
}

impl MarketStatus {
    /// Returns true while orders can be submitted against this phase.
    #[must_use]
    pub const fn is_tradeable(&self) -> bool {
        !matches!(self, Self::Unknown | Self::Closed)
    }

    /// Returns true while the exchange is producing matches.
    #[must_use]
    pub const fn is_matching(&self) -> bool {
        matches!(self, Self::ContinuousMatching | Self::AuctionMatched)
    }

    /// Returns true for any auction phase.
    #[must_use]
    pub const fn is_auction(&self) -> bool {
        matches!(self, Self::AuctionOrdering | Self::AuctionMatched)
    }

    /// Returns true for any phase in which quotes flow.
    #[must_use]
    pub const fn is_trading(&self) -> bool {
        matches!(
            self,
            Self::AuctionOrdering | Self::AuctionMatched | Self::ContinuousMatching
        )
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::AuctionOrdering => "AUCTION_ORDERING",
            Self::AuctionMatched => "AUCTION_MATCHED",
            Self::ContinuousMatching => "CONTINUOUS_MATCHING",
            Self::StopTrading => "STOP_TRADING",
            Self::Closed => "CLOSED",
        };
        write!(f, "{s}")
    }
}

/// Quote and trade snapshot for one instrument at one instant.
///
/// Bid levels are sorted descending (index 0 = best bid), ask levels
/// ascending (index 0 = best ask). `volume`, `turnover` and
/// `open_interest_delta` are the deltas since the previous tick;
/// `today_volume`, `today_turnover` and `open_interest` are the day
/// cumulatives. Ticks are immutable once observed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument code.
    pub code: Code,
    /// Snapshot timestamp.
    pub timestamp: Timestamp,
    /// Last traded price.
    pub last_price: Decimal,
    /// Bid prices, best first.
    pub bid_prices: Vec<Decimal>,
    /// Bid volumes parallel to `bid_prices`.
    pub bid_volumes: Vec<u64>,
    /// Ask prices, best first.
    pub ask_prices: Vec<Decimal>,
    /// Ask volumes parallel to `ask_prices`.
    pub ask_volumes: Vec<u64>,
    /// Cumulative traded volume for the day.
    pub today_volume: u64,
    /// Cumulative turnover for the day.
    pub today_turnover: Decimal,
    /// Current open interest.
    pub open_interest: Decimal,
    /// Volume traded since the previous tick.
    pub volume: u64,
    /// Turnover since the previous tick.
    pub turnover: Decimal,
    /// Open-interest change since the previous tick.
    pub open_interest_delta: Decimal,
    /// Market phase.
    pub status: MarketStatus,
    /// Previous session close price.
    pub pre_close: Decimal,
    /// Previous session settlement price.
    pub pre_settle: Decimal,
    /// Daily upper price limit.
    pub upper_limit: Decimal,
    /// Daily lower price limit.
    pub lower_limit: Decimal,
}

impl Tick {
    /// Creates a tick with the given identity and last price; book arrays
    /// start empty and the status is `Unknown`.
    #[must_use]
    pub fn new(code: Code, timestamp: Timestamp, last_price: Decimal) -> Self {
        Self {
            code,
            timestamp,
            last_price,
            ..Self::default()
        }
    }

    /// Returns the best bid price, if a bid level exists.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bid_prices.first().copied()
    }

    /// Returns the best ask price, if an ask level exists.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.ask_prices.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_tick() -> Tick {
        let mut tick = Tick::new(
            Code::new("rb2410").unwrap(),
            Timestamp::new(1_704_067_200_000).unwrap(),
            dec!(3500),
        );
        tick.bid_prices = vec![dec!(3499), dec!(3498)];
        tick.bid_volumes = vec![10, 20];
        tick.ask_prices = vec![dec!(3501), dec!(3502)];
        tick.ask_volumes = vec![8, 16];
        tick.status = MarketStatus::ContinuousMatching;
        tick
    }

    #[test]
    fn test_best_bid_ask() {
        let tick = create_tick();
        assert_eq!(tick.best_bid(), Some(dec!(3499)));
        assert_eq!(tick.best_ask(), Some(dec!(3501)));
    }

    #[test]
    fn test_status_predicates() {
        assert!(MarketStatus::ContinuousMatching.is_tradeable());
        assert!(MarketStatus::AuctionMatched.is_matching());
        assert!(!MarketStatus::AuctionOrdering.is_matching());
        assert!(!MarketStatus::Closed.is_tradeable());
        assert!(!MarketStatus::Unknown.is_tradeable());
        assert!(MarketStatus::AuctionOrdering.is_trading());
        assert!(!MarketStatus::StopTrading.is_trading());
    }

    #[test]
    fn test_tick_serde_roundtrip() {
        let tick = create_tick();
        let json = serde_json::to_string(&tick).unwrap();
        let parsed: Tick = serde_json::from_str(&json).unwrap();
        assert_eq!(tick, parsed);
    }
}
