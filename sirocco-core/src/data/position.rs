//! Position aggregates and price-addressed position lots.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Code, Timestamp};

use super::Direction;

/// Per (account, code, direction) position aggregate.
///
/// Volumes are lots; `yesterday_volume` and `closeable_volume` are derived,
/// never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Owning account id.
    pub account_id: String,
    /// Instrument code.
    pub code: Code,
    /// Position direction (the side actually held).
    pub direction: Direction,
    /// Volume carried in from the previous trading day.
    pub pre_volume: u64,
    /// Current total volume.
    pub volume: u64,
    /// Volume opened today.
    pub today_volume: u64,
    /// Volume frozen by pending close orders.
    pub frozen_volume: u64,
    /// Today-volume frozen by pending close-today orders.
    pub frozen_today_volume: u64,
    /// Volume opened today (cumulative, not reduced by closes).
    pub today_open_volume: u64,
    /// Volume closed today (cumulative).
    pub today_close_volume: u64,
    /// Commission accrued today on this position.
    pub today_commission: Decimal,
    /// Total open cost (sum of price x volume x multiplier over fills).
    pub open_cost: Decimal,
    /// Last seen market price.
    pub last_price: Decimal,
    /// Unrealized PnL at `last_price`.
    pub pnl: Decimal,
    /// Market value at `last_price`.
    pub value: Decimal,
}

impl Position {
    /// Creates an empty position for the given key.
    #[must_use]
    pub fn new(account_id: String, code: Code, direction: Direction) -> Self {
        Self {
            account_id,
            code,
            direction,
            ..Self::default()
        }
    }

    /// Volume carried over from previous days: `volume - today_volume`.
    #[must_use]
    pub fn yesterday_volume(&self) -> u64 {
        self.volume.saturating_sub(self.today_volume)
    }

    /// Volume not frozen by pending closes: `volume - frozen_volume`.
    #[must_use]
    pub fn closeable_volume(&self) -> u64 {
        self.volume.saturating_sub(self.frozen_volume)
    }

    /// Today volume not frozen: `today_volume - frozen_today_volume`.
    #[must_use]
    pub fn closeable_today_volume(&self) -> u64 {
        self.today_volume.saturating_sub(self.frozen_today_volume)
    }

    /// Yesterday volume not frozen.
    #[must_use]
    pub fn closeable_yesterday_volume(&self) -> u64 {
        self.yesterday_volume()
            .saturating_sub(self.frozen_volume.saturating_sub(self.frozen_today_volume))
    }

    /// Volume-weighted average open price, or zero for a flat position.
    #[must_use]
    pub fn avg_open_price(&self, multiplier: Decimal) -> Decimal {
        if self.volume == 0 || multiplier.is_zero() {
            return Decimal::ZERO;
        }
        self.open_cost / (Decimal::from(self.volume) * multiplier)
    }
}

/// One open-price lot of a position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionDetail {
    /// Owning account id.
    pub account_id: String,
    /// Instrument code.
    pub code: Code,
    /// Position direction.
    pub direction: Direction,
    /// Open price of this lot.
    pub price: Decimal,
    /// Remaining volume in this lot.
    pub volume: u64,
    /// Portion of `volume` opened today.
    pub today_volume: u64,
    /// Last mutation time.
    pub update_time: Timestamp,
}

impl PositionDetail {
    /// Volume carried over from previous days.
    #[must_use]
    pub fn yesterday_volume(&self) -> u64 {
        self.volume.saturating_sub(self.today_volume)
    }
}

/// Sorted container of [`PositionDetail`] lots for one (code, direction).
///
/// Lots are kept strictly ascending by open price; no two lots share a
/// price. Lookups are binary by price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionDetails {
    lots: Vec<PositionDetail>,
}

impl PositionDetails {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a container from unsorted lots, sorting by price.
    #[must_use]
    pub fn from_lots(mut lots: Vec<PositionDetail>) -> Self {
        lots.sort_by(|a, b| a.price.cmp(&b.price));
        Self { lots }
    }

    /// Returns the lots in ascending price order.
    #[must_use]
    pub fn lots(&self) -> &[PositionDetail] {
        &self.lots
    }

    /// Mutable access to the lots; callers must preserve the ordering.
    pub fn lots_mut(&mut self) -> &mut [PositionDetail] {
        &mut self.lots
    }

    /// Returns true if no lots are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Number of distinct price lots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lots.len()
    }

    /// Binary search by price: `Ok(index)` on an exact match, `Err(index)`
    /// with the insertion point otherwise.
    pub fn find(&self, price: Decimal) -> Result<usize, usize> {
        self.lots.binary_search_by(|lot| lot.price.cmp(&price))
    }

    /// Merges an opened volume into the lot at `price`, inserting a new lot
    /// if none exists at that exact price. Returns the lot's index.
    pub fn add_open(
        &mut self,
        account_id: &str,
        code: &Code,
        direction: Direction,
        price: Decimal,
        volume: u64,
        time: Timestamp,
    ) -> usize {
        match self.find(price) {
            Ok(i) => {
                let lot = &mut self.lots[i];
                lot.volume += volume;
                lot.today_volume += volume;
                lot.update_time = lot.update_time.max(time);
                i
            }
            Err(i) => {
                self.lots.insert(
                    i,
                    PositionDetail {
                        account_id: account_id.to_string(),
                        code: code.clone(),
                        direction,
                        price,
                        volume,
                        today_volume: volume,
                        update_time: time,
                    },
                );
                i
            }
        }
    }

    /// Removes lots whose volume has been fully consumed, returning them.
    pub fn prune_empty(&mut self) -> Vec<PositionDetail> {
        let mut removed = Vec::new();
        self.lots.retain(|lot| {
            if lot.volume == 0 {
                removed.push(lot.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Total remaining volume over all lots.
    #[must_use]
    pub fn total_volume(&self) -> u64 {
        self.lots.iter().map(|l| l.volume).sum()
    }

    /// Total today volume over all lots.
    #[must_use]
    pub fn total_today_volume(&self) -> u64 {
        self.lots.iter().map(|l| l.today_volume).sum()
    }

    /// Aggregate open cost: `sum(price x volume x multiplier)`.
    #[must_use]
    pub fn open_cost(&self, multiplier: Decimal) -> Decimal {
        self.lots
            .iter()
            .map(|l| l.price * Decimal::from(l.volume) * multiplier)
            .sum()
    }
}

/// Long/short pair of positions for one code; an absent side means no
/// position is held in that direction (not a zero-volume one).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiPosition {
    /// Long-side position, if held.
    pub long: Option<Position>,
    /// Short-side position, if held.
    pub short: Option<Position>,
}

impl BiPosition {
    /// Returns the side held in `direction`, if any.
    #[must_use]
    pub fn side(&self, direction: Direction) -> Option<&Position> {
        match direction {
            Direction::Long => self.long.as_ref(),
            Direction::Short => self.short.as_ref(),
        }
    }

    /// Mutable access to the side held in `direction`.
    pub fn side_mut(&mut self, direction: Direction) -> Option<&mut Position> {
        match direction {
            Direction::Long => self.long.as_mut(),
            Direction::Short => self.short.as_mut(),
        }
    }

    /// Returns the side in `direction`, creating an empty position if absent.
    pub fn side_or_insert(
        &mut self,
        account_id: &str,
        code: &Code,
        direction: Direction,
    ) -> &mut Position {
        let slot = match direction {
            Direction::Long => &mut self.long,
            Direction::Short => &mut self.short,
        };
        slot.get_or_insert_with(|| Position::new(account_id.to_string(), code.clone(), direction))
    }

    /// Returns true if neither side is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.long.is_none() && self.short.is_none()
    }
}

/// Long/short pair of lot containers for one code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiPositionDetails {
    /// Long-side lots, if any.
    pub long: Option<PositionDetails>,
    /// Short-side lots, if any.
    pub short: Option<PositionDetails>,
}

impl BiPositionDetails {
    /// Returns the lot container for `direction`, if present.
    #[must_use]
    pub fn side(&self, direction: Direction) -> Option<&PositionDetails> {
        match direction {
            Direction::Long => self.long.as_ref(),
            Direction::Short => self.short.as_ref(),
        }
    }

    /// Mutable access to the lot container for `direction`.
    pub fn side_mut(&mut self, direction: Direction) -> Option<&mut PositionDetails> {
        match direction {
            Direction::Long => self.long.as_mut(),
            Direction::Short => self.short.as_mut(),
        }
    }

    /// Returns the lot container for `direction`, creating it if absent.
    pub fn side_or_insert(&mut self, direction: Direction) -> &mut PositionDetails {
        let slot = match direction {
            Direction::Long => &mut self.long,
            Direction::Short => &mut self.short,
        };
        slot.get_or_insert_with(PositionDetails::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn code() -> Code {
        Code::new("rb2410").unwrap()
    }

    fn details_with(prices: &[(i64, u64, u64)]) -> PositionDetails {
        let lots = prices
            .iter()
            .map(|&(p, v, tv)| PositionDetail {
                account_id: "acct".into(),
                code: code(),
                direction: Direction::Long,
                price: Decimal::from(p),
                volume: v,
                today_volume: tv,
                update_time: Timestamp::ZERO,
            })
            .collect();
        PositionDetails::from_lots(lots)
    }

    #[test]
    fn test_position_derived_volumes() {
        let mut p = Position::new("acct".into(), code(), Direction::Long);
        p.volume = 10;
        p.today_volume = 4;
        p.frozen_volume = 3;
        p.frozen_today_volume = 1;
        assert_eq!(p.yesterday_volume(), 6);
        assert_eq!(p.closeable_volume(), 7);
        assert_eq!(p.closeable_today_volume(), 3);
        assert_eq!(p.closeable_yesterday_volume(), 4);
    }

    #[test]
    fn test_avg_open_price() {
        let mut p = Position::new("acct".into(), code(), Direction::Long);
        p.volume = 4;
        p.open_cost = dec!(140000);
        assert_eq!(p.avg_open_price(dec!(10)), dec!(3500));
        p.volume = 0;
        assert_eq!(p.avg_open_price(dec!(10)), Decimal::ZERO);
    }

    #[test]
    fn test_details_sorted_and_find() {
        let details = details_with(&[(120, 5, 0), (100, 5, 0), (110, 5, 0)]);
        let prices: Vec<Decimal> = details.lots().iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec!(100), dec!(110), dec!(120)]);
        assert_eq!(details.find(dec!(110)), Ok(1));
        assert_eq!(details.find(dec!(115)), Err(2));
    }

    #[test]
    fn test_add_open_merges_same_price() {
        let mut details = details_with(&[(100, 5, 2)]);
        details.add_open("acct", &code(), Direction::Long, dec!(100), 3, Timestamp::ZERO);
        assert_eq!(details.len(), 1);
        assert_eq!(details.lots()[0].volume, 8);
        assert_eq!(details.lots()[0].today_volume, 5);
    }

    #[test]
    fn test_add_open_inserts_in_order() {
        let mut details = details_with(&[(100, 5, 0), (120, 5, 0)]);
        details.add_open("acct", &code(), Direction::Long, dec!(110), 2, Timestamp::ZERO);
        let prices: Vec<Decimal> = details.lots().iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec!(100), dec!(110), dec!(120)]);
    }

    #[test]
    fn test_open_cost_and_totals() {
        let details = details_with(&[(100, 2, 1), (110, 3, 3)]);
        assert_eq!(details.total_volume(), 5);
        assert_eq!(details.total_today_volume(), 4);
        assert_eq!(details.open_cost(dec!(10)), dec!(5300));
    }

    #[test]
    fn test_prune_empty() {
        let mut details = details_with(&[(100, 0, 0), (110, 3, 0)]);
        let removed = details.prune_empty();
        assert_eq!(removed.len(), 1);
        assert_eq!(details.len(), 1);
        assert_eq!(details.lots()[0].price, dec!(110));
    }

    #[test]
    fn test_bi_position_sides() {
        let mut bi = BiPosition::default();
        assert!(bi.is_empty());
        bi.side_or_insert("acct", &code(), Direction::Short).volume = 3;
        assert!(bi.side(Direction::Long).is_none());
        assert_eq!(bi.side(Direction::Short).unwrap().volume, 3);
    }
}
