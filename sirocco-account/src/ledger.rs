//! Position and asset bookkeeping for one virtual account.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::warn;

use sirocco_core::data::{
    Assets, BiPosition, BiPositionDetails, Direction, Offset, Order, Position, PositionDetail,
    Security, Trade,
};
use sirocco_core::types::Code;

/// Outcome of booking a close trade: which lots changed, which emptied, and
/// the realized PnL.
#[derive(Debug, Default)]
pub struct CloseOutcome {
    /// Lots that still hold volume and must be upserted.
    pub mutated_lots: Vec<PositionDetail>,
    /// Lots fully consumed and removed; delete their persisted records.
    pub removed_lots: Vec<PositionDetail>,
    /// Realized PnL accrued into the assets by this trade.
    pub close_pnl: Decimal,
}

/// In-memory books of one virtual account.
///
/// All accounting mutation is confined here; the overlay applies events to
/// the ledger and persists whatever the ledger reports as changed. The
/// direction of an order is the trade-side direction, so close orders act
/// on the book opposite to their own direction (see
/// [`Ledger::position_book_for`]).
pub struct Ledger {
    /// Owning account id.
    pub account_id: String,
    /// Current trading day.
    pub trading_day: NaiveDate,
    /// Asset summary.
    pub assets: Assets,
    /// Positions per code.
    pub positions: HashMap<Code, BiPosition>,
    /// Position lots per code.
    pub details: HashMap<Code, BiPositionDetails>,
    /// Orders submitted today, by order id.
    pub today_orders: HashMap<String, Order>,
    /// Trades booked today.
    pub today_trades: Vec<Trade>,
    /// Codes whose tick feed the user subscribed.
    pub tick_subscriptions: HashSet<Code>,
    /// True after a subscribe-all; every tick is forwarded.
    pub all_ticks: bool,
    /// Cached instrument metadata.
    pub securities: HashMap<Code, Security>,
}

impl Ledger {
    /// Creates empty books with a fresh asset record.
    #[must_use]
    pub fn new(account_id: String, trading_day: NaiveDate, initial_cash: Decimal) -> Self {
        let assets = Assets::new(account_id.clone(), trading_day, initial_cash);
        Self {
            account_id,
            trading_day,
            assets,
            positions: HashMap::new(),
            details: HashMap::new(),
            today_orders: HashMap::new(),
            today_trades: Vec::new(),
            tick_subscriptions: HashSet::new(),
            all_ticks: false,
            securities: HashMap::new(),
        }
    }

    /// Maps a trade-side direction and offset to the position book it acts
    /// on: opens act on their own side, closes on the opposite side.
    #[must_use]
    pub fn position_book_for(direction: Direction, offset: Offset) -> Direction {
        if offset.is_close() {
            direction.opposite()
        } else {
            direction
        }
    }

    /// Contract multiplier for `code`, defaulting to one when the security
    /// is unknown.
    #[must_use]
    pub fn multiplier(&self, code: &Code) -> Decimal {
        self.securities
            .get(code)
            .map_or(Decimal::ONE, |s| s.multiplier)
    }

    /// Volume closeable by an order of the given offset against `position`.
    #[must_use]
    pub fn closeable_for(position: &Position, offset: Offset) -> u64 {
        match offset {
            Offset::Close => position.closeable_volume(),
            Offset::CloseToday => position.closeable_today_volume(),
            Offset::CloseYesterday => position.closeable_yesterday_volume(),
            Offset::Open => 0,
        }
    }

    /// Freezes the resources a freshly accepted order will consume: cash
    /// for opens, position volume for closes.
    pub fn freeze_order(&mut self, order: &Order) {
        if order.offset == Offset::Open {
            self.assets.frozen_by_order += order.frozen_cash;
            self.assets.recompute_totals();
            return;
        }
        let book = Self::position_book_for(order.direction, order.offset);
        if let Some(position) = self
            .positions
            .get_mut(&order.code)
            .and_then(|bi| bi.side_mut(book))
        {
            position.frozen_volume += order.volume;
            if order.offset == Offset::CloseToday {
                position.frozen_today_volume += order.volume;
            }
        }
    }

    /// Releases what a canceled or failed order still holds frozen.
    pub fn unfreeze_order(&mut self, order: &Order) {
        if order.offset == Offset::Open {
            self.assets.frozen_by_order =
                (self.assets.frozen_by_order - order.frozen_cash).max(Decimal::ZERO);
            self.assets.recompute_totals();
            return;
        }
        let unfilled = order.unfilled_volume();
        let book = Self::position_book_for(order.direction, order.offset);
        if let Some(position) = self
            .positions
            .get_mut(&order.code)
            .and_then(|bi| bi.side_mut(book))
        {
            position.frozen_volume = position.frozen_volume.saturating_sub(unfilled);
            if order.offset == Offset::CloseToday {
                position.frozen_today_volume =
                    position.frozen_today_volume.saturating_sub(unfilled);
            }
        }
    }

    /// Accrues a trade's commission into the account and position books.
    pub fn add_commission(&mut self, trade: &Trade) {
        self.assets.today_commission += trade.commission;
        self.assets.total_commission += trade.commission;
        self.assets.recompute_totals();
        let book = Self::position_book_for(trade.direction, trade.offset);
        if let Some(position) = self
            .positions
            .get_mut(&trade.code)
            .and_then(|bi| bi.side_mut(book))
        {
            position.today_commission += trade.commission;
        }
    }

    /// Books an open trade: merges the fill into the lot at its price and
    /// grows the position aggregate. Returns the lot to persist.
    pub fn apply_open_trade(&mut self, trade: &Trade) -> PositionDetail {
        let multiplier = self.multiplier(&trade.code);
        let account_id = self.account_id.clone();

        let position = self
            .positions
            .entry(trade.code.clone())
            .or_default()
            .side_or_insert(&account_id, &trade.code, trade.direction);
        position.volume += trade.volume;
        position.today_volume += trade.volume;
        position.today_open_volume += trade.volume;
        position.open_cost += trade.price * Decimal::from(trade.volume) * multiplier;
        position.last_price = trade.price;

        let details = self
            .details
            .entry(trade.code.clone())
            .or_default()
            .side_or_insert(trade.direction);
        let index = details.add_open(
            &account_id,
            &trade.code,
            trade.direction,
            trade.price,
            trade.volume,
            trade.time,
        );
        details.lots()[index].clone()
    }

    /// Books a close trade against the opposite position book.
    ///
    /// Lots are selected by binary-searching the ascending price list for
    /// the order's target price (the `close_position_price` annotation, or
    /// the offset-dependent extreme when absent) and consuming the
    /// candidate nearest the target that still qualifies under the trade's
    /// offset; ties go to the lower price. The trade's offset is used even
    /// when the backend coerced it away from the order's.
    pub fn apply_close_trade(&mut self, order: &Order, trade: &Trade) -> CloseOutcome {
        let multiplier = self.multiplier(&trade.code);
        let book = Self::position_book_for(trade.direction, trade.offset);
        let target = order.close_position_price().unwrap_or(match trade.direction {
            // A long close buys back shorts: no anchor means cheapest lot
            // first, scanned from below; a short close mirrors it.
            Direction::Long => Decimal::MIN,
            Direction::Short => Decimal::MAX,
        });

        let mut outcome = CloseOutcome::default();
        let Some(details) = self
            .details
            .get_mut(&trade.code)
            .and_then(|bi| bi.side_mut(book))
        else {
            warn!(code = %trade.code, "close trade without position lots");
            return outcome;
        };

        let mut rest = trade.volume;
        let mut today_debit_total: u64 = 0;
        let sign = book.sign();
        {
            let start = match details.find(target) {
                Ok(i) | Err(i) => i,
            };
            let lots = details.lots_mut();
            let mut left: isize = start as isize - 1;
            let mut right: usize = start;

            while rest > 0 {
                while left >= 0 && !qualifies(&lots[left as usize], trade.offset) {
                    left -= 1;
                }
                while right < lots.len() && !qualifies(&lots[right], trade.offset) {
                    right += 1;
                }
                let pick = match (left >= 0, right < lots.len()) {
                    (false, false) => break,
                    (true, false) => left as usize,
                    (false, true) => right,
                    (true, true) => {
                        let left_dist = (lots[left as usize].price - target).abs();
                        let right_dist = (lots[right].price - target).abs();
                        // Tie goes to the lower-priced lot.
                        if right_dist < left_dist {
                            right
                        } else {
                            left as usize
                        }
                    }
                };

                let lot = &mut lots[pick];
                let take = available(lot, trade.offset).min(rest);
                let today_debit = match trade.offset {
                    Offset::CloseToday => take,
                    Offset::CloseYesterday => 0,
                    // Plain closes consume carried-over volume first.
                    Offset::Close | Offset::Open => {
                        take.saturating_sub(lot.yesterday_volume())
                    }
                };
                lot.volume -= take;
                lot.today_volume -= today_debit;
                lot.update_time = trade.time;
                today_debit_total += today_debit;
                outcome.close_pnl +=
                    sign * Decimal::from(take) * (trade.price - lot.price) * multiplier;
                rest -= take;

                if lot.volume > 0 {
                    outcome.mutated_lots.push(lot.clone());
                }
            }
        }
        outcome.removed_lots = details.prune_empty();
        if rest > 0 {
            warn!(
                code = %trade.code,
                rest,
                "close trade exceeded qualifying lots"
            );
        }
        let closed = trade.volume - rest;

        // Closed volume leaves at its open cost; the PnL lands in assets.
        let remaining_cost = self
            .details
            .get(&trade.code)
            .and_then(|bi| bi.side(book))
            .map_or(Decimal::ZERO, |d| d.open_cost(multiplier));
        if let Some(position) = self
            .positions
            .get_mut(&trade.code)
            .and_then(|bi| bi.side_mut(book))
        {
            position.volume = position.volume.saturating_sub(closed);
            position.today_volume = position.today_volume.saturating_sub(today_debit_total);
            position.today_close_volume += closed;
            position.frozen_volume = position.frozen_volume.saturating_sub(closed);
            if trade.offset == Offset::CloseToday {
                position.frozen_today_volume = position.frozen_today_volume.saturating_sub(closed);
            }
            position.last_price = trade.price;
            position.open_cost = remaining_cost;
        }

        self.assets.total_close_pnl += outcome.close_pnl;
        self.assets.recompute_totals();
        outcome
    }

    /// Rolls the books into a new trading day: daily collections clear,
    /// today counters freeze into yesterday, frozen resources release.
    pub fn rollover(&mut self, new_day: NaiveDate) {
        self.today_orders.clear();
        self.today_trades.clear();
        self.securities.clear();
        self.tick_subscriptions.clear();
        self.all_ticks = false;

        for bi in self.details.values_mut() {
            for side in [Direction::Long, Direction::Short] {
                if let Some(details) = bi.side_mut(side) {
                    for lot in details.lots_mut() {
                        lot.today_volume = 0;
                    }
                }
            }
        }
        for bi in self.positions.values_mut() {
            for side in [Direction::Long, Direction::Short] {
                if let Some(position) = bi.side_mut(side) {
                    position.pre_volume = position.volume;
                    position.today_volume = 0;
                    position.frozen_volume = 0;
                    position.frozen_today_volume = 0;
                    position.today_open_volume = 0;
                    position.today_close_volume = 0;
                    position.today_commission = Decimal::ZERO;
                }
            }
        }

        self.assets.available += self.assets.frozen_by_order;
        self.assets.frozen_by_order = Decimal::ZERO;
        self.assets.today_commission = Decimal::ZERO;
        self.assets.trading_day = new_day;
        self.trading_day = new_day;
    }

    /// Flat list of every position held.
    #[must_use]
    pub fn all_positions(&self) -> Vec<Position> {
        self.positions
            .values()
            .flat_map(|bi| [bi.long.clone(), bi.short.clone()])
            .flatten()
            .collect()
    }

    /// Flat list of every lot held.
    #[must_use]
    pub fn all_lots(&self) -> Vec<PositionDetail> {
        let mut lots = Vec::new();
        for bi in self.details.values() {
            for side in [Direction::Long, Direction::Short] {
                if let Some(details) = bi.side(side) {
                    lots.extend(details.lots().iter().cloned());
                }
            }
        }
        lots
    }
}

fn qualifies(lot: &PositionDetail, offset: Offset) -> bool {
    match offset {
        Offset::CloseToday => lot.today_volume > 0,
        Offset::CloseYesterday => lot.yesterday_volume() > 0,
        Offset::Close | Offset::Open => lot.volume > 0,
    }
}

fn available(lot: &PositionDetail, offset: Offset) -> u64 {
    match offset {
        Offset::CloseToday => lot.today_volume,
        Offset::CloseYesterday => lot.yesterday_volume(),
        Offset::Close | Offset::Open => lot.volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sirocco_core::data::{OrderRequest, OrderType};
    use sirocco_core::types::Timestamp;

    fn code() -> Code {
        Code::new("rb2410").unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn ledger() -> Ledger {
        Ledger::new("acct".into(), day(), dec!(1000000))
    }

    fn open_trade(direction: Direction, price: Decimal, volume: u64) -> Trade {
        Trade {
            trade_id: "t".into(),
            order_id: "o".into(),
            account_id: "acct".into(),
            code: code(),
            price,
            volume,
            turnover: Decimal::ZERO,
            commission: Decimal::ZERO,
            direction,
            offset: Offset::Open,
            time: Timestamp::ZERO,
        }
    }

    fn close_trade(direction: Direction, offset: Offset, price: Decimal, volume: u64) -> Trade {
        Trade {
            offset,
            ..open_trade(direction, price, volume)
        }
    }

    fn close_order(direction: Direction, offset: Offset, target: Option<Decimal>) -> Order {
        let mut request = OrderRequest {
            code: code(),
            price: Decimal::ZERO,
            volume: 0,
            direction,
            offset,
            order_type: OrderType::Limit,
            min_volume: 0,
            extras: Default::default(),
        };
        if let Some(target) = target {
            request = request.with_close_position_price(target);
        }
        Order::from_request(&request, "o".into(), "acct".into(), Timestamp::ZERO)
    }

    /// Seed a LONG position with lots 100x5, 110x5, 120x5, all yesterday.
    fn seed_long_lots(ledger: &mut Ledger) {
        for price in [100, 110, 120] {
            ledger.apply_open_trade(&open_trade(Direction::Long, Decimal::from(price), 5));
        }
        // Freeze "today" into "yesterday" so plain closes see aged lots.
        ledger.rollover(day().succ_opt().unwrap());
    }

    #[test]
    fn test_direction_offset_book_mapping() {
        assert_eq!(
            Ledger::position_book_for(Direction::Long, Offset::Open),
            Direction::Long
        );
        assert_eq!(
            Ledger::position_book_for(Direction::Short, Offset::Open),
            Direction::Short
        );
        // Closes act on the opposite book: a short close order closes longs.
        assert_eq!(
            Ledger::position_book_for(Direction::Short, Offset::Close),
            Direction::Long
        );
        assert_eq!(
            Ledger::position_book_for(Direction::Long, Offset::CloseToday),
            Direction::Short
        );
    }

    #[test]
    fn test_open_trade_grows_position_and_lots() {
        let mut ledger = ledger();
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(100), 5));
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(100), 3));
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(110), 2));

        let position = ledger.positions[&code()].side(Direction::Long).unwrap();
        assert_eq!(position.volume, 10);
        assert_eq!(position.today_volume, 10);
        assert_eq!(position.today_open_volume, 10);
        assert_eq!(position.open_cost, dec!(1020)); // 100*8 + 110*2

        let details = ledger.details[&code()].side(Direction::Long).unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details.total_volume(), 10);
        // Invariant: position aggregates equal lot sums.
        assert_eq!(position.volume, details.total_volume());
        assert_eq!(position.today_volume, details.total_today_volume());
    }

    #[test]
    fn test_close_by_price_selection() {
        let mut ledger = ledger();
        seed_long_lots(&mut ledger);

        // SHORT-direction close of the LONG book, 7 lots at 112, anchored
        // at 115: consumes 5 from the 110 lot (tie with 120 goes low),
        // then 2 from the 120 lot.
        let order = close_order(Direction::Short, Offset::Close, Some(dec!(115)));
        let trade = close_trade(Direction::Short, Offset::Close, dec!(112), 7);
        let outcome = ledger.apply_close_trade(&order, &trade);

        let details = ledger.details[&code()].side(Direction::Long).unwrap();
        let remaining: Vec<(Decimal, u64)> =
            details.lots().iter().map(|l| (l.price, l.volume)).collect();
        assert_eq!(remaining, vec![(dec!(100), 5), (dec!(120), 3)]);

        // 5*(112-110) + 2*(112-120) = 10 - 16 = -6
        assert_eq!(outcome.close_pnl, dec!(-6));
        assert_eq!(ledger.assets.total_close_pnl, dec!(-6));
        assert_eq!(outcome.removed_lots.len(), 1);
        assert_eq!(outcome.removed_lots[0].price, dec!(110));

        let position = ledger.positions[&code()].side(Direction::Long).unwrap();
        assert_eq!(position.volume, 8);
        assert_eq!(position.today_close_volume, 7);
        assert_eq!(position.open_cost, dec!(860)); // 100*5 + 120*3
    }

    #[test]
    fn test_close_without_anchor_takes_extreme() {
        let mut ledger = ledger();
        seed_long_lots(&mut ledger);

        // No anchor on a short-side close: target +inf, highest lot first.
        let order = close_order(Direction::Short, Offset::Close, None);
        let trade = close_trade(Direction::Short, Offset::Close, dec!(118), 6);
        ledger.apply_close_trade(&order, &trade);

        let details = ledger.details[&code()].side(Direction::Long).unwrap();
        let remaining: Vec<(Decimal, u64)> =
            details.lots().iter().map(|l| (l.price, l.volume)).collect();
        assert_eq!(remaining, vec![(dec!(100), 5), (dec!(110), 4)]);
    }

    #[test]
    fn test_close_short_book_without_anchor_takes_low() {
        let mut ledger = ledger();
        for price in [100, 110] {
            ledger.apply_open_trade(&open_trade(Direction::Short, Decimal::from(price), 5));
        }
        // A long close buys back shorts; no anchor means target -inf.
        let order = close_order(Direction::Long, Offset::Close, None);
        let trade = close_trade(Direction::Long, Offset::CloseToday, dec!(95), 5);
        let outcome = ledger.apply_close_trade(&order, &trade);

        // Short book gains when buying back below open: 5*(100-95).
        assert_eq!(outcome.close_pnl, dec!(25));
        let details = ledger.details[&code()].side(Direction::Short).unwrap();
        assert_eq!(details.lots()[0].price, dec!(110));
    }

    #[test]
    fn test_close_today_only_touches_today_lots() {
        let mut ledger = ledger();
        seed_long_lots(&mut ledger); // all yesterday now
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(130), 2));

        let order = close_order(Direction::Short, Offset::CloseToday, None);
        let trade = close_trade(Direction::Short, Offset::CloseToday, dec!(131), 2);
        ledger.apply_close_trade(&order, &trade);

        let position = ledger.positions[&code()].side(Direction::Long).unwrap();
        assert_eq!(position.volume, 15);
        assert_eq!(position.today_volume, 0);
        // Yesterday lots untouched.
        let details = ledger.details[&code()].side(Direction::Long).unwrap();
        assert_eq!(details.total_volume(), 15);
        assert_eq!(details.total_today_volume(), 0);
    }

    #[test]
    fn test_close_yesterday_skips_today_lots() {
        let mut ledger = ledger();
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(100), 5));
        ledger.rollover(day().succ_opt().unwrap());
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(90), 5));

        // Target -inf would prefer the 90 lot, but it is all today volume.
        let order = close_order(Direction::Short, Offset::CloseYesterday, Some(dec!(0)));
        let trade = close_trade(Direction::Short, Offset::CloseYesterday, dec!(95), 3);
        ledger.apply_close_trade(&order, &trade);

        let details = ledger.details[&code()].side(Direction::Long).unwrap();
        let remaining: Vec<(Decimal, u64)> =
            details.lots().iter().map(|l| (l.price, l.volume)).collect();
        assert_eq!(remaining, vec![(dec!(90), 5), (dec!(100), 2)]);
        let position = ledger.positions[&code()].side(Direction::Long).unwrap();
        assert_eq!(position.today_volume, 5);
        assert_eq!(position.volume, 7);
    }

    #[test]
    fn test_plain_close_debits_today_after_yesterday() {
        let mut ledger = ledger();
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(100), 2));
        ledger.rollover(day().succ_opt().unwrap());
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(100), 3));
        // One lot at 100: volume 5, today 3, yesterday 2.

        let order = close_order(Direction::Short, Offset::Close, None);
        let trade = close_trade(Direction::Short, Offset::Close, dec!(101), 4);
        ledger.apply_close_trade(&order, &trade);

        let details = ledger.details[&code()].side(Direction::Long).unwrap();
        assert_eq!(details.lots()[0].volume, 1);
        // close 4 = 2 yesterday + 2 today
        assert_eq!(details.lots()[0].today_volume, 1);
        let position = ledger.positions[&code()].side(Direction::Long).unwrap();
        assert_eq!(position.today_volume, 1);
    }

    #[test]
    fn test_coerced_offset_books_under_trade_offset() {
        let mut ledger = ledger();
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(100), 5));

        // Order requested a plain close; the backend coerced the fill to
        // close-today. The booking follows the trade.
        let order = close_order(Direction::Short, Offset::Close, None);
        let trade = close_trade(Direction::Short, Offset::CloseToday, dec!(102), 2);
        ledger.apply_close_trade(&order, &trade);

        let position = ledger.positions[&code()].side(Direction::Long).unwrap();
        assert_eq!(position.today_volume, 3);
        assert_eq!(position.volume, 3);
    }

    #[test]
    fn test_freeze_unfreeze_close_order() {
        let mut ledger = ledger();
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(100), 5));

        let mut order = close_order(Direction::Short, Offset::Close, None);
        order.volume = 4;
        ledger.freeze_order(&order);
        {
            let position = ledger.positions[&code()].side(Direction::Long).unwrap();
            assert_eq!(position.frozen_volume, 4);
            assert_eq!(position.closeable_volume(), 1);
        }

        // One lot filled, the rest canceled: only the unfilled part thaws.
        order.filled_volume = 1;
        let trade = close_trade(Direction::Short, Offset::Close, dec!(101), 1);
        ledger.apply_close_trade(&order, &trade);
        ledger.unfreeze_order(&order);

        let position = ledger.positions[&code()].side(Direction::Long).unwrap();
        assert_eq!(position.volume, 4);
        assert_eq!(position.frozen_volume, 0);
    }

    #[test]
    fn test_freeze_unfreeze_open_order() {
        let mut ledger = ledger();
        let request = OrderRequest::limit(code(), dec!(100), 2, Direction::Long, Offset::Open);
        let mut order = Order::from_request(&request, "o".into(), "acct".into(), Timestamp::ZERO);
        order.frozen_cash = dec!(2000);

        ledger.freeze_order(&order);
        assert_eq!(ledger.assets.frozen_by_order, dec!(2000));
        assert_eq!(ledger.assets.available, dec!(998000));

        ledger.unfreeze_order(&order);
        assert_eq!(ledger.assets.frozen_by_order, Decimal::ZERO);
        assert_eq!(ledger.assets.available, dec!(1000000));
    }

    #[test]
    fn test_commission_accrual() {
        let mut ledger = ledger();
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(100), 5));
        let mut trade = open_trade(Direction::Long, dec!(100), 5);
        trade.commission = dec!(12);
        ledger.add_commission(&trade);

        assert_eq!(ledger.assets.today_commission, dec!(12));
        assert_eq!(ledger.assets.total_commission, dec!(12));
        assert_eq!(ledger.assets.total, dec!(999988));
        let position = ledger.positions[&code()].side(Direction::Long).unwrap();
        assert_eq!(position.today_commission, dec!(12));
    }

    #[test]
    fn test_rollover_freezes_today_into_yesterday() {
        let mut ledger = ledger();
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(100), 5));
        ledger.assets.frozen_by_order = dec!(1000);
        ledger.assets.available = dec!(4000);
        ledger.assets.today_commission = dec!(50);
        let mut order = close_order(Direction::Short, Offset::Close, None);
        order.volume = 2;
        ledger.freeze_order(&order);

        let new_day = day().succ_opt().unwrap();
        ledger.rollover(new_day);

        assert_eq!(ledger.assets.frozen_by_order, Decimal::ZERO);
        assert_eq!(ledger.assets.available, dec!(5000));
        assert_eq!(ledger.assets.today_commission, Decimal::ZERO);
        assert_eq!(ledger.assets.trading_day, new_day);
        assert!(ledger.today_orders.is_empty());
        assert!(ledger.today_trades.is_empty());
        assert!(ledger.tick_subscriptions.is_empty());

        let position = ledger.positions[&code()].side(Direction::Long).unwrap();
        assert_eq!(position.pre_volume, 5);
        assert_eq!(position.today_volume, 0);
        assert_eq!(position.frozen_volume, 0);
        assert_eq!(position.yesterday_volume(), 5);
        let details = ledger.details[&code()].side(Direction::Long).unwrap();
        assert_eq!(details.total_today_volume(), 0);
    }

    #[test]
    fn test_rollover_idempotent() {
        let mut ledger = ledger();
        ledger.apply_open_trade(&open_trade(Direction::Long, dec!(100), 5));
        let new_day = day().succ_opt().unwrap();
        ledger.rollover(new_day);
        let positions_once = ledger.all_positions();
        let assets_once = ledger.assets.clone();
        ledger.rollover(new_day);
        assert_eq!(ledger.all_positions(), positions_once);
        assert_eq!(ledger.assets, assets_once);
    }
}
