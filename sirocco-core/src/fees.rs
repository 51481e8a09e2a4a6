//! Fee, margin and valuation calculations.

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::data::{Offset, Order, Position, Security, Trade};
use crate::types::Code;

/// Synchronous fee/margin/valuation capability.
///
/// These are pure computations over instrument metadata; they never
/// suspend, so event handlers and the matching simulator may call them
/// inline.
pub trait FeeCalculator: Send + Sync {
    /// Returns instrument metadata for `code`, if known.
    fn security(&self, code: &Code) -> Option<Security>;

    /// Fills the derived fields of an order: `avg_fill_price` from the
    /// accumulated turnover and, for open orders, `frozen_cash` (margin
    /// plus estimated open commission).
    fn calculate_order(&self, order: &mut Order);

    /// Fills `turnover` and `commission` of a trade from its price and
    /// volume.
    fn calculate_trade(&self, trade: &mut Trade);

    /// Fills the derived fields of a position: `value`, `pnl` at
    /// `last_price`.
    fn calculate_position(&self, position: &mut Position);
}

/// [`FeeCalculator`] backed by a shared security table.
#[derive(Default)]
pub struct SecurityTable {
    securities: DashMap<Code, Security>,
}

impl SecurityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the metadata for a security.
    pub fn put(&self, security: Security) {
        self.securities.insert(security.code.clone(), security);
    }

    /// Number of securities known.
    #[must_use]
    pub fn len(&self) -> usize {
        self.securities.len()
    }

    /// Returns true if no securities are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }
}

impl FeeCalculator for SecurityTable {
    fn security(&self, code: &Code) -> Option<Security> {
        self.securities.get(code).map(|s| s.clone())
    }

    fn calculate_order(&self, order: &mut Order) {
        let Some(sec) = self.security(&order.code) else {
            return;
        };
        if order.filled_volume > 0 {
            order.avg_fill_price =
                order.turnover / (Decimal::from(order.filled_volume) * sec.multiplier);
        }
        if order.offset == Offset::Open {
            let notional = order.price * Decimal::from(order.volume) * sec.multiplier;
            order.frozen_cash =
                notional * sec.margin_ratio + sec.commission(Offset::Open, order.price, order.volume);
        }
    }

    fn calculate_trade(&self, trade: &mut Trade) {
        let Some(sec) = self.security(&trade.code) else {
            return;
        };
        trade.turnover = trade.price * Decimal::from(trade.volume) * sec.multiplier;
        trade.commission = sec.commission(trade.offset, trade.price, trade.volume);
    }

    fn calculate_position(&self, position: &mut Position) {
        let Some(sec) = self.security(&position.code) else {
            return;
        };
        let volume = Decimal::from(position.volume);
        position.value = position.last_price * volume * sec.multiplier;
        let avg = position.avg_open_price(sec.multiplier);
        position.pnl =
            (position.last_price - avg) * volume * sec.multiplier * position.direction.sign();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Direction, OrderRequest, ProductClass};
    use crate::types::Timestamp;
    use rust_decimal_macros::dec;

    fn table() -> SecurityTable {
        let table = SecurityTable::new();
        table.put(Security {
            code: Code::new("rb2410").unwrap(),
            name: "rebar 2410".into(),
            exchange: "SHFE".into(),
            product_class: ProductClass::Futures,
            multiplier: dec!(10),
            price_tick: dec!(1),
            margin_ratio: dec!(0.1),
            fee_by_ratio: false,
            open_fee: dec!(3),
            close_fee: dec!(3),
            close_today_fee: dec!(6),
        });
        table
    }

    #[test]
    fn test_calculate_trade() {
        let table = table();
        let mut trade = Trade {
            code: Code::new("rb2410").unwrap(),
            price: dec!(3500),
            volume: 2,
            offset: Offset::CloseToday,
            direction: Direction::Short,
            ..Trade::default()
        };
        table.calculate_trade(&mut trade);
        assert_eq!(trade.turnover, dec!(70000));
        assert_eq!(trade.commission, dec!(12));
    }

    #[test]
    fn test_calculate_order_open_margin() {
        let table = table();
        let req = OrderRequest::limit(
            Code::new("rb2410").unwrap(),
            dec!(3500),
            2,
            Direction::Long,
            Offset::Open,
        );
        let mut order = Order::from_request(&req, "a_1_0".into(), "a".into(), Timestamp::ZERO);
        table.calculate_order(&mut order);
        // margin 3500*2*10*0.1 = 7000 plus 2 lots open fee
        assert_eq!(order.frozen_cash, dec!(7006));
    }

    #[test]
    fn test_calculate_order_avg_fill() {
        let table = table();
        let req = OrderRequest::limit(
            Code::new("rb2410").unwrap(),
            dec!(3500),
            4,
            Direction::Long,
            Offset::Open,
        );
        let mut order = Order::from_request(&req, "a_1_0".into(), "a".into(), Timestamp::ZERO);
        order.filled_volume = 2;
        order.turnover = dec!(70020);
        table.calculate_order(&mut order);
        assert_eq!(order.avg_fill_price, dec!(3501));
    }

    #[test]
    fn test_calculate_position_pnl_sign() {
        let table = table();
        let mut long = Position::new("a".into(), Code::new("rb2410").unwrap(), Direction::Long);
        long.volume = 2;
        long.open_cost = dec!(70000); // avg 3500
        long.last_price = dec!(3510);
        table.calculate_position(&mut long);
        assert_eq!(long.pnl, dec!(200));
        assert_eq!(long.value, dec!(70200));

        let mut short = Position::new("a".into(), Code::new("rb2410").unwrap(), Direction::Short);
        short.volume = 2;
        short.open_cost = dec!(70000);
        short.last_price = dec!(3510);
        table.calculate_position(&mut short);
        assert_eq!(short.pnl, dec!(-200));
    }

    #[test]
    fn test_unknown_security_is_noop() {
        let table = SecurityTable::new();
        let mut trade = Trade {
            code: Code::new("zz9999").unwrap(),
            price: dec!(100),
            volume: 1,
            ..Trade::default()
        };
        table.calculate_trade(&mut trade);
        assert_eq!(trade.turnover, Decimal::ZERO);
        assert_eq!(trade.commission, Decimal::ZERO);
    }
}
