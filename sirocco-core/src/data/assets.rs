//! Account asset summary.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account-level asset summary.
///
/// `total` and `available` are derived from the other fields via
/// [`Assets::recompute_totals`]:
///
/// ```text
/// total     = initial_cash + total_close_pnl - total_commission + position_pnl
/// available = total - position_value - frozen_by_order
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assets {
    /// Owning account id.
    pub account_id: String,
    /// Current trading day.
    pub trading_day: NaiveDate,
    /// Total equity.
    pub total: Decimal,
    /// Cash available for new orders.
    pub available: Decimal,
    /// Market value of open positions.
    pub position_value: Decimal,
    /// Unrealized PnL of open positions.
    pub position_pnl: Decimal,
    /// Cash frozen by pending open orders.
    pub frozen_by_order: Decimal,
    /// Commission accrued today.
    pub today_commission: Decimal,
    /// Cash deposited at account creation.
    pub initial_cash: Decimal,
    /// Cumulative realized close PnL.
    pub total_close_pnl: Decimal,
    /// Cumulative commission.
    pub total_commission: Decimal,
}

impl Assets {
    /// Creates a fresh asset record with the given starting cash.
    #[must_use]
    pub fn new(account_id: String, trading_day: NaiveDate, initial_cash: Decimal) -> Self {
        let mut assets = Self {
            account_id,
            trading_day,
            initial_cash,
            ..Self::default()
        };
        assets.recompute_totals();
        assets
    }

    /// Recomputes `total` and `available` from the primary fields.
    pub fn recompute_totals(&mut self) {
        self.total =
            self.initial_cash + self.total_close_pnl - self.total_commission + self.position_pnl;
        self.available = self.total - self.position_value - self.frozen_by_order;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_assets_totals() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let assets = Assets::new("acct".into(), day, dec!(1000000));
        assert_eq!(assets.total, dec!(1000000));
        assert_eq!(assets.available, dec!(1000000));
    }

    #[test]
    fn test_recompute_totals() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut assets = Assets::new("acct".into(), day, dec!(1000000));
        assets.total_close_pnl = dec!(5000);
        assets.total_commission = dec!(200);
        assets.position_pnl = dec!(-300);
        assets.position_value = dec!(40000);
        assets.frozen_by_order = dec!(10000);
        assets.recompute_totals();
        assert_eq!(assets.total, dec!(1004500));
        assert_eq!(assets.available, dec!(954500));
    }
}
