//! Instrument metadata.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Code;

use super::Offset;

/// Instrument product class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductClass {
    /// Exchange-traded futures contract.
    #[default]
    Futures,
    /// Exchange-traded option.
    Option,
    /// Listed stock.
    Stock,
}

impl fmt::Display for ProductClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Futures => "FUTURES",
            Self::Option => "OPTION",
            Self::Stock => "STOCK",
        };
        write!(f, "{s}")
    }
}

/// Instrument metadata used by fee, margin and valuation calculations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    /// Instrument code.
    pub code: Code,
    /// Human-readable name.
    pub name: String,
    /// Listing exchange id.
    pub exchange: String,
    /// Product class.
    pub product_class: ProductClass,
    /// Contract multiplier (value per price point per lot).
    pub multiplier: Decimal,
    /// Minimum price increment.
    pub price_tick: Decimal,
    /// Margin ratio for open orders.
    pub margin_ratio: Decimal,
    /// True if fees are a ratio of turnover, false if per lot.
    pub fee_by_ratio: bool,
    /// Open fee (ratio or per lot).
    pub open_fee: Decimal,
    /// Close fee (ratio or per lot).
    pub close_fee: Decimal,
    /// Close-today fee (ratio or per lot).
    pub close_today_fee: Decimal,
}

impl Security {
    /// Returns the fee rate applicable to the given offset.
    #[must_use]
    pub fn fee_for(&self, offset: Offset) -> Decimal {
        match offset {
            Offset::Open => self.open_fee,
            Offset::Close | Offset::CloseYesterday => self.close_fee,
            Offset::CloseToday => self.close_today_fee,
        }
    }

    /// Commission for a fill of `volume` lots at `price`.
    #[must_use]
    pub fn commission(&self, offset: Offset, price: Decimal, volume: u64) -> Decimal {
        let fee = self.fee_for(offset);
        if self.fee_by_ratio {
            price * Decimal::from(volume) * self.multiplier * fee
        } else {
            Decimal::from(volume) * fee
        }
    }
}
