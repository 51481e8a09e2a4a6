//! Data model for the trading facade.
//!
//! Value types shared by every component: market data ([`Tick`], [`Bar`]),
//! order lifecycle ([`Order`], [`Trade`]), accounting ([`Position`],
//! [`PositionDetail`], [`Assets`]) and instrument metadata ([`Security`]).

mod assets;
mod bar;
mod order;
mod position;
mod security;
mod tick;

pub use assets::Assets;
pub use bar::Bar;
pub use order::{
    Direction, Extras, Offset, Order, OrderRequest, OrderStatus, OrderType, Trade,
    EXTRA_CLOSE_POSITION_PRICE, EXTRA_MIN_VOLUME,
};
pub use position::{BiPosition, BiPositionDetails, Position, PositionDetail, PositionDetails};
pub use security::{ProductClass, Security};
pub use tick::{MarketStatus, Tick};

use thiserror::Error;

/// Validation error for data-model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataValidationError {
    /// A price relation (high/low/open/close) is inconsistent.
    #[error("invalid price relation: {0}")]
    InvalidPriceRelation(String),

    /// Bar time bounds do not span exactly one interval.
    #[error("invalid bar bounds [{start}, {end}) for interval {interval_secs}s")]
    InvalidTimeBounds {
        /// Start of the bar in epoch milliseconds.
        start: i64,
        /// End of the bar in epoch milliseconds.
        end: i64,
        /// Bar interval in seconds.
        interval_secs: u32,
    },
}
