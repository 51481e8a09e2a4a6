//! Order and trade types for trading operations.
//!
//! This module provides:
//! - [`Direction`] - trade-side direction (long/short)
//! - [`Offset`] - intent relative to existing position (open/close variants)
//! - [`OrderType`] / [`OrderStatus`] - execution constraint and lifecycle
//! - [`OrderRequest`] - parameters for submitting a new order
//! - [`Order`] - an order with its mutable lifecycle state
//! - [`Trade`] - an immutable fill record

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::{Code, Timestamp};

/// Extras annotation key: requested close price lot anchor.
pub const EXTRA_CLOSE_POSITION_PRICE: &str = "close_position_price";
/// Extras annotation key: FAK minimum fill volume.
pub const EXTRA_MIN_VOLUME: &str = "min_volume";

/// Free-form string annotations carried by orders and requests.
pub type Extras = HashMap<String, String>;

/// Trade-side direction.
///
/// This is the direction of the trade itself, not of the position it acts
/// on: a `Long` order with a close offset closes a *short* position and
/// vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Buy side.
    Long,
    /// Sell side.
    Short,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Returns the PnL sign for a position held in this direction.
    #[must_use]
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => -Decimal::ONE,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Directional intent of an order relative to existing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Offset {
    /// Open new position.
    Open,
    /// Close position regardless of age.
    Close,
    /// Close position opened today.
    CloseToday,
    /// Close position carried over from a previous day.
    CloseYesterday,
}

impl Offset {
    /// Returns true for any of the close variants.
    #[must_use]
    pub const fn is_close(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::CloseToday => "CLOSE_TODAY",
            Self::CloseYesterday => "CLOSE_YESTERDAY",
        };
        write!(f, "{s}")
    }
}

/// Order execution constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Rests at the limit price or better.
    #[default]
    Limit,
    /// Executes at any available price.
    Market,
    /// Fill-and-kill: fill what is immediately available, cancel the rest.
    Fak,
    /// Fill-or-kill: fill completely and immediately or cancel entirely.
    Fok,
    /// Stop order, triggered at a stop price.
    Stop,
    /// Broker-specific order type.
    Custom,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Limit => "LIMIT",
            Self::Market => "MARKET",
            Self::Fak => "FAK",
            Self::Fok => "FOK",
            Self::Stop => "STOP",
            Self::Custom => "CUSTOM",
        };
        write!(f, "{s}")
    }
}

/// Order lifecycle state.
///
/// # State transitions
///
/// ```text
/// Submitting -> Accepted -> PartiallyFilled -> Filled
///                        -> Canceling -> Canceled
///                        -> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Sent, not yet acknowledged.
    #[default]
    Submitting,
    /// Acknowledged, resting unfilled.
    Accepted,
    /// Some volume filled, remainder resting.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancel requested, not yet confirmed.
    Canceling,
    /// Canceled; unfilled volume released.
    Canceled,
    /// Rejected or failed.
    Error,
}

impl OrderStatus {
    /// Returns true if the order has reached a terminal state.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Error)
    }

    /// Returns true while a cancel request can still be honored.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(self, Self::Submitting | Self::Accepted | Self::PartiallyFilled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitting => "SUBMITTING",
            Self::Accepted => "ACCEPTED",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceling => "CANCELING",
            Self::Canceled => "CANCELED",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// Parameters for submitting a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Instrument code.
    pub code: Code,
    /// Limit price (ignored by market orders).
    pub price: Decimal,
    /// Order volume in lots.
    pub volume: u64,
    /// Trade-side direction.
    pub direction: Direction,
    /// Open/close intent.
    pub offset: Offset,
    /// Execution constraint.
    pub order_type: OrderType,
    /// Minimum fill volume for FAK orders (0 = no floor).
    #[serde(default)]
    pub min_volume: u64,
    /// Free-form annotations.
    #[serde(default)]
    pub extras: Extras,
}

impl OrderRequest {
    /// Creates a limit order request.
    #[must_use]
    pub fn limit(
        code: Code,
        price: Decimal,
        volume: u64,
        direction: Direction,
        offset: Offset,
    ) -> Self {
        Self {
            code,
            price,
            volume,
            direction,
            offset,
            order_type: OrderType::Limit,
            min_volume: 0,
            extras: Extras::new(),
        }
    }

    /// Creates a market order request.
    #[must_use]
    pub fn market(code: Code, volume: u64, direction: Direction, offset: Offset) -> Self {
        Self {
            code,
            price: Decimal::ZERO,
            volume,
            direction,
            offset,
            order_type: OrderType::Market,
            min_volume: 0,
            extras: Extras::new(),
        }
    }

    /// Overrides the order type.
    #[must_use]
    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    /// Sets the FAK minimum fill volume.
    #[must_use]
    pub fn with_min_volume(mut self, min_volume: u64) -> Self {
        self.min_volume = min_volume;
        self
    }

    /// Anchors close-lot selection at the given open price.
    #[must_use]
    pub fn with_close_position_price(mut self, price: Decimal) -> Self {
        self.extras
            .insert(EXTRA_CLOSE_POSITION_PRICE.to_string(), price.to_string());
        self
    }
}

/// An order with its mutable lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order id, unique within the account.
    pub order_id: String,
    /// Owning account id.
    pub account_id: String,
    /// Instrument code.
    pub code: Code,
    /// Limit price.
    pub price: Decimal,
    /// Requested volume in lots.
    pub volume: u64,
    /// Trade-side direction.
    pub direction: Direction,
    /// Open/close intent.
    pub offset: Offset,
    /// Execution constraint.
    pub order_type: OrderType,
    /// Lifecycle state.
    pub status: OrderStatus,
    /// Human-readable status detail.
    pub status_msg: String,
    /// Filled volume so far.
    pub filled_volume: u64,
    /// Filled turnover so far.
    pub turnover: Decimal,
    /// Volume-weighted average fill price.
    pub avg_fill_price: Decimal,
    /// Cash frozen by this order (open orders only).
    pub frozen_cash: Decimal,
    /// Commission accrued so far.
    pub commission: Decimal,
    /// Submission time.
    pub create_time: Timestamp,
    /// Last state-change time.
    pub update_time: Timestamp,
    /// Free-form annotations.
    #[serde(default)]
    pub extras: Extras,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Long
    }
}

impl Default for Offset {
    fn default() -> Self {
        Self::Open
    }
}

impl Order {
    /// Creates an order from a request, in `Submitting` state.
    #[must_use]
    pub fn from_request(request: &OrderRequest, order_id: String, account_id: String, now: Timestamp) -> Self {
        let mut extras = request.extras.clone();
        if request.min_volume > 0 {
            extras.insert(EXTRA_MIN_VOLUME.to_string(), request.min_volume.to_string());
        }
        Self {
            order_id,
            account_id,
            code: request.code.clone(),
            price: request.price,
            volume: request.volume,
            direction: request.direction,
            offset: request.offset,
            order_type: request.order_type,
            status: OrderStatus::Submitting,
            status_msg: String::new(),
            filled_volume: 0,
            turnover: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            frozen_cash: Decimal::ZERO,
            commission: Decimal::ZERO,
            create_time: now,
            update_time: now,
            extras,
        }
    }

    /// Returns the volume not yet filled.
    #[must_use]
    pub fn unfilled_volume(&self) -> u64 {
        self.volume.saturating_sub(self.filled_volume)
    }

    /// Returns true if the order has reached a terminal state.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    /// Returns the close-lot anchor price annotation, if present.
    #[must_use]
    pub fn close_position_price(&self) -> Option<Decimal> {
        self.extras
            .get(EXTRA_CLOSE_POSITION_PRICE)
            .and_then(|s| s.parse().ok())
    }

    /// Returns the FAK minimum fill volume annotation, if present.
    #[must_use]
    pub fn min_volume(&self) -> Option<u64> {
        self.extras.get(EXTRA_MIN_VOLUME).and_then(|s| s.parse().ok())
    }
}

/// Immutable fill record referencing an [`Order`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Trade id, unique within the account.
    pub trade_id: String,
    /// Id of the filled order.
    pub order_id: String,
    /// Owning account id.
    pub account_id: String,
    /// Instrument code.
    pub code: Code,
    /// Fill price.
    pub price: Decimal,
    /// Fill volume in lots.
    pub volume: u64,
    /// Fill turnover (price x volume x multiplier).
    pub turnover: Decimal,
    /// Commission charged for this fill.
    pub commission: Decimal,
    /// Trade-side direction.
    pub direction: Direction,
    /// Open/close intent, as reported by the backend.
    pub offset: Offset,
    /// Fill time.
    pub time: Timestamp,
}
