//! Persistence port for accounting state.
//!
//! The facade persists accounting state through the narrow [`DataStore`]
//! port; the storage engine behind it is external. [`MemoryStore`] is the
//! in-process implementation used by tests and as the default backend.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::data::{Assets, Direction, Order, OrderStatus, Position, PositionDetail, Trade};
use crate::error::StoreError;
use crate::types::Code;

/// Asynchronous CRUD port for persisted accounting state.
///
/// `None` filter parameters mean "any". Deletes return the number of
/// affected records.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Saves (upserts) an asset record keyed by (account, trading day).
    async fn save_assets(&self, assets: &Assets) -> Result<(), StoreError>;

    /// Queries asset records for an account, optionally for one day.
    async fn query_assets(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
    ) -> Result<Vec<Assets>, StoreError>;

    /// Deletes asset records.
    async fn delete_assets(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
    ) -> Result<u64, StoreError>;

    /// Saves (upserts) a position keyed by (account, code, direction).
    async fn save_position(&self, position: &Position) -> Result<(), StoreError>;

    /// Queries positions with optional code/direction filters.
    async fn query_positions(
        &self,
        account_id: &str,
        code: Option<&Code>,
        direction: Option<Direction>,
    ) -> Result<Vec<Position>, StoreError>;

    /// Deletes positions, optionally restricted to one code.
    async fn delete_positions(
        &self,
        account_id: &str,
        code: Option<&Code>,
    ) -> Result<u64, StoreError>;

    /// Saves (upserts) a lot keyed by (account, code, direction, price).
    async fn save_position_detail(&self, lot: &PositionDetail) -> Result<(), StoreError>;

    /// Queries lots with optional code/direction filters.
    async fn query_position_details(
        &self,
        account_id: &str,
        code: Option<&Code>,
        direction: Option<Direction>,
    ) -> Result<Vec<PositionDetail>, StoreError>;

    /// Deletes the lot at an exact price, if present.
    async fn delete_position_detail(
        &self,
        account_id: &str,
        code: &Code,
        direction: Direction,
        price: Decimal,
    ) -> Result<u64, StoreError>;

    /// Saves (upserts) an order under its trading day.
    async fn save_order(&self, trading_day: NaiveDate, order: &Order) -> Result<(), StoreError>;

    /// Queries orders with optional day/code/status filters.
    async fn query_orders(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
        code: Option<&Code>,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, StoreError>;

    /// Deletes orders, optionally restricted to one day.
    async fn delete_orders(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
    ) -> Result<u64, StoreError>;

    /// Saves (upserts) a trade under its trading day.
    async fn save_trade(&self, trading_day: NaiveDate, trade: &Trade) -> Result<(), StoreError>;

    /// Queries trades with optional day/code/order filters.
    async fn query_trades(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
        code: Option<&Code>,
        order_id: Option<&str>,
    ) -> Result<Vec<Trade>, StoreError>;

    /// Deletes trades, optionally restricted to one day.
    async fn delete_trades(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
    ) -> Result<u64, StoreError>;

    /// Records the last known trading day for an account.
    async fn save_trading_day(
        &self,
        account_id: &str,
        trading_day: NaiveDate,
    ) -> Result<(), StoreError>;

    /// Returns the last recorded trading day for an account.
    async fn query_trading_day(&self, account_id: &str) -> Result<Option<NaiveDate>, StoreError>;

    /// Saves a key-value property for an account.
    async fn save_property(
        &self,
        account_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError>;

    /// Returns a property value, if set.
    async fn query_property(
        &self,
        account_id: &str,
        key: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Returns a property value, falling back to `default` without writing.
    async fn query_property_or_default(
        &self,
        account_id: &str,
        key: &str,
        default: &str,
    ) -> Result<String, StoreError> {
        Ok(self
            .query_property(account_id, key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Returns a property value, writing and returning `default` if unset.
    async fn query_property_or_put(
        &self,
        account_id: &str,
        key: &str,
        default: &str,
    ) -> Result<String, StoreError> {
        if let Some(value) = self.query_property(account_id, key).await? {
            return Ok(value);
        }
        self.save_property(account_id, key, default).await?;
        Ok(default.to_string())
    }
}

type OrderKey = (String, NaiveDate, String);
type TradeKey = (String, NaiveDate, String);
type PositionKey = (String, Code, Direction);
type LotKey = (String, Code, Direction, Decimal);

/// In-process [`DataStore`] backed by concurrent maps.
#[derive(Default)]
pub struct MemoryStore {
    assets: DashMap<(String, NaiveDate), Assets>,
    positions: DashMap<PositionKey, Position>,
    lots: DashMap<LotKey, PositionDetail>,
    orders: DashMap<OrderKey, Order>,
    trades: DashMap<TradeKey, Trade>,
    trading_days: DashMap<String, NaiveDate>,
    properties: DashMap<(String, String), String>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn save_assets(&self, assets: &Assets) -> Result<(), StoreError> {
        self.assets.insert(
            (assets.account_id.clone(), assets.trading_day),
            assets.clone(),
        );
        Ok(())
    }

    async fn query_assets(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
    ) -> Result<Vec<Assets>, StoreError> {
        Ok(self
            .assets
            .iter()
            .filter(|e| {
                e.key().0 == account_id && trading_day.is_none_or(|d| e.key().1 == d)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn delete_assets(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
    ) -> Result<u64, StoreError> {
        let before = self.assets.len();
        self.assets
            .retain(|k, _| !(k.0 == account_id && trading_day.is_none_or(|d| k.1 == d)));
        Ok((before - self.assets.len()) as u64)
    }

    async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        self.positions.insert(
            (
                position.account_id.clone(),
                position.code.clone(),
                position.direction,
            ),
            position.clone(),
        );
        Ok(())
    }

    async fn query_positions(
        &self,
        account_id: &str,
        code: Option<&Code>,
        direction: Option<Direction>,
    ) -> Result<Vec<Position>, StoreError> {
        Ok(self
            .positions
            .iter()
            .filter(|e| {
                let (acct, c, d) = e.key();
                acct == account_id
                    && code.is_none_or(|want| c == want)
                    && direction.is_none_or(|want| *d == want)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn delete_positions(
        &self,
        account_id: &str,
        code: Option<&Code>,
    ) -> Result<u64, StoreError> {
        let before = self.positions.len();
        self.positions
            .retain(|k, _| !(k.0 == account_id && code.is_none_or(|want| &k.1 == want)));
        Ok((before - self.positions.len()) as u64)
    }

    async fn save_position_detail(&self, lot: &PositionDetail) -> Result<(), StoreError> {
        self.lots.insert(
            (
                lot.account_id.clone(),
                lot.code.clone(),
                lot.direction,
                lot.price,
            ),
            lot.clone(),
        );
        Ok(())
    }

    async fn query_position_details(
        &self,
        account_id: &str,
        code: Option<&Code>,
        direction: Option<Direction>,
    ) -> Result<Vec<PositionDetail>, StoreError> {
        Ok(self
            .lots
            .iter()
            .filter(|e| {
                let (acct, c, d, _) = e.key();
                acct == account_id
                    && code.is_none_or(|want| c == want)
                    && direction.is_none_or(|want| *d == want)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn delete_position_detail(
        &self,
        account_id: &str,
        code: &Code,
        direction: Direction,
        price: Decimal,
    ) -> Result<u64, StoreError> {
        let key = (account_id.to_string(), code.clone(), direction, price);
        Ok(u64::from(self.lots.remove(&key).is_some()))
    }

    async fn save_order(&self, trading_day: NaiveDate, order: &Order) -> Result<(), StoreError> {
        self.orders.insert(
            (order.account_id.clone(), trading_day, order.order_id.clone()),
            order.clone(),
        );
        Ok(())
    }

    async fn query_orders(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
        code: Option<&Code>,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .orders
            .iter()
            .filter(|e| {
                let (acct, day, _) = e.key();
                acct == account_id
                    && trading_day.is_none_or(|d| *day == d)
                    && code.is_none_or(|want| &e.value().code == want)
                    && status.is_none_or(|want| e.value().status == want)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn delete_orders(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
    ) -> Result<u64, StoreError> {
        let before = self.orders.len();
        self.orders
            .retain(|k, _| !(k.0 == account_id && trading_day.is_none_or(|d| k.1 == d)));
        Ok((before - self.orders.len()) as u64)
    }

    async fn save_trade(&self, trading_day: NaiveDate, trade: &Trade) -> Result<(), StoreError> {
        self.trades.insert(
            (trade.account_id.clone(), trading_day, trade.trade_id.clone()),
            trade.clone(),
        );
        Ok(())
    }

    async fn query_trades(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
        code: Option<&Code>,
        order_id: Option<&str>,
    ) -> Result<Vec<Trade>, StoreError> {
        Ok(self
            .trades
            .iter()
            .filter(|e| {
                let (acct, day, _) = e.key();
                acct == account_id
                    && trading_day.is_none_or(|d| *day == d)
                    && code.is_none_or(|want| &e.value().code == want)
                    && order_id.is_none_or(|want| e.value().order_id == want)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn delete_trades(
        &self,
        account_id: &str,
        trading_day: Option<NaiveDate>,
    ) -> Result<u64, StoreError> {
        let before = self.trades.len();
        self.trades
            .retain(|k, _| !(k.0 == account_id && trading_day.is_none_or(|d| k.1 == d)));
        Ok((before - self.trades.len()) as u64)
    }

    async fn save_trading_day(
        &self,
        account_id: &str,
        trading_day: NaiveDate,
    ) -> Result<(), StoreError> {
        self.trading_days
            .insert(account_id.to_string(), trading_day);
        Ok(())
    }

    async fn query_trading_day(&self, account_id: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.trading_days.get(account_id).map(|d| *d))
    }

    async fn save_property(
        &self,
        account_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        self.properties
            .insert((account_id.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn query_property(
        &self,
        account_id: &str,
        key: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .properties
            .get(&(account_id.to_string(), key.to_string()))
            .map(|v| v.clone()))
    }
}
