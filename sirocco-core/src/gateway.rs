//! Broker gateway facade trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::bus::EventBus;
use crate::data::{
    Assets, Direction, Extras, Order, OrderRequest, Position, PositionDetail, Security, Tick,
    Trade,
};
use crate::error::GatewayError;
use crate::fees::FeeCalculator;
use crate::types::Code;

/// Unified broker facade over heterogeneous backends.
///
/// Implemented by concrete broker-wire adapters and by the virtual
/// sub-account overlay alike, so overlays compose over any parent by
/// interface, never by concrete type. Long-running operations are
/// suspending; pure computations come from the [`FeeCalculator`]
/// supertrait.
///
/// Each instance owns an [`EventBus`] on which it publishes its
/// [`crate::event::BrokerEvent`] stream.
#[async_trait]
pub trait BrokerGateway: FeeCalculator + Send + Sync {
    /// Stable gateway display name.
    fn gateway_name(&self) -> &str;

    /// Account id under which orders and accounting are kept.
    fn account_id(&self) -> &str;

    /// Unique id of this adapter instance, used as event `source_id`.
    fn source_id(&self) -> &str;

    /// The event bus this instance publishes on.
    fn event_bus(&self) -> &Arc<EventBus>;

    /// Returns true once the gateway is connected and logged in.
    fn is_connected(&self) -> bool;

    /// Connects and restores session state.
    async fn connect(&self, extras: Option<Extras>) -> Result<(), GatewayError>;

    /// Releases all resources; in-flight orders are not cancelled.
    async fn close(&self);

    /// Returns the current trading day.
    async fn trading_day(&self) -> Result<NaiveDate, GatewayError>;

    /// Returns the latest tick for `code`.
    async fn query_last_tick(
        &self,
        code: &Code,
        use_cache: bool,
    ) -> Result<Option<Tick>, GatewayError>;

    /// Returns instrument metadata for `code`.
    async fn query_security(
        &self,
        code: &Code,
        use_cache: bool,
    ) -> Result<Option<Security>, GatewayError>;

    /// Returns all known instrument metadata.
    async fn query_all_securities(&self, use_cache: bool) -> Result<Vec<Security>, GatewayError>;

    /// Returns the account asset summary.
    async fn query_assets(&self, use_cache: bool) -> Result<Assets, GatewayError>;

    /// Returns the position held in `direction` for `code`, if any.
    async fn query_position(
        &self,
        code: &Code,
        direction: Direction,
        use_cache: bool,
    ) -> Result<Option<Position>, GatewayError>;

    /// Returns positions, optionally filtered by code.
    async fn query_positions(
        &self,
        code: Option<&Code>,
        use_cache: bool,
    ) -> Result<Vec<Position>, GatewayError>;

    /// Returns position lots, optionally filtered by code.
    async fn query_position_details(
        &self,
        code: Option<&Code>,
        use_cache: bool,
    ) -> Result<Vec<PositionDetail>, GatewayError>;

    /// Returns the order with `order_id`, if known today.
    async fn query_order(
        &self,
        order_id: &str,
        use_cache: bool,
    ) -> Result<Option<Order>, GatewayError>;

    /// Returns today's orders, optionally filtered.
    async fn query_orders(
        &self,
        code: Option<&Code>,
        only_unfinished: bool,
        use_cache: bool,
    ) -> Result<Vec<Order>, GatewayError>;

    /// Returns the trade with `trade_id`, if known today.
    async fn query_trade(
        &self,
        trade_id: &str,
        use_cache: bool,
    ) -> Result<Option<Trade>, GatewayError>;

    /// Returns today's trades, optionally filtered.
    async fn query_trades(
        &self,
        code: Option<&Code>,
        order_id: Option<&str>,
        use_cache: bool,
    ) -> Result<Vec<Trade>, GatewayError>;

    /// Subscribes the tick feed for one code.
    async fn subscribe_tick(&self, code: &Code, extras: Option<Extras>)
        -> Result<(), GatewayError>;

    /// Unsubscribes the tick feed for one code.
    async fn unsubscribe_tick(
        &self,
        code: &Code,
        extras: Option<Extras>,
    ) -> Result<(), GatewayError>;

    /// Subscribes tick feeds for several codes.
    async fn subscribe_ticks(
        &self,
        codes: &[Code],
        extras: Option<Extras>,
    ) -> Result<(), GatewayError> {
        for code in codes {
            self.subscribe_tick(code, extras.clone()).await?;
        }
        Ok(())
    }

    /// Subscribes every available tick feed.
    async fn subscribe_all_ticks(&self, extras: Option<Extras>) -> Result<(), GatewayError>;

    /// Drops every tick subscription.
    async fn unsubscribe_all_ticks(&self) -> Result<(), GatewayError>;

    /// Returns the currently subscribed codes.
    async fn query_tick_subscriptions(&self, use_cache: bool) -> Result<Vec<Code>, GatewayError>;

    /// Submits a new order. Validation failures are fatal to the caller;
    /// later lifecycle failures surface through events only.
    async fn insert_order(&self, request: OrderRequest) -> Result<Order, GatewayError>;

    /// Requests cancellation of a pending order.
    async fn cancel_order(&self, order_id: &str, extras: Option<Extras>)
        -> Result<(), GatewayError>;

    /// Requests cancellation of every pending order.
    async fn cancel_all_orders(&self, extras: Option<Extras>) -> Result<(), GatewayError>;

    /// Loads instrument metadata so that fee calculations can run offline.
    async fn prepare_fee_calculation(
        &self,
        codes: Option<&[Code]>,
        extras: Option<Extras>,
    ) -> Result<(), GatewayError>;

    /// Passes an adapter-specific request through the facade.
    async fn custom_request(
        &self,
        method: &str,
        params: Option<Extras>,
    ) -> Result<Option<String>, GatewayError>;
}
