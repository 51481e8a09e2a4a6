//! Virtual sub-account gateway layered over a parent adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sirocco_core::bus::EventBus;
use sirocco_core::data::{
    Assets, Direction, Extras, Offset, Order, OrderRequest, OrderStatus, Position,
    PositionDetail, PositionDetails, Security, Tick, Trade,
};
use sirocco_core::error::GatewayError;
use sirocco_core::event::{BrokerEvent, ConnectionState, EventData};
use sirocco_core::fees::FeeCalculator;
use sirocco_core::gateway::BrokerGateway;
use sirocco_core::store::DataStore;
use sirocco_core::types::{Code, Timestamp};

use sirocco_data::BarAggregator;

use crate::ledger::Ledger;

/// Property key holding the account's starting cash.
const PROP_INITIAL_CASH: &str = "initial_cash";
/// Starting cash when the property store has none.
const DEFAULT_INITIAL_CASH: &str = "1000000";

/// Delay before a tick-quiet period is inspected for an asset snapshot.
const ASSET_FLUSH_DELAY: Duration = Duration::from_millis(60);
/// Minimum tick-free window that triggers the snapshot.
const ASSET_IDLE_WINDOW: Duration = Duration::from_millis(55);

/// Virtual sub-account overlay.
///
/// Filters and rewrites the event stream of a parent [`BrokerGateway`],
/// keeps independent position and asset books (price-addressed lots,
/// commission tracking, realized PnL), derives bar streams from the tick
/// feed and persists its state through a [`DataStore`]. Implements the full
/// facade itself, so overlays stack over any parent by interface.
pub struct SubAccountGateway {
    core: Arc<Core>,
}

struct Core {
    parent: Arc<dyn BrokerGateway>,
    store: Arc<dyn DataStore>,
    bus: Arc<EventBus>,
    bars: BarAggregator,
    gateway_name: String,
    account_id: String,
    source_id: String,
    is_as_parent: bool,
    connected: AtomicBool,
    disabled: AtomicBool,
    books: Mutex<Ledger>,
    last_ticks: DashMap<Code, Tick>,
    last_tick_update: Mutex<Option<tokio::time::Instant>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SubAccountGateway {
    /// Creates an overlay over `parent` for the given sub-account id.
    ///
    /// The sub-account id becomes part of the compound account id, so it
    /// must not contain `-`, `_` or whitespace.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidArgument` for a malformed id.
    pub fn new(
        parent: Arc<dyn BrokerGateway>,
        sub_account: &str,
        store: Arc<dyn DataStore>,
        is_as_parent: bool,
    ) -> Result<Self, GatewayError> {
        if sub_account.is_empty()
            || sub_account
                .chars()
                .any(|c| c == '-' || c == '_' || c.is_whitespace())
        {
            return Err(GatewayError::InvalidArgument(format!(
                "sub-account id {sub_account:?} must be non-empty without '-', '_' or whitespace"
            )));
        }
        let gateway_name = format!("{}-SEP", parent.gateway_name());
        let account_id = format!("{}-{}", parent.account_id(), sub_account);
        let source_id = account_id.clone();
        let bus = Arc::new(EventBus::new());
        let bars = BarAggregator::new(Arc::clone(&bus), source_id.clone());
        let books = Ledger::new(account_id.clone(), Timestamp::now().to_date(), Decimal::ZERO);
        Ok(Self {
            core: Arc::new(Core {
                parent,
                store,
                bus,
                bars,
                gateway_name,
                account_id,
                source_id,
                is_as_parent,
                connected: AtomicBool::new(false),
                disabled: AtomicBool::new(false),
                books: Mutex::new(books),
                last_ticks: DashMap::new(),
                last_tick_update: Mutex::new(None),
                pump: Mutex::new(None),
            }),
        })
    }

    /// The bar aggregator deriving bar streams from this account's feed.
    #[must_use]
    pub fn bars(&self) -> &BarAggregator {
        &self.core.bars
    }

    /// Disables or re-enables order submission.
    pub fn set_disabled(&self, disabled: bool) {
        self.core.disabled.store(disabled, Ordering::Release);
    }
}

impl Core {
    /// Restores persisted books: trading day, assets, positions, lots and
    /// today's orders and trades.
    async fn restore(&self) -> Result<(), GatewayError> {
        let stored_day = self.store.query_trading_day(&self.account_id).await?;
        let trading_day = stored_day.unwrap_or_else(|| Timestamp::now().to_date());
        let raw_cash = self
            .store
            .query_property_or_put(&self.account_id, PROP_INITIAL_CASH, DEFAULT_INITIAL_CASH)
            .await?;
        let initial_cash: Decimal = raw_cash
            .parse()
            .map_err(|e| GatewayError::Backend(format!("bad {PROP_INITIAL_CASH} property: {e}")))?;

        let mut ledger = Ledger::new(self.account_id.clone(), trading_day, initial_cash);
        if let Some(assets) = self
            .store
            .query_assets(&self.account_id, Some(trading_day))
            .await?
            .into_iter()
            .next()
        {
            ledger.assets = assets;
        }
        for position in self
            .store
            .query_positions(&self.account_id, None, None)
            .await?
        {
            let slot = ledger.positions.entry(position.code.clone()).or_default();
            match position.direction {
                Direction::Long => slot.long = Some(position),
                Direction::Short => slot.short = Some(position),
            }
        }
        let mut grouped: HashMap<(Code, Direction), Vec<PositionDetail>> = HashMap::new();
        for lot in self
            .store
            .query_position_details(&self.account_id, None, None)
            .await?
        {
            grouped
                .entry((lot.code.clone(), lot.direction))
                .or_default()
                .push(lot);
        }
        for ((code, direction), lots) in grouped {
            let slot = ledger.details.entry(code).or_default();
            let details = PositionDetails::from_lots(lots);
            match direction {
                Direction::Long => slot.long = Some(details),
                Direction::Short => slot.short = Some(details),
            }
        }
        for order in self
            .store
            .query_orders(&self.account_id, Some(trading_day), None, None)
            .await?
        {
            ledger.today_orders.insert(order.order_id.clone(), order);
        }
        ledger.today_trades = self
            .store
            .query_trades(&self.account_id, Some(trading_day), None, None)
            .await?;

        *self.books.lock() = ledger;
        debug!(account = %self.account_id, day = %trading_day, "books restored");
        Ok(())
    }

    /// Applies one parent event to the books; runs on the pump task so
    /// events are processed strictly in arrival order.
    async fn handle_event(self: &Arc<Self>, event: BrokerEvent) {
        match event.data {
            EventData::NewTradingDay(day) => {
                if self.connected.load(Ordering::Acquire) {
                    self.rollover(day).await;
                }
            }
            EventData::Connection(state) => {
                self.bus.post(BrokerEvent::new(
                    self.source_id.clone(),
                    EventData::Connection(state),
                ));
                if state == ConnectionState::TdLoggedIn {
                    self.probe_trading_day().await;
                }
            }
            EventData::Tick(tick) => self.handle_tick(tick),
            EventData::OrderStatus(order) => self.handle_order_status(order).await,
            EventData::CancelFailed(order) => self.handle_cancel_failed(order).await,
            EventData::TradeReport(trade) => self.handle_trade(trade).await,
            EventData::Log(_) | EventData::Custom(_) => self.bus.post(event),
            EventData::Bar(_) => {}
        }
    }

    fn handle_tick(self: &Arc<Self>, tick: Tick) {
        let (forward, holds_position) = {
            let books = self.books.lock();
            let forward = books.all_ticks || books.tick_subscriptions.contains(&tick.code);
            let holds = books
                .positions
                .get(&tick.code)
                .is_some_and(|bi| !bi.is_empty());
            (forward, holds)
        };
        if forward {
            self.bus.post(BrokerEvent::new(
                self.source_id.clone(),
                EventData::Tick(tick.clone()),
            ));
        }
        self.bars.update_tick(&tick);
        if holds_position {
            self.last_ticks.insert(tick.code.clone(), tick);
            *self.last_tick_update.lock() = Some(tokio::time::Instant::now());
            // Tail debounce: the last tick of a quiet period persists the
            // asset snapshot.
            let core = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(ASSET_FLUSH_DELAY).await;
                let idle = core
                    .last_tick_update
                    .lock()
                    .map(|last| last.elapsed())
                    .unwrap_or_default();
                if idle >= ASSET_IDLE_WINDOW {
                    core.update_assets(true).await;
                }
            });
        }
    }

    async fn handle_order_status(&self, incoming: Order) {
        let merged = {
            let mut books = self.books.lock();
            let Some(mut local) = books.today_orders.get(&incoming.order_id).cloned() else {
                return;
            };
            if matches!(
                incoming.status,
                OrderStatus::Accepted | OrderStatus::Canceled
            ) {
                let delta = incoming.commission - local.commission;
                if !delta.is_zero() {
                    books.assets.today_commission += delta;
                    books.assets.total_commission += delta;
                    books.assets.recompute_totals();
                }
            }
            local.status = incoming.status;
            local.status_msg = incoming.status_msg;
            local.filled_volume = incoming.filled_volume;
            local.turnover = incoming.turnover;
            local.avg_fill_price = incoming.avg_fill_price;
            local.commission = incoming.commission;
            local.update_time = incoming.update_time;
            if !incoming.frozen_cash.is_zero() {
                local.frozen_cash = incoming.frozen_cash;
            }
            if matches!(local.status, OrderStatus::Canceled | OrderStatus::Error) {
                books.unfreeze_order(&local);
            }
            books
                .today_orders
                .insert(local.order_id.clone(), local.clone());
            (local, books.trading_day)
        };
        let (local, day) = merged;
        if let Err(error) = self.store.save_order(day, &local).await {
            warn!(%error, order_id = %local.order_id, "order persist failed");
        }
        self.bus.post(BrokerEvent::new(
            self.source_id.clone(),
            EventData::OrderStatus(local),
        ));
    }

    async fn handle_cancel_failed(&self, incoming: Order) {
        let merged = {
            let mut books = self.books.lock();
            let Some(mut local) = books.today_orders.get(&incoming.order_id).cloned() else {
                return;
            };
            local.status_msg = incoming.status_msg;
            books
                .today_orders
                .insert(local.order_id.clone(), local.clone());
            (local, books.trading_day)
        };
        let (local, day) = merged;
        if let Err(error) = self.store.save_order(day, &local).await {
            warn!(%error, order_id = %local.order_id, "order persist failed");
        }
        self.bus.post(BrokerEvent::new(
            self.source_id.clone(),
            EventData::CancelFailed(local),
        ));
    }

    async fn handle_trade(&self, incoming: Trade) {
        let mut trade = incoming;
        let booked = {
            let mut books = self.books.lock();
            let Some(order) = books.today_orders.get(&trade.order_id).cloned() else {
                return;
            };
            trade.account_id = self.account_id.clone();
            books.today_trades.push(trade.clone());

            let (mutated_lots, removed_lots) = if trade.offset == Offset::Open {
                (vec![books.apply_open_trade(&trade)], Vec::new())
            } else {
                let outcome = books.apply_close_trade(&order, &trade);
                (outcome.mutated_lots, outcome.removed_lots)
            };
            books.add_commission(&trade);

            let book_dir = Ledger::position_book_for(trade.direction, trade.offset);
            let position = books
                .positions
                .get(&trade.code)
                .and_then(|bi| bi.side(book_dir))
                .cloned();
            (
                mutated_lots,
                removed_lots,
                position,
                books.assets.clone(),
                books.trading_day,
            )
        };
        let (mutated_lots, removed_lots, position, assets, day) = booked;

        if let Err(error) = self.store.save_trade(day, &trade).await {
            warn!(%error, trade_id = %trade.trade_id, "trade persist failed");
        }
        for lot in &mutated_lots {
            if let Err(error) = self.store.save_position_detail(lot).await {
                warn!(%error, "lot persist failed");
            }
        }
        for lot in &removed_lots {
            if let Err(error) = self
                .store
                .delete_position_detail(&self.account_id, &lot.code, lot.direction, lot.price)
                .await
            {
                warn!(%error, "lot delete failed");
            }
        }
        if let Some(position) = &position {
            if let Err(error) = self.store.save_position(position).await {
                warn!(%error, "position persist failed");
            }
        }
        if let Err(error) = self.store.save_assets(&assets).await {
            warn!(%error, "assets persist failed");
        }
        self.bus.post(BrokerEvent::new(
            self.source_id.clone(),
            EventData::TradeReport(trade),
        ));
    }

    async fn probe_trading_day(self: &Arc<Self>) {
        match self.parent.trading_day().await {
            Ok(day) => {
                let local = self.books.lock().trading_day;
                if day != local {
                    self.rollover(day).await;
                }
            }
            Err(error) => warn!(%error, "trading day probe failed"),
        }
    }

    /// Trading-day transition: daily state clears, today counters freeze
    /// into yesterday, everything is persisted, `NEW_TRADING_DAY` posts.
    async fn rollover(self: &Arc<Self>, new_day: NaiveDate) {
        {
            let books = self.books.lock();
            if books.trading_day == new_day {
                return;
            }
        }
        let (assets, positions, lots) = {
            let mut books = self.books.lock();
            books.rollover(new_day);
            (books.assets.clone(), books.all_positions(), books.all_lots())
        };
        self.bars.reset();

        if let Err(error) = self.store.save_assets(&assets).await {
            warn!(%error, "assets persist failed");
        }
        for position in &positions {
            if let Err(error) = self.store.save_position(position).await {
                warn!(%error, "position persist failed");
            }
        }
        for lot in &lots {
            if let Err(error) = self.store.save_position_detail(lot).await {
                warn!(%error, "lot persist failed");
            }
        }
        if let Err(error) = self.store.save_trading_day(&self.account_id, new_day).await {
            warn!(%error, "trading day persist failed");
        }
        info!(account = %self.account_id, day = %new_day, "trading day rolled over");
        self.bus.post(BrokerEvent::new(
            self.source_id.clone(),
            EventData::NewTradingDay(new_day),
        ));
    }

    /// Re-derives position value/PnL from the latest ticks and recomputes
    /// the asset totals, optionally persisting the snapshot.
    async fn update_assets(&self, save: bool) {
        let assets = {
            let mut books = self.books.lock();
            let mut position_value = Decimal::ZERO;
            let mut position_pnl = Decimal::ZERO;
            let codes: Vec<Code> = books.positions.keys().cloned().collect();
            for code in codes {
                let last_price = self.last_ticks.get(&code).map(|t| t.last_price);
                let Some(bi) = books.positions.get_mut(&code) else {
                    continue;
                };
                for direction in [Direction::Long, Direction::Short] {
                    if let Some(position) = bi.side_mut(direction) {
                        if let Some(price) = last_price {
                            position.last_price = price;
                        }
                        self.parent.calculate_position(position);
                        position_value += position.value;
                        position_pnl += position.pnl;
                    }
                }
            }
            books.assets.position_value = position_value;
            books.assets.position_pnl = position_pnl;
            books.assets.recompute_totals();
            books.assets.clone()
        };
        if save {
            if let Err(error) = self.store.save_assets(&assets).await {
                warn!(%error, "assets persist failed");
            }
        }
    }
}

impl FeeCalculator for SubAccountGateway {
    fn security(&self, code: &Code) -> Option<Security> {
        self.core.parent.security(code)
    }

    fn calculate_order(&self, order: &mut Order) {
        self.core.parent.calculate_order(order);
    }

    fn calculate_trade(&self, trade: &mut Trade) {
        self.core.parent.calculate_trade(trade);
    }

    fn calculate_position(&self, position: &mut Position) {
        self.core.parent.calculate_position(position);
    }
}

#[async_trait]
impl BrokerGateway for SubAccountGateway {
    fn gateway_name(&self) -> &str {
        &self.core.gateway_name
    }

    fn account_id(&self) -> &str {
        &self.core.account_id
    }

    fn source_id(&self) -> &str {
        &self.core.source_id
    }

    fn event_bus(&self) -> &Arc<EventBus> {
        &self.core.bus
    }

    fn is_connected(&self) -> bool {
        self.core.connected.load(Ordering::Acquire)
    }

    async fn connect(&self, extras: Option<Extras>) -> Result<(), GatewayError> {
        let core = &self.core;
        if core.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        core.restore().await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<BrokerEvent>();
        core.parent.event_bus().subscribe_all(
            core.source_id.clone(),
            Arc::new(move |event| {
                let _ = tx.send(event.clone());
            }),
        );
        let pump_core = Arc::clone(core);
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                pump_core.handle_event(event).await;
            }
        });
        *core.pump.lock() = Some(pump);
        core.connected.store(true, Ordering::Release);

        if core.is_as_parent {
            core.parent.connect(extras).await?;
        } else if core.parent.is_connected() {
            // Position codes need a live feed for PnL and asset refresh.
            let codes: Vec<Code> = core.books.lock().positions.keys().cloned().collect();
            for code in &codes {
                if let Err(error) = core.parent.subscribe_tick(code, None).await {
                    warn!(%error, %code, "tick subscribe failed");
                }
            }
            core.probe_trading_day().await;
        }
        info!(account = %core.account_id, "sub-account connected");
        Ok(())
    }

    async fn close(&self) {
        let core = &self.core;
        core.connected.store(false, Ordering::Release);
        // Shutdown order is fixed: parent tag, task pool, bar aggregator,
        // own bus.
        core.parent
            .event_bus()
            .remove_subscribers_by_tag(&core.source_id);
        if let Some(pump) = core.pump.lock().take() {
            pump.abort();
        }
        core.bars.release();
        core.bus.release();
        if core.is_as_parent {
            core.parent.close().await;
        }
        info!(account = %core.account_id, "sub-account closed");
    }

    async fn trading_day(&self) -> Result<NaiveDate, GatewayError> {
        Ok(self.core.books.lock().trading_day)
    }

    async fn query_last_tick(
        &self,
        code: &Code,
        use_cache: bool,
    ) -> Result<Option<Tick>, GatewayError> {
        if use_cache {
            if let Some(tick) = self.core.last_ticks.get(code) {
                return Ok(Some(tick.clone()));
            }
        }
        self.core.parent.query_last_tick(code, use_cache).await
    }

    async fn query_security(
        &self,
        code: &Code,
        use_cache: bool,
    ) -> Result<Option<Security>, GatewayError> {
        if use_cache {
            if let Some(security) = self.core.books.lock().securities.get(code) {
                return Ok(Some(security.clone()));
            }
        }
        let security = self.core.parent.query_security(code, use_cache).await?;
        if let Some(security) = &security {
            self.core
                .books
                .lock()
                .securities
                .insert(code.clone(), security.clone());
        }
        Ok(security)
    }

    async fn query_all_securities(&self, use_cache: bool) -> Result<Vec<Security>, GatewayError> {
        self.core.parent.query_all_securities(use_cache).await
    }

    async fn query_assets(&self, use_cache: bool) -> Result<Assets, GatewayError> {
        if !use_cache {
            self.core.update_assets(false).await;
        }
        Ok(self.core.books.lock().assets.clone())
    }

    async fn query_position(
        &self,
        code: &Code,
        direction: Direction,
        use_cache: bool,
    ) -> Result<Option<Position>, GatewayError> {
        let _ = use_cache;
        Ok(self
            .core
            .books
            .lock()
            .positions
            .get(code)
            .and_then(|bi| bi.side(direction))
            .cloned())
    }

    async fn query_positions(
        &self,
        code: Option<&Code>,
        use_cache: bool,
    ) -> Result<Vec<Position>, GatewayError> {
        let _ = use_cache;
        Ok(self
            .core
            .books
            .lock()
            .all_positions()
            .into_iter()
            .filter(|p| code.is_none_or(|want| &p.code == want))
            .collect())
    }

    async fn query_position_details(
        &self,
        code: Option<&Code>,
        use_cache: bool,
    ) -> Result<Vec<PositionDetail>, GatewayError> {
        let _ = use_cache;
        Ok(self
            .core
            .books
            .lock()
            .all_lots()
            .into_iter()
            .filter(|lot| code.is_none_or(|want| &lot.code == want))
            .collect())
    }

    async fn query_order(
        &self,
        order_id: &str,
        use_cache: bool,
    ) -> Result<Option<Order>, GatewayError> {
        let _ = use_cache;
        Ok(self.core.books.lock().today_orders.get(order_id).cloned())
    }

    async fn query_orders(
        &self,
        code: Option<&Code>,
        only_unfinished: bool,
        use_cache: bool,
    ) -> Result<Vec<Order>, GatewayError> {
        let _ = use_cache;
        Ok(self
            .core
            .books
            .lock()
            .today_orders
            .values()
            .filter(|o| code.is_none_or(|want| &o.code == want))
            .filter(|o| !only_unfinished || !o.is_final())
            .cloned()
            .collect())
    }

    async fn query_trade(
        &self,
        trade_id: &str,
        use_cache: bool,
    ) -> Result<Option<Trade>, GatewayError> {
        let _ = use_cache;
        Ok(self
            .core
            .books
            .lock()
            .today_trades
            .iter()
            .find(|t| t.trade_id == trade_id)
            .cloned())
    }

    async fn query_trades(
        &self,
        code: Option<&Code>,
        order_id: Option<&str>,
        use_cache: bool,
    ) -> Result<Vec<Trade>, GatewayError> {
        let _ = use_cache;
        Ok(self
            .core
            .books
            .lock()
            .today_trades
            .iter()
            .filter(|t| code.is_none_or(|want| &t.code == want))
            .filter(|t| order_id.is_none_or(|want| t.order_id == want))
            .cloned()
            .collect())
    }

    async fn subscribe_tick(
        &self,
        code: &Code,
        extras: Option<Extras>,
    ) -> Result<(), GatewayError> {
        self.core
            .books
            .lock()
            .tick_subscriptions
            .insert(code.clone());
        self.core.parent.subscribe_tick(code, extras).await
    }

    async fn unsubscribe_tick(
        &self,
        code: &Code,
        extras: Option<Extras>,
    ) -> Result<(), GatewayError> {
        let holds_position = {
            let mut books = self.core.books.lock();
            books.tick_subscriptions.remove(code);
            books.positions.get(code).is_some_and(|bi| !bi.is_empty())
        };
        // The upstream feed stays while a position needs PnL refresh.
        if holds_position {
            return Ok(());
        }
        self.core.parent.unsubscribe_tick(code, extras).await
    }

    async fn subscribe_all_ticks(&self, extras: Option<Extras>) -> Result<(), GatewayError> {
        self.core.books.lock().all_ticks = true;
        self.core.parent.subscribe_all_ticks(extras).await
    }

    async fn unsubscribe_all_ticks(&self) -> Result<(), GatewayError> {
        let position_codes: Vec<Code> = {
            let mut books = self.core.books.lock();
            books.all_ticks = false;
            books.tick_subscriptions.clear();
            books.positions.keys().cloned().collect()
        };
        self.core.parent.unsubscribe_all_ticks().await?;
        for code in &position_codes {
            if let Err(error) = self.core.parent.subscribe_tick(code, None).await {
                warn!(%error, %code, "position feed re-subscribe failed");
            }
        }
        Ok(())
    }

    async fn query_tick_subscriptions(&self, use_cache: bool) -> Result<Vec<Code>, GatewayError> {
        let _ = use_cache;
        Ok(self
            .core
            .books
            .lock()
            .tick_subscriptions
            .iter()
            .cloned()
            .collect())
    }

    async fn insert_order(&self, request: OrderRequest) -> Result<Order, GatewayError> {
        let core = &self.core;
        if core.disabled.load(Ordering::Acquire) {
            return Err(GatewayError::Disabled);
        }

        if request.offset == Offset::Open {
            let mut dry = Order::from_request(
                &request,
                String::new(),
                core.account_id.clone(),
                Timestamp::now(),
            );
            core.parent.calculate_order(&mut dry);
            core.update_assets(false).await;
            let available = core.books.lock().assets.available;
            if available < dry.frozen_cash {
                return Err(GatewayError::Rejected(format!(
                    "insufficient available cash: {available} < {}",
                    dry.frozen_cash
                )));
            }
        } else {
            let book = Ledger::position_book_for(request.direction, request.offset);
            let closeable = {
                let books = core.books.lock();
                books
                    .positions
                    .get(&request.code)
                    .and_then(|bi| bi.side(book))
                    .map_or(0, |p| Ledger::closeable_for(p, request.offset))
            };
            if closeable < request.volume {
                return Err(GatewayError::Rejected(format!(
                    "insufficient closeable volume: {closeable} < {}",
                    request.volume
                )));
            }
        }

        let mut order = core.parent.insert_order(request.clone()).await?;
        order.account_id = core.account_id.clone();
        for (key, value) in &request.extras {
            order
                .extras
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        core.parent.calculate_order(&mut order);

        let day = {
            let mut books = core.books.lock();
            books
                .today_orders
                .insert(order.order_id.clone(), order.clone());
            if !order.is_final() {
                books.tick_subscriptions.insert(order.code.clone());
                books.freeze_order(&order);
            }
            books.trading_day
        };
        if !order.is_final() {
            if let Err(error) = core.parent.subscribe_tick(&order.code, None).await {
                warn!(%error, code = %order.code, "tick subscribe failed");
            }
        }
        if let Err(error) = core.store.save_order(day, &order).await {
            warn!(%error, order_id = %order.order_id, "order persist failed");
        }
        Ok(order)
    }

    async fn cancel_order(
        &self,
        order_id: &str,
        extras: Option<Extras>,
    ) -> Result<(), GatewayError> {
        if !self.core.books.lock().today_orders.contains_key(order_id) {
            return Err(GatewayError::NotFound(format!("order {order_id}")));
        }
        self.core.parent.cancel_order(order_id, extras).await
    }

    async fn cancel_all_orders(&self, extras: Option<Extras>) -> Result<(), GatewayError> {
        let ids: Vec<String> = {
            let books = self.core.books.lock();
            books
                .today_orders
                .values()
                .filter(|o| !o.is_final())
                .map(|o| o.order_id.clone())
                .collect()
        };
        for id in ids {
            self.core.parent.cancel_order(&id, extras.clone()).await?;
        }
        Ok(())
    }

    async fn prepare_fee_calculation(
        &self,
        codes: Option<&[Code]>,
        extras: Option<Extras>,
    ) -> Result<(), GatewayError> {
        let _ = extras;
        let codes: Vec<Code> = match codes {
            Some(codes) => codes.to_vec(),
            None => self.core.books.lock().positions.keys().cloned().collect(),
        };
        for code in &codes {
            if let Some(security) = self.core.parent.query_security(code, true).await? {
                self.core
                    .books
                    .lock()
                    .securities
                    .insert(code.clone(), security);
            }
        }
        Ok(())
    }

    async fn custom_request(
        &self,
        method: &str,
        params: Option<Extras>,
    ) -> Result<Option<String>, GatewayError> {
        self.core.parent.custom_request(method, params).await
    }
}
