//! Order-matching simulation against published book snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use sirocco_core::bus::EventBus;
use sirocco_core::data::{
    Direction, Order, OrderRequest, OrderStatus, OrderType, Tick, Trade,
};
use sirocco_core::event::{BrokerEvent, EventData};
use sirocco_core::fees::FeeCalculator;
use sirocco_core::types::{Code, Timestamp};

use crate::MatchError;

/// Delay between the synchronous return of an order submission and the
/// ACCEPTED event, so callers always observe the returned order first.
const ACCEPT_DELAY: Duration = Duration::from_millis(1);

#[derive(Default)]
struct MatchState {
    subscriptions: HashSet<Code>,
    last_ticks: HashMap<Code, Tick>,
    today_orders: HashMap<String, Order>,
    open_orders: HashMap<Code, Vec<String>>,
    order_ref: u64,
    trade_ref: u64,
}

/// Tick-driven order-matching simulator for one account.
///
/// Limit and market orders walk the opposite book side from the top;
/// FAK/FOK orders are admitted only after a dry-run walk proves the
/// required volume is immediately available. Fills are published as
/// `TRADE_REPORT` followed by the `ORDER_STATUS` acknowledging them.
pub struct MatchEngine {
    account_id: String,
    source_id: String,
    bus: Arc<EventBus>,
    fees: Option<Arc<dyn FeeCalculator>>,
    state: Arc<Mutex<MatchState>>,
}

impl MatchEngine {
    /// Creates a match engine posting events on `bus` under `source_id`.
    ///
    /// When `fees` is provided, trades are enriched with turnover and
    /// commission and orders with average fill price and frozen cash.
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        source_id: impl Into<String>,
        bus: Arc<EventBus>,
        fees: Option<Arc<dyn FeeCalculator>>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            source_id: source_id.into(),
            bus,
            fees,
            state: Arc::new(Mutex::new(MatchState::default())),
        }
    }

    /// Submits an order for simulation.
    ///
    /// Validation failures return an `Error`-status order without posting
    /// any event. On success the returned order is `Accepted`; the
    /// ACCEPTED event, book insertion and first match run one scheduler
    /// turn later.
    pub async fn insert_order(&self, request: OrderRequest, last_tick: Option<Tick>) -> Order {
        let now = Timestamp::now();
        let order = {
            let mut st = self.state.lock();
            let order_id = format!("{}_{}_{}", self.account_id, now.as_millis(), st.order_ref);
            st.order_ref += 1;
            let mut order =
                Order::from_request(&request, order_id, self.account_id.clone(), now);

            let tick = last_tick.or_else(|| st.last_ticks.get(&request.code).cloned());
            let reject = |st: &mut MatchState, mut order: Order, reason: String| {
                warn!(order_id = %order.order_id, %reason, "order rejected");
                order.status = OrderStatus::Error;
                order.status_msg = reason;
                st.today_orders.insert(order.order_id.clone(), order.clone());
                order
            };
            let Some(tick) = tick else {
                return reject(&mut st, order, "no last tick".to_string());
            };
            if !tick.status.is_tradeable() {
                let reason = format!("not tradeable: {}", tick.status);
                return reject(&mut st, order, reason);
            }
            if matches!(request.order_type, OrderType::Stop | OrderType::Custom) {
                let reason = format!("unsupported order type: {}", request.order_type);
                return reject(&mut st, order, reason);
            }

            order.status = OrderStatus::Accepted;
            order.status_msg = "unfilled".to_string();
            st.last_ticks.insert(request.code.clone(), tick);
            st.subscriptions.insert(request.code.clone());
            st.today_orders.insert(order.order_id.clone(), order.clone());
            order
        };

        self.spawn_accept(order.order_id.clone(), order.code.clone());
        order
    }

    /// Requests cancellation of `order_id`.
    ///
    /// A terminal order yields a `CANCEL_FAILED` event and leaves state
    /// unchanged; an unknown id is an error.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::UnknownOrder` if the id was never seen today.
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), MatchError> {
        let mut events = Vec::new();
        {
            let mut st = self.state.lock();
            let Some(order) = st.today_orders.get_mut(order_id) else {
                return Err(MatchError::UnknownOrder(order_id.to_string()));
            };
            if !order.status.is_cancellable() {
                let mut copy = order.clone();
                copy.status_msg = format!("cancel failed: {}", copy.status);
                events.push(BrokerEvent::new(
                    self.source_id.clone(),
                    EventData::CancelFailed(copy),
                ));
            } else {
                order.status = OrderStatus::Canceled;
                order.status_msg = "canceled".to_string();
                order.update_time = Timestamp::now();
                let order = order.clone();
                Self::finish_order(&mut st, &order);
                events.push(BrokerEvent::new(
                    self.source_id.clone(),
                    EventData::OrderStatus(order),
                ));
            }
        }
        self.post_all(events);
        Ok(())
    }

    /// Cancels every open order, iterating a snapshot.
    pub async fn cancel_all_orders(&self) {
        let ids: Vec<String> = {
            let st = self.state.lock();
            st.open_orders.values().flatten().cloned().collect()
        };
        for id in ids {
            // Ids from the snapshot are known today by construction.
            let _ = self.cancel_order(&id).await;
        }
    }

    /// Feeds a tick; orders open on its code are re-matched.
    pub fn update_tick(&self, tick: &Tick) {
        let events = {
            let mut st = self.state.lock();
            if !st.subscriptions.contains(&tick.code) {
                return;
            }
            st.last_ticks.insert(tick.code.clone(), tick.clone());
            self.match_code(&mut st, &tick.code)
        };
        self.post_all(events);
    }

    /// Clears all simulator state; invoked on trading-day rollover.
    pub fn reset(&self) {
        let mut st = self.state.lock();
        *st = MatchState::default();
    }

    /// Returns every order seen today.
    #[must_use]
    pub fn today_orders(&self) -> Vec<Order> {
        self.state.lock().today_orders.values().cloned().collect()
    }

    /// Returns the order with `order_id`, if seen today.
    #[must_use]
    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.state.lock().today_orders.get(order_id).cloned()
    }

    /// Codes the simulator currently watches.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Code> {
        self.state.lock().subscriptions.iter().cloned().collect()
    }

    /// Posts the ACCEPTED event one scheduler turn after submission, then
    /// opens the order for matching.
    fn spawn_accept(&self, order_id: String, code: Code) {
        let state = Arc::clone(&self.state);
        let bus = Arc::clone(&self.bus);
        let source_id = self.source_id.clone();
        let fees = self.fees.clone();
        let account_id = self.account_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ACCEPT_DELAY).await;
            let events = {
                let mut st = state.lock();
                let Some(order) = st.today_orders.get(&order_id) else {
                    return;
                };
                // Canceled between submission and acknowledgement.
                if order.is_final() {
                    return;
                }
                let mut events = vec![BrokerEvent::new(
                    source_id.clone(),
                    EventData::OrderStatus(order.clone()),
                )];
                st.open_orders.entry(code.clone()).or_default().push(order_id);
                let engine = EngineRef {
                    account_id: &account_id,
                    source_id: &source_id,
                    fees: fees.as_deref(),
                };
                events.extend(engine.match_code(&mut st, &code));
                events
            };
            for event in events {
                bus.post(event);
            }
        });
    }

    fn match_code(&self, st: &mut MatchState, code: &Code) -> Vec<BrokerEvent> {
        EngineRef {
            account_id: &self.account_id,
            source_id: &self.source_id,
            fees: self.fees.as_deref(),
        }
        .match_code(st, code)
    }

    fn finish_order(st: &mut MatchState, order: &Order) {
        EngineRef::finish(st, order);
    }

    fn post_all(&self, events: Vec<BrokerEvent>) {
        for event in events {
            self.bus.post(event);
        }
    }
}

/// Borrowed engine context shared by the inline and deferred match paths.
struct EngineRef<'a> {
    account_id: &'a str,
    source_id: &'a str,
    fees: Option<&'a dyn FeeCalculator>,
}

impl EngineRef<'_> {
    /// Runs the matching pass for every open order on `code`.
    fn match_code(&self, st: &mut MatchState, code: &Code) -> Vec<BrokerEvent> {
        let Some(tick) = st.last_ticks.get(code).cloned() else {
            return Vec::new();
        };
        if !tick.status.is_matching() {
            return Vec::new();
        }
        let order_ids: Vec<String> = st.open_orders.get(code).cloned().unwrap_or_default();
        let mut events = Vec::new();
        for order_id in order_ids {
            let Some(order) = st.today_orders.get(&order_id).cloned() else {
                continue;
            };
            if order.is_final() {
                continue;
            }
            match order.order_type {
                OrderType::Limit | OrderType::Market => {
                    self.simulate(st, &tick, &order_id, &mut events);
                }
                OrderType::Fak | OrderType::Fok => {
                    if can_fill_volume(&tick, &order) {
                        self.simulate(st, &tick, &order_id, &mut events);
                    }
                    self.cancel_unfilled(st, &order_id, &mut events);
                }
                // Stop and custom types are rejected at submission.
                OrderType::Stop | OrderType::Custom => {}
            }
        }
        events
    }

    /// Walks the opposite book side and applies the resulting fills.
    fn simulate(
        &self,
        st: &mut MatchState,
        tick: &Tick,
        order_id: &str,
        events: &mut Vec<BrokerEvent>,
    ) {
        let Some(order) = st.today_orders.get(order_id).cloned() else {
            return;
        };
        let fills = walk_book(tick, &order, order.unfilled_volume(), true);
        if fills.is_empty() {
            return;
        }
        let mut order = order;
        for (price, volume) in fills {
            st.trade_ref += 1;
            let mut trade = Trade {
                trade_id: format!("{}_{}", order.order_id, st.trade_ref),
                order_id: order.order_id.clone(),
                account_id: self.account_id.to_string(),
                code: order.code.clone(),
                price,
                volume,
                turnover: Decimal::ZERO,
                commission: Decimal::ZERO,
                direction: order.direction,
                offset: order.offset,
                time: tick.timestamp,
            };
            if let Some(fees) = self.fees {
                fees.calculate_trade(&mut trade);
            }
            order.filled_volume += trade.volume;
            order.turnover += trade.turnover;
            order.commission += trade.commission;
            order.update_time = trade.time;
            if order.filled_volume == order.volume {
                order.status = OrderStatus::Filled;
                order.status_msg = "fully filled".to_string();
            } else {
                order.status = OrderStatus::PartiallyFilled;
                order.status_msg = "partially filled".to_string();
            }
            if let Some(fees) = self.fees {
                fees.calculate_order(&mut order);
            }
            debug!(order_id = %order.order_id, %price, volume, "simulated fill");
            // Every consumer sees the trade before the status update that
            // acknowledges it.
            events.push(BrokerEvent::new(
                self.source_id.to_string(),
                EventData::TradeReport(trade),
            ));
            events.push(BrokerEvent::new(
                self.source_id.to_string(),
                EventData::OrderStatus(order.clone()),
            ));
        }
        st.today_orders.insert(order.order_id.clone(), order.clone());
        if order.is_final() {
            Self::finish(st, &order);
        }
    }

    /// Cancels the remainder of a FAK/FOK order that did not fully fill.
    fn cancel_unfilled(&self, st: &mut MatchState, order_id: &str, events: &mut Vec<BrokerEvent>) {
        let Some(order) = st.today_orders.get_mut(order_id) else {
            return;
        };
        if order.status == OrderStatus::Filled {
            return;
        }
        order.status = OrderStatus::Canceled;
        order.status_msg = "canceled".to_string();
        order.update_time = Timestamp::now();
        let order = order.clone();
        Self::finish(st, &order);
        events.push(BrokerEvent::new(
            self.source_id.to_string(),
            EventData::OrderStatus(order),
        ));
    }

    /// Removes a terminal order from the open book; when the last open
    /// order on a code goes, the code's subscription and cached tick go
    /// with it.
    fn finish(st: &mut MatchState, order: &Order) {
        let empty = if let Some(ids) = st.open_orders.get_mut(&order.code) {
            ids.retain(|id| id != &order.order_id);
            ids.is_empty()
        } else {
            false
        };
        if empty {
            st.open_orders.remove(&order.code);
            st.subscriptions.remove(&order.code);
            st.last_ticks.remove(&order.code);
        }
    }
}

/// Walks the book side opposite to `order.direction` from the top while the
/// price constraint holds, producing `(price, volume)` fills.
///
/// Market orders are limit orders priced at the most permissive bound. If
/// the walk consumes every level with volume still unfilled and
/// `with_spillover` is set, the remainder fills at the deepest traded
/// level, modeling spillover against the last-known quote.
fn walk_book(
    tick: &Tick,
    order: &Order,
    initial_volume: u64,
    with_spillover: bool,
) -> Vec<(Decimal, u64)> {
    let limit = match (order.order_type, order.direction) {
        (OrderType::Market, Direction::Long) => Decimal::MAX,
        (OrderType::Market, Direction::Short) => Decimal::MIN,
        _ => order.price,
    };
    let (prices, volumes) = match order.direction {
        Direction::Long => (&tick.ask_prices, &tick.ask_volumes),
        Direction::Short => (&tick.bid_prices, &tick.bid_volumes),
    };

    let mut rest = initial_volume;
    let mut fills: Vec<(Decimal, u64)> = Vec::new();
    let mut price_broke = false;
    for (price, volume) in prices.iter().zip(volumes) {
        if rest == 0 {
            break;
        }
        let crossed = match order.direction {
            Direction::Long => *price <= limit,
            Direction::Short => *price >= limit,
        };
        if !crossed {
            price_broke = true;
            break;
        }
        let take = (*volume).min(rest);
        if take > 0 {
            fills.push((*price, take));
            rest -= take;
        }
    }
    if with_spillover && rest > 0 && !price_broke {
        if let Some(&(deepest, _)) = fills.last() {
            fills.push((deepest, rest));
        }
    }
    fills
}

/// Dry-run walk deciding whether a FAK/FOK order can fill immediately.
///
/// FAK tests its `min_volume` floor when one is set; FOK tests the whole
/// unfilled volume. True iff the walk reduces the tested volume to zero.
fn can_fill_volume(tick: &Tick, order: &Order) -> bool {
    let unfilled = order.unfilled_volume();
    let tested = match order.order_type {
        OrderType::Fak => match order.min_volume() {
            Some(min) if min > 0 => min.min(unfilled),
            _ => unfilled,
        },
        _ => unfilled,
    };
    let filled: u64 = walk_book(tick, order, tested, false)
        .iter()
        .map(|(_, v)| v)
        .sum();
    filled == tested
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use rust_decimal_macros::dec;
    use sirocco_core::data::{MarketStatus, Offset};
    use sirocco_core::event::EventType;
    use std::time::Duration;

    fn code() -> Code {
        Code::new("rb2410").unwrap()
    }

    /// Book from the depth-walk scenarios: asks 10.1x2, 10.3x3, 10.6x4;
    /// bids 10.0, 9.9.
    fn book_tick() -> Tick {
        let mut tick = Tick::new(code(), Timestamp::now(), dec!(10.05));
        tick.bid_prices = vec![dec!(10.0), dec!(9.9)];
        tick.bid_volumes = vec![5, 5];
        tick.ask_prices = vec![dec!(10.1), dec!(10.3), dec!(10.6)];
        tick.ask_volumes = vec![2, 3, 4];
        tick.status = MarketStatus::ContinuousMatching;
        tick
    }

    fn engine_with_bus() -> (MatchEngine, Arc<EventBus>, Arc<PlMutex<Vec<BrokerEvent>>>) {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            &[
                EventType::OrderStatus,
                EventType::TradeReport,
                EventType::CancelFailed,
            ],
            "test",
            Arc::new(move |event| sink.lock().push(event.clone())),
        );
        let engine = MatchEngine::new("sim", "sim-src", Arc::clone(&bus), None);
        (engine, bus, seen)
    }

    fn long_limit(price: Decimal, volume: u64) -> OrderRequest {
        OrderRequest::limit(code(), price, volume, Direction::Long, Offset::Open)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    fn trades(events: &[BrokerEvent]) -> Vec<(Decimal, u64)> {
        events
            .iter()
            .filter_map(|e| match &e.data {
                EventData::TradeReport(t) => Some((t.price, t.volume)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_without_tick() {
        let (engine, _bus, seen) = engine_with_bus();
        let order = engine.insert_order(long_limit(dec!(10.5), 1), None).await;
        assert_eq!(order.status, OrderStatus::Error);
        assert_eq!(order.status_msg, "no last tick");
        settle().await;
        assert!(seen.lock().is_empty());
        // The rejected order is still kept in today's orders.
        assert_eq!(engine.order(&order.order_id).unwrap().status, OrderStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_untradeable_phase() {
        let (engine, _bus, _seen) = engine_with_bus();
        let mut tick = book_tick();
        tick.status = MarketStatus::Closed;
        let order = engine
            .insert_order(long_limit(dec!(10.5), 1), Some(tick))
            .await;
        assert_eq!(order.status, OrderStatus::Error);
        assert!(order.status_msg.starts_with("not tradeable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_unsupported_type() {
        let (engine, _bus, _seen) = engine_with_bus();
        let request = long_limit(dec!(10.5), 1).with_order_type(OrderType::Stop);
        let order = engine.insert_order(request, Some(book_tick())).await;
        assert_eq!(order.status, OrderStatus::Error);
        assert!(order.status_msg.starts_with("unsupported order type"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_event_follows_return() {
        let (engine, _bus, seen) = engine_with_bus();
        let order = engine
            .insert_order(long_limit(dec!(9.0), 1), Some(book_tick()))
            .await;
        assert_eq!(order.status, OrderStatus::Accepted);
        // Nothing observable until a scheduler turn passes.
        assert!(seen.lock().is_empty());
        settle().await;
        let events = seen.lock();
        assert_eq!(events.len(), 1);
        match &events[0].data {
            EventData::OrderStatus(o) => {
                assert_eq!(o.status, OrderStatus::Accepted);
                assert_eq!(o.status_msg, "unfilled");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_walks_book_partial_fill() {
        let (engine, _bus, seen) = engine_with_bus();
        // LONG LIMIT 10.5 x 7 against asks 10.1x2, 10.3x3, 10.6x4.
        let order = engine
            .insert_order(long_limit(dec!(10.5), 7), Some(book_tick()))
            .await;
        settle().await;

        let events = seen.lock();
        assert_eq!(trades(&events), vec![(dec!(10.1), 2), (dec!(10.3), 3)]);
        drop(events);

        let order = engine.order(&order.order_id).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_volume, 5);
        assert_eq!(order.unfilled_volume(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_spillover_beyond_book() {
        let (engine, _bus, seen) = engine_with_bus();
        // LONG LIMIT 11 x 12 crosses the whole book (9 lots) and spills the
        // remaining 3 at the deepest traded level.
        let order = engine
            .insert_order(long_limit(dec!(11), 12), Some(book_tick()))
            .await;
        settle().await;

        let events = seen.lock();
        assert_eq!(
            trades(&events),
            vec![(dec!(10.1), 2), (dec!(10.3), 3), (dec!(10.6), 4), (dec!(10.6), 3)]
        );
        drop(events);
        assert_eq!(engine.order(&order.order_id).unwrap().status, OrderStatus::Filled);
        // Spillover happened on the submission tick only; the order is gone
        // from the book.
        assert!(engine.subscriptions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_market_order_fills_at_book() {
        let (engine, _bus, seen) = engine_with_bus();
        let request = OrderRequest::market(code(), 4, Direction::Short, Offset::Open);
        engine.insert_order(request, Some(book_tick())).await;
        settle().await;

        let events = seen.lock();
        assert_eq!(trades(&events), vec![(dec!(10.0), 4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fok_rejected_when_book_too_thin() {
        let (engine, _bus, seen) = engine_with_bus();
        // FOK LONG 10.2 x 5: only 2 lots reachable at or under 10.2.
        let request = long_limit(dec!(10.2), 5).with_order_type(OrderType::Fok);
        let order = engine.insert_order(request, Some(book_tick())).await;
        settle().await;

        let events = seen.lock();
        assert!(trades(&events).is_empty());
        drop(events);
        let order = engine.order(&order.order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(order.filled_volume, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fok_fills_when_book_suffices() {
        let (engine, _bus, seen) = engine_with_bus();
        let request = long_limit(dec!(10.3), 5).with_order_type(OrderType::Fok);
        let order = engine.insert_order(request, Some(book_tick())).await;
        settle().await;

        let events = seen.lock();
        assert_eq!(trades(&events), vec![(dec!(10.1), 2), (dec!(10.3), 3)]);
        drop(events);
        assert_eq!(engine.order(&order.order_id).unwrap().status, OrderStatus::Filled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fak_fills_available_and_cancels_rest() {
        let (engine, _bus, seen) = engine_with_bus();
        // FAK LONG 10.3 x 7 with min volume 2: 5 lots reachable, floor met.
        let request = long_limit(dec!(10.3), 7)
            .with_order_type(OrderType::Fak)
            .with_min_volume(2);
        let order = engine.insert_order(request, Some(book_tick())).await;
        settle().await;

        let events = seen.lock();
        assert_eq!(trades(&events), vec![(dec!(10.1), 2), (dec!(10.3), 3)]);
        drop(events);
        let order = engine.order(&order.order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(order.filled_volume, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trade_precedes_status_per_fill() {
        let (engine, _bus, seen) = engine_with_bus();
        engine
            .insert_order(long_limit(dec!(10.5), 7), Some(book_tick()))
            .await;
        settle().await;

        let events = seen.lock();
        // ACCEPTED first, then alternating trade/status pairs.
        let kinds: Vec<EventType> = events.iter().map(BrokerEvent::event_type).collect();
        assert_eq!(
            kinds,
            vec![
                EventType::OrderStatus,
                EventType::TradeReport,
                EventType::OrderStatus,
                EventType::TradeReport,
                EventType::OrderStatus,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resting_order_matches_on_later_tick() {
        let (engine, _bus, seen) = engine_with_bus();
        let order = engine
            .insert_order(long_limit(dec!(9.5), 2), Some(book_tick()))
            .await;
        settle().await;
        assert!(trades(&seen.lock()).is_empty());

        let mut tick = book_tick();
        tick.ask_prices = vec![dec!(9.4)];
        tick.ask_volumes = vec![10];
        engine.update_tick(&tick);

        assert_eq!(trades(&seen.lock()), vec![(dec!(9.4), 2)]);
        assert_eq!(engine.order(&order.order_id).unwrap().status, OrderStatus::Filled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_match_outside_matching_phase() {
        let (engine, _bus, seen) = engine_with_bus();
        let mut tick = book_tick();
        tick.status = MarketStatus::AuctionOrdering;
        engine
            .insert_order(long_limit(dec!(10.5), 1), Some(tick))
            .await;
        settle().await;
        // Accepted but nothing matched during auction ordering.
        assert!(trades(&seen.lock()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_resting_order() {
        let (engine, _bus, seen) = engine_with_bus();
        let order = engine
            .insert_order(long_limit(dec!(9.5), 2), Some(book_tick()))
            .await;
        settle().await;
        engine.cancel_order(&order.order_id).await.unwrap();

        let stored = engine.order(&order.order_id).unwrap();
        assert_eq!(stored.status, OrderStatus::Canceled);
        assert_eq!(stored.status_msg, "canceled");
        // Book is empty again: subscription and cached tick dropped.
        assert!(engine.subscriptions().is_empty());

        let statuses: Vec<OrderStatus> = seen
            .lock()
            .iter()
            .filter_map(|e| match &e.data {
                EventData::OrderStatus(o) => Some(o.status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![OrderStatus::Accepted, OrderStatus::Canceled]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unknown_order_is_error() {
        let (engine, _bus, _seen) = engine_with_bus();
        assert_eq!(
            engine.cancel_order("missing").await,
            Err(MatchError::UnknownOrder("missing".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_terminal_order_posts_cancel_failed_once() {
        let (engine, _bus, seen) = engine_with_bus();
        let order = engine
            .insert_order(long_limit(dec!(9.5), 2), Some(book_tick()))
            .await;
        settle().await;
        engine.cancel_order(&order.order_id).await.unwrap();
        seen.lock().clear();

        engine.cancel_order(&order.order_id).await.unwrap();
        let events = seen.lock();
        assert_eq!(events.len(), 1);
        match &events[0].data {
            EventData::CancelFailed(o) => {
                assert_eq!(o.status_msg, "cancel failed: CANCELED");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        drop(events);
        // The stored order is untouched by the failed cancel.
        assert_eq!(
            engine.order(&order.order_id).unwrap().status_msg,
            "canceled"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_orders() {
        let (engine, _bus, _seen) = engine_with_bus();
        let first = engine
            .insert_order(long_limit(dec!(9.5), 1), Some(book_tick()))
            .await;
        let second = engine
            .insert_order(long_limit(dec!(9.6), 1), Some(book_tick()))
            .await;
        settle().await;
        engine.cancel_all_orders().await;
        assert_eq!(engine.order(&first.order_id).unwrap().status, OrderStatus::Canceled);
        assert_eq!(engine.order(&second.order_id).unwrap().status, OrderStatus::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_state() {
        let (engine, _bus, _seen) = engine_with_bus();
        engine
            .insert_order(long_limit(dec!(9.5), 1), Some(book_tick()))
            .await;
        settle().await;
        engine.reset();
        assert!(engine.today_orders().is_empty());
        assert!(engine.subscriptions().is_empty());
    }
}
