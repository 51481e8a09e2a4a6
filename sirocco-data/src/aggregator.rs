//! Multi-interval bar subscription fan-out.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use sirocco_core::bus::EventBus;
use sirocco_core::data::{Bar, Tick};
use sirocco_core::event::{BrokerEvent, EventData};
use sirocco_core::types::Code;

use crate::second_bar::{BarSink, SecondBarGenerator};
use crate::BarError;

/// Per-code minute-bar fan-out: publishes minute bars when a user asked for
/// them and maintains the cache feeding composite intervals.
struct MinuteFan {
    bus: Arc<EventBus>,
    source_id: String,
    /// True while a user explicitly subscribed the 60s feed (as opposed to
    /// it existing only to feed composites).
    user_minute: AtomicBool,
    state: Mutex<FanState>,
}

#[derive(Default)]
struct FanState {
    cache: Vec<Bar>,
    /// Composite intervals in seconds (each a multiple of 60).
    intervals: BTreeSet<u32>,
}

impl MinuteFan {
    fn new(bus: Arc<EventBus>, source_id: String) -> Self {
        Self {
            bus,
            source_id,
            user_minute: AtomicBool::new(false),
            state: Mutex::new(FanState::default()),
        }
    }

    fn on_minute_bar(&self, bar: Bar) {
        let mut out: Vec<Bar> = Vec::new();
        if self.user_minute.load(Ordering::Acquire) {
            out.push(bar.clone());
        }
        {
            let mut st = self.state.lock();
            st.cache.push(bar);
            for &interval in &st.intervals {
                let k = (interval / 60) as usize;
                if k > 0 && st.cache.len() % k == 0 {
                    out.push(compose(&st.cache[st.cache.len() - k..], interval));
                }
            }
        }
        for bar in out {
            self.bus
                .post(BrokerEvent::new(self.source_id.clone(), EventData::Bar(bar)));
        }
    }
}

/// Builds a composite bar from `k` consecutive minute bars.
fn compose(minutes: &[Bar], interval: u32) -> Bar {
    let first = &minutes[0];
    let last = &minutes[minutes.len() - 1];
    let mut bar = Bar {
        code: first.code.clone(),
        interval_secs: interval,
        start_time: first.start_time,
        end_time: last.end_time,
        open: first.open,
        high: first.high,
        low: first.low,
        close: last.close,
        volume: 0,
        turnover: rust_decimal::Decimal::ZERO,
        open_interest: last.open_interest,
    };
    for minute in minutes {
        bar.high = bar.high.max(minute.high);
        bar.low = bar.low.min(minute.low);
        bar.volume += minute.volume;
        bar.turnover += minute.turnover;
    }
    bar
}

#[derive(Default)]
struct AggState {
    generators: HashMap<(Code, u32), SecondBarGenerator>,
    fans: HashMap<Code, Arc<MinuteFan>>,
    user_subs: HashSet<(Code, u32)>,
}

/// Multiplexes per-code bar subscriptions across intervals.
///
/// Sub-minute intervals run their own [`SecondBarGenerator`]; intervals
/// above one minute implicitly subscribe a 60-second feed whose bars are
/// cached per code and composed whenever the cache length reaches a
/// multiple of `interval / 60`. Completed bars are published as
/// [`EventData::Bar`] on the owning bus.
pub struct BarAggregator {
    bus: Arc<EventBus>,
    source_id: String,
    state: Mutex<AggState>,
}

impl BarAggregator {
    /// Creates an aggregator publishing on `bus` under `source_id`.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, source_id: impl Into<String>) -> Self {
        Self {
            bus,
            source_id: source_id.into(),
            state: Mutex::new(AggState::default()),
        }
    }

    /// Subscribes bars of `interval` seconds for `code`.
    ///
    /// # Errors
    ///
    /// Returns `BarError::InvalidInterval` for zero, for sub-minute values
    /// outside the accepted set, and for super-minute values that are not
    /// multiples of 60.
    pub fn subscribe(&self, code: &Code, interval: u32) -> Result<(), BarError> {
        if interval == 0 {
            return Err(BarError::InvalidInterval(interval));
        }
        let mut st = self.state.lock();
        if interval < 60 {
            self.ensure_plain_generator(&mut st, code, interval)?;
        } else if interval == 60 {
            let fan = self.ensure_minute_feed(&mut st, code)?;
            fan.user_minute.store(true, Ordering::Release);
        } else {
            if interval % 60 != 0 {
                return Err(BarError::InvalidInterval(interval));
            }
            let fan = self.ensure_minute_feed(&mut st, code)?;
            fan.state.lock().intervals.insert(interval);
        }
        st.user_subs.insert((code.clone(), interval));
        Ok(())
    }

    /// Drops the user subscription for (`code`, `interval`) and tears down
    /// feeds nothing depends on any more.
    pub fn unsubscribe(&self, code: &Code, interval: u32) {
        let mut st = self.state.lock();
        if !st.user_subs.remove(&(code.clone(), interval)) {
            return;
        }
        if interval < 60 {
            if let Some(generator) = st.generators.remove(&(code.clone(), interval)) {
                generator.release();
            }
            return;
        }
        let Some(fan) = st.fans.get(code) else {
            return;
        };
        if interval == 60 {
            fan.user_minute.store(false, Ordering::Release);
        } else {
            fan.state.lock().intervals.remove(&interval);
        }
        let fan_idle =
            !fan.user_minute.load(Ordering::Acquire) && fan.state.lock().intervals.is_empty();
        if fan_idle {
            st.fans.remove(code);
            if let Some(generator) = st.generators.remove(&(code.clone(), 60)) {
                generator.release();
            }
        }
    }

    /// Routes a tick to every generator aggregating its code.
    pub fn update_tick(&self, tick: &Tick) {
        let generators: Vec<SecondBarGenerator> = {
            let st = self.state.lock();
            st.generators
                .iter()
                .filter(|((code, _), _)| code == &tick.code)
                .map(|(_, generator)| generator.clone())
                .collect()
        };
        // Generators are driven outside the aggregator lock: their sinks
        // re-enter the fan state.
        for generator in generators {
            generator.update_tick(tick);
        }
    }

    /// Explicit user subscriptions.
    #[must_use]
    pub fn user_subscriptions(&self) -> Vec<(Code, u32)> {
        let st = self.state.lock();
        let mut subs: Vec<_> = st.user_subs.iter().cloned().collect();
        subs.sort();
        subs
    }

    /// Effective feeds, including implicit 60-second feeds serving
    /// composite intervals.
    #[must_use]
    pub fn effective_subscriptions(&self) -> Vec<(Code, u32)> {
        let st = self.state.lock();
        let mut subs: Vec<_> = st.generators.keys().cloned().collect();
        subs.sort();
        subs
    }

    /// Clears bar state for a new trading day; subscriptions survive.
    pub fn reset(&self) {
        let (generators, fans) = {
            let st = self.state.lock();
            (
                st.generators.values().cloned().collect::<Vec<_>>(),
                st.fans.values().map(Arc::clone).collect::<Vec<_>>(),
            )
        };
        for generator in generators {
            generator.reset();
        }
        for fan in fans {
            fan.state.lock().cache.clear();
        }
    }

    /// Releases every generator and timer; the aggregator is unusable
    /// afterwards.
    pub fn release(&self) {
        let mut st = self.state.lock();
        for generator in st.generators.values() {
            generator.release();
        }
        st.generators.clear();
        st.fans.clear();
        st.user_subs.clear();
        debug!("bar aggregator released");
    }

    fn ensure_plain_generator(
        &self,
        st: &mut AggState,
        code: &Code,
        interval: u32,
    ) -> Result<(), BarError> {
        if st.generators.contains_key(&(code.clone(), interval)) {
            return Ok(());
        }
        let bus = Arc::clone(&self.bus);
        let source_id = self.source_id.clone();
        let sink: BarSink = Arc::new(move |bar| {
            bus.post(BrokerEvent::new(source_id.clone(), EventData::Bar(bar)));
        });
        let generator = SecondBarGenerator::new(code.clone(), interval, sink)?;
        st.generators.insert((code.clone(), interval), generator);
        Ok(())
    }

    fn ensure_minute_feed(
        &self,
        st: &mut AggState,
        code: &Code,
    ) -> Result<Arc<MinuteFan>, BarError> {
        let fan = st
            .fans
            .entry(code.clone())
            .or_insert_with(|| {
                Arc::new(MinuteFan::new(
                    Arc::clone(&self.bus),
                    self.source_id.clone(),
                ))
            })
            .clone();
        if !st.generators.contains_key(&(code.clone(), 60)) {
            let sink_fan = Arc::clone(&fan);
            let sink: BarSink = Arc::new(move |bar| sink_fan.on_minute_bar(bar));
            let generator = SecondBarGenerator::new(code.clone(), 60, sink)?;
            st.generators.insert((code.clone(), 60), generator);
        }
        Ok(fan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use sirocco_core::data::{MarketStatus, Tick};
    use sirocco_core::event::EventType;
    use sirocco_core::types::Timestamp;

    const BASE: i64 = 1_704_103_200; // whole minute

    fn code() -> Code {
        Code::new("rb2410").unwrap()
    }

    fn tick_at(secs: i64, price: Decimal, volume: u64) -> Tick {
        let mut tick = Tick::new(code(), Timestamp::from_secs(secs).unwrap(), price);
        tick.volume = volume;
        tick.turnover = price * Decimal::from(volume);
        tick.status = MarketStatus::ContinuousMatching;
        tick
    }

    fn bar_collector(bus: &EventBus) -> Arc<PlMutex<Vec<Bar>>> {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            &[EventType::Bar],
            "test",
            Arc::new(move |event| {
                if let EventData::Bar(bar) = &event.data {
                    sink.lock().push(bar.clone());
                }
            }),
        );
        seen
    }

    #[test]
    fn test_invalid_intervals() {
        let aggregator = BarAggregator::new(Arc::new(EventBus::new()), "agg");
        assert!(aggregator.subscribe(&code(), 0).is_err());
        assert!(aggregator.subscribe(&code(), 7).is_err());
        assert!(aggregator.subscribe(&code(), 90).is_err());
        assert!(aggregator.subscribe(&code(), 15).is_ok());
        assert!(aggregator.subscribe(&code(), 300).is_ok());
    }

    #[test]
    fn test_sub_minute_bars_published_on_bus() {
        let bus = Arc::new(EventBus::new());
        let seen = bar_collector(&bus);
        let aggregator = BarAggregator::new(Arc::clone(&bus), "agg");
        aggregator.subscribe(&code(), 10).unwrap();

        aggregator.update_tick(&tick_at(BASE + 2, dec!(100), 1));
        aggregator.update_tick(&tick_at(BASE + 11, dec!(101), 2));

        let bars = seen.lock();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].interval_secs, 10);
        assert_eq!(bars[0].open, dec!(100));
    }

    #[test]
    fn test_composite_interval_feeds_off_minute_cache() {
        let bus = Arc::new(EventBus::new());
        let seen = bar_collector(&bus);
        let aggregator = BarAggregator::new(Arc::clone(&bus), "agg");
        aggregator.subscribe(&code(), 180).unwrap();

        // The 60s feed exists but is not a user subscription.
        assert_eq!(
            aggregator.effective_subscriptions(),
            vec![(code(), 60)]
        );
        assert_eq!(aggregator.user_subscriptions(), vec![(code(), 180)]);

        // Three minute bars: boundary ticks fold into the closing minute.
        aggregator.update_tick(&tick_at(BASE + 1, dec!(100), 1));
        aggregator.update_tick(&tick_at(BASE + 60, dec!(101), 1));
        aggregator.update_tick(&tick_at(BASE + 120, dec!(102), 1));
        aggregator.update_tick(&tick_at(BASE + 180, dec!(103), 1));

        let bars = seen.lock();
        // Minute bars are non-user: only the composite is published.
        assert_eq!(bars.len(), 1);
        let composite = &bars[0];
        assert_eq!(composite.interval_secs, 180);
        assert_eq!(composite.start_time, Timestamp::from_secs(BASE).unwrap());
        assert_eq!(composite.end_time, Timestamp::from_secs(BASE + 180).unwrap());
        assert_eq!(composite.open, dec!(100));
        assert_eq!(composite.close, dec!(103));
        assert_eq!(composite.high, dec!(103));
        assert_eq!(composite.volume, 4);
    }

    #[test]
    fn test_user_minute_and_composite_share_feed() {
        let bus = Arc::new(EventBus::new());
        let seen = bar_collector(&bus);
        let aggregator = BarAggregator::new(Arc::clone(&bus), "agg");
        aggregator.subscribe(&code(), 60).unwrap();
        aggregator.subscribe(&code(), 120).unwrap();
        assert_eq!(aggregator.effective_subscriptions(), vec![(code(), 60)]);

        aggregator.update_tick(&tick_at(BASE + 1, dec!(100), 1));
        aggregator.update_tick(&tick_at(BASE + 60, dec!(101), 1));
        aggregator.update_tick(&tick_at(BASE + 120, dec!(102), 1));

        let bars = seen.lock();
        // Two minute bars for the user plus one 120s composite.
        let minute_count = bars.iter().filter(|b| b.interval_secs == 60).count();
        let composite_count = bars.iter().filter(|b| b.interval_secs == 120).count();
        assert_eq!(minute_count, 2);
        assert_eq!(composite_count, 1);
    }

    #[test]
    fn test_unsubscribe_symmetry() {
        let aggregator = BarAggregator::new(Arc::new(EventBus::new()), "agg");
        aggregator.subscribe(&code(), 10).unwrap();
        aggregator.subscribe(&code(), 300).unwrap();
        let before_user = aggregator.user_subscriptions();
        let before_effective = aggregator.effective_subscriptions();

        aggregator.unsubscribe(&code(), 300);
        assert_eq!(aggregator.user_subscriptions(), vec![(code(), 10)]);
        // The implicit minute feed is gone with its last dependent.
        assert_eq!(aggregator.effective_subscriptions(), vec![(code(), 10)]);

        aggregator.subscribe(&code(), 300).unwrap();
        assert_eq!(aggregator.user_subscriptions(), before_user);
        assert_eq!(aggregator.effective_subscriptions(), before_effective);
    }

    #[test]
    fn test_minute_feed_survives_while_composite_depends() {
        let aggregator = BarAggregator::new(Arc::new(EventBus::new()), "agg");
        aggregator.subscribe(&code(), 60).unwrap();
        aggregator.subscribe(&code(), 120).unwrap();

        aggregator.unsubscribe(&code(), 60);
        // 120s still needs the minute feed.
        assert_eq!(aggregator.effective_subscriptions(), vec![(code(), 60)]);

        aggregator.unsubscribe(&code(), 120);
        assert!(aggregator.effective_subscriptions().is_empty());
    }

    #[test]
    fn test_reset_clears_minute_cache() {
        let bus = Arc::new(EventBus::new());
        let seen = bar_collector(&bus);
        let aggregator = BarAggregator::new(Arc::clone(&bus), "agg");
        aggregator.subscribe(&code(), 120).unwrap();

        aggregator.update_tick(&tick_at(BASE + 1, dec!(100), 1));
        aggregator.update_tick(&tick_at(BASE + 60, dec!(101), 1));
        aggregator.reset();
        // One minute bar was cached pre-reset; after reset two fresh minute
        // bars are needed before a composite appears.
        aggregator.update_tick(&tick_at(BASE + 121, dec!(102), 1));
        aggregator.update_tick(&tick_at(BASE + 180, dec!(103), 1));
        assert!(seen.lock().iter().all(|b| b.interval_secs != 120));

        aggregator.update_tick(&tick_at(BASE + 240, dec!(104), 1));
        assert_eq!(
            seen.lock()
                .iter()
                .filter(|b| b.interval_secs == 120)
                .count(),
            1
        );
    }
}
