//! Per-(code, interval) second-bar state machine.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use sirocco_core::data::{Bar, MarketStatus, Tick};
use sirocco_core::types::{Code, Timestamp};

use crate::BarError;

/// Sink receiving completed bars.
pub type BarSink = Arc<dyn Fn(Bar) + Send + Sync>;

/// Intervals accepted at sub-minute resolution: the divisors of 60 greater
/// than one.
pub const VALID_SECOND_INTERVALS: [u32; 9] = [2, 3, 5, 6, 10, 15, 20, 30, 60];

/// Grace window after a bar's end during which a late tick still folds into
/// it, in milliseconds.
const GRACE_MILLIS: i64 = 1_000;

struct State {
    current: Bar,
    market_status: MarketStatus,
    first_auction_tick: Option<Tick>,
    /// Bumped whenever `current` is replaced; flush timers re-check it so a
    /// stale timer never double-flushes.
    generation: u64,
    timer: Option<tokio::task::JoinHandle<()>>,
    released: bool,
}

struct Inner {
    code: Code,
    interval: u32,
    sink: BarSink,
    state: Mutex<State>,
}

/// State machine producing bars at a sub-minute interval from a tick feed.
///
/// Bars are aligned so that the seconds component of `start_time` is a
/// multiple of the interval within its minute. Auction volume is withheld
/// until continuous matching begins, at which point the auction match price
/// becomes the opening price of the first continuous bar. A flush timer at
/// `end_time + 1s` closes bars across tick gaps; bars that never absorbed a
/// price (zero open) are suppressed.
#[derive(Clone)]
pub struct SecondBarGenerator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SecondBarGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondBarGenerator")
            .field("code", &self.inner.code)
            .field("interval", &self.inner.interval)
            .finish_non_exhaustive()
    }
}

impl SecondBarGenerator {
    /// Creates a generator for `code` at `interval` seconds.
    ///
    /// # Errors
    ///
    /// Returns `BarError::InvalidInterval` unless the interval is one of
    /// [`VALID_SECOND_INTERVALS`].
    pub fn new(code: Code, interval: u32, sink: BarSink) -> Result<Self, BarError> {
        if !VALID_SECOND_INTERVALS.contains(&interval) {
            return Err(BarError::InvalidInterval(interval));
        }
        let current = Bar::sentinel(code.clone(), interval, Timestamp::now().next_minute());
        Ok(Self {
            inner: Arc::new(Inner {
                code,
                interval,
                sink,
                state: Mutex::new(State {
                    current,
                    market_status: MarketStatus::Unknown,
                    first_auction_tick: None,
                    generation: 0,
                    timer: None,
                    released: false,
                }),
            }),
        })
    }

    /// The instrument this generator aggregates.
    #[must_use]
    pub fn code(&self) -> &Code {
        &self.inner.code
    }

    /// The bar interval in seconds.
    #[must_use]
    pub fn interval(&self) -> u32 {
        self.inner.interval
    }

    /// Feeds one tick into the state machine.
    pub fn update_tick(&self, tick: &Tick) {
        let mut emits: Vec<Bar> = Vec::new();
        {
            let mut st = self.inner.state.lock();
            if st.released {
                return;
            }
            if tick.status == MarketStatus::Closed {
                st.market_status = MarketStatus::Closed;
                Inner::cancel_timer(&mut st);
                return;
            }

            let entering = !st.market_status.is_trading() && tick.status.is_trading();
            if entering {
                self.inner.start_bar(
                    &mut st,
                    tick.timestamp.align_bar_start(self.inner.interval),
                    tick.last_price,
                    tick.timestamp,
                );
            }
            st.market_status = tick.status;

            if tick.volume == 0 {
                return;
            }

            if st.market_status.is_auction() {
                // The open-auction match is withheld until continuous
                // matching begins.
                if st.first_auction_tick.is_none() {
                    st.first_auction_tick = Some(tick.clone());
                }
                return;
            }

            if let Some(auction) = st.first_auction_tick.take() {
                self.inner.start_bar(
                    &mut st,
                    tick.timestamp.align_bar_start(self.inner.interval),
                    auction.last_price,
                    tick.timestamp,
                );
                fold(&mut st.current, &auction);
            }

            if tick.timestamp < st.current.end_time {
                fold(&mut st.current, tick);
            } else if tick.timestamp < st.current.end_time.plus_millis(GRACE_MILLIS) {
                fold(&mut st.current, tick);
                Inner::take_completed(&mut st, &mut emits);
                let start = st.current.end_time;
                self.inner
                    .start_bar(&mut st, start, tick.last_price, tick.timestamp);
            } else {
                Inner::take_completed(&mut st, &mut emits);
                self.inner.start_bar(
                    &mut st,
                    tick.timestamp.align_bar_start(self.inner.interval),
                    tick.last_price,
                    tick.timestamp,
                );
                fold(&mut st.current, tick);
            }
        }
        self.emit(emits);
    }

    /// Restores the initial state for a new trading day.
    pub fn reset(&self) {
        let mut st = self.inner.state.lock();
        Inner::cancel_timer(&mut st);
        st.current = Bar::sentinel(
            self.inner.code.clone(),
            self.inner.interval,
            Timestamp::now().next_minute(),
        );
        st.market_status = MarketStatus::Unknown;
        st.first_auction_tick = None;
    }

    /// Stops the flush timer permanently; further ticks are ignored.
    pub fn release(&self) {
        let mut st = self.inner.state.lock();
        Inner::cancel_timer(&mut st);
        st.released = true;
    }

    fn emit(&self, bars: Vec<Bar>) {
        for bar in bars {
            (self.inner.sink)(bar);
        }
    }
}

impl Inner {
    /// Replaces the current bar and arms a flush timer for
    /// `end_time + grace`, measured relative to `reference` stream time.
    fn start_bar(self: &Arc<Self>, st: &mut State, start: Timestamp, open: rust_decimal::Decimal, reference: Timestamp) {
        Self::cancel_timer(st);
        let mut bar = Bar::sentinel(self.code.clone(), self.interval, start);
        if !open.is_zero() {
            bar.open = open;
            bar.high = open;
            bar.low = open;
            bar.close = open;
        }
        let delay = (bar.end_time.plus_millis(GRACE_MILLIS).as_millis() - reference.as_millis())
            .max(0) as u64;
        st.current = bar;
        st.generation += 1;
        self.arm_timer(st, delay);
    }

    fn arm_timer(self: &Arc<Self>, st: &mut State, delay_ms: u64) {
        // Timers need an ambient runtime; without one (plain synchronous
        // use) bars are closed by the next tick alone.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = Arc::clone(self);
        let generation = st.generation;
        st.timer = Some(handle.spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            inner.flush(generation);
        }));
    }

    /// Timer-driven flush: closes the current bar if it has not advanced
    /// since the timer was armed and synthesizes the next one opening at
    /// the previous close.
    fn flush(self: &Arc<Self>, generation: u64) {
        let mut emits: Vec<Bar> = Vec::new();
        {
            let mut st = self.state.lock();
            if st.released || st.generation != generation {
                return;
            }
            if st.current.is_sentinel() {
                // Nothing absorbed yet; stay dormant until the next tick.
                return;
            }
            let close = st.current.close;
            let start = st.current.end_time;
            Self::take_completed(&mut st, &mut emits);
            let mut bar = Bar::sentinel(self.code.clone(), self.interval, start);
            bar.open = close;
            bar.high = close;
            bar.low = close;
            bar.close = close;
            st.current = bar;
            st.generation += 1;
            self.arm_timer(&mut st, u64::from(self.interval) * 1000 + GRACE_MILLIS as u64);
        }
        for bar in emits {
            (self.sink)(bar);
        }
    }

    /// Moves the current bar into `emits` unless it is an uninitialized
    /// sentinel.
    fn take_completed(st: &mut State, emits: &mut Vec<Bar>) {
        if st.current.is_sentinel() {
            debug!(code = %st.current.code, "suppressing empty bar");
            return;
        }
        emits.push(st.current.clone());
    }

    fn cancel_timer(st: &mut State) {
        if let Some(timer) = st.timer.take() {
            timer.abort();
        }
        st.generation += 1;
    }
}

fn fold(bar: &mut Bar, tick: &Tick) {
    if bar.open.is_zero() {
        bar.open = tick.last_price;
        bar.high = tick.last_price;
        bar.low = tick.last_price;
        bar.close = tick.last_price;
    } else {
        bar.high = bar.high.max(tick.last_price);
        bar.low = bar.low.min(tick.last_price);
        bar.close = tick.last_price;
    }
    bar.volume += tick.volume;
    bar.turnover += tick.turnover;
    bar.open_interest = tick.open_interest;
}
