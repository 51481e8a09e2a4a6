//! Tick-to-bar aggregation for the sirocco trading facade.
//!
//! [`SecondBarGenerator`] turns a tick stream into bars at sub-minute
//! intervals; [`BarAggregator`] multiplexes per-code subscriptions across
//! intervals and composes minute bars into larger ones.

mod aggregator;
mod second_bar;

pub use aggregator::BarAggregator;
pub use second_bar::{BarSink, SecondBarGenerator, VALID_SECOND_INTERVALS};

use thiserror::Error;

/// Error raised by the bar pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarError {
    /// Interval is not a supported bar interval.
    #[error("invalid bar interval: {0}s")]
    InvalidInterval(u32),
}
