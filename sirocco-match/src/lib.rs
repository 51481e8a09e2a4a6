//! Tick-driven order-matching simulator for the sirocco trading facade.
//!
//! [`MatchEngine`] consumes live ticks from a real adapter and synthesizes
//! order and trade events by walking the published book snapshot level by
//! level. It matches a single submitted order against a static book; it
//! does not form a continuous book of its own.

mod engine;

pub use engine::MatchEngine;

use thiserror::Error;

/// Error raised by the matching simulator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// Cancel referenced an order id never seen today.
    #[error("no such order: {0}")]
    UnknownOrder(String),
}
