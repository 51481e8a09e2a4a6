//! Core of the sirocco unified brokerage trading facade.
//!
//! Provides the shared data model (ticks, bars, orders, trades, positions,
//! assets, securities), the typed [`bus::EventBus`], the
//! [`gateway::BrokerGateway`] facade trait implemented by broker adapters
//! and overlays, the synchronous [`fees::FeeCalculator`] capability and the
//! [`store::DataStore`] persistence port.

pub mod bus;
pub mod data;
pub mod error;
pub mod event;
pub mod fees;
pub mod gateway;
pub mod store;
pub mod types;

pub use bus::{EventBus, EventHandler};
pub use error::{GatewayError, StoreError};
pub use event::{BrokerEvent, ConnectionState, EventData, EventType, LogEntry, LogLevel};
pub use gateway::BrokerGateway;
