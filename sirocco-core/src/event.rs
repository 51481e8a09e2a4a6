//! Broker event types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{Bar, Order, Tick, Trade};

/// Event type discriminant, used for subscription routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Adapter-specific payload.
    CustomEvent,
    /// Log line surfaced as an event.
    Log,
    /// Trading-day transition.
    NewTradingDay,
    /// Connection state change.
    Connection,
    /// Market tick.
    Tick,
    /// Aggregated bar.
    Bar,
    /// Order lifecycle update.
    OrderStatus,
    /// Cancel request rejection.
    CancelFailed,
    /// Fill report.
    TradeReport,
}

/// All event types, for subscribe-to-everything handlers.
pub const ALL_EVENT_TYPES: [EventType; 9] = [
    EventType::CustomEvent,
    EventType::Log,
    EventType::NewTradingDay,
    EventType::Connection,
    EventType::Tick,
    EventType::Bar,
    EventType::OrderStatus,
    EventType::CancelFailed,
    EventType::TradeReport,
];

/// Log severity for [`EventData::Log`] payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Informational message.
    Info,
    /// Something degraded but operation continues.
    Warning,
    /// Operation failed.
    Error,
}

/// Log line carried on the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Message content.
    pub content: String,
}

/// Adapter connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Connection attempt in progress.
    Connecting,
    /// Transport connected, not yet logged in.
    Connected,
    /// Market-data session logged in.
    MdLoggedIn,
    /// Trading session logged in.
    TdLoggedIn,
    /// Disconnect in progress.
    Disconnecting,
    /// Disconnected.
    Disconnected,
}

/// Event payload, one variant per [`EventType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventData {
    /// Adapter-specific payload.
    Custom(String),
    /// Log line.
    Log(LogEntry),
    /// New trading day.
    NewTradingDay(NaiveDate),
    /// Connection state change.
    Connection(ConnectionState),
    /// Market tick.
    Tick(Tick),
    /// Aggregated bar.
    Bar(Bar),
    /// Order lifecycle update.
    OrderStatus(Order),
    /// Cancel request rejection; carries the order with the failure message.
    CancelFailed(Order),
    /// Fill report.
    TradeReport(Trade),
}

/// Typed event record published on the process-local bus.
///
/// `source_id` uniquely identifies the emitting adapter instance so that
/// overlays can tell their own traffic from the parent's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerEvent {
    /// Id of the emitting adapter instance.
    pub source_id: String,
    /// Payload.
    pub data: EventData,
}

impl BrokerEvent {
    /// Creates an event from a source id and payload.
    #[must_use]
    pub fn new(source_id: impl Into<String>, data: EventData) -> Self {
        Self {
            source_id: source_id.into(),
            data,
        }
    }

    /// Returns the event type discriminant of the payload.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self.data {
            EventData::Custom(_) => EventType::CustomEvent,
            EventData::Log(_) => EventType::Log,
            EventData::NewTradingDay(_) => EventType::NewTradingDay,
            EventData::Connection(_) => EventType::Connection,
            EventData::Tick(_) => EventType::Tick,
            EventData::Bar(_) => EventType::Bar,
            EventData::OrderStatus(_) => EventType::OrderStatus,
            EventData::CancelFailed(_) => EventType::CancelFailed,
            EventData::TradeReport(_) => EventType::TradeReport,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CustomEvent => "CUSTOM_EVENT",
            Self::Log => "LOG",
            Self::NewTradingDay => "NEW_TRADING_DAY",
            Self::Connection => "CONNECTION",
            Self::Tick => "TICK",
            Self::Bar => "BAR",
            Self::OrderStatus => "ORDER_STATUS",
            Self::CancelFailed => "CANCEL_FAILED",
            Self::TradeReport => "TRADE_REPORT",
        };
        write!(f, "{s}")
    }
}
