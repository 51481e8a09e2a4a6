//! Virtual sub-account overlay for the sirocco trading facade.
//!
//! [`SubAccountGateway`] layers an independently-accounted virtual account
//! over any parent [`sirocco_core::BrokerGateway`]: it filters and rewrites
//! the parent's event stream, keeps its own position/asset books with
//! price-addressed lot accounting, derives bar streams from the tick feed
//! and persists everything through the data-store port.

mod ledger;
mod overlay;

pub use ledger::Ledger;
pub use overlay::SubAccountGateway;
