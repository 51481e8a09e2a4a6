//! OHLCV bar data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Code, Timestamp};

use super::DataValidationError;

/// Aggregated OHLCV over a fixed interval.
///
/// `start_time` is aligned on a whole-interval boundary and
/// `end_time = start_time + interval_secs`. A bar whose `open` is zero is an
/// uninitialized sentinel and must never be published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Instrument code.
    pub code: Code,
    /// Bar interval in seconds.
    pub interval_secs: u32,
    /// Start of the covered interval (inclusive).
    pub start_time: Timestamp,
    /// End of the covered interval (exclusive).
    pub end_time: Timestamp,
    /// Opening price.
    pub open: Decimal,
    /// Highest price.
    pub high: Decimal,
    /// Lowest price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Traded volume within the interval.
    pub volume: u64,
    /// Turnover within the interval.
    pub turnover: Decimal,
    /// Open interest at the end of the interval.
    pub open_interest: Decimal,
}

impl Bar {
    /// Creates an empty sentinel bar covering `[start, start + interval)`.
    #[must_use]
    pub fn sentinel(code: Code, interval_secs: u32, start_time: Timestamp) -> Self {
        Self {
            code,
            interval_secs,
            start_time,
            end_time: start_time.plus_secs(i64::from(interval_secs)),
            ..Self::default()
        }
    }

    /// Returns true while the bar has not absorbed any price.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.open.is_zero()
    }

    /// Validates the price relations and time bounds of the bar.
    ///
    /// # Errors
    ///
    /// Returns an error if the high/low range is inverted, if open or close
    /// escape that range, or if the time bounds do not span one interval.
    pub fn validate(&self) -> Result<(), DataValidationError> {
        if self.low > self.high {
            return Err(DataValidationError::InvalidPriceRelation(format!(
                "inverted range: low {} above high {}",
                self.low, self.high
            )));
        }
        for (field, price) in [("open", self.open), ("close", self.close)] {
            if price < self.low || price > self.high {
                return Err(DataValidationError::InvalidPriceRelation(format!(
                    "{field} {price} escapes [{}, {}]",
                    self.low, self.high
                )));
            }
        }
        if self.start_time.plus_secs(i64::from(self.interval_secs)) != self.end_time {
            return Err(DataValidationError::InvalidTimeBounds {
                start: self.start_time.as_millis(),
                end: self.end_time.as_millis(),
                interval_secs: self.interval_secs,
            });
        }
        Ok(())
    }
}
