//! Timestamp type for representing Unix millisecond timestamps.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// Unix millisecond timestamp.
///
/// Wraps an `i64` value representing milliseconds since the Unix epoch and
/// carries the alignment arithmetic used by the bar pipeline.
///
/// # Examples
///
/// ```
/// use sirocco_core::types::Timestamp;
///
/// let ts = Timestamp::now();
/// assert!(ts.as_millis() > 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Zero timestamp constant.
    pub const ZERO: Self = Self(0);

    /// Creates a new `Timestamp` from milliseconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTimestamp` for pre-epoch values.
    pub fn new(millis: i64) -> Result<Self, ValidationError> {
        if millis >= 0 {
            Ok(Self(millis))
        } else {
            Err(ValidationError::InvalidTimestamp(millis))
        }
    }

    /// Creates a new `Timestamp` without validation.
    #[must_use]
    pub const fn new_unchecked(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock timestamp.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Creates a `Timestamp` from seconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTimestamp` if the value is negative.
    pub fn from_secs(secs: i64) -> Result<Self, ValidationError> {
        Self::new(secs * 1000)
    }

    /// Returns the timestamp as milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns the timestamp as whole seconds since the Unix epoch.
    #[must_use]
    pub const fn as_secs(&self) -> i64 {
        self.0 / 1000
    }

    /// Returns true if the timestamp is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns a timestamp shifted by the given number of seconds.
    #[must_use]
    pub const fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0 + secs * 1000)
    }

    /// Returns a timestamp shifted by the given number of milliseconds.
    #[must_use]
    pub const fn plus_millis(&self, millis: i64) -> Self {
        Self(self.0 + millis)
    }

    /// Returns the second-of-minute component (0..=59).
    #[must_use]
    pub const fn second_of_minute(&self) -> i64 {
        (self.0 / 1000) % 60
    }

    /// Aligns this timestamp down to the start of a bar of `interval_secs`.
    ///
    /// For sub-minute intervals the seconds component becomes
    /// `(second / interval) * interval` within the containing minute; for 60
    /// seconds this is the start of the minute.
    #[must_use]
    pub const fn align_bar_start(&self, interval_secs: u32) -> Self {
        let secs = self.0 / 1000;
        let minute_start = secs - secs % 60;
        let in_minute = secs % 60;
        let aligned = in_minute / interval_secs as i64 * interval_secs as i64;
        Self((minute_start + aligned) * 1000)
    }

    /// Aligns this timestamp up to the next whole-minute boundary.
    #[must_use]
    pub const fn next_minute(&self) -> Self {
        let secs = self.0 / 1000;
        Self((secs - secs % 60 + 60) * 1000)
    }

    /// Converts to a `DateTime<Utc>`; values chrono cannot represent
    /// collapse to the epoch.
    #[must_use]
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::new_unchecked(dt.timestamp_millis())
    }

    /// Returns the UTC calendar date of this timestamp.
    #[must_use]
    pub fn to_date(&self) -> NaiveDate {
        self.to_datetime().date_naive()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}
