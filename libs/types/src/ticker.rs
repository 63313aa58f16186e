//! Raw ticker events from the market-data feed
//!
//! A `RawTicker` is the only shape the ranking core consumes: a symbol, the
//! last-trade price, and the instant the feed stamped it. The instant keeps
//! its own UTC offset; nothing downstream assumes UTC.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::ids::Symbol;
use crate::numeric::{nan_as_null, Price};

/// Immutable price observation for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTicker {
    pub symbol: Symbol,
    /// Last-trade price; NaN when no trade has printed yet
    #[serde(with = "nan_as_null")]
    pub last: Price,
    /// Feed timestamp, timezone-aware
    pub time: DateTime<FixedOffset>,
}

impl RawTicker {
    pub fn new(symbol: Symbol, last: Price, time: DateTime<FixedOffset>) -> Self {
        Self { symbol, last, time }
    }

    /// Whether the ticker carries a usable last price.
    pub fn has_price(&self) -> bool {
        !self.last.is_nan()
    }

    /// Event time as Unix milliseconds (broker record timestamp).
    pub fn timestamp_ms(&self) -> i64 {
        self.time.timestamp_millis()
    }
}
