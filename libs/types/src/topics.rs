//! Default broker topic names

/// Raw tickers from the feed adapter, keyed by symbol.
pub const RAW_TICKER_EVENT: &str = "raw_ticker_event";

/// Per-symbol gap changes, keyed by symbol.
pub const INTRADAY_TICKER_EVENT: &str = "intraday_ticker_event";

/// Top (positive gap) leaderboard changes.
pub const TOP_HIGH_EVENT: &str = "top_high_event";

/// Bottom (negative gap) leaderboard changes.
pub const TOP_LOW_EVENT: &str = "top_low_event";
