//! Gap Ranker Service
//!
//! Consumes raw ticker events for a fixed universe of symbols and maintains
//! two live leaderboards:
//! - Top: symbols with the largest positive gap against their reference price
//! - Bottom: symbols with the most negative gap
//!
//! A leaderboard is published only when its ranked snapshot differs from the
//! last one published for that side. Prices outside the venue's qualified
//! session window, NaN prices and untracked symbols are discarded.
//!
//! # Architecture
//!
//! ```text
//!   raw_ticker_event
//!          │
//!    ┌─────▼─────┐
//!    │  Offsets  │  ← seek to start-of-day (or configured instant)
//!    └─────┬─────┘
//!          │
//!    ┌─────▼─────┐      ┌─────────┐
//!    │  Engine   │─────►│ Archive │  ← bounded, lossy tap
//!    └─────┬─────┘      └─────────┘
//!          │  decode → window → universe → SymbolState
//!          │
//!   ┌──────┼───────────────┐
//!   │      │               │
//! ┌─▼──┐ ┌─▼───┐     ┌─────▼─────┐
//! │Top │ │Bottom│    │ Intraday  │
//! └─┬──┘ └──┬──┘     └─────┬─────┘
//!   │       │              │
//! top_high top_low  intraday_ticker
//!  _event   _event      _event
//! ```

pub mod archive;
pub mod config;
pub mod engine;
pub mod leaderboard;
pub mod memory;
pub mod metrics;
pub mod offsets;
pub mod symbol_state;
pub mod transport;
pub mod window;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
