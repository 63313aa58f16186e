//! Types library for the gap leaderboard services
//!
//! Wire-level definitions shared between the ranking service and anything
//! that produces raw tickers or consumes leaderboard changes.
//!
//! # Version
//! v1.0.0 - payload schema `1.x`
//!
//! # Modules
//! - `ids`: Instrument identifiers (Symbol)
//! - `numeric`: Float price helpers (NaN sentinel handling)
//! - `ticker`: Raw ticker events from the market-data feed
//! - `events`: Leaderboard and intraday change events
//! - `envelope`: Versioned payload encoding
//! - `topics`: Default broker topic names
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod ticker;
pub mod events;
pub mod envelope;
pub mod topics;
pub mod errors;
