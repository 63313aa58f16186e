//! Engine configuration
//!
//! Everything the engine needs is supplied once at construction and never
//! changes afterwards. `EngineConfig::from_env` loads it from environment
//! variables with defaults:
//!
//! - `RANKER_SYMBOLS` (required): `SYM=REFERENCE` pairs, comma separated
//! - `RANKER_BAKE_IN_MINUTES` (default: 0)
//! - `RANKER_BAKE_OUT_MINUTES` (default: 0)
//! - `RANKER_TOP_N` (default: 4)
//! - `RANKER_BOTTOM_N` (default: 4)
//! - `RANKER_BYPASS_WINDOW` (default: false)
//! - `RANKER_RAW_TOPIC` (default: raw_ticker_event)
//! - `RANKER_TOP_TOPIC` (default: top_high_event)
//! - `RANKER_BOTTOM_TOPIC` (default: top_low_event)
//! - `RANKER_INTRADAY_TOPIC` (default: intraday_ticker_event, empty disables)
//! - `RANKER_ARCHIVE_DIR` (default: unset, no file archive)
//! - `RANKER_ARCHIVE_CAPACITY` (default: 10000)
//! - `RANKER_START_TIME` (default: unset, RFC 3339 seek target)

use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;
use types::ids::Symbol;
use types::topics;

use crate::symbol_state::TrackedSymbol;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("symbol universe is empty")]
    EmptyUniverse,

    #[error("symbol {0} listed more than once")]
    DuplicateSymbol(String),
}

/// Immutable engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Tracked universe, fixed for the process lifetime
    pub universe: Vec<TrackedSymbol>,
    pub bake_in_minutes: i64,
    pub bake_out_minutes: i64,
    pub n_top: usize,
    pub n_bottom: usize,
    /// Disable session-window filtering (backfill/testing)
    pub bypass_window: bool,
    pub raw_topic: String,
    pub top_topic: String,
    pub bottom_topic: String,
    /// Per-symbol change topic; `None` disables intraday events
    pub intraday_topic: Option<String>,
    pub archive_dir: Option<PathBuf>,
    pub archive_capacity: usize,
    /// Seek target applied before consuming
    pub start_time: Option<DateTime<FixedOffset>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            universe: Vec::new(),
            bake_in_minutes: 0,
            bake_out_minutes: 0,
            n_top: 4,
            n_bottom: 4,
            bypass_window: false,
            raw_topic: topics::RAW_TICKER_EVENT.to_string(),
            top_topic: topics::TOP_HIGH_EVENT.to_string(),
            bottom_topic: topics::TOP_LOW_EVENT.to_string(),
            intraday_topic: Some(topics::INTRADAY_TICKER_EVENT.to_string()),
            archive_dir: None,
            archive_capacity: 10_000,
            start_time: None,
        }
    }
}

impl EngineConfig {
    /// Default configuration over the given universe.
    pub fn with_universe(universe: Vec<TrackedSymbol>) -> Self {
        Self {
            universe,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let symbols = lookup("RANKER_SYMBOLS").ok_or(ConfigError::Missing("RANKER_SYMBOLS"))?;
        let universe = parse_universe(&symbols)?;

        let intraday_topic = match lookup("RANKER_INTRADAY_TOPIC") {
            Some(t) if t.trim().is_empty() => None,
            Some(t) => Some(t),
            None => defaults.intraday_topic,
        };

        let start_time = lookup("RANKER_START_TIME")
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw).map_err(|e| ConfigError::InvalidValue {
                    var: "RANKER_START_TIME",
                    value: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let config = Self {
            universe,
            bake_in_minutes: parse_or(&lookup, "RANKER_BAKE_IN_MINUTES", defaults.bake_in_minutes)?,
            bake_out_minutes: parse_or(&lookup, "RANKER_BAKE_OUT_MINUTES", defaults.bake_out_minutes)?,
            n_top: parse_or(&lookup, "RANKER_TOP_N", defaults.n_top)?,
            n_bottom: parse_or(&lookup, "RANKER_BOTTOM_N", defaults.n_bottom)?,
            bypass_window: parse_or(&lookup, "RANKER_BYPASS_WINDOW", defaults.bypass_window)?,
            raw_topic: lookup("RANKER_RAW_TOPIC").unwrap_or(defaults.raw_topic),
            top_topic: lookup("RANKER_TOP_TOPIC").unwrap_or(defaults.top_topic),
            bottom_topic: lookup("RANKER_BOTTOM_TOPIC").unwrap_or(defaults.bottom_topic),
            intraday_topic,
            archive_dir: lookup("RANKER_ARCHIVE_DIR").map(PathBuf::from),
            archive_capacity: parse_or(&lookup, "RANKER_ARCHIVE_CAPACITY", defaults.archive_capacity)?,
            start_time,
        };
        config.validate()?;
        Ok(config)
    }

    /// Universe must be non-empty, free of duplicates, and every reference
    /// price finite and positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.universe.is_empty() {
            return Err(ConfigError::EmptyUniverse);
        }
        let mut seen = BTreeSet::new();
        for tracked in &self.universe {
            if !seen.insert(tracked.symbol.as_str()) {
                return Err(ConfigError::DuplicateSymbol(tracked.symbol.to_string()));
            }
            if !valid_reference(tracked.reference) {
                return Err(ConfigError::InvalidValue {
                    var: "RANKER_SYMBOLS",
                    value: format!("{}={}", tracked.symbol, tracked.reference),
                    reason: "reference price must be finite and positive".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A gap is only meaningful against a finite, positive reference.
fn valid_reference(reference: f64) -> bool {
    reference.is_finite() && reference > 0.0
}

/// Parse `AAPL=189.5,MSFT=410.25` into tracked symbols.
pub fn parse_universe(raw: &str) -> Result<Vec<TrackedSymbol>, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        var: "RANKER_SYMBOLS",
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (sym, reference) = item
                .split_once('=')
                .ok_or_else(|| invalid("expected SYMBOL=REFERENCE"))?;
            let symbol =
                Symbol::try_new(sym.trim()).ok_or_else(|| invalid("empty symbol"))?;
            let reference: f64 = reference
                .trim()
                .parse()
                .map_err(|_| invalid("reference price is not a number"))?;
            if !valid_reference(reference) {
                return Err(invalid("reference price must be finite and positive"));
            }
            Ok(TrackedSymbol::new(symbol, reference))
        })
        .collect()
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
