//! Change events published by the ranking service
//!
//! `LeaderboardEvent` is emitted once per real change of one leaderboard
//! side. `IntradayEvent` is emitted once per accepted gap change of one
//! symbol.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::Symbol;
use crate::numeric::{nan_as_null, Price};

/// Which end of the ranking a leaderboard covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BoardSide {
    /// Largest positive gaps, descending
    Top,
    /// Most negative gaps, ascending
    Bottom,
}

impl BoardSide {
    pub fn label(&self) -> &'static str {
        match self {
            BoardSide::Top => "top",
            BoardSide::Bottom => "bottom",
        }
    }
}

/// One ranked position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankEntry {
    pub symbol: Symbol,
    pub gap: f64,
}

impl RankEntry {
    pub fn new(symbol: Symbol, gap: f64) -> Self {
        Self { symbol, gap }
    }
}

/// A published leaderboard change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEvent {
    /// Unique event identifier (UUID v7)
    pub event_id: Uuid,
    /// Per-side publish counter, starting at 1
    pub sequence: u64,
    pub side: BoardSide,
    /// Ranked entries, best first
    pub entries: Vec<RankEntry>,
    /// Time of the raw ticker that triggered the change
    pub event_time: DateTime<FixedOffset>,
}

impl LeaderboardEvent {
    pub fn symbols(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.symbol.as_str()).collect()
    }
}

/// Per-symbol state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayEvent {
    pub symbol: Symbol,
    #[serde(with = "nan_as_null")]
    pub last: Price,
    pub reference: Price,
    #[serde(with = "nan_as_null")]
    pub gap: f64,
    pub event_time: DateTime<FixedOffset>,
}
