//! Per-symbol ranking state
//!
//! One `SymbolState` per tracked instrument, created at start-up and mutated
//! only by the engine. The ranking metric ("gap") is computed by an injected
//! `GapModel` from the accepted price and the symbol's reference price.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use types::ids::Symbol;
use types::numeric::Price;
use types::ticker::RawTicker;

/// Pure function from (price, reference) to the ranking metric.
pub trait GapModel: Send + Sync {
    fn gap(&self, price: Price, reference: Price) -> f64;
}

impl<F> GapModel for F
where
    F: Fn(Price, Price) -> f64 + Send + Sync,
{
    fn gap(&self, price: Price, reference: Price) -> f64 {
        self(price, reference)
    }
}

/// Percentage deviation of the price from the reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentGap;

impl GapModel for PercentGap {
    fn gap(&self, price: Price, reference: Price) -> f64 {
        (price - reference) / reference * 100.0
    }
}

/// Contract identity of a tracked instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSymbol {
    pub symbol: Symbol,
    /// Baseline the gap is measured against (e.g. previous close)
    pub reference: Price,
}

impl TrackedSymbol {
    pub fn new(symbol: Symbol, reference: Price) -> Self {
        Self { symbol, reference }
    }
}

/// Mutable ranking state of one symbol.
#[derive(Clone)]
pub struct SymbolState {
    contract: TrackedSymbol,
    model: Arc<dyn GapModel>,
    last: Option<Price>,
    /// `None` until the first accepted price
    gap: Option<f64>,
    updated_at: Option<DateTime<FixedOffset>>,
}

impl SymbolState {
    pub fn new(contract: TrackedSymbol, model: Arc<dyn GapModel>) -> Self {
        Self {
            contract,
            model,
            last: None,
            gap: None,
            updated_at: None,
        }
    }

    /// Apply an already-filtered ticker. Returns true iff the gap changed.
    ///
    /// Gap comparison is exact. On no change only the update time moves.
    pub fn update(&mut self, ticker: &RawTicker) -> bool {
        let gap = self.model.gap(ticker.last, self.contract.reference);
        self.updated_at = Some(ticker.time);

        if self.gap == Some(gap) {
            return false;
        }

        self.last = Some(ticker.last);
        self.gap = Some(gap);
        true
    }

    pub fn symbol(&self) -> &Symbol {
        &self.contract.symbol
    }

    pub fn contract(&self) -> &TrackedSymbol {
        &self.contract
    }

    pub fn reference(&self) -> Price {
        self.contract.reference
    }

    pub fn last(&self) -> Option<Price> {
        self.last
    }

    pub fn gap(&self) -> Option<f64> {
        self.gap
    }

    pub fn updated_at(&self) -> Option<DateTime<FixedOffset>> {
        self.updated_at
    }
}

impl fmt::Debug for SymbolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolState")
            .field("contract", &self.contract)
            .field("last", &self.last)
            .field("gap", &self.gap)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(price: f64, time: &str) -> RawTicker {
        RawTicker::new(
            Symbol::new("AAPL"),
            price,
            DateTime::parse_from_rfc3339(time).unwrap(),
        )
    }

    fn state(reference: f64) -> SymbolState {
        SymbolState::new(
            TrackedSymbol::new(Symbol::new("AAPL"), reference),
            Arc::new(PercentGap),
        )
    }

    #[test]
    fn test_first_update_always_changes() {
        let mut s = state(100.0);
        assert!(s.gap().is_none());
        assert!(s.update(&ticker(105.0, "2024-03-04T10:00:00-05:00")));
        assert_eq!(s.last(), Some(105.0));
        assert_eq!(s.gap(), Some(5.0));
    }

    #[test]
    fn test_same_price_reports_no_change_but_refreshes_time() {
        let mut s = state(100.0);
        s.update(&ticker(105.0, "2024-03-04T10:00:00-05:00"));

        assert!(!s.update(&ticker(105.0, "2024-03-04T10:00:05-05:00")));
        assert_eq!(s.gap(), Some(5.0));
        assert_eq!(
            s.updated_at(),
            Some(DateTime::parse_from_rfc3339("2024-03-04T10:00:05-05:00").unwrap())
        );
    }

    #[test]
    fn test_price_move_overwrites_in_place() {
        let mut s = state(100.0);
        s.update(&ticker(105.0, "2024-03-04T10:00:00-05:00"));
        assert!(s.update(&ticker(98.0, "2024-03-04T10:01:00-05:00")));
        assert_eq!(s.last(), Some(98.0));
        assert_eq!(s.gap(), Some(-2.0));
    }

    #[test]
    fn test_exact_comparison_detects_tiny_moves() {
        let mut s = state(100.0);
        s.update(&ticker(100.0, "2024-03-04T10:00:00-05:00"));
        assert!(s.update(&ticker(100.0 + f64::EPSILON * 128.0, "2024-03-04T10:00:01-05:00")));
    }

    #[test]
    fn test_injected_model_is_used() {
        let model = |price: f64, reference: f64| price - reference;
        let mut s = SymbolState::new(
            TrackedSymbol::new(Symbol::new("AAPL"), 10.0),
            Arc::new(model),
        );
        s.update(&ticker(13.5, "2024-03-04T10:00:00-05:00"));
        assert_eq!(s.gap(), Some(3.5));
    }

    #[test]
    fn test_percent_gap() {
        assert_eq!(PercentGap.gap(110.0, 100.0), 10.0);
        assert_eq!(PercentGap.gap(90.0, 100.0), -10.0);
        assert_eq!(PercentGap.gap(100.0, 100.0), 0.0);
    }
}
