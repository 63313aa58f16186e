//! Leaderboard snapshots
//!
//! A snapshot is the ranked top-N (positive gaps, descending) or bottom-N
//! (negative gaps, ascending) of the whole symbol-state set. Snapshots are
//! rebuilt from scratch and compared structurally: same length, same symbol
//! and same gap at every position.
//!
//! Equal gaps are ordered by symbol, ascending, on both sides. Non-finite
//! gaps rank on neither side.

use std::cmp::Ordering;

use types::events::{BoardSide, RankEntry};
use types::ids::Symbol;

use crate::symbol_state::SymbolState;

/// Immutable ranked view of one side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Leaderboard {
    entries: Vec<RankEntry>,
}

impl Leaderboard {
    /// Empty snapshot, the state before anything is published.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rank `states` for one side, keeping at most `n` entries.
    pub fn build<'a, I>(side: BoardSide, states: I, n: usize) -> Self
    where
        I: IntoIterator<Item = &'a SymbolState>,
    {
        let mut entries: Vec<RankEntry> = states
            .into_iter()
            .filter_map(|s| s.gap().map(|g| (s.symbol(), g)))
            .filter(|(_, g)| g.is_finite())
            .filter(|(_, g)| match side {
                BoardSide::Top => *g > 0.0,
                BoardSide::Bottom => *g < 0.0,
            })
            .map(|(symbol, gap)| RankEntry::new(symbol.clone(), gap))
            .collect();

        entries.sort_by(|a, b| rank_order(side, a, b));
        entries.truncate(n);

        Self { entries }
    }

    pub fn entries(&self) -> &[RankEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<RankEntry> {
        self.entries
    }

    pub fn symbols(&self) -> Vec<&Symbol> {
        self.entries.iter().map(|e| &e.symbol).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<RankEntry>> for Leaderboard {
    fn from(entries: Vec<RankEntry>) -> Self {
        Self { entries }
    }
}

/// Top-N snapshot: gap > 0, largest first.
pub fn top_n<'a, I>(states: I, n: usize) -> Leaderboard
where
    I: IntoIterator<Item = &'a SymbolState>,
{
    Leaderboard::build(BoardSide::Top, states, n)
}

/// Bottom-N snapshot: gap < 0, most negative first.
pub fn bottom_n<'a, I>(states: I, n: usize) -> Leaderboard
where
    I: IntoIterator<Item = &'a SymbolState>,
{
    Leaderboard::build(BoardSide::Bottom, states, n)
}

fn rank_order(side: BoardSide, a: &RankEntry, b: &RankEntry) -> Ordering {
    let by_gap = match side {
        BoardSide::Top => b.gap.total_cmp(&a.gap),
        BoardSide::Bottom => a.gap.total_cmp(&b.gap),
    };
    by_gap.then_with(|| a.symbol.cmp(&b.symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol_state::{GapModel, TrackedSymbol};
    use chrono::DateTime;
    use proptest::prelude::*;
    use std::sync::Arc;
    use types::ticker::RawTicker;

    /// Gap equals price, so tests can set gaps directly.
    fn identity() -> Arc<dyn GapModel> {
        Arc::new(|price: f64, _reference: f64| price)
    }

    fn states(gaps: &[(&str, Option<f64>)]) -> Vec<SymbolState> {
        let time = DateTime::parse_from_rfc3339("2024-03-04T10:00:00-05:00").unwrap();
        gaps.iter()
            .map(|(sym, gap)| {
                let mut s = SymbolState::new(TrackedSymbol::new(Symbol::new(*sym), 0.0), identity());
                if let Some(g) = gap {
                    s.update(&RawTicker::new(Symbol::new(*sym), *g, time));
                }
                s
            })
            .collect()
    }

    fn pairs(board: &Leaderboard) -> Vec<(String, f64)> {
        board
            .entries()
            .iter()
            .map(|e| (e.symbol.to_string(), e.gap))
            .collect()
    }

    fn board(entries: &[(&str, f64)]) -> Leaderboard {
        entries
            .iter()
            .map(|(s, g)| RankEntry::new(Symbol::new(*s), *g))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_top_n_filters_sorts_and_truncates() {
        let s = states(&[
            ("A", Some(5.0)),
            ("B", Some(3.0)),
            ("C", Some(7.0)),
            ("D", Some(-1.0)),
            ("E", Some(0.0)),
            ("F", None),
        ]);
        let top = top_n(&s, 2);
        assert_eq!(pairs(&top), vec![("C".into(), 7.0), ("A".into(), 5.0)]);
    }

    #[test]
    fn test_bottom_n_most_negative_first() {
        let s = states(&[
            ("A", Some(-5.0)),
            ("B", Some(-3.0)),
            ("C", Some(-7.0)),
            ("D", Some(2.0)),
            ("E", Some(0.0)),
        ]);
        let bottom = bottom_n(&s, 4);
        assert_eq!(
            pairs(&bottom),
            vec![("C".into(), -7.0), ("A".into(), -5.0), ("B".into(), -3.0)]
        );
    }

    #[test]
    fn test_zero_gap_is_on_neither_side() {
        let s = states(&[("A", Some(0.0)), ("B", Some(-0.0))]);
        assert!(top_n(&s, 4).is_empty());
        assert!(bottom_n(&s, 4).is_empty());
    }

    #[test]
    fn test_nan_gap_is_on_neither_side() {
        let s = states(&[("A", Some(f64::NAN))]);
        assert!(top_n(&s, 4).is_empty());
        assert!(bottom_n(&s, 4).is_empty());
    }

    #[test]
    fn test_infinite_gap_is_on_neither_side() {
        let s = states(&[
            ("A", Some(f64::INFINITY)),
            ("B", Some(f64::NEG_INFINITY)),
            ("C", Some(1.5)),
            ("D", Some(-1.5)),
        ]);
        assert_eq!(pairs(&top_n(&s, 4)), vec![("C".into(), 1.5)]);
        assert_eq!(pairs(&bottom_n(&s, 4)), vec![("D".into(), -1.5)]);
    }

    #[test]
    fn test_ties_break_by_symbol_ascending() {
        let s = states(&[
            ("MSFT", Some(2.0)),
            ("AAPL", Some(2.0)),
            ("GOOG", Some(2.0)),
            ("TSLA", Some(-2.0)),
            ("F", Some(-2.0)),
        ]);
        let top = top_n(&s, 2);
        assert_eq!(pairs(&top), vec![("AAPL".into(), 2.0), ("GOOG".into(), 2.0)]);
        let bottom = bottom_n(&s, 2);
        assert_eq!(pairs(&bottom), vec![("F".into(), -2.0), ("TSLA".into(), -2.0)]);
    }

    #[test]
    fn test_zero_n_is_empty() {
        let s = states(&[("A", Some(1.0))]);
        assert!(top_n(&s, 0).is_empty());
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let a = board(&[("A", 5.0), ("B", 3.0)]);
        let b = board(&[("B", 3.0), ("A", 5.0)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_is_value_sensitive() {
        assert_ne!(board(&[("A", 5.0)]), board(&[("A", 5.5)]));
        assert_ne!(board(&[("A", 5.0)]), board(&[("A", 5.0), ("B", 1.0)]));
        assert_eq!(board(&[("A", 5.0), ("B", 3.0)]), board(&[("A", 5.0), ("B", 3.0)]));
        assert_eq!(Leaderboard::empty(), board(&[]));
    }

    proptest! {
        #[test]
        fn test_top_n_is_bounded_positive_and_ordered(
            gaps in proptest::collection::vec(-50i32..50, 0..20),
            n in 0usize..8,
        ) {
            let names: Vec<String> = (0..gaps.len()).map(|i| format!("S{:02}", i)).collect();
            let input: Vec<(&str, Option<f64>)> = names
                .iter()
                .zip(&gaps)
                .map(|(s, g)| (s.as_str(), Some(*g as f64)))
                .collect();
            let s = states(&input);
            let top = top_n(&s, n);

            prop_assert!(top.len() <= n);
            prop_assert!(top.entries().iter().all(|e| e.gap > 0.0));
            for w in top.entries().windows(2) {
                prop_assert!(
                    w[0].gap > w[1].gap || (w[0].gap == w[1].gap && w[0].symbol < w[1].symbol)
                );
            }
            let positives = gaps.iter().filter(|g| **g > 0).count();
            prop_assert_eq!(top.len(), positives.min(n));
        }

        #[test]
        fn test_bottom_n_holds_the_most_negative(
            gaps in proptest::collection::vec(-50i32..50, 0..20),
            n in 1usize..8,
        ) {
            let names: Vec<String> = (0..gaps.len()).map(|i| format!("S{:02}", i)).collect();
            let input: Vec<(&str, Option<f64>)> = names
                .iter()
                .zip(&gaps)
                .map(|(s, g)| (s.as_str(), Some(*g as f64)))
                .collect();
            let s = states(&input);
            let bottom = bottom_n(&s, n);

            prop_assert!(bottom.entries().iter().all(|e| e.gap < 0.0));
            if let Some(worst_kept) = bottom.entries().last() {
                let excluded_better = s
                    .iter()
                    .filter(|st| !bottom.symbols().contains(&st.symbol()))
                    .filter_map(|st| st.gap())
                    .any(|g| g < worst_kept.gap);
                prop_assert!(!excluded_better);
            }
        }
    }
}
