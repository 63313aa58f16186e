//! Aggregation engine
//!
//! Owns the tracked symbol states and the last published leaderboard of
//! each side. Every inbound message runs the same pipeline:
//!
//! ```text
//! decode → price check → window check → universe check
//!        → SymbolState::update ──(unchanged)──► stop
//!        → rank top / bottom
//!        → publish intraday, then each side whose snapshot changed (top first)
//!        → commit
//! ```
//!
//! Data problems discard the event and the loop carries on. Broker failures
//! propagate to the caller. An event is applied whole or not at all: if any
//! publish fails, the symbol state is restored and neither side's snapshot
//! or sequence moves, so a redelivery of the same event is processed afresh.
//!
//! The engine is driven through `&mut self`, so there is exactly one writer.
//! Publishing is awaited inline: a publish that never completes stalls the
//! consume loop. That is the service's backpressure behaviour.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, info, warn};
use types::envelope;
use types::events::{BoardSide, IntradayEvent, LeaderboardEvent};
use types::ids::Symbol;
use types::ticker::RawTicker;
use uuid::Uuid;

use crate::archive::ArchiveHandle;
use crate::config::EngineConfig;
use crate::leaderboard::{bottom_n, top_n, Leaderboard};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::symbol_state::{GapModel, SymbolState};
use crate::transport::{EventSource, Message, Publisher, TransportError};
use crate::window::{SessionWindow, TradingCalendar};

/// Why an event was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Payload did not decode as a RawTicker envelope
    Undecodable,
    /// Last price is NaN
    NoPrice,
    /// Outside the qualified session window
    OutsideWindow,
    /// Symbol not in the tracked universe
    UnknownSymbol,
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Rejected(RejectReason),
    /// Accepted, but the gap did not move
    Unchanged,
    /// Gap moved and both sides were re-ranked
    Ranked {
        top_published: bool,
        bottom_published: bool,
    },
}

/// Why the consume loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Exhausted,
    Shutdown,
}

/// Result of a `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub messages: u64,
    pub stopped: StopReason,
}

/// Last published snapshot of one side plus its publish counter.
///
/// `snapshot` is `None` until the side is first published, so the first
/// accepted change publishes both sides, an empty board included.
#[derive(Debug, Default)]
struct PublishedSide {
    snapshot: Option<Leaderboard>,
    sequence: u64,
}

impl PublishedSide {
    fn differs(&self, candidate: &Leaderboard) -> bool {
        self.snapshot.as_ref() != Some(candidate)
    }
}

/// Leaderboard event awaiting publish, with the snapshot it commits.
struct PendingBoard {
    snapshot: Leaderboard,
    event: LeaderboardEvent,
}

/// Streaming ranking engine.
pub struct AggregationEngine<P> {
    states: BTreeMap<Symbol, SymbolState>,
    window: SessionWindow,
    publisher: P,
    n_top: usize,
    n_bottom: usize,
    top_topic: String,
    bottom_topic: String,
    intraday_topic: Option<String>,
    top: PublishedSide,
    bottom: PublishedSide,
    archive: Option<ArchiveHandle>,
    metrics: Arc<EngineMetrics>,
}

impl<P: Publisher> AggregationEngine<P> {
    /// Build the engine. The publisher is owned for the engine's lifetime.
    pub fn new(
        config: EngineConfig,
        calendar: Arc<dyn TradingCalendar>,
        gap_model: Arc<dyn GapModel>,
        publisher: P,
    ) -> Self {
        let window = SessionWindow::new(
            calendar,
            config.bake_in_minutes,
            config.bake_out_minutes,
            config.bypass_window,
        );

        let states: BTreeMap<Symbol, SymbolState> = config
            .universe
            .into_iter()
            .map(|contract| {
                (
                    contract.symbol.clone(),
                    SymbolState::new(contract, Arc::clone(&gap_model)),
                )
            })
            .collect();

        info!(
            symbols = states.len(),
            n_top = config.n_top,
            n_bottom = config.n_bottom,
            bake_in = config.bake_in_minutes,
            bake_out = config.bake_out_minutes,
            bypass_window = config.bypass_window,
            "AggregationEngine initialized"
        );
        if config.bypass_window {
            warn!("Session window filtering is bypassed");
        }

        Self {
            states,
            window,
            publisher,
            n_top: config.n_top,
            n_bottom: config.n_bottom,
            top_topic: config.top_topic,
            bottom_topic: config.bottom_topic,
            intraday_topic: config.intraday_topic,
            top: PublishedSide::default(),
            bottom: PublishedSide::default(),
            archive: None,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    /// Attach a raw-ticker archive tap.
    pub fn with_archive(mut self, archive: ArchiveHandle) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Consume until the source is exhausted or `shutdown` resolves.
    ///
    /// Shutdown is only observed while waiting for the next message; an
    /// event already in flight is processed to completion first.
    pub async fn run<S, F>(
        &mut self,
        source: &mut S,
        shutdown: F,
    ) -> Result<RunSummary, TransportError>
    where
        S: EventSource + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut messages: u64 = 0;

        let stopped = loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => break StopReason::Shutdown,
                next = source.next_message() => next?,
            };

            match next {
                Some(message) => {
                    messages += 1;
                    self.handle_message(&message).await?;
                }
                None => break StopReason::Exhausted,
            }
        };

        info!(messages, stopped = ?stopped, "Consume loop stopped");
        Ok(RunSummary { messages, stopped })
    }

    /// Decode one broker message and run it through the pipeline.
    pub async fn handle_message(&mut self, message: &Message) -> Result<EventOutcome, TransportError> {
        self.metrics.record_received();

        let ticker: RawTicker = match envelope::decode(&message.payload) {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Dropping undecodable message"
                );
                return Ok(self.reject(RejectReason::Undecodable));
            }
        };

        if let Some(archive) = &self.archive {
            if !archive.offer(&ticker) {
                self.metrics.record_archive_drop();
            }
        }

        self.process(ticker).await
    }

    /// Run an already-decoded ticker through the pipeline.
    pub async fn handle_ticker(&mut self, ticker: RawTicker) -> Result<EventOutcome, TransportError> {
        self.metrics.record_received();
        self.process(ticker).await
    }

    async fn process(&mut self, ticker: RawTicker) -> Result<EventOutcome, TransportError> {
        if !ticker.has_price() {
            debug!(symbol = %ticker.symbol, time = %ticker.time, "Ticker has NaN last price");
            return Ok(self.reject(RejectReason::NoPrice));
        }

        if !self.window.accepts(&ticker.time) {
            debug!(symbol = %ticker.symbol, time = %ticker.time, "Ticker outside update window");
            return Ok(self.reject(RejectReason::OutsideWindow));
        }

        let Some(state) = self.states.get_mut(&ticker.symbol) else {
            warn!(symbol = %ticker.symbol, "Ticker for untracked symbol");
            return Ok(self.reject(RejectReason::UnknownSymbol));
        };

        let prior = state.clone();
        if !state.update(&ticker) {
            self.metrics.record_unchanged();
            return Ok(EventOutcome::Unchanged);
        }

        let intraday = IntradayEvent {
            symbol: ticker.symbol.clone(),
            last: ticker.last,
            reference: state.reference(),
            gap: state.gap().unwrap_or(f64::NAN),
            event_time: ticker.time,
        };
        debug!(symbol = %intraday.symbol, last = intraday.last, gap = intraday.gap, "Gap updated");

        let top = self.pending(
            BoardSide::Top,
            top_n(self.states.values(), self.n_top),
            ticker.time,
        );
        let bottom = self.pending(
            BoardSide::Bottom,
            bottom_n(self.states.values(), self.n_bottom),
            ticker.time,
        );

        let published = self
            .publish_all(&intraday, ticker.timestamp_ms(), top.as_ref(), bottom.as_ref())
            .await;
        if let Err(e) = published {
            if let Some(state) = self.states.get_mut(&ticker.symbol) {
                *state = prior;
            }
            warn!(symbol = %ticker.symbol, error = %e, "Publish failed, event rolled back");
            return Err(e);
        }

        self.metrics.record_state_change();
        let outcome = EventOutcome::Ranked {
            top_published: top.is_some(),
            bottom_published: bottom.is_some(),
        };
        for board in [top, bottom].into_iter().flatten() {
            self.commit(board);
        }
        Ok(outcome)
    }

    fn reject(&self, reason: RejectReason) -> EventOutcome {
        self.metrics.record_rejected(reason);
        EventOutcome::Rejected(reason)
    }

    fn published(&self, side: BoardSide) -> &PublishedSide {
        match side {
            BoardSide::Top => &self.top,
            BoardSide::Bottom => &self.bottom,
        }
    }

    fn topic(&self, side: BoardSide) -> &str {
        match side {
            BoardSide::Top => &self.top_topic,
            BoardSide::Bottom => &self.bottom_topic,
        }
    }

    /// Build the event for `side` iff `snapshot` differs from the last one published.
    fn pending(
        &self,
        side: BoardSide,
        snapshot: Leaderboard,
        event_time: DateTime<FixedOffset>,
    ) -> Option<PendingBoard> {
        let published = self.published(side);
        if !published.differs(&snapshot) {
            return None;
        }
        let event = LeaderboardEvent {
            event_id: Uuid::now_v7(),
            sequence: published.sequence + 1,
            side,
            entries: snapshot.entries().to_vec(),
            event_time,
        };
        Some(PendingBoard { snapshot, event })
    }

    async fn publish_all(
        &mut self,
        intraday: &IntradayEvent,
        timestamp_ms: i64,
        top: Option<&PendingBoard>,
        bottom: Option<&PendingBoard>,
    ) -> Result<(), TransportError> {
        self.publish_intraday(intraday, timestamp_ms).await?;
        for board in [top, bottom].into_iter().flatten() {
            self.publish_board(&board.event).await?;
        }
        Ok(())
    }

    async fn publish_intraday(
        &mut self,
        event: &IntradayEvent,
        timestamp_ms: i64,
    ) -> Result<(), TransportError> {
        let Some(topic) = &self.intraday_topic else {
            return Ok(());
        };
        let payload = envelope::encode(event).map_err(|e| TransportError::Publish {
            topic: topic.clone(),
            reason: e.to_string(),
        })?;
        self.publisher
            .publish(topic, Some(event.symbol.as_str()), payload, timestamp_ms)
            .await?;
        self.metrics.record_intraday_published();
        Ok(())
    }

    async fn publish_board(&mut self, event: &LeaderboardEvent) -> Result<(), TransportError> {
        let topic = self.topic(event.side).to_string();
        let payload = envelope::encode(event).map_err(|e| TransportError::Publish {
            topic: topic.clone(),
            reason: e.to_string(),
        })?;
        self.publisher
            .publish(&topic, None, payload, event.event_time.timestamp_millis())
            .await?;
        match event.side {
            BoardSide::Top => self.metrics.record_top_published(),
            BoardSide::Bottom => self.metrics.record_bottom_published(),
        }
        Ok(())
    }

    /// Replace the stored snapshot and sequence of a side that was published.
    fn commit(&mut self, board: PendingBoard) {
        info!(
            side = board.event.side.label(),
            sequence = board.event.sequence,
            symbols = ?board.event.symbols(),
            "Leaderboard changed"
        );
        let published = match board.event.side {
            BoardSide::Top => &mut self.top,
            BoardSide::Bottom => &mut self.bottom,
        };
        published.sequence = board.event.sequence;
        published.snapshot = Some(board.snapshot);
    }

    /// Flush the publisher and close the archive tap.
    pub async fn shutdown(mut self) -> Result<MetricsSnapshot, TransportError> {
        self.archive = None;
        self.publisher.flush().await?;
        let snapshot = self.metrics.snapshot();
        info!(
            received = snapshot.messages_received,
            rejected = snapshot.total_rejected(),
            state_changes = snapshot.state_changes,
            top_published = snapshot.top_published,
            bottom_published = snapshot.bottom_published,
            "AggregationEngine shut down"
        );
        Ok(snapshot)
    }

    pub fn state(&self, symbol: &Symbol) -> Option<&SymbolState> {
        self.states.get(symbol)
    }

    pub fn states(&self) -> impl Iterator<Item = &SymbolState> {
        self.states.values()
    }

    /// Last published top snapshot, `None` before the first publish.
    pub fn top(&self) -> Option<&Leaderboard> {
        self.top.snapshot.as_ref()
    }

    /// Last published bottom snapshot, `None` before the first publish.
    pub fn bottom(&self) -> Option<&Leaderboard> {
        self.bottom.snapshot.as_ref()
    }

    pub fn window(&self) -> &SessionWindow {
        &self.window
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }
}
