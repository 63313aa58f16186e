use std::sync::Arc;

use anyhow::Context;
use gap_ranker::archive::{spawn_archiver, ArchiveSink, FileArchive};
use gap_ranker::config::EngineConfig;
use gap_ranker::engine::AggregationEngine;
use gap_ranker::memory::MemoryBroker;
use gap_ranker::offsets::seek_to_time;
use gap_ranker::symbol_state::PercentGap;
use gap_ranker::window::ExchangeCalendar;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;
use types::envelope;
use types::events::LeaderboardEvent;
use types::ticker::RawTicker;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Logs go to stderr; stdout carries leaderboard events
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = gap_ranker::SERVICE_VERSION, "Starting gap ranker");

    let config = EngineConfig::from_env().context("loading configuration")?;

    // Load raw tickers from stdin into the raw topic
    let broker = MemoryBroker::new(1);
    broker.create_topic(&config.raw_topic, 1)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut loaded: u64 = 0;
    let mut line_no: u64 = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let ticker: RawTicker = match serde_json::from_str(&line) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping unparseable ticker line");
                continue;
            }
        };
        let payload = envelope::encode(&ticker)?;
        broker.append(
            &config.raw_topic,
            Some(ticker.symbol.as_str()),
            payload,
            ticker.timestamp_ms(),
        )?;
        loaded += 1;
    }
    tracing::info!(loaded, topic = %config.raw_topic, "Raw tickers loaded");

    let mut consumer = broker.consumer(&[config.raw_topic.as_str()]);
    if config.start_time.is_some() {
        seek_to_time(&mut consumer, config.start_time).await?;
    }

    let archiver = match &config.archive_dir {
        Some(dir) => {
            let sink = FileArchive::new(dir.clone()).await?;
            tracing::info!(directory = %dir.display(), "Archiving raw tickers");
            let sinks: Vec<Box<dyn ArchiveSink>> = vec![Box::new(sink)];
            Some(spawn_archiver(sinks, config.archive_capacity))
        }
        None => None,
    };

    let top_topic = config.top_topic.clone();
    let bottom_topic = config.bottom_topic.clone();

    let mut engine = AggregationEngine::new(
        config,
        Arc::new(ExchangeCalendar::nasdaq()),
        Arc::new(PercentGap),
        broker.producer(),
    );
    let archive_task = match archiver {
        Some((handle, task)) => {
            engine = engine.with_archive(handle);
            Some(task)
        }
        None => None,
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    };
    let summary = engine.run(&mut consumer, shutdown).await?;
    let metrics = engine.shutdown().await?;
    tracing::info!(
        messages = summary.messages,
        stopped = ?summary.stopped,
        metrics = %serde_json::to_string(&metrics)?,
        "Gap ranker finished"
    );

    if let Some(task) = archive_task {
        let archived = task.await?;
        tracing::info!(archived, "Archive drained");
    }

    let mut stdout = tokio::io::stdout();
    for record in broker.records_in_order(&[top_topic.as_str(), bottom_topic.as_str()])? {
        let event: LeaderboardEvent = match envelope::decode(&record.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(offset = record.offset, error = %e, "Skipping undecodable leaderboard record");
                continue;
            }
        };
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
    }
    stdout.flush().await?;

    Ok(())
}
