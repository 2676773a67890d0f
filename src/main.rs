//! tick-feed: connect to a feed server and log coalesced ticks
//!
//! # Architecture
//! - **core**: registry, symbol ids, tick and marker types
//! - **protocol**: binary wire codec
//! - **ws**: reconnecting WebSocket transport and event bus
//! - **hot_path**: frame and microtask batchers
//! - **infrastructure**: config, logging, metrics

use anyhow::Context;
use tick_feed::infrastructure::logging::init_logging;
use tick_feed::ws::{events, FeedEvent};
use tick_feed::{Config, FeedEngine};
use tracing::Level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let _guards = init_logging(&config.logging).context("Failed to initialize logging")?;

    tick_feed::log_main!(Level::INFO, url = %config.feed.url, "Starting tick-feed");

    let mut engine = FeedEngine::from_config(&config).context("Failed to assemble feed engine")?;

    let _ticks = engine.on_tick(|tick| {
        tracing::info!(
            target: "main",
            symbol = %tick.symbol,
            ts = tick.ts,
            price = tick.price,
            bid = tick.bid,
            ask = tick.ask,
            volume = tick.volume,
            "tick"
        );
    });
    let _mappings = engine.on_event(events::MAPPING, |event| {
        if let FeedEvent::Mapping { id, symbol } = event {
            tracing::info!(target: "main", %id, %symbol, "Symbol mapped");
        }
    });
    let _disconnects = engine.on_event(events::DISCONNECT, |event| {
        if let FeedEvent::Disconnected { reason } = event {
            tracing::warn!(target: "main", reason = reason.as_deref().unwrap_or("none"), "Feed disconnected");
        }
    });

    let driver = engine.start()?;

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    tick_feed::log_main!(Level::INFO, "Shutting down");

    engine.shutdown()?;
    driver.await.context("Transport task failed")?;

    let snapshot = engine.metrics().snapshot();
    tick_feed::log_main!(
        Level::INFO,
        messages = snapshot.messages,
        decode_errors = snapshot.decode_errors,
        parse_errors = snapshot.parse_errors,
        reconnects = snapshot.reconnects,
        uptime_seconds = snapshot.uptime_seconds,
        "Final metrics"
    );

    Ok(())
}
