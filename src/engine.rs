//! Feed engine
//!
//! Top-level assembly. Owns the symbol registry and wires it into the codec
//! and the transport; transport ticks feed the frame-aligned render batcher,
//! and chart markers go through the microtask batcher.

use crate::core::{Marker, SharedRegistry, SymbolRegistry, TickEvent};
use crate::hot_path::{MarkerBatcher, MarkerCallback, RenderBatcher, ScheduleOnce};
use crate::infrastructure::config::Config;
use crate::infrastructure::metrics::{MetricsCollector, MetricsSink};
use crate::protocol::WireCodec;
use crate::ws::{
    events, Connector, FeedEvent, Subscription, TransportClient, TransportConfig, TransportHandle,
    WsConnector,
};
use crate::{FeedError, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Registry, codec, transport and batchers for one feed connection
pub struct FeedEngine<C: Connector = WsConnector> {
    registry: SharedRegistry,
    codec: WireCodec,
    metrics: Arc<MetricsCollector>,
    /// Taken by `start`
    transport: Option<TransportClient<C>>,
    handle: TransportHandle,
    ticks: RenderBatcher<TickEvent>,
    markers: MarkerBatcher,
    /// Transport -> render batcher bridge
    _tick_bridge: Subscription,
}

impl FeedEngine<WsConnector> {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_connector(config, WsConnector::new(config.feed.connect_timeout()))
    }
}

impl<C: Connector + 'static> FeedEngine<C> {
    pub fn with_connector(config: &Config, connector: C) -> Result<Self> {
        let registry = SymbolRegistry::with_symbols(&config.feed.symbols)?.into_shared();
        let codec = WireCodec::new(registry.clone()).with_version(config.feed.protocol_version);
        let metrics = Arc::new(MetricsCollector::new());
        let sink: Arc<dyn MetricsSink> = metrics.clone();

        let transport = TransportClient::new(
            TransportConfig::from_feed(&config.feed)?,
            connector,
            codec.clone(),
            sink.clone(),
        );
        let ticks = RenderBatcher::new(ScheduleOnce::frame(config.batching.frame_interval()), sink.clone());
        let markers = MarkerBatcher::new(ScheduleOnce::microtask(), sink);

        let batcher = ticks.clone();
        let tick_bridge = transport.subscribe(events::TICK, move |event| {
            if let FeedEvent::Tick(tick) = event {
                batcher.push(tick.clone());
            }
        });

        crate::log_main!(
            tracing::Level::INFO,
            symbols = registry.read().len(),
            frame_rate_hz = config.batching.frame_rate_hz,
            "Feed engine assembled"
        );

        Ok(Self {
            registry,
            codec,
            metrics,
            handle: transport.handle(),
            transport: Some(transport),
            ticks,
            markers,
            _tick_bridge: tick_bridge,
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn codec(&self) -> &WireCodec {
        &self.codec
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Command access to the transport, usable from any task
    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    /// Coalesced ticks: at most one per symbol per frame
    pub fn on_tick<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TickEvent) + Send + Sync + 'static,
    {
        self.ticks.subscribe(f)
    }

    /// Raw transport events (`connect`, `disconnect`, `mapping`, ...)
    pub fn on_event<F>(&self, event: &str, f: F) -> Subscription
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        self.handle.subscribe(event, f)
    }

    pub fn render_batcher(&self) -> &RenderBatcher<TickEvent> {
        &self.ticks
    }

    pub fn queue_markers<I>(&self, markers: I, on_update: MarkerCallback)
    where
        I: IntoIterator<Item = Marker>,
    {
        self.markers.queue_marker_update(markers, on_update);
    }

    /// Spawn the transport driver and open the connection
    pub fn start(&mut self) -> Result<JoinHandle<()>> {
        let transport = self.transport.take().ok_or(FeedError::AlreadyStarted)?;
        self.handle.connect()?;
        crate::log_batcher!(tracing::Level::DEBUG, "Render batcher attached to transport ticks");
        Ok(tokio::spawn(transport.run()))
    }

    /// Stop the transport driver
    pub fn shutdown(&self) -> Result<()> {
        self.handle.shutdown()?;
        Ok(())
    }
}
