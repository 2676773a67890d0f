//! Test utilities: registry fixture, tick comparison, in-memory connector

use crate::core::{SharedRegistry, SymbolRegistry, TickEvent};
use crate::ws::{Connector, Frame, Link, LinkEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Symbols registered by [`test_registry`], ids 1..=3 in this order
pub const TEST_SYMBOLS: [&str; 3] = ["BTCUSD", "ETHUSD", "SOLUSD"];

/// Fresh registry with the test symbols
pub fn test_registry() -> SharedRegistry {
    SymbolRegistry::with_symbols(&TEST_SYMBOLS)
        .expect("test symbols fit the id space")
        .into_shared()
}

/// Tick equality with f32 fields compared at 1e-5 relative tolerance
pub fn assert_tick_close(got: &TickEvent, want: &TickEvent) {
    assert_eq!(got.symbol, want.symbol);
    assert_eq!(got.ts, want.ts);
    for (name, g, w) in [
        ("price", got.price, want.price),
        ("volume", got.volume, want.volume),
        ("bid", got.bid, want.bid),
        ("ask", got.ask, want.ask),
    ] {
        let tolerance = 1e-5 * w.abs().max(1.0);
        assert!((g - w).abs() <= tolerance, "{name}: got {g}, want {w}");
    }
}

struct MockLink {
    url: String,
    events: mpsc::UnboundedSender<LinkEvent>,
    frames: mpsc::UnboundedReceiver<Frame>,
}

type MockLinks = Arc<Mutex<Vec<MockLink>>>;

/// Connector whose links are driven by a [`MockServer`]
pub struct MockConnector {
    links: MockLinks,
}

/// Server side of every link a [`MockConnector`] opened, by open order
#[derive(Clone)]
pub struct MockServer {
    links: MockLinks,
}

/// Connected mock pair
pub fn mock_connector() -> (MockConnector, MockServer) {
    let links: MockLinks = Arc::new(Mutex::new(Vec::new()));
    (
        MockConnector { links: links.clone() },
        MockServer { links },
    )
}

impl Connector for MockConnector {
    fn open(&mut self, url: &str) -> Link {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let mut links = self.links.lock();
        let id = links.len() as u64;
        links.push(MockLink {
            url: url.to_string(),
            events: ev_tx,
            frames: out_rx,
        });
        Link::new(id, out_tx, ev_rx)
    }
}

impl MockServer {
    /// How many links have been opened
    pub fn open_count(&self) -> usize {
        self.links.lock().len()
    }

    pub fn url(&self, link: usize) -> String {
        self.links.lock()[link].url.clone()
    }

    /// Deliver an event on `link`
    pub fn push(&self, link: usize, event: LinkEvent) {
        // the client may already have dropped the link
        let _ = self.links.lock()[link].events.send(event);
    }

    pub fn accept(&self, link: usize) {
        self.push(link, LinkEvent::Opened);
    }

    pub fn hang_up(&self, link: usize, reason: &str) {
        self.push(link, LinkEvent::Closed(Some(reason.to_string())));
    }

    /// Frames the client has written to `link` since the last call
    pub fn sent(&self, link: usize) -> Vec<Frame> {
        let mut links = self.links.lock();
        let mut frames = Vec::new();
        while let Ok(frame) = links[link].frames.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Text frames written to `link`, parsed as JSON
    pub fn sent_json(&self, link: usize) -> Vec<serde_json::Value> {
        self.sent(link)
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => serde_json::from_str(&text).ok(),
                Frame::Binary(_) => None,
            })
            .collect()
    }

    /// True once the client dropped its end of `link` and every frame was read
    pub fn link_dropped(&self, link: usize) -> bool {
        matches!(
            self.links.lock()[link].frames.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        )
    }
}
