//! Market data types
//!
//! `TickEvent` is the decoded, application-level form of a tick.
//! `Marker` is a discrete chart annotation.

use serde::{Deserialize, Serialize};

/// Logical tick event: `{type: "tick", symbol, ts, price, volume, bid, ask}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickEvent {
    /// Instrument name (or "UNKNOWN" for an unmapped wire id)
    pub symbol: String,
    /// Unix seconds
    pub ts: u32,
    pub price: f32,
    pub volume: f32,
    pub bid: f32,
    pub ask: f32,
}

impl TickEvent {
    /// Event tag tick events are dispatched under
    pub const KIND: &'static str = "tick";

    pub fn new(symbol: impl Into<String>, ts: u32, price: f32, volume: f32, bid: f32, ask: f32) -> Self {
        Self {
            symbol: symbol.into(),
            ts,
            price,
            volume,
            bid,
            ask,
        }
    }

    /// Ask minus bid
    #[inline]
    pub fn spread(&self) -> f32 {
        self.ask - self.bid
    }

    /// JSON form carrying the `type` tag
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": Self::KIND,
            "symbol": self.symbol,
            "ts": self.ts,
            "price": self.price,
            "volume": self.volume,
            "bid": self.bid,
            "ask": self.ask,
        })
    }
}

/// Where a marker sits relative to the bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerPosition {
    #[default]
    AboveBar,
    BelowBar,
    InBar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerShape {
    #[default]
    Circle,
    Square,
    ArrowUp,
    ArrowDown,
}

/// Chart annotation; identity is `(time, text)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Unix seconds
    pub time: u32,
    pub text: String,
    #[serde(default)]
    pub position: MarkerPosition,
    #[serde(default)]
    pub shape: MarkerShape,
    #[serde(default)]
    pub color: String,
}

impl Marker {
    pub fn new(time: u32, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
            position: MarkerPosition::default(),
            shape: MarkerShape::default(),
            color: String::new(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_shape(mut self, shape: MarkerShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_position(mut self, position: MarkerPosition) -> Self {
        self.position = position;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_json_carries_type() {
        let tick = TickEvent::new("BTCUSD", 1_700_000_000, 100.5, 2.0, 100.4, 100.6);
        let json = tick.to_json();
        assert_eq!(json["type"], "tick");
        assert_eq!(json["symbol"], "BTCUSD");
        assert_eq!(json["ts"], 1_700_000_000u32);
    }

    #[test]
    fn test_tick_from_json_ignores_type() {
        let json = r#"{"type":"tick","symbol":"ETHUSD","ts":5,"price":1.0,"volume":2.0,"bid":0.5,"ask":1.5}"#;
        let tick: TickEvent = serde_json::from_str(json).unwrap();
        assert_eq!(tick.symbol, "ETHUSD");
        assert_eq!(tick.spread(), 1.0);
    }

    #[test]
    fn test_marker_defaults() {
        let marker: Marker = serde_json::from_str(r#"{"time":3,"text":"fill"}"#).unwrap();
        assert_eq!(marker, Marker::new(3, "fill"));
        assert_eq!(marker.position, MarkerPosition::AboveBar);
    }

    #[test]
    fn test_marker_builder() {
        let marker = Marker::new(1, "x")
            .with_color("red")
            .with_shape(MarkerShape::ArrowUp)
            .with_position(MarkerPosition::BelowBar);
        let json = serde_json::to_value(&marker).unwrap();
        assert_eq!(json["shape"], "arrowUp");
        assert_eq!(json["position"], "belowBar");
    }
}
