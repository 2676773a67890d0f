//! Core types
//!
//! This module contains the fundamental types used throughout the client:
//! - SymbolId: compact wire id for an instrument
//! - SymbolRegistry: symbol string <-> id map, shared by handle
//! - TickEvent / Marker: decoded market data and chart annotations

pub mod market_data;
pub mod registry;
pub mod symbol;

pub use market_data::{Marker, MarkerPosition, MarkerShape, TickEvent};
pub use registry::{RegistryError, SharedRegistry, SymbolRegistry};
pub use symbol::{SymbolId, UNKNOWN_SYMBOL};
