//! Symbol registry: symbol string <-> wire id
//!
//! The registry is an explicit object owned by the top-level assembly and
//! shared by handle with the codec and the transport. Ids are assigned
//! monotonically starting at 1; id 0 stays reserved.
//!
//! The server is authoritative: a MAPPING frame overwrites whatever the
//! client assigned locally (last writer wins), and the stale direction is
//! evicted so both maps stay a bijection.

use crate::core::symbol::{SymbolId, UNKNOWN_SYMBOL};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry shared between codec, transport and the owning engine
pub type SharedRegistry = Arc<RwLock<SymbolRegistry>>;

/// Bidirectional symbol map
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    str_to_id: HashMap<String, SymbolId>,
    id_to_str: HashMap<SymbolId, String>,
    /// Next id to hand out; u32 so exhaustion of the u16 space is detectable
    next_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Symbol id space exhausted ({} ids)", u16::MAX)]
    CapacityExceeded,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self {
            str_to_id: HashMap::new(),
            id_to_str: HashMap::new(),
            next_id: SymbolId::FIRST.as_raw() as u32,
        }
    }

    /// Build a registry with `symbols` registered in order
    pub fn with_symbols<S: AsRef<str>>(symbols: &[S]) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for symbol in symbols {
            registry.register(symbol.as_ref())?;
        }
        tracing::info!("Symbol registry initialized with {} symbols", registry.len());
        Ok(registry)
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Register `symbol`, returning its id. Idempotent.
    pub fn register(&mut self, symbol: &str) -> Result<SymbolId, RegistryError> {
        if let Some(&id) = self.str_to_id.get(symbol) {
            return Ok(id);
        }

        let raw = self.next_id;
        if raw > u16::MAX as u32 {
            return Err(RegistryError::CapacityExceeded);
        }
        let id = SymbolId::from_raw(raw as u16);
        self.next_id += 1;

        self.str_to_id.insert(symbol.to_string(), id);
        self.id_to_str.insert(id, symbol.to_string());
        Ok(id)
    }

    /// Apply a server-assigned mapping (last writer wins)
    pub fn apply_mapping(&mut self, id: SymbolId, symbol: &str) {
        if id.is_none() {
            tracing::warn!(target: "codec", symbol, "Ignoring mapping onto reserved id 0");
            return;
        }

        if let Some(old_id) = self.str_to_id.insert(symbol.to_string(), id) {
            if old_id != id {
                self.id_to_str.remove(&old_id);
            }
        }
        if let Some(old_symbol) = self.id_to_str.insert(id, symbol.to_string()) {
            if old_symbol != symbol {
                tracing::debug!(target: "codec", %id, old = %old_symbol, new = symbol, "Mapping reassigned id");
                self.str_to_id.remove(&old_symbol);
            }
        }

        // Locally assigned ids must never collide with server ids
        let raw = id.as_raw() as u32;
        if raw >= self.next_id {
            self.next_id = raw + 1;
        }
    }

    #[inline]
    pub fn get_id(&self, symbol: &str) -> Option<SymbolId> {
        self.str_to_id.get(symbol).copied()
    }

    #[inline]
    pub fn get_str(&self, id: SymbolId) -> Option<&str> {
        self.id_to_str.get(&id).map(String::as_str)
    }

    /// Name for `id`, degrading to [`UNKNOWN_SYMBOL`]
    #[inline]
    pub fn resolve(&self, id: SymbolId) -> &str {
        self.get_str(id).unwrap_or(UNKNOWN_SYMBOL)
    }

    /// Id for `symbol`, degrading to [`SymbolId::NONE`]
    #[inline]
    pub fn id_or_none(&self, symbol: &str) -> SymbolId {
        self.get_id(symbol).unwrap_or(SymbolId::NONE)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.str_to_id.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.str_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.str_to_id.is_empty()
    }
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_id_is_one() {
        let mut registry = SymbolRegistry::new();
        assert_eq!(registry.register("BTCUSD").unwrap(), SymbolId::from_raw(1));
        assert_eq!(registry.register("ETHUSD").unwrap(), SymbolId::from_raw(2));
    }

    #[test]
    fn test_register_idempotent() {
        let mut registry = SymbolRegistry::new();
        let a = registry.register("BTCUSD").unwrap();
        let b = registry.register("BTCUSD").unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_id_of_get_str() {
        let mut registry = SymbolRegistry::new();
        let ids: Vec<_> = ["BTCUSD", "ETHUSD", "SOLUSD"]
            .iter()
            .map(|s| registry.register(s).unwrap())
            .collect();
        for id in ids {
            let name = registry.get_str(id).unwrap().to_string();
            assert_eq!(registry.get_id(&name), Some(id));
        }
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = SymbolRegistry::new();
        assert_eq!(registry.get_id("NOPE"), None);
        assert_eq!(registry.get_str(SymbolId::from_raw(9)), None);
        assert_eq!(registry.resolve(SymbolId::from_raw(9)), UNKNOWN_SYMBOL);
        assert_eq!(registry.id_or_none("NOPE"), SymbolId::NONE);
    }

    #[test]
    fn test_mapping_moves_symbol() {
        let mut registry = SymbolRegistry::new();
        let local = registry.register("BTCUSD").unwrap();
        registry.apply_mapping(SymbolId::from_raw(40), "BTCUSD");

        assert_eq!(registry.get_id("BTCUSD"), Some(SymbolId::from_raw(40)));
        assert_eq!(registry.get_str(local), None);
        assert_eq!(registry.get_str(SymbolId::from_raw(40)), Some("BTCUSD"));
    }

    #[test]
    fn test_mapping_reuses_id() {
        let mut registry = SymbolRegistry::new();
        let id = registry.register("BTCUSD").unwrap();
        registry.apply_mapping(id, "ETHUSD");

        assert_eq!(registry.get_id("BTCUSD"), None);
        assert_eq!(registry.get_id("ETHUSD"), Some(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_mapping_bumps_next_id() {
        let mut registry = SymbolRegistry::new();
        registry.apply_mapping(SymbolId::from_raw(7), "BTCUSD");
        assert_eq!(registry.register("ETHUSD").unwrap(), SymbolId::from_raw(8));
    }

    #[test]
    fn test_mapping_onto_reserved_id_ignored() {
        let mut registry = SymbolRegistry::new();
        registry.apply_mapping(SymbolId::NONE, "BTCUSD");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut registry = SymbolRegistry::new();
        registry.apply_mapping(SymbolId::from_raw(u16::MAX), "LAST");
        assert_eq!(registry.register("OVERFLOW"), Err(RegistryError::CapacityExceeded));
    }

    #[test]
    fn test_with_symbols() {
        let registry = SymbolRegistry::with_symbols(&["A", "B", "A"]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_id("B"), Some(SymbolId::from_raw(2)));
    }
}
