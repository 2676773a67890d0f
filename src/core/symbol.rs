//! Wire-level symbol identifiers
//!
//! Symbols are strings at the application boundary and u16 ids on the wire.
//! Id 0 is reserved: it never names a real symbol.

use serde::{Deserialize, Serialize};

/// Name reported for ids the registry has never seen
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SymbolId(u16);

impl SymbolId {
    /// Reserved "none/unknown" id
    pub const NONE: Self = Self(0);
    /// First id handed out by a fresh registry
    pub const FIRST: Self = Self(1);

    #[inline(always)]
    pub const fn from_raw(id: u16) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub const fn as_raw(&self) -> u16 {
        self.0
    }

    #[inline(always)]
    pub const fn is_none(&self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl Default for SymbolId {
    #[inline(always)]
    fn default() -> Self {
        Self::NONE
    }
}

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
