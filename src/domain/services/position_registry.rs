//! In-memory view of open positions, keyed by symbol.
//!
//! The execution engine owns the registry and keeps it mirrored with the
//! ledger; everything else (signal evaluation, reporting) reads it. At
//! most one position per symbol.

use crate::domain::entities::position::Position;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PositionRegistry {
    positions: HashMap<String, Position>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the position for its symbol.
    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
    }

    pub fn remove(&mut self, symbol: &str) -> Option<Position> {
        self.positions.remove(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
