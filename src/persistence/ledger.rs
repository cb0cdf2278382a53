use crate::domain::entities::position::{ClosedTrade, ExitReason, Position, TierHit};
use crate::domain::errors::LedgerError;
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// On-disk shape of the ledger file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerStore {
    #[serde(default)]
    positions: HashMap<String, Position>,
    #[serde(default)]
    closed_trades: Vec<ClosedTrade>,
    last_updated: Option<DateTime<Utc>>,
}

/// Aggregate statistics over the closed-trade history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_profit_loss: f64,
    pub win_rate: f64,
    pub avg_profit: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

/// File-backed trade ledger.
///
/// Every mutation rewrites the whole store. Persist is atomic (temp file
/// then rename), so a crash never leaves a torn file; an event that
/// filled on the exchange but was not yet persisted can still be lost,
/// which reconciliation recovers by synthesizing at market price.
pub struct TradeLedger {
    path: PathBuf,
    store: LedgerStore,
}

impl TradeLedger {
    /// Open the ledger at `path`, loading existing state if present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let store = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            match serde_json::from_str::<LedgerStore>(&raw) {
                Ok(store) => {
                    info!(
                        "Loaded trade ledger from {:?}: {} open positions, {} closed trades",
                        path,
                        store.positions.len(),
                        store.closed_trades.len()
                    );
                    store
                }
                Err(e) => return Err(LedgerError::Serialization(e)),
            }
        } else {
            info!("No trade ledger at {:?}, starting fresh", path);
            LedgerStore::default()
        };
        Ok(Self { path, store })
    }

    /// Serialize the whole store to a sibling temp file and rename it
    /// over the target.
    fn persist(&mut self) -> Result<(), LedgerError> {
        self.store.last_updated = Some(Utc::now());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.store)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Record a newly opened position. Errors if a position for the
    /// symbol is already open; the execution engine's one-position-per-
    /// symbol invariant makes that a logic error.
    pub fn open_position(
        &mut self,
        symbol: &str,
        quantity: Quantity,
        entry_price: Price,
        order_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        if self.store.positions.contains_key(symbol) {
            return Err(LedgerError::PositionAlreadyOpen(symbol.to_string()));
        }
        let position = Position::new(
            symbol.to_string(),
            quantity,
            entry_price,
            order_id.to_string(),
            timestamp,
        );
        self.store
            .positions
            .insert(symbol.to_string(), position.clone());
        info!(
            "Recorded new position for {}: {} @ {}",
            symbol, quantity, entry_price
        );
        self.persist()?;
        Ok(position)
    }

    /// Record a partial take-profit fill against an open position.
    pub fn record_partial_take_profit(
        &mut self,
        symbol: &str,
        tier: u8,
        price: Price,
        quantity: Quantity,
        order_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let position = self
            .store
            .positions
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::PositionNotFound(symbol.to_string()))?;
        let hit = TierHit {
            tier,
            price,
            quantity,
            order_id: order_id.to_string(),
            time: timestamp,
        };
        if let Err(e) = position.record_tier_hit(hit) {
            warn!("Rejected tier hit for {}: {}", symbol, e);
            return Err(LedgerError::InvalidTierHit(e));
        }
        info!("Recorded TP{} hit for {}: {} @ {}", tier, symbol, quantity, price);
        self.persist()
    }

    /// Move an open position into the closed-trade history.
    pub fn close_position(
        &mut self,
        symbol: &str,
        exit_price: Price,
        exit_quantity: Quantity,
        order_id: &str,
        profit_loss: f64,
        exit_reason: ExitReason,
        timestamp: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let position = self
            .store
            .positions
            .remove(symbol)
            .ok_or_else(|| LedgerError::PositionNotFound(symbol.to_string()))?;
        let trade = position.into_closed(
            exit_price,
            exit_quantity,
            order_id.to_string(),
            profit_loss,
            exit_reason,
            timestamp,
        );
        self.store.closed_trades.push(trade);
        info!(
            "Recorded position close for {}: {} @ {} (P/L: {:.4}, reason: {})",
            symbol, exit_quantity, exit_price, profit_loss, exit_reason
        );
        self.persist()
    }

    /// Persist a position synthesized by reconciliation.
    pub fn adopt_position(&mut self, position: Position) -> Result<(), LedgerError> {
        if self.store.positions.contains_key(&position.symbol) {
            return Err(LedgerError::PositionAlreadyOpen(position.symbol.clone()));
        }
        self.store
            .positions
            .insert(position.symbol.clone(), position);
        self.persist()
    }

    pub fn get_open_positions(&self) -> &HashMap<String, Position> {
        &self.store.positions
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.store.positions.get(symbol)
    }

    /// Closed trades, newest first, optionally limited.
    pub fn get_closed_trades(&self, limit: Option<usize>) -> Vec<&ClosedTrade> {
        let mut trades: Vec<&ClosedTrade> = self.store.closed_trades.iter().collect();
        trades.sort_by(|a, b| b.exit_time.cmp(&a.exit_time));
        match limit {
            Some(n) => trades.into_iter().take(n).collect(),
            None => trades,
        }
    }

    /// Win rate, average win/loss and total P&L over the closed history.
    pub fn get_trade_stats(&self) -> TradeStats {
        let mut stats = TradeStats {
            total_trades: self.store.closed_trades.len(),
            ..TradeStats::default()
        };
        if stats.total_trades == 0 {
            return stats;
        }

        let mut profits = Vec::new();
        let mut losses = Vec::new();
        for trade in &self.store.closed_trades {
            let pl = trade.profit_loss;
            stats.total_profit_loss += pl;
            if pl > 0.0 {
                stats.winning_trades += 1;
                stats.largest_win = stats.largest_win.max(pl);
                profits.push(pl);
            } else {
                stats.losing_trades += 1;
                stats.largest_loss = stats.largest_loss.min(pl);
                losses.push(pl);
            }
        }

        stats.win_rate = stats.winning_trades as f64 / stats.total_trades as f64;
        if !profits.is_empty() {
            stats.avg_profit = profits.iter().sum::<f64>() / profits.len() as f64;
        }
        if !losses.is_empty() {
            stats.avg_loss = losses.iter().sum::<f64>() / losses.len() as f64;
        }
        stats
    }
}
