//! Per-symbol signal state machine.
//!
//! Three states per symbol: `NoPosition -> Holding -> Cooldown ->
//! NoPosition`. The engine consumes an indicator snapshot per tick and
//! emits a trading intent; it never places orders and never mutates
//! position state. Position existence and entry price are read from the
//! registry owned by the execution engine, and the machine resynchronizes
//! against them every tick, so a rejected entry or an externally vanished
//! position cannot wedge it in `Holding`.

use crate::domain::entities::position::{ExitReason, Position};
use crate::domain::errors::ConfigError;
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// One graduated take-profit rung: close `size_fraction` of the original
/// entry quantity once price reaches `profit_pct` above entry.
#[derive(Debug, Clone, Copy)]
pub struct ProfitTier {
    pub profit_pct: f64,
    pub size_fraction: f64,
}

/// Strategy parameters for the state machine.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Oscillator level below which the market counts as oversold.
    pub oversold_threshold: f64,
    pub stop_loss_pct: f64,
    /// Take-profit rungs ordered by increasing profit percentage.
    pub tiers: Vec<ProfitTier>,
    /// Minimum time after a trade before a new entry may fire.
    pub cooldown: Duration,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            oversold_threshold: 30.0,
            stop_loss_pct: 0.02,
            tiers: vec![
                ProfitTier { profit_pct: 0.02, size_fraction: 0.33 },
                ProfitTier { profit_pct: 0.03, size_fraction: 0.33 },
                ProfitTier { profit_pct: 0.04, size_fraction: 0.34 },
            ],
            cooldown: Duration::hours(4),
        }
    }
}

/// Parse a cooldown spec: `"15m"`, `"4h"`, or a bare number of hours.
pub fn parse_cooldown(value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    if let Some(minutes) = value.strip_suffix('m') {
        return minutes
            .parse::<i64>()
            .map(Duration::minutes)
            .map_err(|_| ConfigError::InvalidCooldown(value.to_string()));
    }
    if let Some(hours) = value.strip_suffix('h') {
        return hours
            .parse::<i64>()
            .map(Duration::hours)
            .map_err(|_| ConfigError::InvalidCooldown(value.to_string()));
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|h| h.is_finite() && *h >= 0.0)
        .map(|h| Duration::seconds((h * 3600.0) as i64))
        .ok_or_else(|| ConfigError::InvalidCooldown(value.to_string()))
}

/// One evaluation tick's worth of market data for a symbol.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSnapshot {
    pub price: f64,
    /// Lower volatility band bound; `None` when the feed could not
    /// produce one.
    pub lower_band: Option<f64>,
    /// Oscillator value (RSI-style, 0..100).
    pub oscillator: Option<f64>,
}

/// Trading intent handed to the execution engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Open {
        price: Price,
    },
    PartialClose {
        tier: u8,
        quantity: Quantity,
        price: Price,
    },
    Close {
        reason: ExitReason,
        quantity: Quantity,
        price: Price,
    },
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolState {
    NoPosition,
    Holding,
    Cooldown,
}

pub struct SignalEngine {
    config: StrategyConfig,
    states: HashMap<String, SymbolState>,
    last_trade_time: HashMap<String, DateTime<Utc>>,
}

impl SignalEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            last_trade_time: HashMap::new(),
        }
    }

    /// Evaluate one snapshot for one symbol and emit an intent.
    ///
    /// `position` is the currently open position for the symbol, if any;
    /// the engine reads its entry price and remaining quantity but never
    /// mutates it.
    pub fn evaluate(
        &mut self,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        position: Option<&Position>,
        now: DateTime<Utc>,
    ) -> Intent {
        match position {
            Some(position) => {
                self.states.insert(symbol.to_string(), SymbolState::Holding);
                self.evaluate_holding(symbol, snapshot, position, now)
            }
            None => {
                let state = *self
                    .states
                    .get(symbol)
                    .unwrap_or(&SymbolState::NoPosition);
                if state == SymbolState::Holding {
                    debug!("{} has no open position, leaving Holding", symbol);
                }
                if self.in_cooldown(symbol, now) {
                    self.states.insert(symbol.to_string(), SymbolState::Cooldown);
                    return Intent::None;
                }
                self.states
                    .insert(symbol.to_string(), SymbolState::NoPosition);
                self.evaluate_entry(symbol, snapshot, now)
            }
        }
    }

    fn in_cooldown(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        match self.last_trade_time.get(symbol) {
            Some(last) => now.signed_duration_since(*last) < self.config.cooldown,
            None => false,
        }
    }

    fn evaluate_entry(
        &mut self,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        now: DateTime<Utc>,
    ) -> Intent {
        let (lower_band, oscillator) = match (snapshot.lower_band, snapshot.oscillator) {
            (Some(band), Some(osc)) => (band, osc),
            _ => {
                warn!(
                    "Incomplete snapshot for {} (band: {:?}, oscillator: {:?}), no signal",
                    symbol, snapshot.lower_band, snapshot.oscillator
                );
                return Intent::None;
            }
        };

        if snapshot.price <= lower_band && oscillator < self.config.oversold_threshold {
            let price = match Price::new(snapshot.price) {
                Ok(price) => price,
                Err(e) => {
                    warn!("Rejected entry snapshot for {}: {}", symbol, e);
                    return Intent::None;
                }
            };
            self.last_trade_time.insert(symbol.to_string(), now);
            self.states.insert(symbol.to_string(), SymbolState::Holding);
            info!(
                "Entry signal for {} at {} (band {:.4}, oscillator {:.2})",
                symbol, price, lower_band, oscillator
            );
            return Intent::Open { price };
        }
        Intent::None
    }

    fn evaluate_holding(
        &mut self,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        position: &Position,
        now: DateTime<Utc>,
    ) -> Intent {
        let remaining = position.quantity;
        let price = match Price::new(snapshot.price) {
            Ok(price) => price,
            Err(e) => {
                warn!("Rejected holding snapshot for {}: {}", symbol, e);
                return Intent::None;
            }
        };

        // Stop-loss takes priority over any take-profit rung.
        let stop = position
            .entry_price
            .with_offset_pct(-self.config.stop_loss_pct)
            .unwrap_or(position.entry_price);
        if price <= stop {
            self.last_trade_time.insert(symbol.to_string(), now);
            self.states.insert(symbol.to_string(), SymbolState::Cooldown);
            info!(
                "Stop-loss for {} at {} (entry {}, remaining {})",
                symbol, price, position.entry_price, remaining
            );
            return Intent::Close {
                reason: ExitReason::StopLoss,
                quantity: remaining,
                price,
            };
        }

        // Highest crossed, not-yet-hit tier wins; one rung per tick even
        // when price gapped past several thresholds.
        for (idx, tier) in self.config.tiers.iter().enumerate().rev() {
            let tier_number = (idx + 1) as u8;
            let target = match position.entry_price.with_offset_pct(tier.profit_pct) {
                Ok(target) => target,
                Err(_) => continue,
            };
            if price < target || position.tier_already_hit(tier_number) {
                continue;
            }

            let quantity = self.tier_quantity(idx, position);
            if quantity.is_zero() {
                debug!("Tier {} for {} computes to zero quantity", tier_number, symbol);
                return Intent::None;
            }

            self.last_trade_time.insert(symbol.to_string(), now);
            if quantity >= remaining {
                self.states.insert(symbol.to_string(), SymbolState::Cooldown);
            }
            info!(
                "Take-profit tier {} for {} at {} (target {}, qty {})",
                tier_number, symbol, price, target, quantity
            );
            return Intent::PartialClose {
                tier: tier_number,
                quantity,
                price,
            };
        }

        Intent::None
    }

    /// Close quantity for tier `idx`: a fraction of the original entry
    /// quantity, except the last configured tier, which takes whatever
    /// the other tiers' nominal quantities leave over so rounding drift
    /// is absorbed there. Always clamped to the remaining quantity.
    fn tier_quantity(&self, idx: usize, position: &Position) -> Quantity {
        let original = position.original_quantity().value();
        let remaining = position.quantity.value();

        let nominal = if idx + 1 == self.config.tiers.len() {
            let others: f64 = self
                .config
                .tiers
                .iter()
                .take(idx)
                .map(|t| original * t.size_fraction)
                .sum();
            original - others
        } else {
            original * self.config.tiers[idx].size_fraction
        };

        let clamped = nominal.min(remaining).max(0.0);
        let rounded = Quantity::new(clamped)
            .unwrap_or(Quantity::zero())
            .round_to(8);
        // Rounding can creep a few ULPs past the remainder; emptying the
        // position must use the exact remaining quantity.
        if rounded.value() > remaining {
            position.quantity
        } else {
            rounded
        }
    }
}
