use crate::domain::value_objects::{price::Price, quantity::Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position (or part of it) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Signal,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::Signal => write!(f, "signal"),
        }
    }
}

/// A recorded partial take-profit fill. Append-only; each tier appears at
/// most once per position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierHit {
    pub tier: u8,
    pub price: Price,
    pub quantity: Quantity,
    pub order_id: String,
    pub time: DateTime<Utc>,
}

/// An open position for one symbol. At most one exists per symbol.
///
/// `entry_price` is immutable after creation. `quantity` is the remaining
/// size; it strictly decreases with each tier or stop fill and never goes
/// negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Quantity,
    pub entry_price: Price,
    pub entry_time: DateTime<Utc>,
    pub order_id: String,
    #[serde(default)]
    pub tier_hits: Vec<TierHit>,
    #[serde(default)]
    pub sl_hit: bool,
    pub status: PositionStatus,
}

impl Position {
    pub fn new(
        symbol: String,
        quantity: Quantity,
        entry_price: Price,
        order_id: String,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Position {
            symbol,
            quantity,
            entry_price,
            entry_time,
            order_id,
            tier_hits: Vec::new(),
            sl_hit: false,
            status: PositionStatus::Open,
        }
    }

    /// The entry quantity, reconstructed as remaining plus everything
    /// already closed through tier hits. Tier sizing is expressed as
    /// fractions of this value, not of the remaining quantity.
    pub fn original_quantity(&self) -> Quantity {
        self.tier_hits
            .iter()
            .fold(self.quantity, |total, hit| {
                total.add(hit.quantity).unwrap_or(total)
            })
    }

    pub fn tier_already_hit(&self, tier: u8) -> bool {
        self.tier_hits.iter().any(|h| h.tier == tier)
    }

    /// Append a tier hit and decrement the remaining quantity.
    ///
    /// Rejects a tier that already hit and a quantity exceeding the
    /// remainder, so the append-only and non-negativity invariants hold.
    pub fn record_tier_hit(&mut self, hit: TierHit) -> Result<(), String> {
        if self.tier_already_hit(hit.tier) {
            return Err(format!(
                "Tier {} already recorded for {}",
                hit.tier, self.symbol
            ));
        }
        let remaining = self.quantity.subtract(hit.quantity)?;
        self.quantity = remaining;
        self.tier_hits.push(hit);
        Ok(())
    }

    pub fn unrealized_pnl(&self, current_price: Price) -> f64 {
        (current_price.value() - self.entry_price.value()) * self.quantity.value()
    }

    /// Snapshot this position into its closed-trade record.
    pub fn into_closed(
        mut self,
        exit_price: Price,
        exit_quantity: Quantity,
        exit_order_id: String,
        profit_loss: f64,
        exit_reason: ExitReason,
        exit_time: DateTime<Utc>,
    ) -> ClosedTrade {
        self.status = PositionStatus::Closed;
        if exit_reason == ExitReason::StopLoss {
            self.sl_hit = true;
        }
        ClosedTrade {
            position: self,
            exit_price,
            exit_time,
            exit_quantity,
            exit_order_id,
            profit_loss,
            exit_reason,
        }
    }
}

/// An immutable record of a completed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    #[serde(flatten)]
    pub position: Position,
    pub exit_price: Price,
    pub exit_time: DateTime<Utc>,
    pub exit_quantity: Quantity,
    pub exit_order_id: String,
    pub profit_loss: f64,
    pub exit_reason: ExitReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_position() -> Position {
        Position::new(
            "SUI/USDT".to_string(),
            Quantity::new(10.0).unwrap(),
            Price::new(100.0).unwrap(),
            "order-1".to_string(),
            Utc::now(),
        )
    }

    fn tier_hit(tier: u8, qty: f64, price: f64) -> TierHit {
        TierHit {
            tier,
            price: Price::new(price).unwrap(),
            quantity: Quantity::new(qty).unwrap(),
            order_id: format!("tp-{}", tier),
            time: Utc::now(),
        }
    }

    #[test]
    fn test_new_position_is_open() {
        let position = sample_position();
        assert_eq!(position.status, PositionStatus::Open);
        assert!(position.tier_hits.is_empty());
        assert!(!position.sl_hit);
    }

    #[test]
    fn test_record_tier_hit_decrements_quantity() {
        let mut position = sample_position();
        position.record_tier_hit(tier_hit(1, 3.3, 102.0)).unwrap();
        assert!((position.quantity.value() - 6.7).abs() < 1e-9);
        assert_eq!(position.tier_hits.len(), 1);
    }

    #[test]
    fn test_record_tier_hit_rejects_duplicate_tier() {
        let mut position = sample_position();
        position.record_tier_hit(tier_hit(1, 3.3, 102.0)).unwrap();
        assert!(position.record_tier_hit(tier_hit(1, 1.0, 102.5)).is_err());
        assert_eq!(position.tier_hits.len(), 1);
    }

    #[test]
    fn test_record_tier_hit_rejects_oversized_quantity() {
        let mut position = sample_position();
        assert!(position.record_tier_hit(tier_hit(1, 11.0, 102.0)).is_err());
        assert_eq!(position.quantity.value(), 10.0);
    }

    #[test]
    fn test_original_quantity_reconstruction() {
        let mut position = sample_position();
        position.record_tier_hit(tier_hit(1, 3.3, 102.0)).unwrap();
        position.record_tier_hit(tier_hit(2, 3.3, 103.0)).unwrap();
        assert!((position.original_quantity().value() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_unrealized_pnl() {
        let position = sample_position();
        let pnl = position.unrealized_pnl(Price::new(105.0).unwrap());
        assert!((pnl - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_into_closed_stop_loss_sets_flag() {
        let position = sample_position();
        let trade = position.into_closed(
            Price::new(97.9).unwrap(),
            Quantity::new(10.0).unwrap(),
            "sell-1".to_string(),
            -21.0,
            ExitReason::StopLoss,
            Utc::now(),
        );
        assert_eq!(trade.position.status, PositionStatus::Closed);
        assert!(trade.position.sl_hit);
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    }
}
