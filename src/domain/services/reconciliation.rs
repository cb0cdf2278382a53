//! Startup reconciliation.
//!
//! Runs once before the trading loop starts and brings the ledger in
//! line with what the exchange actually holds. Three cases per symbol:
//!
//! - ledger position backed by a sufficient exchange balance: adopted
//!   as-is, tier progress intact;
//! - exchange balance with no ledger position (a fill that crashed
//!   before persisting): a position is synthesized at the current market
//!   price and written to the ledger;
//! - ledger position the exchange balance no longer supports: reported
//!   as stale and kept in the ledger for operator review, never silently
//!   dropped.

use crate::domain::entities::position::Position;
use crate::domain::errors::ReconciliationError;
use crate::domain::repositories::exchange_client::ExchangeClient;
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use crate::persistence::ledger::TradeLedger;
use crate::rate_limit::RateGate;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

const BALANCE_TOLERANCE: f64 = 1e-8;

/// Outcome of one reconciliation pass, by symbol.
#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub adopted: Vec<String>,
    pub synthesized: Vec<String>,
    pub stale: Vec<String>,
}

pub struct Reconciler {
    client: Arc<dyn ExchangeClient>,
    gate: RateGate,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ExchangeClient>, gate: RateGate) -> Self {
        Self { client, gate }
    }

    /// Reconcile the ledger against exchange balances for `symbols` plus
    /// any symbol the ledger already tracks.
    pub async fn reconcile(
        &self,
        ledger: &mut TradeLedger,
        symbols: &[String],
    ) -> Result<ReconciliationReport, ReconciliationError> {
        let mut all: BTreeSet<String> = symbols.iter().cloned().collect();
        all.extend(ledger.get_open_positions().keys().cloned());

        let mut report = ReconciliationReport::default();
        for symbol in all {
            self.reconcile_symbol(ledger, &symbol, &mut report).await?;
        }
        info!(
            "Reconciliation complete: {} adopted, {} synthesized, {} stale",
            report.adopted.len(),
            report.synthesized.len(),
            report.stale.len()
        );
        Ok(report)
    }

    async fn reconcile_symbol(
        &self,
        ledger: &mut TradeLedger,
        symbol: &str,
        report: &mut ReconciliationReport,
    ) -> Result<(), ReconciliationError> {
        let base_asset = symbol.split('/').next().unwrap_or(symbol);
        self.gate.acquire().await;
        let balance = self.client.get_balance(base_asset).await?;

        match ledger.get_position(symbol) {
            Some(position) => {
                if balance + BALANCE_TOLERANCE >= position.quantity.value() {
                    info!(
                        "Adopted ledger position for {}: {} @ {} ({} tier hits)",
                        symbol,
                        position.quantity,
                        position.entry_price,
                        position.tier_hits.len()
                    );
                    report.adopted.push(symbol.to_string());
                } else {
                    warn!(
                        "Stale ledger position for {}: records {} but exchange holds {}",
                        symbol, position.quantity, balance
                    );
                    report.stale.push(symbol.to_string());
                }
            }
            None => {
                if self.is_tradable_balance(symbol, balance).await {
                    self.synthesize(ledger, symbol, balance).await?;
                    report.synthesized.push(symbol.to_string());
                }
            }
        }
        Ok(())
    }

    /// A balance below the symbol's minimum order quantity is dust, not
    /// a recoverable position.
    async fn is_tradable_balance(&self, symbol: &str, balance: f64) -> bool {
        if balance <= 0.0 {
            return false;
        }
        self.gate.acquire().await;
        match self.client.get_symbol_rules(symbol).await {
            Ok(rules) => balance >= rules.min_qty,
            Err(e) => {
                warn!(
                    "Cannot judge {} balance {} without trading rules: {}",
                    symbol, balance, e
                );
                false
            }
        }
    }

    /// Record an unledgered exchange balance as a position entered at the
    /// current market price. Real entry price and tier progress are lost;
    /// stops and tiers restart from here.
    async fn synthesize(
        &self,
        ledger: &mut TradeLedger,
        symbol: &str,
        balance: f64,
    ) -> Result<(), ReconciliationError> {
        self.gate.acquire().await;
        let market_price = self.client.get_ticker_price(symbol).await?;
        let now = Utc::now();

        let quantity = Quantity::new(balance).unwrap_or(Quantity::zero());
        let price = match Price::new(market_price) {
            Ok(price) => price,
            Err(e) => {
                warn!("Cannot synthesize {} position: {}", symbol, e);
                return Ok(());
            }
        };
        let position = Position::new(
            symbol.to_string(),
            quantity,
            price,
            format!("recovered-{}", now.timestamp()),
            now,
        );
        warn!(
            "Synthesized position for {}: {} adopted at market price {}",
            symbol, quantity, price
        );
        ledger.adopt_position(position)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::execution::test_support::MockExchangeClient;
    use crate::rate_limit::RateGateConfig;
    use std::time::Duration;
    use tempfile::tempdir;

    fn gate() -> RateGate {
        RateGate::new(RateGateConfig {
            min_interval: Duration::from_millis(1),
        })
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_adopts_ledger_position_backed_by_balance() {
        let dir = tempdir().unwrap();
        let mut ledger = TradeLedger::open(dir.path().join("ledger.json")).unwrap();
        ledger
            .open_position(
                "SUI/USDT",
                Quantity::new(2.0).unwrap(),
                Price::new(3.1).unwrap(),
                "buy-1",
                Utc::now(),
            )
            .unwrap();

        let client = Arc::new(MockExchangeClient::new(5.0, 3.2));
        let reconciler = Reconciler::new(client, gate());
        let report = reconciler
            .reconcile(&mut ledger, &symbols(&["SUI/USDT"]))
            .await
            .unwrap();

        assert_eq!(report.adopted, vec!["SUI/USDT"]);
        assert!(report.synthesized.is_empty());
        assert!(report.stale.is_empty());
        // tier progress untouched
        let position = ledger.get_position("SUI/USDT").unwrap();
        assert_eq!(position.entry_price.value(), 3.1);
    }

    #[tokio::test]
    async fn test_synthesizes_unledgered_balance_at_market_price() {
        let dir = tempdir().unwrap();
        let mut ledger = TradeLedger::open(dir.path().join("ledger.json")).unwrap();

        let client = Arc::new(MockExchangeClient::new(4.5, 3.2));
        let reconciler = Reconciler::new(client, gate());
        let report = reconciler
            .reconcile(&mut ledger, &symbols(&["SUI/USDT"]))
            .await
            .unwrap();

        assert_eq!(report.synthesized, vec!["SUI/USDT"]);
        let position = ledger.get_position("SUI/USDT").unwrap();
        assert_eq!(position.quantity.value(), 4.5);
        assert_eq!(position.entry_price.value(), 3.2);
        assert!(position.order_id.starts_with("recovered-"));
    }

    #[tokio::test]
    async fn test_stale_ledger_position_reported_not_dropped() {
        let dir = tempdir().unwrap();
        let mut ledger = TradeLedger::open(dir.path().join("ledger.json")).unwrap();
        ledger
            .open_position(
                "SUI/USDT",
                Quantity::new(2.0).unwrap(),
                Price::new(3.1).unwrap(),
                "buy-1",
                Utc::now(),
            )
            .unwrap();

        let client = Arc::new(MockExchangeClient::new(0.0, 3.2));
        let reconciler = Reconciler::new(client, gate());
        let report = reconciler
            .reconcile(&mut ledger, &symbols(&["SUI/USDT"]))
            .await
            .unwrap();

        assert_eq!(report.stale, vec!["SUI/USDT"]);
        // the entry stays for operator review
        assert!(ledger.get_position("SUI/USDT").is_some());
    }

    #[tokio::test]
    async fn test_dust_balance_is_ignored() {
        let dir = tempdir().unwrap();
        let mut ledger = TradeLedger::open(dir.path().join("ledger.json")).unwrap();

        // below the mock's 0.001 min_qty
        let client = Arc::new(MockExchangeClient::new(0.0005, 3.2));
        let reconciler = Reconciler::new(client, gate());
        let report = reconciler
            .reconcile(&mut ledger, &symbols(&["SUI/USDT"]))
            .await
            .unwrap();

        assert!(report.synthesized.is_empty());
        assert!(ledger.get_open_positions().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_symbols_outside_watchlist_are_checked() {
        let dir = tempdir().unwrap();
        let mut ledger = TradeLedger::open(dir.path().join("ledger.json")).unwrap();
        ledger
            .open_position(
                "OLD/USDT",
                Quantity::new(1.0).unwrap(),
                Price::new(10.0).unwrap(),
                "buy-1",
                Utc::now(),
            )
            .unwrap();

        let client = Arc::new(MockExchangeClient::new(5.0, 10.0));
        let reconciler = Reconciler::new(client, gate());
        let report = reconciler
            .reconcile(&mut ledger, &symbols(&["SUI/USDT"]))
            .await
            .unwrap();

        // OLD/USDT is not on the watchlist but still gets reconciled
        assert!(report.adopted.contains(&"OLD/USDT".to_string()));
    }
}
