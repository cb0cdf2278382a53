//! Execution Engine
//!
//! Turns signal intents into exchange orders and keeps the in-memory
//! position registry and the durable ledger mirrored with what actually
//! filled. Every exchange call passes through the rate gate. Failures
//! are absorbed into `IntentOutcome::Rejected` with a log line; nothing
//! in this module panics on exchange or sizing errors.

use crate::domain::entities::order::{OrderReport, OrderSide, OrderStatus};
use crate::domain::entities::position::{ExitReason, Position};
use crate::domain::repositories::exchange_client::{ExchangeClient, ExchangeResult, OpenOrder};
use crate::domain::services::position_registry::PositionRegistry;
use crate::domain::services::signal_engine::Intent;
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use crate::persistence::ledger::TradeLedger;
use crate::rate_limit::RateGate;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Asset balances are sized against, e.g. "USDT".
    pub quote_asset: String,
    /// Fraction of the free quote balance committed per entry.
    pub position_size_pct: f64,
    pub max_open_positions: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            position_size_pct: 0.1,
            max_open_positions: 3,
        }
    }
}

/// What happened to a submitted intent.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    Executed,
    Rejected(String),
}

pub struct ExecutionEngine {
    client: Arc<dyn ExchangeClient>,
    ledger: TradeLedger,
    registry: PositionRegistry,
    gate: RateGate,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    /// Build the engine, seeding the registry from the ledger's open
    /// positions. Reconciliation runs against the ledger before this.
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        ledger: TradeLedger,
        gate: RateGate,
        config: ExecutionConfig,
    ) -> Self {
        let mut registry = PositionRegistry::new();
        for position in ledger.get_open_positions().values() {
            registry.insert(position.clone());
        }
        Self {
            client,
            ledger,
            registry,
            gate,
            config,
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.registry.get(symbol)
    }

    pub fn open_position_count(&self) -> usize {
        self.registry.len()
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    /// Order quantity for a new entry at `price`, derived from the free
    /// quote balance and the symbol's lot-size rules: snapped down to the
    /// lot step, then clamped into `[min_qty, max_qty]`.
    ///
    /// Returns `(quantity, quote_amount)`. Any failure (balance query,
    /// missing rules, no free balance) yields the `(0.0, 0.0)` sentinel
    /// rather than an error.
    pub async fn compute_order_size(&self, symbol: &str, price: f64) -> (f64, f64) {
        if price <= 0.0 || !price.is_finite() {
            warn!("Cannot size {} order at price {}", symbol, price);
            return (0.0, 0.0);
        }

        self.gate.acquire().await;
        let balance = match self.client.get_balance(&self.config.quote_asset).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Sizing {}: balance query failed: {}", symbol, e);
                return (0.0, 0.0);
            }
        };

        let quote_amount = balance * self.config.position_size_pct;
        if quote_amount <= 0.0 {
            warn!(
                "Sizing {}: no free {} balance to commit",
                symbol, self.config.quote_asset
            );
            return (0.0, 0.0);
        }

        self.gate.acquire().await;
        let rules = match self.client.get_symbol_rules(symbol).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!("Sizing {}: trading rules unavailable: {}", symbol, e);
                return (0.0, 0.0);
            }
        };

        let raw = match Quantity::new(quote_amount / price) {
            Ok(qty) => qty,
            Err(e) => {
                warn!("Sizing {}: {}", symbol, e);
                return (0.0, 0.0);
            }
        };
        let snapped = raw.snap_to_step(rules.step_size);
        let sized = snapped.clamp(rules.min_qty, rules.max_qty);
        if sized.value() > snapped.value() {
            warn!(
                "Sizing {}: {} below exchange minimum, clamped up to {}",
                symbol, snapped, sized
            );
        }
        (sized.value(), quote_amount)
    }

    /// Execute one intent for one symbol. `Intent::None` is a no-op.
    pub async fn submit_intent(&mut self, symbol: &str, intent: Intent) -> IntentOutcome {
        match intent {
            Intent::None => IntentOutcome::Executed,
            Intent::Open { price } => self.execute_open(symbol, price).await,
            Intent::PartialClose {
                tier,
                quantity,
                price,
            } => self.execute_partial_close(symbol, tier, quantity, price).await,
            Intent::Close {
                reason,
                quantity,
                price,
            } => self.execute_close(symbol, reason, quantity, price).await,
        }
    }

    async fn execute_open(&mut self, symbol: &str, price: Price) -> IntentOutcome {
        if self.registry.contains(symbol) {
            return self.reject(symbol, "position already open");
        }
        // Capacity is only checked at entry; exits always go through.
        if self.registry.len() >= self.config.max_open_positions {
            return self.reject(
                symbol,
                &format!(
                    "at capacity ({}/{} positions open)",
                    self.registry.len(),
                    self.config.max_open_positions
                ),
            );
        }

        let (quantity, quote_amount) = self.compute_order_size(symbol, price.value()).await;
        if quantity <= 0.0 {
            return self.reject(symbol, "order size computed to zero");
        }

        let report = match self.place_order(symbol, OrderSide::Buy, quantity).await {
            Ok(report) => report,
            Err(e) => return self.reject(symbol, &format!("buy order failed: {}", e)),
        };
        if !report.status.is_filled() || report.executed_qty <= 0.0 {
            return self.reject(
                symbol,
                &format!("buy order not filled (status {})", report.status),
            );
        }

        let fill_price = self.fill_price(&report, price);
        let fill_qty = match Quantity::new(report.executed_qty) {
            Ok(qty) => qty,
            Err(e) => return self.reject(symbol, &format!("bad fill quantity: {}", e)),
        };
        let now = Utc::now();
        match self
            .ledger
            .open_position(symbol, fill_qty, fill_price, &report.order_id, now)
        {
            Ok(position) => {
                self.registry.insert(position);
                info!(
                    "Opened {} position: {} @ {} (~{:.2} {})",
                    symbol, fill_qty, fill_price, quote_amount, self.config.quote_asset
                );
                IntentOutcome::Executed
            }
            Err(e) => {
                // Filled on the exchange but not persisted; reconciliation
                // recovers this on next startup.
                error!("Ledger write failed after {} fill: {}", symbol, e);
                IntentOutcome::Rejected(format!("ledger write failed: {}", e))
            }
        }
    }

    async fn execute_partial_close(
        &mut self,
        symbol: &str,
        tier: u8,
        quantity: Quantity,
        price: Price,
    ) -> IntentOutcome {
        let (entry_price, remaining) = match self.registry.get(symbol) {
            Some(position) => (position.entry_price, position.quantity),
            None => return self.reject(symbol, "no open position for partial close"),
        };

        let report = match self
            .place_order(symbol, OrderSide::Sell, quantity.value())
            .await
        {
            Ok(report) => report,
            Err(e) => return self.reject(symbol, &format!("tier {} sell failed: {}", tier, e)),
        };
        if !report.status.is_filled() || report.executed_qty <= 0.0 {
            return self.reject(
                symbol,
                &format!("tier {} sell not filled (status {})", tier, report.status),
            );
        }

        let fill_price = self.fill_price(&report, price);
        let fill_qty = match Quantity::new(report.executed_qty) {
            Ok(qty) => qty,
            Err(e) => return self.reject(symbol, &format!("bad fill quantity: {}", e)),
        };
        let realized = (fill_price.value() - entry_price.value()) * fill_qty.value()
            - report.commission;
        let now = Utc::now();

        // An emptying fill is recorded once, as the close; earlier fills
        // are recorded once each, as tier hits.
        if fill_qty.value() + 1e-9 >= remaining.value() {
            if let Err(e) = self.ledger.close_position(
                symbol,
                fill_price,
                fill_qty,
                &report.order_id,
                realized,
                ExitReason::TakeProfit,
                now,
            ) {
                error!("Ledger close failed for {}: {}", symbol, e);
                return IntentOutcome::Rejected(format!("ledger write failed: {}", e));
            }
            self.registry.remove(symbol);
            info!(
                "Final tier {} emptied {}: closed at {} (P/L {:.4})",
                tier, symbol, fill_price, realized
            );
            return IntentOutcome::Executed;
        }

        if let Err(e) = self.ledger.record_partial_take_profit(
            symbol,
            tier,
            fill_price,
            fill_qty,
            &report.order_id,
            now,
        ) {
            error!("Ledger write failed after {} TP{} fill: {}", symbol, tier, e);
            return IntentOutcome::Rejected(format!("ledger write failed: {}", e));
        }
        if let Some(position) = self.ledger.get_position(symbol) {
            self.registry.insert(position.clone());
        }
        IntentOutcome::Executed
    }

    async fn execute_close(
        &mut self,
        symbol: &str,
        reason: ExitReason,
        quantity: Quantity,
        price: Price,
    ) -> IntentOutcome {
        let entry_price = match self.registry.get(symbol) {
            Some(position) => position.entry_price,
            None => return self.reject(symbol, "no open position to close"),
        };

        let report = match self
            .place_order(symbol, OrderSide::Sell, quantity.value())
            .await
        {
            Ok(report) => report,
            Err(e) => return self.reject(symbol, &format!("close sell failed: {}", e)),
        };
        if !report.status.is_filled() || report.executed_qty <= 0.0 {
            return self.reject(
                symbol,
                &format!("close sell not filled (status {})", report.status),
            );
        }

        let fill_price = self.fill_price(&report, price);
        let fill_qty = match Quantity::new(report.executed_qty) {
            Ok(qty) => qty,
            Err(e) => return self.reject(symbol, &format!("bad fill quantity: {}", e)),
        };
        let realized = (fill_price.value() - entry_price.value()) * fill_qty.value()
            - report.commission;

        // The exchange position is gone regardless of what the ledger
        // write does next.
        self.registry.remove(symbol);
        if let Err(e) = self.ledger.close_position(
            symbol,
            fill_price,
            fill_qty,
            &report.order_id,
            realized,
            reason,
            Utc::now(),
        ) {
            error!("Ledger close failed for {}: {}", symbol, e);
            return IntentOutcome::Rejected(format!("ledger write failed: {}", e));
        }
        info!(
            "Closed {} at {} ({}, P/L {:.4})",
            symbol, fill_price, reason, realized
        );
        IntentOutcome::Executed
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> ExchangeResult<OrderReport> {
        self.gate.acquire().await;
        self.client.place_market_order(symbol, side, quantity).await
    }

    /// Prefer the exchange's average fill price; fall back to the signal
    /// price when the report carries none.
    fn fill_price(&self, report: &OrderReport, fallback: Price) -> Price {
        if report.avg_fill_price > 0.0 {
            Price::new(report.avg_fill_price).unwrap_or(fallback)
        } else {
            fallback
        }
    }

    fn reject(&self, symbol: &str, reason: &str) -> IntentOutcome {
        warn!("Rejected intent for {}: {}", symbol, reason);
        IntentOutcome::Rejected(reason.to_string())
    }

    /// Cancel every open order for a symbol, through the rate gate.
    pub async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()> {
        self.gate.acquire().await;
        self.client.cancel_all_orders(symbol).await
    }

    /// Open orders on the exchange, through the rate gate.
    pub async fn get_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<OpenOrder>> {
        self.gate.acquire().await;
        self.client.get_open_orders(symbol).await
    }

    /// Status of one order, through the rate gate.
    pub async fn get_order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> ExchangeResult<OrderStatus> {
        self.gate.acquire().await;
        self.client.get_order_status(symbol, order_id).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::entities::order::{OrderReport, OrderSide, OrderStatus, SymbolRules};
    use crate::domain::errors::ExchangeError;
    use crate::domain::repositories::exchange_client::{
        ExchangeClient, ExchangeResult, OpenOrder,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted exchange for engine tests: fixed balance/rules, every
    /// market order fills at `fill_price` unless `fail_orders` is set.
    pub struct MockExchangeClient {
        pub balance: Mutex<f64>,
        pub fill_price: Mutex<f64>,
        pub rules: SymbolRules,
        pub fail_orders: Mutex<bool>,
        pub orders: Mutex<Vec<(String, OrderSide, f64)>>,
        order_seq: AtomicU32,
    }

    impl MockExchangeClient {
        pub fn new(balance: f64, fill_price: f64) -> Self {
            Self {
                balance: Mutex::new(balance),
                fill_price: Mutex::new(fill_price),
                rules: SymbolRules {
                    step_size: 0.001,
                    min_qty: 0.001,
                    max_qty: 100000.0,
                    tick_size: 0.0001,
                },
                fail_orders: Mutex::new(false),
                orders: Mutex::new(Vec::new()),
                order_seq: AtomicU32::new(1),
            }
        }

        pub fn set_fill_price(&self, price: f64) {
            *self.fill_price.lock().unwrap() = price;
        }

        pub fn set_fail_orders(&self, fail: bool) {
            *self.fail_orders.lock().unwrap() = fail;
        }
    }

    #[async_trait]
    impl ExchangeClient for MockExchangeClient {
        fn name(&self) -> &str {
            "mock"
        }

        async fn ping(&self) -> ExchangeResult<()> {
            Ok(())
        }

        async fn get_balance(&self, _asset: &str) -> ExchangeResult<f64> {
            Ok(*self.balance.lock().unwrap())
        }

        async fn get_symbol_rules(&self, _symbol: &str) -> ExchangeResult<SymbolRules> {
            Ok(self.rules)
        }

        async fn place_market_order(
            &self,
            symbol: &str,
            side: OrderSide,
            quantity: f64,
        ) -> ExchangeResult<OrderReport> {
            if *self.fail_orders.lock().unwrap() {
                return Err(ExchangeError::OrderPlacementFailed(
                    "scripted failure".to_string(),
                ));
            }
            self.orders
                .lock()
                .unwrap()
                .push((symbol.to_string(), side, quantity));
            let id = self.order_seq.fetch_add(1, Ordering::SeqCst);
            Ok(OrderReport {
                order_id: format!("mock-{}", id),
                symbol: symbol.to_string(),
                side,
                status: OrderStatus::Filled,
                executed_qty: quantity,
                avg_fill_price: *self.fill_price.lock().unwrap(),
                commission: 0.0,
            })
        }

        async fn cancel_all_orders(&self, _symbol: &str) -> ExchangeResult<()> {
            Ok(())
        }

        async fn get_open_orders(&self, _symbol: Option<&str>) -> ExchangeResult<Vec<OpenOrder>> {
            Ok(Vec::new())
        }

        async fn get_order_status(
            &self,
            _symbol: &str,
            _order_id: &str,
        ) -> ExchangeResult<OrderStatus> {
            Ok(OrderStatus::Filled)
        }

        async fn get_ticker_price(&self, _symbol: &str) -> ExchangeResult<f64> {
            Ok(*self.fill_price.lock().unwrap())
        }

        async fn get_recent_closes(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: usize,
        ) -> ExchangeResult<Vec<f64>> {
            Ok(Vec::new())
        }
    }
}
