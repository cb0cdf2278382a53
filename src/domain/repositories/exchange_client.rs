//! Exchange Client Trait
//!
//! Common interface over the exchange operations the lifecycle core
//! consumes: balances, per-symbol trading rules, market order placement,
//! order cleanup/lookup, and ticker snapshots. Keeping the trait at this
//! seam decouples the execution engine from any concrete exchange and
//! makes it mockable in tests.

use crate::domain::entities::order::{OrderReport, OrderSide, OrderStatus, SymbolRules};
use crate::domain::errors::ExchangeError;
use async_trait::async_trait;

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// A single open order as listed by the exchange.
#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub orig_qty: f64,
    pub executed_qty: f64,
    pub status: OrderStatus,
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Exchange name for logging.
    fn name(&self) -> &str;

    /// Connectivity probe used by startup bring-up.
    async fn ping(&self) -> ExchangeResult<()>;

    /// Free balance of a single asset. Assets absent from the account
    /// report a balance of zero.
    async fn get_balance(&self, asset: &str) -> ExchangeResult<f64>;

    /// Lot-size and price-tick rules for a symbol.
    async fn get_symbol_rules(&self, symbol: &str) -> ExchangeResult<SymbolRules>;

    /// Place a market order and return the exchange's fill report.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> ExchangeResult<OrderReport>;

    /// Cancel every open order for a symbol.
    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()>;

    /// List open orders, optionally restricted to one symbol.
    async fn get_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<OpenOrder>>;

    /// Status of a specific order.
    async fn get_order_status(&self, symbol: &str, order_id: &str)
        -> ExchangeResult<OrderStatus>;

    /// Current ticker price for a symbol.
    async fn get_ticker_price(&self, symbol: &str) -> ExchangeResult<f64>;

    /// Recent close prices for a symbol, oldest first. One snapshot
    /// request; no pagination.
    async fn get_recent_closes(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<f64>>;
}
