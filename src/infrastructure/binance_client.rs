//! Binance spot REST client.
//!
//! Signed requests carry the query string HMAC-SHA256 signature required
//! by the exchange; the caller is responsible for pacing through the
//! rate gate.

use crate::domain::entities::order::{OrderReport, OrderSide, OrderStatus, SymbolRules};
use crate::domain::errors::ExchangeError;
use crate::domain::repositories::exchange_client::{ExchangeClient, ExchangeResult, OpenOrder};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const BINANCE_API_BASE: &str = "https://api.binance.com";
const BINANCE_TESTNET_BASE: &str = "https://testnet.binance.vision";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub api_base: String,
    pub api_key: String,
    pub api_secret: String,
}

impl BinanceConfig {
    pub fn new(api_key: &str, api_secret: &str, testnet: bool) -> Self {
        Self {
            api_base: if testnet {
                BINANCE_TESTNET_BASE.to_string()
            } else {
                BINANCE_API_BASE.to_string()
            },
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        }
    }
}

/// One asset's balance inside the account response.
#[derive(Debug, Deserialize)]
struct BinanceBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct BinanceAccount {
    balances: Vec<BinanceBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceFilter {
    filter_type: String,
    #[serde(default)]
    step_size: Option<String>,
    #[serde(default)]
    min_qty: Option<String>,
    #[serde(default)]
    max_qty: Option<String>,
    #[serde(default)]
    tick_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BinanceSymbolInfo {
    filters: Vec<BinanceFilter>,
}

#[derive(Debug, Deserialize)]
struct BinanceExchangeInfo {
    symbols: Vec<BinanceSymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct BinanceFill {
    price: String,
    qty: String,
    commission: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOrderResponse {
    order_id: u64,
    status: String,
    executed_qty: String,
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
    #[serde(default)]
    fills: Vec<BinanceFill>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOpenOrder {
    order_id: u64,
    symbol: String,
    side: String,
    orig_qty: String,
    executed_qty: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct BinanceTicker {
    price: String,
}

pub struct BinanceClient {
    client: Client,
    config: BinanceConfig,
}

impl BinanceClient {
    pub fn new(config: BinanceConfig) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ExchangeError::ConnectionFailed(e.to_string()))?;
        info!("Binance client targeting {}", config.api_base);
        Ok(Self { client, config })
    }

    /// `"SUI/USDT"` -> `"SUIUSDT"`.
    fn normalize_symbol(symbol: &str) -> String {
        symbol.replace('/', "")
    }

    fn timestamp_ms() -> Result<u64, ExchangeError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .map_err(|e| ExchangeError::ConnectionFailed(format!("clock error: {}", e)))
    }

    /// Hex HMAC-SHA256 of the query string, as Binance signed endpoints
    /// require.
    fn sign(&self, query: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .map_err(|e| ExchangeError::ConnectionFailed(format!("HMAC error: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_url(&self, path: &str, query: &str) -> Result<String, ExchangeError> {
        let query = if query.is_empty() {
            format!("timestamp={}", Self::timestamp_ms()?)
        } else {
            format!("{}&timestamp={}", query, Self::timestamp_ms()?)
        };
        let signature = self.sign(&query)?;
        Ok(format!(
            "{}{}?{}&signature={}",
            self.config.api_base, path, query, signature
        ))
    }

    async fn read_response(
        response: reqwest::Response,
        context: &str,
    ) -> Result<String, ExchangeError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;
        if !status.is_success() {
            return Err(ExchangeError::NetworkError(format!(
                "{}: HTTP {} - {}",
                context, status, body
            )));
        }
        Ok(body)
    }

    async fn get_signed(&self, path: &str, query: &str, context: &str) -> Result<String, ExchangeError> {
        let url = self.signed_url(path, query)?;
        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;
        Self::read_response(response, context).await
    }

    fn parse_f64(value: &str, field: &str) -> Result<f64, ExchangeError> {
        value.parse::<f64>().map_err(|_| {
            ExchangeError::ResponseParseError(format!("bad {}: {:?}", field, value))
        })
    }

    fn order_report(
        symbol: &str,
        side: OrderSide,
        response: BinanceOrderResponse,
    ) -> Result<OrderReport, ExchangeError> {
        let executed_qty = Self::parse_f64(&response.executed_qty, "executedQty")?;
        let quote_qty = response
            .cummulative_quote_qty
            .as_deref()
            .map(|q| Self::parse_f64(q, "cummulativeQuoteQty"))
            .transpose()?
            .unwrap_or(0.0);

        // quote volume over base volume gives the quantity-weighted
        // average; fall back to the fill list when the quote total is
        // absent
        let avg_fill_price = if executed_qty > 0.0 && quote_qty > 0.0 {
            quote_qty / executed_qty
        } else {
            let mut notional = 0.0;
            let mut volume = 0.0;
            for fill in &response.fills {
                let price = Self::parse_f64(&fill.price, "fill price")?;
                let qty = Self::parse_f64(&fill.qty, "fill qty")?;
                notional += price * qty;
                volume += qty;
            }
            if volume > 0.0 {
                notional / volume
            } else {
                0.0
            }
        };

        let mut commission = 0.0;
        for fill in &response.fills {
            commission += Self::parse_f64(&fill.commission, "fill commission")?;
        }

        Ok(OrderReport {
            order_id: response.order_id.to_string(),
            symbol: symbol.to_string(),
            side,
            status: OrderStatus::from_exchange(&response.status),
            executed_qty,
            avg_fill_price,
            commission,
        })
    }

    fn symbol_rules(info: BinanceExchangeInfo, symbol: &str) -> Result<SymbolRules, ExchangeError> {
        let missing = |reason: &str| ExchangeError::SymbolRulesUnavailable {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        };
        let symbol_info = info.symbols.into_iter().next().ok_or_else(|| missing("unknown symbol"))?;

        let mut rules = SymbolRules {
            step_size: 0.0,
            min_qty: 0.0,
            max_qty: f64::MAX,
            tick_size: 0.0,
        };
        let mut lot_size_seen = false;
        for filter in symbol_info.filters {
            match filter.filter_type.as_str() {
                "LOT_SIZE" => {
                    lot_size_seen = true;
                    if let Some(step) = filter.step_size.as_deref() {
                        rules.step_size = Self::parse_f64(step, "stepSize")?;
                    }
                    if let Some(min) = filter.min_qty.as_deref() {
                        rules.min_qty = Self::parse_f64(min, "minQty")?;
                    }
                    if let Some(max) = filter.max_qty.as_deref() {
                        rules.max_qty = Self::parse_f64(max, "maxQty")?;
                    }
                }
                "PRICE_FILTER" => {
                    if let Some(tick) = filter.tick_size.as_deref() {
                        rules.tick_size = Self::parse_f64(tick, "tickSize")?;
                    }
                }
                _ => {}
            }
        }
        if !lot_size_seen {
            return Err(missing("no LOT_SIZE filter"));
        }
        Ok(rules)
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &str {
        "Binance"
    }

    async fn ping(&self) -> ExchangeResult<()> {
        let url = format!("{}/api/v3/ping", self.config.api_base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::ConnectionFailed(e.to_string()))?;
        Self::read_response(response, "ping").await.map(|_| ())
    }

    async fn get_balance(&self, asset: &str) -> ExchangeResult<f64> {
        let body = self
            .get_signed("/api/v3/account", "", "account")
            .await
            .map_err(|e| ExchangeError::BalanceQueryFailed(e.to_string()))?;
        let account: BinanceAccount = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ResponseParseError(e.to_string()))?;

        // assets missing from the account are simply not held
        let free = account
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| Self::parse_f64(&b.free, "free balance"))
            .transpose()?
            .unwrap_or(0.0);
        debug!("Free {} balance: {}", asset, free);
        Ok(free)
    }

    async fn get_symbol_rules(&self, symbol: &str) -> ExchangeResult<SymbolRules> {
        let url = format!(
            "{}/api/v3/exchangeInfo?symbol={}",
            self.config.api_base,
            Self::normalize_symbol(symbol)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;
        let body = Self::read_response(response, "exchangeInfo").await?;
        let info: BinanceExchangeInfo = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ResponseParseError(e.to_string()))?;
        Self::symbol_rules(info, symbol)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> ExchangeResult<OrderReport> {
        let query = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newOrderRespType=FULL",
            Self::normalize_symbol(symbol),
            side,
            quantity
        );
        let url = self.signed_url("/api/v3/order", &query)?;
        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::OrderPlacementFailed(e.to_string()))?;
        let body = Self::read_response(response, "order")
            .await
            .map_err(|e| ExchangeError::OrderPlacementFailed(e.to_string()))?;
        let parsed: BinanceOrderResponse = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ResponseParseError(e.to_string()))?;
        info!(
            "Placed {} {} market order for {}: order {} ({})",
            side, symbol, quantity, parsed.order_id, parsed.status
        );
        Self::order_report(symbol, side, parsed)
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()> {
        let query = format!("symbol={}", Self::normalize_symbol(symbol));
        let url = self.signed_url("/api/v3/openOrders", &query)?;
        let response = self
            .client
            .delete(&url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::OrderCancellationFailed(e.to_string()))?;
        // Binance answers 400 with code -2011 when there is nothing to
        // cancel; treat that as success.
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;
        if status.is_success() || body.contains("-2011") {
            Ok(())
        } else {
            Err(ExchangeError::OrderCancellationFailed(format!(
                "HTTP {} - {}",
                status, body
            )))
        }
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<OpenOrder>> {
        let query = match symbol {
            Some(symbol) => format!("symbol={}", Self::normalize_symbol(symbol)),
            None => String::new(),
        };
        let body = self.get_signed("/api/v3/openOrders", &query, "openOrders").await?;
        let raw: Vec<BinanceOpenOrder> = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ResponseParseError(e.to_string()))?;

        let mut orders = Vec::with_capacity(raw.len());
        for order in raw {
            let side = if order.side == "BUY" {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            orders.push(OpenOrder {
                order_id: order.order_id.to_string(),
                symbol: order.symbol,
                side,
                orig_qty: Self::parse_f64(&order.orig_qty, "origQty")?,
                executed_qty: Self::parse_f64(&order.executed_qty, "executedQty")?,
                status: OrderStatus::from_exchange(&order.status),
            });
        }
        Ok(orders)
    }

    async fn get_order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> ExchangeResult<OrderStatus> {
        let query = format!(
            "symbol={}&orderId={}",
            Self::normalize_symbol(symbol),
            order_id
        );
        let body = self
            .get_signed("/api/v3/order", &query, "order status")
            .await
            .map_err(|e| ExchangeError::OrderStatusFailed(e.to_string()))?;
        let parsed: BinanceOrderResponse = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ResponseParseError(e.to_string()))?;
        Ok(OrderStatus::from_exchange(&parsed.status))
    }

    async fn get_ticker_price(&self, symbol: &str) -> ExchangeResult<f64> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.config.api_base,
            Self::normalize_symbol(symbol)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::TickerFailed(e.to_string()))?;
        let body = Self::read_response(response, "ticker").await?;
        let ticker: BinanceTicker = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ResponseParseError(e.to_string()))?;
        Self::parse_f64(&ticker.price, "ticker price")
    }

    async fn get_recent_closes(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<f64>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.config.api_base,
            Self::normalize_symbol(symbol),
            interval,
            limit
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::MarketDataFailed(e.to_string()))?;
        let body = Self::read_response(response, "klines").await?;

        // each kline is a positional array; the close price is index 4
        let klines: Vec<Vec<serde_json::Value>> = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ResponseParseError(e.to_string()))?;
        let mut closes = Vec::with_capacity(klines.len());
        for kline in klines {
            let close = kline
                .get(4)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    ExchangeError::ResponseParseError("kline missing close price".to_string())
                })?;
            closes.push(Self::parse_f64(close, "kline close")?);
        }
        Ok(closes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BinanceClient {
        BinanceClient::new(BinanceConfig::new("key", "secret", true)).unwrap()
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(BinanceClient::normalize_symbol("SUI/USDT"), "SUIUSDT");
        assert_eq!(BinanceClient::normalize_symbol("BTCUSDT"), "BTCUSDT");
    }

    #[test]
    fn test_signature_matches_documented_vector() {
        // signature example published in the Binance API docs
        let client = BinanceClient::new(BinanceConfig::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A",
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
            false,
        ))
        .unwrap();
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            client.sign(query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_order_report_weighted_fill_price() {
        let response: BinanceOrderResponse = serde_json::from_str(
            r#"{
                "orderId": 28,
                "status": "FILLED",
                "executedQty": "10.0",
                "cummulativeQuoteQty": "1005.0",
                "fills": [
                    {"price": "100.0", "qty": "5.0", "commission": "0.05"},
                    {"price": "101.0", "qty": "5.0", "commission": "0.05"}
                ]
            }"#,
        )
        .unwrap();
        let report =
            BinanceClient::order_report("SUI/USDT", OrderSide::Buy, response).unwrap();
        assert_eq!(report.order_id, "28");
        assert_eq!(report.status, OrderStatus::Filled);
        assert!((report.avg_fill_price - 100.5).abs() < 1e-9);
        assert!((report.commission - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_order_report_falls_back_to_fills() {
        let response: BinanceOrderResponse = serde_json::from_str(
            r#"{
                "orderId": 29,
                "status": "FILLED",
                "executedQty": "2.0",
                "fills": [{"price": "50.0", "qty": "2.0", "commission": "0.01"}]
            }"#,
        )
        .unwrap();
        let report =
            BinanceClient::order_report("SUI/USDT", OrderSide::Sell, response).unwrap();
        assert!((report.avg_fill_price - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_symbol_rules_from_exchange_info() {
        let info: BinanceExchangeInfo = serde_json::from_str(
            r#"{
                "symbols": [{
                    "filters": [
                        {"filterType": "PRICE_FILTER", "tickSize": "0.0001"},
                        {"filterType": "LOT_SIZE", "stepSize": "0.1", "minQty": "0.1", "maxQty": "92141578.0"},
                        {"filterType": "NOTIONAL"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        let rules = BinanceClient::symbol_rules(info, "SUI/USDT").unwrap();
        assert_eq!(rules.step_size, 0.1);
        assert_eq!(rules.min_qty, 0.1);
        assert_eq!(rules.max_qty, 92141578.0);
        assert_eq!(rules.tick_size, 0.0001);
    }

    #[test]
    fn test_symbol_rules_require_lot_size() {
        let info: BinanceExchangeInfo = serde_json::from_str(
            r#"{"symbols": [{"filters": [{"filterType": "PRICE_FILTER", "tickSize": "0.01"}]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            BinanceClient::symbol_rules(info, "SUI/USDT"),
            Err(ExchangeError::SymbolRulesUnavailable { .. })
        ));
    }

    #[test]
    fn test_testnet_base_url() {
        let c = client();
        assert_eq!(c.config.api_base, BINANCE_TESTNET_BASE);
    }
}
