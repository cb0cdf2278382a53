use thiserror::Error;

/// Errors surfaced by exchange operations. These are logged and converted
/// to sentinel outcomes at the execution boundary, never propagated as
/// unhandled faults.
#[derive(Debug, Error, Clone)]
pub enum ExchangeError {
    #[error("Order placement failed: {0}")]
    OrderPlacementFailed(String),

    #[error("Order cancellation failed: {0}")]
    OrderCancellationFailed(String),

    #[error("Order status query failed: {0}")]
    OrderStatusFailed(String),

    #[error("Balance query failed: {0}")]
    BalanceQueryFailed(String),

    #[error("Trading rules unavailable for {symbol}: {reason}")]
    SymbolRulesUnavailable { symbol: String, reason: String },

    #[error("Ticker query failed: {0}")]
    TickerFailed(String),

    #[error("Market data query failed: {0}")]
    MarketDataFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to parse exchange response: {0}")]
    ResponseParseError(String),
}

/// Malformed configuration values. Recovered via documented defaults with
/// a warning; never fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid cooldown format: {0}")]
    InvalidCooldown(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Trade ledger persistence failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Position already open for {0}")]
    PositionAlreadyOpen(String),

    #[error("No open position for {0}")]
    PositionNotFound(String),

    #[error("Invalid tier hit: {0}")]
    InvalidTierHit(String),
}

/// Startup reconciliation failures.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("Exchange error during reconciliation: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Ledger error during reconciliation: {0}")]
    Ledger(#[from] LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_error_display() {
        let err = ExchangeError::OrderPlacementFailed("insufficient balance".to_string());
        assert_eq!(
            err.to_string(),
            "Order placement failed: insufficient balance"
        );
    }

    #[test]
    fn test_ledger_error_position_exists() {
        let err = LedgerError::PositionAlreadyOpen("SUI/USDT".to_string());
        assert_eq!(err.to_string(), "Position already open for SUI/USDT");
    }

    #[test]
    fn test_reconciliation_error_from_exchange() {
        let err: ReconciliationError =
            ExchangeError::BalanceQueryFailed("timeout".to_string()).into();
        assert!(err.to_string().contains("Balance query failed"));
    }
}
