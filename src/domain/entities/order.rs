use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    Unknown,
}

impl OrderStatus {
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::Unknown,
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Executed-order report: what the exchange says actually happened.
///
/// `avg_fill_price` is quantity-weighted over individual fills and
/// `commission` is summed over them, so partial-fill accounting flows
/// into realized P&L without extra bookkeeping.
#[derive(Debug, Clone)]
pub struct OrderReport {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub executed_qty: f64,
    pub avg_fill_price: f64,
    pub commission: f64,
}

/// Per-symbol trading rules published by the exchange.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymbolRules {
    /// Minimum increment of order quantity.
    pub step_size: f64,
    pub min_qty: f64,
    pub max_qty: f64,
    /// Minimum increment of order price.
    pub tick_size: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_from_exchange() {
        assert_eq!(OrderStatus::from_exchange("FILLED"), OrderStatus::Filled);
        assert_eq!(
            OrderStatus::from_exchange("PARTIALLY_FILLED"),
            OrderStatus::PartiallyFilled
        );
        assert_eq!(OrderStatus::from_exchange("weird"), OrderStatus::Unknown);
    }

    #[test]
    fn test_order_status_is_filled() {
        assert!(OrderStatus::Filled.is_filled());
        assert!(OrderStatus::PartiallyFilled.is_filled());
        assert!(!OrderStatus::Rejected.is_filled());
    }

    #[test]
    fn test_order_side_display() {
        assert_eq!(OrderSide::Buy.to_string(), "BUY");
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
    }
}
