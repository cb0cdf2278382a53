use serde::{Deserialize, Serialize};

/// A validated, non-negative price in quote currency.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, String> {
        if !value.is_finite() {
            return Err("Price must be finite".to_string());
        }
        if value < 0.0 {
            return Err("Price must be non-negative".to_string());
        }
        Ok(Price(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Price shifted by a signed percentage, e.g. `with_offset_pct(-0.02)`
    /// is 2% below this price. Used for stop-loss and tier targets.
    pub fn with_offset_pct(&self, pct: f64) -> Result<Price, String> {
        if !pct.is_finite() {
            return Err("Offset must be finite".to_string());
        }
        Price::new(self.0 * (1.0 + pct))
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_new_valid() {
        let price = Price::new(100.0);
        assert!(price.is_ok());
        assert_eq!(price.unwrap().value(), 100.0);
    }

    #[test]
    fn test_price_new_negative() {
        assert!(Price::new(-10.0).is_err());
    }

    #[test]
    fn test_price_new_nan() {
        assert!(Price::new(f64::NAN).is_err());
    }

    #[test]
    fn test_price_offset_above() {
        let price = Price::new(100.0).unwrap();
        let target = price.with_offset_pct(0.04).unwrap();
        assert!((target.value() - 104.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_offset_below() {
        let price = Price::new(100.0).unwrap();
        let stop = price.with_offset_pct(-0.02).unwrap();
        assert!((stop.value() - 98.0).abs() < 1e-9);
    }
}
