use serde::{Deserialize, Serialize};

/// A validated, non-negative order/position quantity in base currency.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(f64);

impl Quantity {
    pub fn new(value: f64) -> Result<Self, String> {
        if !value.is_finite() {
            return Err("Quantity must be finite".to_string());
        }
        if value < 0.0 {
            return Err("Quantity must be non-negative".to_string());
        }
        Ok(Quantity(value))
    }

    pub const fn zero() -> Self {
        Quantity(0.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 <= f64::EPSILON
    }

    pub fn add(&self, other: Quantity) -> Result<Quantity, String> {
        Quantity::new(self.0 + other.0)
    }

    pub fn subtract(&self, other: Quantity) -> Result<Quantity, String> {
        Quantity::new(self.0 - other.0)
    }

    /// Snap down to the largest multiple of `step` not exceeding this
    /// quantity, then round to the step's decimal precision to shed float
    /// noise. A non-positive step leaves the quantity unchanged.
    pub fn snap_to_step(&self, step: f64) -> Quantity {
        if step <= 0.0 || !step.is_finite() {
            return *self;
        }
        let steps = (self.0 / step).floor();
        let snapped = steps * step;
        Quantity(round_to_precision(snapped, step_precision(step)))
    }

    /// Clamp into the exchange's `[min, max]` quantity bounds.
    pub fn clamp(&self, min: f64, max: f64) -> Quantity {
        Quantity(self.0.clamp(min, max))
    }

    /// Round to `decimals` decimal places. Tier quantities are rounded to
    /// 8 decimals before submission.
    pub fn round_to(&self, decimals: u32) -> Quantity {
        Quantity(round_to_precision(self.0, decimals))
    }
}

fn round_to_precision(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Number of decimal places in a step size, e.g. 0.001 -> 3.
fn step_precision(step: f64) -> u32 {
    let mut precision = 0u32;
    let mut scaled = step;
    while scaled.fract().abs() > 1e-9 && precision < 12 {
        scaled *= 10.0;
        precision += 1;
    }
    precision
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_new_valid() {
        let qty = Quantity::new(1.5);
        assert!(qty.is_ok());
        assert_eq!(qty.unwrap().value(), 1.5);
    }

    #[test]
    fn test_quantity_new_negative() {
        assert!(Quantity::new(-1.0).is_err());
    }

    #[test]
    fn test_quantity_add() {
        let a = Quantity::new(6.7).unwrap();
        let b = Quantity::new(3.3).unwrap();
        assert!((a.add(b).unwrap().value() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_quantity_subtract() {
        let a = Quantity::new(10.0).unwrap();
        let b = Quantity::new(3.4).unwrap();
        assert!((a.subtract(b).unwrap().value() - 6.6).abs() < 1e-9);
    }

    #[test]
    fn test_quantity_subtract_below_zero() {
        let a = Quantity::new(1.0).unwrap();
        let b = Quantity::new(2.0).unwrap();
        assert!(a.subtract(b).is_err());
    }

    #[test]
    fn test_snap_to_step() {
        let qty = Quantity::new(0.123456).unwrap();
        let snapped = qty.snap_to_step(0.001);
        assert_eq!(snapped.value(), 0.123);
    }

    #[test]
    fn test_snap_to_step_exact_multiple() {
        let qty = Quantity::new(0.25).unwrap();
        assert_eq!(qty.snap_to_step(0.05).value(), 0.25);
    }

    #[test]
    fn test_snap_to_step_invariant() {
        // quantity mod step == 0 after snapping
        let step = 0.01;
        for raw in [0.019, 1.2345, 7.777, 0.0001] {
            let snapped = Quantity::new(raw).unwrap().snap_to_step(step);
            let remainder = snapped.value() % step;
            assert!(remainder < 1e-9 || (step - remainder) < 1e-9);
            assert!(snapped.value() <= raw);
        }
    }

    #[test]
    fn test_clamp_bounds() {
        let qty = Quantity::new(500.0).unwrap();
        assert_eq!(qty.clamp(0.001, 100.0).value(), 100.0);
        let qty = Quantity::new(0.0001).unwrap();
        assert_eq!(qty.clamp(0.001, 100.0).value(), 0.001);
    }

    #[test]
    fn test_round_to() {
        let qty = Quantity::new(3.400000000001).unwrap();
        assert_eq!(qty.round_to(8).value(), 3.4);
    }
}
