//! Indicator construction from recent close prices.
//!
//! Produces the `IndicatorSnapshot` the signal engine consumes: latest
//! price, lower volatility band (SMA minus k standard deviations) and a
//! Wilder-smoothed RSI oscillator. Fields that cannot be computed from
//! the available history are left `None`; the signal engine treats such
//! snapshots as no-signal.

use crate::domain::services::signal_engine::IndicatorSnapshot;

#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub band_period: usize,
    pub band_std_dev: f64,
    pub oscillator_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            band_period: 20,
            band_std_dev: 2.0,
            oscillator_period: 14,
        }
    }
}

pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    /// How many closes a fully populated snapshot needs.
    pub fn required_history(&self) -> usize {
        self.config.band_period.max(self.config.oscillator_period + 1)
    }

    /// Build a snapshot from closes ordered oldest first. Returns `None`
    /// only when there is no price at all.
    pub fn snapshot(&self, closes: &[f64]) -> Option<IndicatorSnapshot> {
        let price = *closes.last()?;
        Some(IndicatorSnapshot {
            price,
            lower_band: self.lower_band(closes),
            oscillator: self.rsi(closes),
        })
    }

    fn lower_band(&self, closes: &[f64]) -> Option<f64> {
        let period = self.config.band_period;
        if period == 0 || closes.len() < period {
            return None;
        }
        let window = &closes[closes.len() - period..];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance =
            window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / period as f64;
        Some(mean - self.config.band_std_dev * variance.sqrt())
    }

    /// Wilder-smoothed relative strength index over the configured
    /// period. Needs `period + 1` closes; an all-gain window reads 100.
    fn rsi(&self, closes: &[f64]) -> Option<f64> {
        let period = self.config.oscillator_period;
        if period == 0 || closes.len() < period + 1 {
            return None;
        }

        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let mut avg_gain = changes[..period]
            .iter()
            .filter(|c| **c > 0.0)
            .sum::<f64>()
            / period as f64;
        let mut avg_loss = changes[..period]
            .iter()
            .filter(|c| **c < 0.0)
            .map(|c| -c)
            .sum::<f64>()
            / period as f64;

        for change in &changes[period..] {
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
            avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        }

        if avg_loss == 0.0 {
            return Some(100.0);
        }
        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new(IndicatorConfig::default())
    }
}
