//! Runtime configuration, loaded from the environment with validated
//! fallbacks. A malformed value never aborts startup; it logs a warning
//! and keeps the documented default.

use crate::domain::services::execution::ExecutionConfig;
use crate::domain::services::signal_engine::{parse_cooldown, ProfitTier, StrategyConfig};
use crate::rate_limit::RateGateConfig;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct AppConfig {
    /// Symbols watched by the trading loop, e.g. `SUI/USDT`.
    pub symbols: Vec<String>,
    pub quote_asset: String,
    pub position_size_pct: f64,
    pub max_open_positions: usize,
    pub stop_loss_pct: f64,
    pub take_profit_tiers: Vec<ProfitTier>,
    pub cooldown: chrono::Duration,
    pub oversold_threshold: f64,
    pub min_request_interval_ms: u64,
    pub ledger_path: String,
    pub candle_interval: String,
    pub candle_limit: usize,
    pub tick_interval_secs: u64,
    pub testnet: bool,
    pub api_key: String,
    pub api_secret: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["SUI/USDT".to_string()],
            quote_asset: "USDT".to_string(),
            position_size_pct: 0.1,
            max_open_positions: 3,
            stop_loss_pct: 0.02,
            take_profit_tiers: vec![
                ProfitTier { profit_pct: 0.02, size_fraction: 0.33 },
                ProfitTier { profit_pct: 0.03, size_fraction: 0.33 },
                ProfitTier { profit_pct: 0.04, size_fraction: 0.34 },
            ],
            cooldown: chrono::Duration::hours(4),
            oversold_threshold: 30.0,
            min_request_interval_ms: 50,
            ledger_path: "trade_ledger.json".to_string(),
            candle_interval: "15m".to_string(),
            candle_limit: 50,
            tick_interval_secs: 60,
            testnet: true,
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> AppConfig {
        let mut config = AppConfig::default();

        if let Ok(symbols) = std::env::var("SYMBOLS") {
            let parsed = parse_symbols(&symbols);
            if parsed.is_empty() {
                warn!("SYMBOLS '{}' parses to nothing, keeping defaults", symbols);
            } else {
                config.symbols = parsed;
            }
        }

        if let Ok(asset) = std::env::var("QUOTE_ASSET") {
            if !asset.trim().is_empty() {
                config.quote_asset = asset.trim().to_uppercase();
            }
        }

        if let Ok(pct) = std::env::var("POSITION_SIZE_PCT") {
            match pct.parse::<f64>() {
                Ok(value) if (0.001..=1.0).contains(&value) => {
                    config.position_size_pct = value;
                }
                _ => warn!(
                    "Invalid POSITION_SIZE_PCT '{}' (must be 0.001..=1.0), using {}",
                    pct, config.position_size_pct
                ),
            }
        }

        if let Ok(max) = std::env::var("MAX_OPEN_POSITIONS") {
            match max.parse::<usize>() {
                Ok(value) if value > 0 => config.max_open_positions = value,
                _ => warn!(
                    "Invalid MAX_OPEN_POSITIONS '{}', using {}",
                    max, config.max_open_positions
                ),
            }
        }

        if let Ok(sl) = std::env::var("STOP_LOSS_PCT") {
            match sl.parse::<f64>() {
                Ok(value) if value > 0.0 && value < 1.0 => config.stop_loss_pct = value,
                _ => warn!(
                    "Invalid STOP_LOSS_PCT '{}' (must be within (0, 1)), using {}",
                    sl, config.stop_loss_pct
                ),
            }
        }

        if let Ok(tiers) = std::env::var("TAKE_PROFIT_TIERS") {
            match parse_tiers(&tiers) {
                Some(parsed) => config.take_profit_tiers = parsed,
                None => warn!(
                    "Invalid TAKE_PROFIT_TIERS '{}' (expected pct:fraction pairs with \
                     ascending percentages and fractions summing to 1), keeping defaults",
                    tiers
                ),
            }
        }

        if let Ok(cooldown) = std::env::var("COOLDOWN") {
            match parse_cooldown(&cooldown) {
                Ok(value) => config.cooldown = value,
                Err(e) => warn!("{}, using 4h", e),
            }
        }

        if let Ok(threshold) = std::env::var("OVERSOLD_THRESHOLD") {
            match threshold.parse::<f64>() {
                Ok(value) if (0.0..=100.0).contains(&value) => {
                    config.oversold_threshold = value;
                }
                _ => warn!(
                    "Invalid OVERSOLD_THRESHOLD '{}' (must be 0..=100), using {}",
                    threshold, config.oversold_threshold
                ),
            }
        }

        if let Ok(interval) = std::env::var("MIN_REQUEST_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(value) if value > 0 => config.min_request_interval_ms = value,
                _ => warn!(
                    "Invalid MIN_REQUEST_INTERVAL_MS '{}', using {}",
                    interval, config.min_request_interval_ms
                ),
            }
        }

        if let Ok(path) = std::env::var("LEDGER_PATH") {
            if !path.trim().is_empty() {
                config.ledger_path = path;
            }
        }

        if let Ok(interval) = std::env::var("CANDLE_INTERVAL") {
            if !interval.trim().is_empty() {
                config.candle_interval = interval.trim().to_string();
            }
        }

        if let Ok(limit) = std::env::var("CANDLE_LIMIT") {
            match limit.parse::<usize>() {
                Ok(value) if value > 0 => config.candle_limit = value,
                _ => warn!("Invalid CANDLE_LIMIT '{}', using {}", limit, config.candle_limit),
            }
        }

        if let Ok(secs) = std::env::var("TICK_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(value) if value > 0 => config.tick_interval_secs = value,
                _ => warn!(
                    "Invalid TICK_INTERVAL_SECS '{}', using {}",
                    secs, config.tick_interval_secs
                ),
            }
        }

        if let Ok(testnet) = std::env::var("BINANCE_TESTNET") {
            config.testnet = testnet.to_lowercase() == "true" || testnet == "1";
        }
        if let Ok(key) = std::env::var("BINANCE_API_KEY") {
            config.api_key = key;
        }
        if let Ok(secret) = std::env::var("BINANCE_API_SECRET") {
            config.api_secret = secret;
        }

        config
    }

    pub fn strategy(&self) -> StrategyConfig {
        StrategyConfig {
            oversold_threshold: self.oversold_threshold,
            stop_loss_pct: self.stop_loss_pct,
            tiers: self.take_profit_tiers.clone(),
            cooldown: self.cooldown,
        }
    }

    pub fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            quote_asset: self.quote_asset.clone(),
            position_size_pct: self.position_size_pct,
            max_open_positions: self.max_open_positions,
        }
    }

    pub fn rate_gate(&self) -> RateGateConfig {
        RateGateConfig {
            min_interval: Duration::from_millis(self.min_request_interval_ms),
        }
    }
}

fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `"0.02:0.33,0.03:0.33,0.04:0.34"` into a tier ladder. Rejects
/// non-ascending percentages and fractions that do not sum to 1.
fn parse_tiers(raw: &str) -> Option<Vec<ProfitTier>> {
    let mut tiers = Vec::new();
    for pair in raw.split(',') {
        let (pct, fraction) = pair.trim().split_once(':')?;
        let tier = ProfitTier {
            profit_pct: pct.trim().parse().ok()?,
            size_fraction: fraction.trim().parse().ok()?,
        };
        if tier.profit_pct <= 0.0 || !(0.0..=1.0).contains(&tier.size_fraction) {
            return None;
        }
        tiers.push(tier);
    }
    if tiers.is_empty() {
        return None;
    }
    if !tiers.windows(2).all(|w| w[0].profit_pct < w[1].profit_pct) {
        return None;
    }
    let total: f64 = tiers.iter().map(|t| t.size_fraction).sum();
    if (total - 1.0).abs() > 1e-6 {
        return None;
    }
    Some(tiers)
}
