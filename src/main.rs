use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use undertow::config::AppConfig;
use undertow::domain::repositories::exchange_client::ExchangeClient;
use undertow::domain::services::execution::{ExecutionEngine, IntentOutcome};
use undertow::domain::services::indicators::IndicatorEngine;
use undertow::domain::services::reconciliation::Reconciler;
use undertow::domain::services::signal_engine::{Intent, SignalEngine};
use undertow::domain::value_objects::price::Price;
use undertow::infrastructure::binance_client::{BinanceClient, BinanceConfig};
use undertow::persistence::ledger::TradeLedger;
use undertow::rate_limit::RateGate;
use undertow::retry::RetryPolicy;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "undertow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();
    info!(
        "Starting lifecycle manager: {} symbols, {} max positions, {} ledger",
        config.symbols.len(),
        config.max_open_positions,
        config.ledger_path
    );
    if config.api_key.is_empty() || config.api_secret.is_empty() {
        warn!("BINANCE_API_KEY/BINANCE_API_SECRET not set; signed endpoints will fail");
    }

    let client: Arc<dyn ExchangeClient> = Arc::new(BinanceClient::new(BinanceConfig::new(
        &config.api_key,
        &config.api_secret,
        config.testnet,
    ))?);
    let gate = RateGate::new(config.rate_gate());

    // Connectivity bring-up is the only retried call; everything after
    // this degrades per tick instead.
    let retry = RetryPolicy::default();
    retry.run("exchange ping", || client.ping()).await?;
    info!("Connected to {}", client.name());

    let mut ledger = TradeLedger::open(&config.ledger_path)?;
    let reconciler = Reconciler::new(client.clone(), gate.clone());
    let report = reconciler.reconcile(&mut ledger, &config.symbols).await?;
    if !report.stale.is_empty() {
        warn!(
            "Ledger entries not backed by exchange balances, review manually: {:?}",
            report.stale
        );
    }

    let mut execution = ExecutionEngine::new(client.clone(), ledger, gate.clone(), config.execution());
    let mut signals = SignalEngine::new(config.strategy());
    let indicators = IndicatorEngine::default();

    // Leftover resting orders from a previous run would fight the
    // market orders this engine places.
    for symbol in &config.symbols {
        if let Err(e) = execution.cancel_all_orders(symbol).await {
            warn!("Could not cancel open {} orders: {}", symbol, e);
        }
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.tick_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_tick(&config, &client, &gate, &indicators, &mut signals, &mut execution).await;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown requested, stopping trading loop");
                break;
            }
        }
    }

    let stats = execution.ledger().get_trade_stats();
    info!(
        "Session summary: {} trades, win rate {:.1}%, total P/L {:.4}",
        stats.total_trades,
        stats.win_rate * 100.0,
        stats.total_profit_loss
    );
    Ok(())
}

/// One evaluation pass over every configured symbol.
async fn run_tick(
    config: &AppConfig,
    client: &Arc<dyn ExchangeClient>,
    gate: &RateGate,
    indicators: &IndicatorEngine,
    signals: &mut SignalEngine,
    execution: &mut ExecutionEngine,
) {
    for symbol in &config.symbols {
        gate.acquire().await;
        let closes = match client
            .get_recent_closes(symbol, &config.candle_interval, config.candle_limit)
            .await
        {
            Ok(closes) => closes,
            Err(e) => {
                warn!("Skipping {} this tick: {}", symbol, e);
                continue;
            }
        };

        let snapshot = match indicators.snapshot(&closes) {
            Some(snapshot) => snapshot,
            None => {
                warn!("No price history for {}, skipping", symbol);
                continue;
            }
        };

        if let Some(position) = execution.position(symbol) {
            if let Ok(price) = Price::new(snapshot.price) {
                debug!(
                    "{} holding {} @ {} (unrealized {:.4})",
                    symbol,
                    position.quantity,
                    position.entry_price,
                    position.unrealized_pnl(price)
                );
            }
        }

        let intent = signals.evaluate(symbol, &snapshot, execution.position(symbol), Utc::now());
        if intent == Intent::None {
            continue;
        }
        if let IntentOutcome::Rejected(reason) = execution.submit_intent(symbol, intent).await {
            warn!("Intent for {} not executed: {}", symbol, reason);
        }
    }
}
