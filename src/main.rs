use alerter::{AlertSender, TelegramAlerter, run_alerter_service};
use anyhow::Context;
use api_client::{ApiClient, BinanceClient};
use clap::{Args, Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{Config, PersistenceBackend, init_tracing, load_config};
use core_types::PositionSide;
use database::{InMemorySignalStore, PgSignalStore, SignalStore, connect, run_migrations};
use engine::LiveEngine;
use risk::{margin_check_with_ratio, margin_used, reward_ratio, size_position};
use rust_decimal::Decimal;
use signals::{Evaluation, IndicatorSnapshot, SignalEvaluator, compute_snapshots};
use std::path::PathBuf;
use std::sync::Arc;

/// The main entry point for the Apex trading agent.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; everything can come from config.toml or the environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    // Keeps the file writer flushing until main returns.
    let _log_guard = init_tracing(&config.logging)?;

    match cli.command {
        Commands::Run(args) => handle_run(config, args).await,
        Commands::Evaluate(args) => handle_evaluate(config, args).await,
        Commands::Size(args) => handle_size(config, args),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A semi-automated futures trading agent.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides the configured log filter (e.g. "debug" or "engine=trace").
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live control loop for every enabled bot until Ctrl-C.
    Run(RunArgs),
    /// Evaluate the current signal for one symbol without trading.
    Evaluate(EvaluateArgs),
    /// Size a hypothetical trade with the configured risk rules.
    Size(SizeArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Overrides the configured persistence backend for the signal memory.
    #[arg(long, value_enum)]
    persistence: Option<PersistenceBackend>,

    /// Route orders to production instead of the testnet.
    #[arg(long)]
    live: bool,
}

#[derive(Args)]
struct EvaluateArgs {
    /// The symbol to evaluate (e.g., "BTCUSDT").
    #[arg(long)]
    symbol: String,

    /// The candle interval (e.g., "15m", "1h").
    #[arg(long)]
    interval: String,
}

#[derive(Args)]
struct SizeArgs {
    #[arg(long)]
    balance: Decimal,

    /// Percent of the balance at risk; defaults to the configured or tiered value.
    #[arg(long)]
    risk_pct: Option<Decimal>,

    #[arg(long)]
    entry: Decimal,

    #[arg(long)]
    stop: Decimal,

    #[arg(long)]
    target: Option<Decimal>,

    /// Defaults to the configured or tiered leverage.
    #[arg(long)]
    leverage: Option<u8>,
}

// ==============================================================================
// Command Logic
// ==============================================================================

fn exchange_client(config: &Config, live: bool) -> anyhow::Result<Arc<dyn ApiClient>> {
    let client = BinanceClient::new(live, &config.api, &config.exchange)
        .context("failed to build the exchange client")?;
    Ok(Arc::new(client))
}

async fn signal_store(backend: PersistenceBackend) -> anyhow::Result<Arc<dyn SignalStore>> {
    Ok(match backend {
        PersistenceBackend::Memory => {
            tracing::warn!("Signal memory is in-process only; it is lost on restart.");
            Arc::new(InMemorySignalStore::new())
        }
        PersistenceBackend::Postgres => {
            let pool = connect().await.context("failed to connect to the database")?;
            run_migrations(&pool)
                .await
                .context("failed to run database migrations")?;
            Arc::new(PgSignalStore::new(pool))
        }
    })
}

async fn handle_run(config: Config, args: RunArgs) -> anyhow::Result<()> {
    let live = args.live || config.exchange.live_trading_enabled;
    if live {
        tracing::warn!("LIVE TRADING ENABLED. Orders go to production.");
    } else {
        tracing::info!("Trading against the testnet.");
    }

    let api = exchange_client(&config, live)?;
    let store = signal_store(args.persistence.unwrap_or(config.persistence.backend)).await?;

    let (alerts, event_rx) = AlertSender::channel();
    let telegram = TelegramAlerter::new(&config.telegram);
    if telegram.is_none() {
        tracing::info!("Telegram is not configured; trade events are only logged.");
    }
    let alerter_handle = tokio::spawn(run_alerter_service(telegram, event_rx));

    let mut engine = LiveEngine::new(config, api, store, alerts)?;
    engine.run().await?;

    // Dropping the engine drops the last sender, which ends the alerter.
    drop(engine);
    if let Err(e) = alerter_handle.await {
        tracing::error!(error = %e, "Alerter task ended abnormally.");
    }
    Ok(())
}

async fn handle_evaluate(config: Config, args: EvaluateArgs) -> anyhow::Result<()> {
    let api = exchange_client(&config, config.exchange.live_trading_enabled)?;
    let symbol = args.symbol.to_uppercase();
    let candles = api
        .fetch_candles(&symbol, &args.interval, config.engine.candle_limit)
        .await?;

    let evaluator = SignalEvaluator::new(config.signal.clone())?;
    let snapshots = compute_snapshots(&candles, evaluator.params())?;
    let evaluation = evaluator.evaluate_snapshots(&snapshots);

    if let Some(latest) = snapshots.last() {
        println!("{}", snapshot_table(latest));
    }
    match &evaluation {
        Evaluation::InsufficientData { candles } => {
            println!("Not enough history: {candles} candles.");
        }
        Evaluation::Undefined => println!("Indicators are not warmed up yet."),
        Evaluation::Voted {
            signal,
            long,
            short,
        } => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["Condition", "Long", "Short"]);
            for ((name, long_vote), (_, short_vote)) in long.as_array().into_iter().zip(short.as_array()) {
                table.add_row(vec![name.to_string(), mark(long_vote), mark(short_vote)]);
            }
            table.add_row(vec![
                "total".to_string(),
                long.count().to_string(),
                short.count().to_string(),
            ]);
            println!("{table}");
            println!("{symbol} {}: {signal}", args.interval);
        }
    }
    Ok(())
}

fn snapshot_table(snapshot: &IndicatorSnapshot) -> Table {
    let fmt = |value: Option<Decimal>| value.map_or_else(|| "-".to_string(), |v| v.round_dp(4).to_string());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Indicator", "Value"]);
    let rows = [
        ("candle open", snapshot.open_time.to_rfc3339()),
        ("close", snapshot.close.to_string()),
        ("EMA", fmt(snapshot.trend_average)),
        ("RSI", fmt(snapshot.oscillator)),
        ("MACD", fmt(snapshot.momentum_line)),
        ("MACD signal", fmt(snapshot.momentum_signal_line)),
        ("BB upper", fmt(snapshot.band_upper)),
        ("BB lower", fmt(snapshot.band_lower)),
        ("ADX", fmt(snapshot.directional_strength)),
        ("ATR", fmt(snapshot.volatility_range)),
        ("volume", snapshot.volume.to_string()),
        ("volume SMA", fmt(snapshot.volume_baseline)),
    ];
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value]);
    }
    table
}

fn mark(vote: bool) -> String {
    if vote { "x".to_string() } else { String::new() }
}

fn handle_size(config: Config, args: SizeArgs) -> anyhow::Result<()> {
    let risk = &config.risk_management;
    let risk_pct = args
        .risk_pct
        .or(risk.risk_pct)
        .unwrap_or_else(|| risk::dynamic_risk_pct(args.balance));
    let leverage = args
        .leverage
        .or(risk.leverage)
        .unwrap_or_else(|| risk::dynamic_leverage(args.balance));
    let side = if args.stop < args.entry {
        PositionSide::Long
    } else {
        PositionSide::Short
    };

    let quantity = size_position(args.balance, risk_pct, args.entry, args.stop, leverage)?;
    let margin = margin_used(quantity, args.entry, leverage)?;
    let (_, level) = margin_check_with_ratio(
        args.balance,
        quantity,
        args.entry,
        leverage,
        risk.margin_warning_ratio,
    );

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Field", "Value"]);
    table.add_row(vec!["side".to_string(), side.to_string()]);
    table.add_row(vec!["risk %".to_string(), risk_pct.to_string()]);
    table.add_row(vec!["leverage".to_string(), format!("{leverage}x")]);
    table.add_row(vec!["quantity".to_string(), quantity.round_dp(6).to_string()]);
    table.add_row(vec!["margin used".to_string(), margin.round_dp(2).to_string()]);
    table.add_row(vec!["margin level".to_string(), format!("{level:?}")]);
    if let Some(target) = args.target {
        let ratio = reward_ratio(args.entry, args.stop, target)?;
        table.add_row(vec!["reward / risk".to_string(), ratio.round_dp(2).to_string()]);
    }
    println!("{table}");
    Ok(())
}
