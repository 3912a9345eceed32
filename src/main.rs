//! Cross-Venue Executor - Main Entry Point
//!
//! Opens a sliced, hedged position pair across two venues, monitors the
//! unwind signal, and closes both legs when it turns.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use cross_venue_executor::config::Config;
use cross_venue_executor::engine::{
    PositionExecutor, PremiumOracle, SignalOracle, SignalReading, TradeLegSpec,
};
use cross_venue_executor::gateway::{
    ExchangeGateway, MockGateway, OrderKind, OrderSide, VenueId, VenueRegistry,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Cross-Venue Executor CLI
#[derive(Parser)]
#[command(name = "cross-venue-executor")]
#[command(version, about = "Sliced cross-venue arbitrage execution with immediate hedging")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a position pair, watch the signal, and unwind when it turns
    Run(PairArgs),

    /// Unwind an existing position pair immediately
    Close(PairArgs),
}

#[derive(Args)]
struct PairArgs {
    /// Primary venue (bitget, bybit, binance, gateio, hyperliquid)
    #[arg(long, default_value = "bitget")]
    primary: String,

    /// Secondary (hedge) venue
    #[arg(long, default_value = "bybit")]
    secondary: String,

    /// Unified symbol, e.g. "DOGE/USDT:USDT"
    #[arg(long, default_value = "DOGE/USDT:USDT")]
    symbol: String,

    /// Order side on the primary venue (buy or sell)
    #[arg(long, default_value = "buy")]
    side: String,

    /// Target amount in base units
    #[arg(long, default_value = "100")]
    amount: f64,

    /// Optional target price; enables chase orders when better than best
    #[arg(long)]
    target_price: Option<f64>,

    /// Leverage on both legs
    #[arg(long, default_value = "3")]
    leverage: u8,

    /// Paper trading against simulated venues
    #[arg(long)]
    mock: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Commands::Run(args) => run_pair(&config, &args).await,
        Commands::Close(args) => close_pair(&config, &args).await,
    }
}

/// Open the pair, then poll the signal until it calls for an unwind.
async fn run_pair(config: &Config, args: &PairArgs) -> Result<()> {
    let session_start: DateTime<Utc> = Utc::now();
    let (primary, secondary) = build_gateways(config, args).await?;
    let (primary_spec, secondary_spec) = build_specs(args)?;

    let mut executor =
        PositionExecutor::new(primary.clone(), secondary.clone(), config.execution.clone());

    let report = executor.open(&primary_spec, &secondary_spec).await;
    if report.unhedged_amount > Decimal::ZERO {
        warn!(
            unhedged = %report.unhedged_amount,
            "open cycle left unhedged exposure, manual intervention required"
        );
    }
    if !report.has_filled_order {
        info!("no orders were filled, nothing to monitor");
        return Ok(());
    }

    info!(
        filled = %report.filled_amount,
        avg_price = %report.avg_entry_price,
        "position open, monitoring signal"
    );

    let oracle = PremiumOracle::new(
        primary,
        secondary,
        primary_spec.symbol.clone(),
        secondary_spec.symbol.clone(),
        config.signal.clone(),
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.signal.poll_interval()) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, leaving position in place");
                return Ok(());
            }
        }

        match oracle.evaluate().await {
            SignalReading::Hold => continue,
            SignalReading::BeginClose => {
                info!("signal calls for unwind, closing both legs");
                let close_report = executor.close(&primary_spec, &secondary_spec, &oracle).await;
                log_close(&close_report);
                info!(
                    session_start = %session_start,
                    held_secs = (Utc::now() - session_start).num_seconds(),
                    "run complete"
                );
                return Ok(());
            }
            // Only meaningful mid-unwind; keep monitoring.
            SignalReading::AbortClose => continue,
        }
    }
}

/// Unwind immediately, without waiting for a signal transition.
async fn close_pair(config: &Config, args: &PairArgs) -> Result<()> {
    let (primary, secondary) = build_gateways(config, args).await?;
    let (primary_spec, secondary_spec) = build_specs(args)?;

    let mut executor =
        PositionExecutor::new(primary.clone(), secondary.clone(), config.execution.clone());

    let oracle = AlwaysClose;
    let report = executor.close(&primary_spec, &secondary_spec, &oracle).await;
    log_close(&report);
    Ok(())
}

/// Oracle for operator-initiated closes: never holds, never aborts.
struct AlwaysClose;

#[async_trait::async_trait]
impl SignalOracle for AlwaysClose {
    async fn evaluate(&self) -> SignalReading {
        SignalReading::BeginClose
    }
}

fn log_close(report: &cross_venue_executor::engine::CloseReport) {
    if report.aborted {
        warn!("close aborted before any order went out");
    } else if report.aborted_by_signal {
        info!(
            remaining = %report.remaining_amount,
            "close halted by signal reversal"
        );
    } else if report.remaining_amount > Decimal::ZERO {
        warn!(
            remaining = %report.remaining_amount,
            force_closed = report.force_closed,
            "position not fully closed"
        );
    } else {
        info!(
            closed = %report.closed_amount,
            force_closed = report.force_closed,
            "position fully closed"
        );
    }
    if report.unhedged_amount > Decimal::ZERO {
        warn!(
            unhedged = %report.unhedged_amount,
            "close cycle left unhedged exposure, manual intervention required"
        );
    }
}

async fn build_gateways(
    config: &Config,
    args: &PairArgs,
) -> Result<(Arc<dyn ExchangeGateway>, Arc<dyn ExchangeGateway>)> {
    let primary_venue: VenueId = args.primary.parse().map_err(anyhow::Error::msg)?;
    let secondary_venue: VenueId = args.secondary.parse().map_err(anyhow::Error::msg)?;
    anyhow::ensure!(
        primary_venue != secondary_venue,
        "primary and secondary must be different venues"
    );

    if args.mock {
        info!("paper trading mode: simulated venues");
        let primary = MockGateway::with_market(primary_venue, dec!(1), dec!(1000)).await;
        primary.set_fill_after_polls(1).await;
        let secondary = MockGateway::with_market(secondary_venue, dec!(1), dec!(1000)).await;
        return Ok((Arc::new(primary), Arc::new(secondary)));
    }

    let registry = VenueRegistry::from_config(config)?;
    Ok((registry.get(primary_venue)?, registry.get(secondary_venue)?))
}

fn build_specs(args: &PairArgs) -> Result<(TradeLegSpec, TradeLegSpec)> {
    let primary_venue: VenueId = args.primary.parse().map_err(anyhow::Error::msg)?;
    let secondary_venue: VenueId = args.secondary.parse().map_err(anyhow::Error::msg)?;

    let side = match args.side.to_ascii_lowercase().as_str() {
        "buy" => OrderSide::Buy,
        "sell" => OrderSide::Sell,
        other => anyhow::bail!("invalid side: {other}"),
    };

    let amount = Decimal::try_from(args.amount).context("invalid amount")?;
    let target_price = args
        .target_price
        .map(Decimal::try_from)
        .transpose()
        .context("invalid target price")?;

    let primary_spec = TradeLegSpec {
        venue: primary_venue,
        side,
        symbol: args.symbol.clone(),
        kind: OrderKind::Limit,
        amount,
        target_price,
        leverage: args.leverage,
    };
    let secondary_spec = TradeLegSpec {
        venue: secondary_venue,
        side: side.opposite(),
        symbol: args.symbol.clone(),
        kind: OrderKind::Market,
        amount,
        target_price: None,
        leverage: args.leverage,
    };
    Ok((primary_spec, secondary_spec))
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::hourly("logs", "cross-venue-executor.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("cross_venue_executor=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}
