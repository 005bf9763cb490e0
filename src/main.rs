use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use core_types::{AccountSnapshot, MarketSnapshot, TradeRecord, parse_signals};
use engine::{EquityPoint, TickReport, TradingDesk};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// The main entry point for the Paper Desk application.
#[tokio::main]
async fn main() -> Result<()> {
    // A .env file is optional; it only pre-populates PAPER_DESK__* overrides and RUST_LOG.
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref())?;

    // Execute the appropriate command
    match cli.command {
        Commands::Replay(args) => handle_replay(args).await,
        Commands::CheckSignals(args) => handle_check_signals(args),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A virtual trading desk that replays LLM agent signals against simulated accounts.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Also write logs to a daily rolling file in this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted sequence of ticks against a fresh account.
    Replay(ReplayArgs),
    /// Validate agent output and show how each entry parses.
    CheckSignals(CheckSignalsArgs),
}

#[derive(Parser)]
struct ReplayArgs {
    /// Path to the TOML configuration. Defaults to ./config.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the JSON scenario file.
    #[arg(long)]
    scenario: PathBuf,

    /// Print every engine event as a JSON line.
    #[arg(long)]
    events: bool,
}

#[derive(Parser)]
struct CheckSignalsArgs {
    /// Path to a JSON file holding one signal object or an array of them.
    #[arg(long)]
    file: PathBuf,
}

/// A scripted replay: an optional funding override and the ticks to run in order.
#[derive(Debug, Deserialize)]
struct Scenario {
    initial_cash: Option<Decimal>,
    ticks: Vec<ScenarioTick>,
}

#[derive(Debug, Deserialize)]
struct ScenarioTick {
    as_of: DateTime<Utc>,
    prices: HashMap<String, Decimal>,
    /// Raw agent output for this tick, exactly as the agent would emit it.
    #[serde(default)]
    signals: Value,
}

// ==============================================================================
// Logging
// ==============================================================================

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "paper-desk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}

// ==============================================================================
// Replay Command Logic
// ==============================================================================

async fn handle_replay(args: ReplayArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => configuration::load_config_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => configuration::load_config().context("Failed to load config.toml")?,
    };
    let scenario: Scenario = {
        let text = std::fs::read_to_string(&args.scenario)
            .with_context(|| format!("Failed to read scenario {}", args.scenario.display()))?;
        serde_json::from_str(&text).context("Scenario is not valid JSON")?
    };
    if scenario.ticks.is_empty() {
        bail!("Scenario has no ticks");
    }

    let desk = TradingDesk::new(config.clone())?;
    let mut events = desk.subscribe();
    let account_id = match scenario.initial_cash {
        Some(cash) => desk.provision_with(cash, &config.account.base_currency).await?,
        None => desk.provision().await?,
    };
    tracing::info!(account = %account_id, ticks = scenario.ticks.len(), "Starting replay");

    for tick in &scenario.ticks {
        let market = tick
            .prices
            .iter()
            .fold(MarketSnapshot::new(tick.as_of), |market, (symbol, price)| {
                market.with_price(symbol, *price)
            });
        let report = match &tick.signals {
            Value::Null => desk.run_tick(account_id, &market, Vec::new()).await?,
            signals => {
                let payload = serde_json::to_string(signals)?;
                desk.run_tick_json(account_id, &market, &payload).await?
            }
        };
        print_tick(&report);

        while let Ok(event) = events.try_recv() {
            if args.events {
                println!("{}", event.to_json()?);
            }
        }
    }

    let snapshot = desk.snapshot(account_id).await?;
    let trades = desk.trades(account_id, usize::MAX).await?;
    let curve = desk.equity_curve(account_id).await?;

    println!("\nTrades");
    println!("{}", trades_table(trades.iter().rev()));
    println!("\nEquity");
    println!("{}", equity_table(&curve));
    println!("\nAccount");
    println!("{}", account_table(&snapshot));
    Ok(())
}

fn print_tick(report: &TickReport) {
    println!(
        "{}  executed={} forced={} rejected={} holds={} equity={}{}",
        report.as_of.format("%Y-%m-%d %H:%M:%S"),
        report.executed.len(),
        report.forced_exits.len(),
        report.rejected.len(),
        report.holds.len(),
        report.snapshot.equity.round_dp(2),
        if report.stale { "  (stale snapshot ignored)" } else { "" },
    );
    for rejected in &report.rejected {
        let kind = rejected
            .signal_kind
            .map_or_else(|| "unparsed".to_string(), |k| k.to_string());
        println!("    rejected {} {}: [{}] {}", kind, rejected.symbol, rejected.kind(), rejected.rejection);
    }
}

fn trades_table<'a>(trades: impl Iterator<Item = &'a TradeRecord>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Time", "Symbol", "Action", "Side", "Qty", "Price", "Lev", "Fee", "Realized PnL", "Cash",
    ]);
    for trade in trades {
        table.add_row(vec![
            trade.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            trade.symbol.clone(),
            trade.action.to_string(),
            trade.side.to_string(),
            trade.quantity.normalize().to_string(),
            trade.price.normalize().to_string(),
            trade.leverage.normalize().to_string(),
            trade.fee.round_dp(4).to_string(),
            trade
                .realized_pnl
                .map_or_else(|| "-".to_string(), |p| p.round_dp(2).to_string()),
            trade.resulting_cash.round_dp(2).to_string(),
        ]);
    }
    table
}

fn equity_table(points: &[EquityPoint]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Time", "Equity", "Cash", "Margin", "Period %"]);
    for point in points {
        table.add_row(vec![
            point.as_of.format("%Y-%m-%d %H:%M").to_string(),
            point.equity.round_dp(2).to_string(),
            point.cash.round_dp(2).to_string(),
            point.margin_in_use.round_dp(2).to_string(),
            point
                .period_return_pct
                .map_or_else(|| "-".to_string(), |p| p.round_dp(2).to_string()),
        ]);
    }
    table
}

fn account_table(snapshot: &AccountSnapshot) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Metric", "Value"]);
    let return_pct = snapshot
        .return_pct()
        .map_or_else(|| "-".to_string(), |p| format!("{}%", p.round_dp(2)));
    let rows = [
        ("Account", snapshot.account_id.to_string()),
        ("Initial cash", format!("{} {}", snapshot.initial_cash, snapshot.base_currency)),
        ("Cash available", snapshot.cash_available.round_dp(2).to_string()),
        ("Margin in use", snapshot.margin_in_use.round_dp(2).to_string()),
        ("Unrealized PnL", snapshot.unrealized_pnl().round_dp(2).to_string()),
        ("Realized PnL", snapshot.realized_pnl.round_dp(2).to_string()),
        ("Fees paid", snapshot.total_fees.round_dp(4).to_string()),
        ("Equity", snapshot.equity.round_dp(2).to_string()),
        ("Return", return_pct),
        ("Open positions", snapshot.positions.len().to_string()),
    ];
    for (metric, value) in rows {
        table.add_row(vec![metric.to_string(), value]);
    }
    for position in &snapshot.positions {
        table.add_row(vec![
            format!("  {} {}", position.side, position.symbol),
            format!(
                "{} @ {} x{} (mark {}, liq {})",
                position.quantity.normalize(),
                position.entry_price.normalize(),
                position.leverage.normalize(),
                position.mark_price.normalize(),
                position.liquidation_price.round_dp(2),
            ),
        ]);
    }
    table
}

// ==============================================================================
// Check-Signals Command Logic
// ==============================================================================

fn handle_check_signals(args: CheckSignalsArgs) -> Result<()> {
    let payload = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let parsed = parse_signals(&payload)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Result", "Signal", "Symbol", "Confidence", "Detail"]);
    let mut failures = 0;
    for (idx, entry) in parsed.iter().enumerate() {
        match entry {
            Ok(signal) => {
                let detail = signal.entry().map_or_else(String::new, |intent| {
                    format!(
                        "x{} {:?} target {} stop {}",
                        intent.leverage,
                        intent.sizing,
                        intent.exit_plan.profit_target,
                        intent.exit_plan.stop_loss
                    )
                });
                table.add_row(vec![
                    idx.to_string(),
                    "ok".to_string(),
                    signal.kind().to_string(),
                    signal.symbol().to_string(),
                    signal.confidence().to_string(),
                    detail,
                ]);
            }
            Err(err) => {
                failures += 1;
                table.add_row(vec![
                    idx.to_string(),
                    "error".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    err.to_string(),
                ]);
            }
        }
    }
    println!("{table}");
    println!("{} of {} entries valid", parsed.len() - failures, parsed.len());
    Ok(())
}
