//! Funding Lender - Main Entry Point
//!
//! One invocation is one placement run: cancel, re-read the balance,
//! re-anchor, deploy. Scheduling repeated runs is left to cron or a systemd
//! timer, which also guarantees at most one run at a time.

use anyhow::Result;
use clap::{Parser, Subcommand};
use funding_lender::config::Config;
use funding_lender::exchange::{BitfinexClient, MarketContext};
use funding_lender::strategy::{
    resolve_anchor, run_once, LadderPlanner, MarketSnapshot, OfferIntent, RunOutcome,
};
use funding_lender::utils::decimal::{apy_display, daily_to_apy};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Funding Lender CLI
#[derive(Parser)]
#[command(name = "funding-lender")]
#[command(version, about = "Automated funding-offer placement on Bitfinex margin funding")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the offer ladder for a hypothetical balance using live public
    /// market data, submitting nothing
    Plan {
        /// Balance to plan for, in wallet base units
        #[arg(short, long)]
        balance: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Some(Commands::Plan { balance }) => run_plan(&config, balance).await,
        None => run_live(&config).await,
    }
}

async fn run_live(config: &Config) -> Result<()> {
    info!("---- Bitfinex funding lender ----");

    anyhow::ensure!(
        !config.bitfinex.api_key.is_empty() && !config.bitfinex.api_secret.is_empty(),
        "missing API credentials: set BFX_KEY and BFX_SEC"
    );

    let client = BitfinexClient::new(&config.bitfinex)?;

    match run_once(&client, config).await? {
        RunOutcome::NothingToDeploy { free_balance } => {
            info!(balance = %free_balance, "Nothing to lend (below minimum offer)");
        }
        RunOutcome::Completed(report) => {
            let deployed: Decimal = report.submitted.iter().map(|i| i.amount).sum();
            info!(
                asset = %report.context.asset_code,
                anchor = %report.anchor,
                anchor_apy = %apy_display(daily_to_apy(report.anchor)),
                offers = report.submitted.len(),
                deployed = %deployed,
                leftover = %report.leftover,
                "Run summary"
            );
        }
    }

    info!("Run complete");
    Ok(())
}

/// Dry planning pass: live public market data, no credentials, no orders.
async fn run_plan(config: &Config, balance: Decimal) -> Result<()> {
    info!(%balance, "Planning offer ladder (no orders will be placed)");

    let client = BitfinexClient::new(&config.bitfinex)?;
    let ctx = MarketContext::for_asset("USDT");

    let snapshot = MarketSnapshot::gather(&client, &ctx.public_symbol).await;
    let anchor = resolve_anchor(config.ladder.anchor_strategy, &snapshot)?;
    info!(
        %anchor,
        apy = %apy_display(daily_to_apy(anchor)),
        strategy = ?config.ladder.anchor_strategy,
        "Resolved anchor rate"
    );

    let planner = LadderPlanner::new(
        config.offer.clone(),
        config.ladder.clone(),
        config.maker.clone(),
    );

    if balance < config.offer.min_offer {
        warn!(
            %balance,
            min_offer = %config.offer.min_offer,
            "Balance below minimum offer, nothing would deploy"
        );
        return Ok(());
    }

    let primary = planner.plan_primary(balance, anchor);
    log_planned(&primary.intents, "ladder");

    let maker = planner.plan_maker(primary.leftover, snapshot.best_bid, anchor);
    log_planned(&maker.intents, "maker");

    if let Some(sweep) = planner.plan_sweep(maker.leftover) {
        log_planned(std::slice::from_ref(&sweep), "sweep");
    }

    Ok(())
}

fn log_planned(intents: &[OfferIntent], phase: &str) {
    for (i, intent) in intents.iter().enumerate() {
        info!(
            phase,
            chunk = i + 1,
            amount = %intent.amount,
            rate = %intent.rate,
            apy = %apy_display(daily_to_apy(intent.rate)),
            kind = intent.kind.as_wire(),
            "Planned offer"
        );
    }
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::hourly("logs", "funding-lender.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("funding_lender=debug".parse()?)
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
