//! Replay binary: wire the CSV inputs into the scheduler and write one
//! run directory of outputs.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sim_engine::config::{self, LatencyConfig, MakerParams, RiskLimits, SimConfig};
use sim_engine::ingest::{load_book_deltas, load_trade_prints};
use sim_engine::policy::{Policy, ThresholdPolicy};
use sim_engine::recorder::Recorder;
use sim_engine::Scheduler;

#[derive(Debug, Parser)]
#[command(name = "replay", about = "Deterministic tick-level execution simulator")]
struct Args {
    /// Recorded book-delta CSV (or legacy top-of-book snapshot CSV).
    replay_csv: PathBuf,

    /// Time-sorted trade prints CSV.
    #[arg(long)]
    trades: Option<PathBuf>,

    /// Venue rules file (indented key-value format).
    #[arg(long)]
    venue_rules: PathBuf,

    #[arg(long, default_value = "bybit")]
    venue: String,

    #[arg(long, default_value = "BTCUSDT")]
    symbol: String,

    /// Latency fit file (base_ms/jitter_ms/tail_ms/tail_prob).
    #[arg(long)]
    latency_fit: Option<PathBuf>,

    /// Base directory for run outputs.
    #[arg(long, default_value = "runs")]
    out_dir: PathBuf,

    /// Override the generated run id (useful for reproducibility checks).
    #[arg(long)]
    run_id: Option<String>,

    /// Write a bookcheck line every N applied deltas (0 disables).
    #[arg(long, default_value_t = 0)]
    bookcheck_every: u64,

    /// Warn instead of failing on unresolved adverse-selection samples.
    #[arg(long)]
    lenient_shutdown: bool,

    /// Order TTL in ms (0 disables expiry).
    #[arg(long, default_value_t = 200)]
    order_ttl_ms: i64,

    /// Adverse-selection measurement horizon in ms.
    #[arg(long, default_value_t = 500)]
    adv_horizon_ms: i64,

    #[arg(long, default_value_t = 0.8)]
    maker_q_init: f64,

    #[arg(long, default_value_t = 0.6)]
    maker_alpha: f64,

    #[arg(long, default_value_t = 200)]
    maker_expire_ms: i64,

    #[arg(long, default_value_t = 2.0)]
    maker_adv_ticks: f64,

    #[arg(long, default_value_t = 5.0)]
    max_position: f64,

    #[arg(long, default_value_t = 250_000.0)]
    max_notional: f64,

    /// Policy trigger threshold on trend strength.
    #[arg(long, default_value_t = 0.01)]
    policy_threshold: f64,

    #[arg(long, default_value_t = 1.0)]
    policy_size: f64,

    /// Rest policy orders at the same-side top instead of crossing.
    #[arg(long)]
    policy_post_maker: bool,
}

fn run(args: Args) -> Result<()> {
    let rules = config::load_venue_rules(&args.venue_rules, &args.venue, &args.symbol)?;
    let latency = match &args.latency_fit {
        Some(path) => config::load_latency_fit(path)?,
        None => {
            warn!("no latency fit supplied; using the stock profile");
            LatencyConfig {
                base_ms: 8.0,
                jitter_ms: 4.0,
                tail_ms: 12.0,
                tail_prob: 0.02,
            }
        }
    };

    let deltas = load_book_deltas(&args.replay_csv)?;
    let trades = match &args.trades {
        Some(path) => load_trade_prints(path)?,
        None => Vec::new(),
    };

    let cfg = SimConfig {
        symbol: args.symbol.clone(),
        rules,
        latency,
        maker: MakerParams {
            q_init: args.maker_q_init,
            alpha: args.maker_alpha,
            expire_ms: args.maker_expire_ms,
            adv_ticks: args.maker_adv_ticks,
        },
        risk: RiskLimits {
            max_position: args.max_position,
            max_notional: args.max_notional,
        },
        order_ttl_ms: args.order_ttl_ms,
        adv_horizon_ms: args.adv_horizon_ms,
        strict_shutdown: !args.lenient_shutdown,
        bookcheck_every: args.bookcheck_every,
    };

    let recorder = Recorder::create(&args.out_dir, args.run_id.clone(), args.bookcheck_every > 0)?;
    let run_dir = recorder.run_dir().to_path_buf();
    let policy: Box<dyn Policy> = Box::new(ThresholdPolicy {
        threshold: args.policy_threshold,
        order_size: args.policy_size,
        post_maker: args.policy_post_maker,
    });

    let scheduler = Scheduler::new(cfg, deltas, trades, policy, recorder);
    let summary = scheduler.run().context("simulation run failed")?;

    info!(
        run_dir = %run_dir.display(),
        net_total = summary.net_total,
        fills = summary.fills,
        rejects = summary.rejects,
        fill_rate = summary.fill_rate,
        maker_fill_rate = summary.maker_fill_rate,
        "replay finished"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replay=info,sim_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "run failed");
            ExitCode::FAILURE
        }
    }
}
