//! Keeper - harvest and fee-conversion planner
//!
//! Reads the vault protocol's on-chain state fresh each pass, decides
//! between a harvest batch and a fee-conversion batch, and prints the
//! resulting call plan. Submission is the external executor's job; this
//! binary only plans.

use chrono::Utc;
use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod chain;
mod config;
mod planner;
mod rewards;
mod swap;

use chain::ChainReader;
use config::{Config, PlanLog};
use planner::Plan;

#[derive(Parser, Debug)]
#[command(name = "keeper", about = "Harvest and fee-conversion planner for a yield vault protocol")]
struct Cli {
    /// Load configuration from a TOML file instead of the environment
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep running, one decision pass per scan interval
    #[arg(long)]
    watch: bool,

    /// Print the decision as JSON instead of the styled report
    #[arg(long)]
    json: bool,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🌾 KEEPER - Harvest & Fee Conversion Planner").cyan().bold()
    );
    println!(
        "{}",
        style("    Batched Reads | Aggregator Fallback | Plan-Only Output").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn print_plan(plan: &Plan) {
    match plan {
        Plan::Execute { calls } => {
            println!("{} Executable batch ({} calls):", style("✓").green(), calls.len());
            for (i, call) in calls.iter().enumerate() {
                let preview_len = call.payload.len().min(8);
                println!(
                    "  {}. {} | to {} | 0x{}…",
                    i + 1,
                    style(&call.label).cyan(),
                    call.target,
                    hex::encode(&call.payload[..preview_len])
                );
            }
        }
        Plan::Skip { reason } => {
            println!("{} Nothing to execute: {}", style("○").yellow(), reason);
        }
    }
}

async fn tick(reader: &ChainReader, cfg: &Config, json: bool) -> Result<()> {
    let plan = planner::run_once(reader, cfg).await?;

    let ops = plan.ops();
    if !ops.is_empty() {
        info!("Ops: {}", ops.join(", "));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }

    if cfg.plan_log {
        let log = PlanLog {
            timestamp: Utc::now(),
            chain_id: cfg.chain_id,
            executable: plan.is_executable(),
            ops,
            reason: match &plan {
                Plan::Skip { reason } => Some(reason.clone()),
                Plan::Execute { .. } => None,
            },
        };
        if let Err(e) = log.append_to_file(&cfg.plan_log_path) {
            warn!("Failed to append plan log: {e}");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("keeper=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if !cli.json {
        print_banner();
    }

    let cfg = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Err(e) = cfg.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your environment or config file");
        return Err(e);
    }

    if !cli.json {
        cfg.print_summary();
        println!();
    }

    let reader = ChainReader::new(cfg.rpc_url.clone());

    loop {
        match tick(&reader, &cfg, cli.json).await {
            Ok(()) => {}
            // In watch mode a failed pass is retried on the next tick; the
            // next invocation re-reads everything, so nothing is lost.
            Err(e) if cli.watch => error!("Decision pass failed: {e:#}"),
            Err(e) => return Err(e),
        }

        if !cli.watch {
            break;
        }
        info!("Sleeping {}s until the next pass", cfg.scan_interval_secs);
        tokio::time::sleep(Duration::from_secs(cfg.scan_interval_secs)).await;
    }

    Ok(())
}
