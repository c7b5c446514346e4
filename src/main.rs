// src/main.rs
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use indicatif::MultiProgress;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use postapply_lib::simulation::{
    ExperimentResults, ExperimentRunner, ExperimentSummary, TrainedAgents, DEFAULT_SEED,
};
use postapply_lib::store::{AgentIdentity, SnapshotStore};
use postapply_lib::utils::env::load_env;
use postapply_lib::utils::rl_config::RLConfig;

#[derive(Parser)]
#[command(author, version, about = "Compare a random follow-up policy against the learning agents", long_about = None)]
struct SimulationArgs {
    /// Applications simulated per experiment
    #[arg(long, default_value_t = 500)]
    episodes: usize,

    /// Seed for the simulated job search and the agents
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Write the full results as JSON to this path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Save the trained agents to the configured snapshot store
    #[arg(long)]
    persist: bool,

    /// Hide progress bars
    #[arg(long)]
    quiet: bool,
}

#[derive(Serialize)]
struct SimulationReport<'a> {
    run_id: String,
    generated_at: chrono::DateTime<Utc>,
    seed: u64,
    episodes: usize,
    baseline: &'a ExperimentResults,
    rl: &'a ExperimentResults,
    summary: ExperimentSummary,
}

async fn persist_agents(rl_config: &RLConfig, agents: &TrainedAgents) -> Result<()> {
    let store = rl_config
        .build_store()
        .await
        .context("Failed to open snapshot store")?;
    info!("Persisting trained agents to {}", store.describe());

    let namespace = rl_config.agent_namespace.as_deref();
    store
        .save(
            &AgentIdentity::scheduler(namespace),
            agents.scheduler.serialize().to_json()?,
        )
        .await?;
    store
        .save(
            &AgentIdentity::style_bandit(namespace),
            agents.style_bandit.serialize().to_json()?,
        )
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = SimulationArgs::parse();

    let rl_config = RLConfig::from_env();
    rl_config.log_config();

    let run_id = Uuid::new_v4().to_string();
    let start_time = Instant::now();
    info!(
        "Starting simulation run {} ({} episodes per experiment, seed {})",
        run_id, args.episodes, args.seed
    );

    let multi_progress = if args.quiet {
        None
    } else {
        Some(MultiProgress::new())
    };

    let mut runner = ExperimentRunner::new(args.seed);
    let baseline = runner.run_baseline(args.episodes, multi_progress.as_ref());
    let (rl, agents) = runner
        .run_rl_experiment(args.episodes, multi_progress.as_ref())
        .context("RL experiment failed")?;

    let summary = ExperimentSummary::compare(&baseline, &rl);
    println!("\n{}", "=".repeat(70));
    println!("FINAL COMPARISON ({} applications each)", args.episodes);
    println!("{}", "=".repeat(70));
    println!("{}", summary.get_display());
    println!("{}", agents.scheduler.get_stats_display());
    println!("{}", agents.style_bandit.get_stats_display());

    if let Some(path) = &args.output {
        let report = SimulationReport {
            run_id: run_id.clone(),
            generated_at: Utc::now(),
            seed: args.seed,
            episodes: args.episodes,
            baseline: &baseline,
            rl: &rl,
            summary,
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to encode results")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        info!("💾 Results saved to {}", path.display());
    }

    if args.persist {
        if let Err(e) = persist_agents(&rl_config, &agents).await {
            warn!("Trained agents were not persisted: {:#}", e);
        }
    }

    info!(
        "Simulation run {} complete in {:.2?}",
        run_id,
        start_time.elapsed()
    );
    Ok(())
}
