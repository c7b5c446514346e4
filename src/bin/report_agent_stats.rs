// src/bin/report_agent_stats.rs
use anyhow::{Context, Result};
use log::info;

use postapply_lib::rl::FollowUpRLOrchestrator;
use postapply_lib::store::{AgentIdentity, SnapshotBackend};
use postapply_lib::utils::env::load_env;
use postapply_lib::utils::rl_config::RLConfig;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();

    let rl_config = RLConfig::from_env();
    rl_config.log_config();

    let store = rl_config
        .build_store()
        .await
        .context("Failed to open snapshot store")?;
    info!("Reading agent snapshots from {}", store.describe());

    if let SnapshotBackend::Postgres(pg_store) = &store {
        let namespace = rl_config.agent_namespace.as_deref();
        for identity in [
            AgentIdentity::scheduler(namespace),
            AgentIdentity::style_bandit(namespace),
        ] {
            match pg_store.record_info(&identity).await? {
                Some(record) => println!(
                    "{}: version {} (last updated {})",
                    record.agent_type, record.version, record.last_updated
                ),
                None => println!("{}: no snapshot stored", identity),
            }
        }
        println!();
    }

    let orchestrator = FollowUpRLOrchestrator::new(store, &rl_config)
        .await
        .context("Failed to load RL agents")?;

    println!("{}", orchestrator.get_stats_display());

    let stats = orchestrator.get_rl_statistics();
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("Failed to encode statistics")?
    );
    Ok(())
}
