// src/rl/feedback_processor.rs
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::encoding::{FollowUpAction, MessageStyle};
use super::orchestrator::{ApplicationContext, FollowUpOutcome, FollowUpRLOrchestrator};
use crate::store::SnapshotStore;

/// An outcome as recorded by the application tracker, with the action and
/// style stored by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedOutcome {
    pub application_id: String,
    pub application: ApplicationContext,
    pub action_taken: String,
    pub style_used: String,
    pub got_response: bool,
    #[serde(default)]
    pub got_interview: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackStats {
    pub processed: usize,
    pub skipped: usize,
}

impl RecordedOutcome {
    fn to_outcome(&self) -> Result<FollowUpOutcome> {
        let action: FollowUpAction = self.action_taken.parse()?;
        let style: MessageStyle = self.style_used.parse()?;
        Ok(FollowUpOutcome {
            action,
            style,
            got_response: self.got_response,
            got_interview: self.got_interview,
        })
    }
}

/// Applies a batch of recorded outcomes to both agents. Records that cannot be
/// interpreted are logged and skipped. The agents are saved once at the end if
/// anything was applied.
pub async fn process_outcomes_for_agents<S: SnapshotStore>(
    orchestrator: &FollowUpRLOrchestrator<S>,
    outcomes: &[RecordedOutcome],
) -> Result<FeedbackStats> {
    info!(
        "Starting outcome processing cycle for {} recorded outcomes",
        outcomes.len()
    );
    if outcomes.is_empty() {
        info!("No new outcomes to process.");
        return Ok(FeedbackStats::default());
    }

    let mut stats = FeedbackStats::default();
    for record in outcomes {
        let outcome = match record.to_outcome() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Skipping outcome for application {}: {:#}",
                    record.application_id, e
                );
                stats.skipped += 1;
                continue;
            }
        };

        let reward = orchestrator.record_outcome(&record.application, &outcome);
        debug!(
            "Applied outcome for application {} (reward {:.1})",
            record.application_id, reward
        );
        stats.processed += 1;
    }

    if stats.processed > 0 {
        orchestrator
            .save_models()
            .await
            .context("Failed to save agents after processing outcomes")?;
    }

    info!(
        "Outcome processing finished. Processed: {}, Skipped: {}",
        stats.processed, stats.skipped
    );
    Ok(stats)
}
