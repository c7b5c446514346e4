// src/rl/orchestrator.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::encoding::{
    CompanyCulture, CompanyType, FollowUpAction, FollowUpState, MessageContext, MessageStyle,
};
use super::follow_up_scheduler::{FollowUpScheduler, QTableSummary, SchedulerSnapshot};
use super::style_bandit::{BanditSnapshot, BanditStatistics, StyleBandit};
use crate::store::{AgentIdentity, MalformedSnapshot, SnapshotStore};
use crate::utils::rl_config::RLConfig;

/// Contact title assumed when the application has no known contact.
pub const DEFAULT_CONTACT_TITLE: &str = "manager";

const SCHEDULER_RNG_STREAM: u64 = 0;
const STYLE_BANDIT_RNG_STREAM: u64 = 1;

/// What the orchestrator knows about one application when asking for advice.
/// Missing company details fall back to `midsize` / `mixed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationContext {
    pub days_since_applied: u32,
    #[serde(default)]
    pub company_type: Option<CompanyType>,
    #[serde(default)]
    pub company_culture: Option<CompanyCulture>,
    #[serde(default)]
    pub has_connection: bool,
    #[serde(default)]
    pub contact_title: Option<String>,
}

impl ApplicationContext {
    pub fn new(days_since_applied: u32) -> Self {
        Self {
            days_since_applied,
            company_type: None,
            company_culture: None,
            has_connection: false,
            contact_title: None,
        }
    }

    /// Whole days between `applied_at` and `now`; an application dated in the
    /// future counts as applied today.
    pub fn from_applied_date(applied_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let days = (now - applied_at).num_days().max(0);
        Self::new(u32::try_from(days).unwrap_or(u32::MAX))
    }

    pub fn with_company(mut self, company_type: CompanyType, culture: CompanyCulture) -> Self {
        self.company_type = Some(company_type);
        self.company_culture = Some(culture);
        self
    }

    pub fn with_connection(mut self, has_connection: bool) -> Self {
        self.has_connection = has_connection;
        self
    }

    pub fn with_contact_title(mut self, title: &str) -> Self {
        self.contact_title = Some(title.to_string());
        self
    }

    pub fn follow_up_state(&self) -> FollowUpState {
        FollowUpState::new(
            self.days_since_applied,
            self.company_type.unwrap_or(CompanyType::Midsize),
            self.has_connection,
        )
    }

    pub fn message_context(&self) -> MessageContext {
        MessageContext::new(
            self.contact_title.as_deref().unwrap_or(DEFAULT_CONTACT_TITLE),
            self.company_culture.unwrap_or(CompanyCulture::Mixed),
            self.has_connection,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingRecommendation {
    pub action: FollowUpAction,
    pub wait_days: u32,
    pub q_value: f64,
    /// Days since applying at the moment the follow-up would be sent.
    pub total_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleRecommendation {
    pub style: MessageStyle,
    /// Posterior mean of the chosen style.
    pub confidence: f64,
    pub all_probabilities: BTreeMap<MessageStyle, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendations {
    pub timing: TimingRecommendation,
    pub style: StyleRecommendation,
}

/// What actually happened after a follow-up was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpOutcome {
    pub action: FollowUpAction,
    pub style: MessageStyle,
    pub got_response: bool,
    pub got_interview: bool,
}

/// Scheduler reward: 50 for an interview, otherwise 20 for a response, minus
/// two points per day waited. The two bonuses never stack.
pub fn follow_up_reward(got_response: bool, got_interview: bool, wait_days: u32) -> f64 {
    let bonus = if got_interview {
        50.0
    } else if got_response {
        20.0
    } else {
        0.0
    };
    bonus - 2.0 * f64::from(wait_days)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RLStatistics {
    pub q_learning: QTableSummary,
    pub thompson_sampling: BanditStatistics,
}

/// Owns both agents and the store they are persisted to.
pub struct FollowUpRLOrchestrator<S: SnapshotStore> {
    pub scheduler: Arc<FollowUpScheduler>,
    pub style_bandit: Arc<StyleBandit>,
    store: S,
    scheduler_id: AgentIdentity,
    style_bandit_id: AgentIdentity,
    explore_on_recommend: bool,
}

impl<S: SnapshotStore> FollowUpRLOrchestrator<S> {
    /// Loads both agents from `store`. A store that cannot be read leads to a
    /// cold start; a snapshot that is present but malformed is an error.
    pub async fn new(store: S, config: &RLConfig) -> Result<Self> {
        let namespace = config.agent_namespace.as_deref();
        let scheduler_id = AgentIdentity::scheduler(namespace);
        let style_bandit_id = AgentIdentity::style_bandit(namespace);

        let (scheduler_snapshot, bandit_snapshot) =
            futures::join!(store.load(&scheduler_id), store.load(&style_bandit_id));

        let scheduler_rng = config.rng_for(SCHEDULER_RNG_STREAM);
        let scheduler = match scheduler_snapshot {
            Ok(Some(json)) => {
                let snapshot = SchedulerSnapshot::from_json(json)?;
                let scheduler =
                    FollowUpScheduler::from_snapshot(config.scheduler, &snapshot, scheduler_rng)
                        .with_context(|| format!("Unusable snapshot for '{}'", scheduler_id))?;
                info!(
                    "Loaded follow-up scheduler '{}' ({} updates)",
                    scheduler_id,
                    scheduler.total_updates()
                );
                scheduler
            }
            Ok(None) => {
                info!("No snapshot for '{}', starting a fresh scheduler", scheduler_id);
                FollowUpScheduler::with_rng(config.scheduler, scheduler_rng)?
            }
            Err(e) if e.is::<MalformedSnapshot>() => {
                return Err(e).with_context(|| format!("Unusable snapshot for '{}'", scheduler_id));
            }
            Err(e) => {
                warn!(
                    "Could not load follow-up scheduler '{}': {}. Creating new one.",
                    scheduler_id, e
                );
                FollowUpScheduler::with_rng(config.scheduler, scheduler_rng)?
            }
        };

        let bandit_rng = config.rng_for(STYLE_BANDIT_RNG_STREAM);
        let style_bandit = match bandit_snapshot {
            Ok(Some(json)) => {
                let snapshot = BanditSnapshot::from_json(json)?;
                let bandit = StyleBandit::from_snapshot(&snapshot, bandit_rng)
                    .with_context(|| format!("Unusable snapshot for '{}'", style_bandit_id))?;
                info!(
                    "Loaded style bandit '{}' ({} selections)",
                    style_bandit_id,
                    bandit.statistics().total_selections
                );
                bandit
            }
            Ok(None) => {
                info!("No snapshot for '{}', starting a fresh style bandit", style_bandit_id);
                StyleBandit::with_rng(bandit_rng)
            }
            Err(e) if e.is::<MalformedSnapshot>() => {
                return Err(e).with_context(|| format!("Unusable snapshot for '{}'", style_bandit_id));
            }
            Err(e) => {
                warn!(
                    "Could not load style bandit '{}': {}. Creating new one.",
                    style_bandit_id, e
                );
                StyleBandit::with_rng(bandit_rng)
            }
        };

        Ok(Self {
            scheduler: Arc::new(scheduler),
            style_bandit: Arc::new(style_bandit),
            store,
            scheduler_id,
            style_bandit_id,
            explore_on_recommend: config.explore_on_recommend,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn recommend_timing(&self, application: &ApplicationContext) -> TimingRecommendation {
        let state = application.follow_up_state();
        let (action, q_value) = if self.explore_on_recommend {
            let action = self.scheduler.select_action(&state, true);
            let q_value = self
                .scheduler
                .q_values(&state)
                .map(|row| row[action.index()])
                .unwrap_or(0.0);
            (action, q_value)
        } else {
            self.scheduler.best_action(&state)
        };

        let wait_days = action.wait_days();
        debug!(
            "Orchestrator: {} days since applied -> wait {} more days (Q={:.2})",
            application.days_since_applied, wait_days, q_value
        );
        TimingRecommendation {
            action,
            wait_days,
            q_value,
            total_days: application.days_since_applied.saturating_add(wait_days),
        }
    }

    pub fn recommend_style(&self, application: &ApplicationContext) -> StyleRecommendation {
        let context = application.message_context();
        let style = self.style_bandit.select_arm(&context);
        let all_probabilities = self.style_bandit.mean_probabilities(&context);
        let confidence = all_probabilities.get(&style).copied().unwrap_or(0.5);
        debug!(
            "Orchestrator: recommended style '{}' for context {} ({:.1}%)",
            style,
            context.key(),
            confidence * 100.0
        );
        StyleRecommendation {
            style,
            confidence,
            all_probabilities,
        }
    }

    pub fn get_recommendations(&self, application: &ApplicationContext) -> Recommendations {
        Recommendations {
            timing: self.recommend_timing(application),
            style: self.recommend_style(application),
        }
    }

    /// Feeds an observed outcome to both agents and returns the scheduler reward.
    /// Only the in-memory tables change; call `save_models` to persist.
    pub fn record_outcome(&self, application: &ApplicationContext, outcome: &FollowUpOutcome) -> f64 {
        let reward = follow_up_reward(
            outcome.got_response,
            outcome.got_interview,
            outcome.action.wait_days(),
        );
        self.scheduler
            .update(&application.follow_up_state(), outcome.action, reward, None);
        self.style_bandit
            .update(&application.message_context(), outcome.style, outcome.got_response);
        debug!(
            "Orchestrator: recorded outcome {:?} (reward {:.1})",
            outcome, reward
        );
        reward
    }

    pub async fn save_models(&self) -> Result<()> {
        let scheduler_json = self.scheduler.serialize().to_json()?;
        let bandit_json = self.style_bandit.serialize().to_json()?;
        futures::try_join!(
            self.store.save(&self.scheduler_id, scheduler_json),
            self.store.save(&self.style_bandit_id, bandit_json),
        )
        .context("Failed to save RL agents")?;
        info!(
            "Orchestrator: saved '{}' and '{}'",
            self.scheduler_id, self.style_bandit_id
        );
        Ok(())
    }

    pub fn get_rl_statistics(&self) -> RLStatistics {
        RLStatistics {
            q_learning: self.scheduler.summary(),
            thompson_sampling: self.style_bandit.statistics(),
        }
    }

    pub fn get_stats_display(&self) -> String {
        let mut output = self.scheduler.get_stats_display();
        output.push('\n');
        output.push_str(&self.style_bandit.get_stats_display());
        output
    }
}
