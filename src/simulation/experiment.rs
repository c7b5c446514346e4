// src/simulation/experiment.rs
use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::{JobSearchSimulator, SimulatedApplication};
use crate::rl::encoding::{FollowUpAction, FollowUpState, MessageContext, MessageStyle};
use crate::rl::follow_up_scheduler::{FollowUpScheduler, SchedulerParams};
use crate::rl::orchestrator::follow_up_reward;
use crate::rl::style_bandit::StyleBandit;

const PROGRESS_LOG_INTERVAL: usize = 25;
const MAX_SIMULATED_DAYS_SINCE_APPLIED: u32 = 5;

/// Hyperparameters for agents trained in simulation; more exploration than
/// the production default.
pub const SIMULATION_SCHEDULER_PARAMS: SchedulerParams = SchedulerParams {
    learning_rate: 0.1,
    discount_factor: 0.9,
    epsilon: 0.15,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeRecord {
    pub app_number: usize,
    pub company: &'static str,
    pub timing: u32,
    pub style: MessageStyle,
    pub got_response: bool,
    pub got_interview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExperimentResults {
    pub episodes: Vec<EpisodeRecord>,
    pub response_rate_history: Vec<f64>,
    pub interview_rate_history: Vec<f64>,
    pub total_responses: usize,
    pub total_interviews: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub q_values_history: Vec<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ts_confidence_history: Vec<f64>,
}

impl ExperimentResults {
    fn record(&mut self, episode: EpisodeRecord) -> (f64, f64) {
        if episode.got_response {
            self.total_responses += 1;
        }
        if episode.got_interview {
            self.total_interviews += 1;
        }
        self.episodes.push(episode);

        let response_rate = self.response_rate();
        let interview_rate = self.interview_rate();
        self.response_rate_history.push(response_rate);
        self.interview_rate_history.push(interview_rate);
        (response_rate, interview_rate)
    }

    pub fn response_rate(&self) -> f64 {
        self.total_responses as f64 / self.episodes.len().max(1) as f64
    }

    pub fn interview_rate(&self) -> f64 {
        self.total_interviews as f64 / self.episodes.len().max(1) as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExperimentSummary {
    pub baseline_response_rate: f64,
    pub rl_response_rate: f64,
    pub improvement_pct: f64,
    pub baseline_interview_rate: f64,
    pub rl_interview_rate: f64,
    pub interview_improvement_pct: f64,
}

fn improvement_pct(baseline: f64, candidate: f64) -> f64 {
    (candidate - baseline) / baseline.max(0.01) * 100.0
}

impl ExperimentSummary {
    pub fn compare(baseline: &ExperimentResults, rl: &ExperimentResults) -> Self {
        let baseline_response_rate = baseline.response_rate();
        let rl_response_rate = rl.response_rate();
        let baseline_interview_rate = baseline.interview_rate();
        let rl_interview_rate = rl.interview_rate();
        Self {
            baseline_response_rate,
            rl_response_rate,
            improvement_pct: improvement_pct(baseline_response_rate, rl_response_rate),
            baseline_interview_rate,
            rl_interview_rate,
            interview_improvement_pct: improvement_pct(baseline_interview_rate, rl_interview_rate),
        }
    }

    pub fn get_display(&self) -> String {
        format!(
            "Response Rates:\n  Baseline: {:.1}%\n  RL System: {:.1}%\n  Improvement: {:+.1}%\n\n\
             Interview Rates:\n  Baseline: {:.1}%\n  RL System: {:.1}%\n  Improvement: {:+.1}%\n",
            self.baseline_response_rate * 100.0,
            self.rl_response_rate * 100.0,
            self.improvement_pct,
            self.baseline_interview_rate * 100.0,
            self.rl_interview_rate * 100.0,
            self.interview_improvement_pct
        )
    }
}

/// Agents trained by `run_rl_experiment`, ready to be persisted.
pub struct TrainedAgents {
    pub scheduler: FollowUpScheduler,
    pub style_bandit: StyleBandit,
}

/// Runs the random baseline and the learning agents against the same kind of
/// synthetic applications.
pub struct ExperimentRunner {
    simulator: JobSearchSimulator,
    policy_rng: StdRng,
    seed: u64,
}

fn episode_progress_bar(multi_progress: Option<&MultiProgress>, len: usize, label: &str) -> ProgressBar {
    let pb = match multi_progress {
        Some(mp) => mp.add(ProgressBar::new(len as u64)),
        None => ProgressBar::hidden(),
    };
    let style = ProgressStyle::default_bar()
        .template("  🎯 [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    pb.set_message(label.to_string());
    pb
}

impl ExperimentRunner {
    pub fn new(seed: u64) -> Self {
        info!("Experiment runner initialized with seed {}", seed);
        Self {
            simulator: JobSearchSimulator::new(seed),
            policy_rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
            seed,
        }
    }

    /// Random timing and random style for every application.
    pub fn run_baseline(
        &mut self,
        num_episodes: usize,
        multi_progress: Option<&MultiProgress>,
    ) -> ExperimentResults {
        info!("BASELINE EXPERIMENT (Random Policy): {} episodes", num_episodes);
        let pb = episode_progress_bar(multi_progress, num_episodes, "Baseline");
        let mut results = ExperimentResults::default();

        for i in 0..num_episodes {
            let app = self.simulator.generate_application(i + 1);
            let action = FollowUpAction::ALL[self.policy_rng.gen_range(0..FollowUpAction::COUNT)];
            let style = MessageStyle::ALL[self.policy_rng.gen_range(0..MessageStyle::COUNT)];
            let timing = action.wait_days();

            let (got_response, got_interview) = self.simulator.simulate_outcome(&app, timing, style);
            let (response_rate, interview_rate) =
                results.record(episode(&app, timing, style, got_response, got_interview, None));

            pb.inc(1);
            if (i + 1) % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    "  Episode {}: Response rate = {:.1}%, Interview rate = {:.1}%",
                    i + 1,
                    response_rate * 100.0,
                    interview_rate * 100.0
                );
            }
        }
        pb.finish_with_message("Baseline complete");

        info!(
            "BASELINE RESULTS: {}/{} responses ({:.1}%), {}/{} interviews ({:.1}%)",
            results.total_responses,
            num_episodes,
            results.response_rate() * 100.0,
            results.total_interviews,
            num_episodes,
            results.interview_rate() * 100.0
        );
        results
    }

    /// ε-greedy scheduler picks the timing, Thompson sampling picks the style,
    /// and both learn from every simulated outcome.
    pub fn run_rl_experiment(
        &mut self,
        num_episodes: usize,
        multi_progress: Option<&MultiProgress>,
    ) -> Result<(ExperimentResults, TrainedAgents)> {
        info!(
            "RL EXPERIMENT (Q-Learning + Thompson Sampling): {} episodes",
            num_episodes
        );
        let scheduler = FollowUpScheduler::with_rng(
            SIMULATION_SCHEDULER_PARAMS,
            StdRng::seed_from_u64(self.seed.wrapping_add(2)),
        )?;
        let style_bandit = StyleBandit::with_rng(StdRng::seed_from_u64(self.seed.wrapping_add(3)));

        let pb = episode_progress_bar(multi_progress, num_episodes, "RL agents");
        let mut results = ExperimentResults::default();

        for i in 0..num_episodes {
            let app = self.simulator.generate_application(i + 1);
            let days_since = self.policy_rng.gen_range(0..=MAX_SIMULATED_DAYS_SINCE_APPLIED);
            let state = FollowUpState::new(days_since, app.company_type, app.has_connection);
            let context = MessageContext::new(app.contact_title, app.company_culture, app.has_connection);

            let action = scheduler.select_action(&state, true);
            let style = style_bandit.select_arm(&context);
            let timing = action.wait_days();

            let (got_response, got_interview) = self.simulator.simulate_outcome(&app, timing, style);
            let reward = follow_up_reward(got_response, got_interview, timing);
            scheduler.update(&state, action, reward, None);
            style_bandit.update(&context, style, got_response);

            let (response_rate, interview_rate) = results.record(episode(
                &app,
                timing,
                style,
                got_response,
                got_interview,
                Some(reward),
            ));
            let avg_q = scheduler.summary().avg_q_value;
            results.q_values_history.push(avg_q);
            results
                .ts_confidence_history
                .push(style_bandit.statistics().success_rate);

            pb.inc(1);
            if (i + 1) % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    "  Episode {}: Response rate = {:.1}%, Interview rate = {:.1}%, Avg Q = {:.2}",
                    i + 1,
                    response_rate * 100.0,
                    interview_rate * 100.0,
                    avg_q
                );
            }
        }
        pb.finish_with_message("RL experiment complete");

        info!(
            "RL RESULTS: {}/{} responses ({:.1}%), {}/{} interviews ({:.1}%), final avg Q {:.2}",
            results.total_responses,
            num_episodes,
            results.response_rate() * 100.0,
            results.total_interviews,
            num_episodes,
            results.interview_rate() * 100.0,
            results.q_values_history.last().copied().unwrap_or(0.0)
        );
        Ok((
            results,
            TrainedAgents {
                scheduler,
                style_bandit,
            },
        ))
    }
}

fn episode(
    app: &SimulatedApplication,
    timing: u32,
    style: MessageStyle,
    got_response: bool,
    got_interview: bool,
    reward: Option<f64>,
) -> EpisodeRecord {
    EpisodeRecord {
        app_number: app.app_number,
        company: app.company,
        timing,
        style,
        got_response,
        got_interview,
        reward,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rl_experiment_trains_both_agents() {
        let mut runner = ExperimentRunner::new(42);
        let (results, agents) = runner.run_rl_experiment(120, None).unwrap();

        assert_eq!(results.episodes.len(), 120);
        assert_eq!(results.response_rate_history.len(), 120);
        assert_eq!(results.q_values_history.len(), 120);
        assert_eq!(results.ts_confidence_history.len(), 120);
        assert!(results.total_interviews <= results.total_responses);
        assert!(results.episodes.iter().all(|e| e.reward.is_some()));

        assert_eq!(agents.scheduler.total_updates(), 120);
        let stats = agents.style_bandit.statistics();
        assert_eq!(stats.total_selections, 120);
        assert_eq!(stats.total_updates, 120);
        assert_eq!(stats.total_successes as usize, results.total_responses);
    }

    #[test]
    fn runs_are_reproducible_for_a_seed() {
        let (a, _) = ExperimentRunner::new(9).run_rl_experiment(60, None).unwrap();
        let (b, _) = ExperimentRunner::new(9).run_rl_experiment(60, None).unwrap();
        assert_eq!(a.episodes, b.episodes);
        assert_eq!(a.response_rate_history, b.response_rate_history);
        for (qa, qb) in a.q_values_history.iter().zip(&b.q_values_history) {
            assert!((qa - qb).abs() < 1e-9);
        }
    }

    #[test]
    fn baseline_uses_the_action_set() {
        let mut runner = ExperimentRunner::new(1);
        let results = runner.run_baseline(80, None);
        assert!(results.q_values_history.is_empty());
        assert!(results
            .episodes
            .iter()
            .all(|e| FollowUpAction::from_wait_days(e.timing).is_some() && e.reward.is_none()));
        let last = *results.response_rate_history.last().unwrap();
        assert!((last - results.response_rate()).abs() < 1e-12);
    }

    #[test]
    fn comparison_guards_an_empty_baseline() {
        let empty = ExperimentResults::default();
        let mut rl = ExperimentResults::default();
        rl.record(EpisodeRecord {
            app_number: 1,
            company: "Stripe",
            timing: 3,
            style: MessageStyle::Casual,
            got_response: true,
            got_interview: false,
            reward: Some(14.0),
        });
        let summary = ExperimentSummary::compare(&empty, &rl);
        assert_eq!(summary.baseline_response_rate, 0.0);
        assert_eq!(summary.rl_response_rate, 1.0);
        assert!((summary.improvement_pct - 10_000.0).abs() < 1e-6);
        assert!(summary.get_display().contains("Improvement"));
    }
}
