// src/rl/style_bandit.rs
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::encoding::{ContextKey, MessageContext, MessageStyle};

/// Beta(alpha, beta) belief about an arm's response probability.
/// Starts at the uniform prior (1, 1); each outcome adds one to either side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaBelief {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BetaBelief {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

impl BetaBelief {
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        // alpha, beta >= 1 always holds, so construction cannot fail in practice
        match Beta::new(self.alpha, self.beta) {
            Ok(dist) => dist.sample(rng),
            Err(_) => self.mean(),
        }
    }

    fn is_valid(&self) -> bool {
        self.alpha.is_finite() && self.beta.is_finite() && self.alpha >= 1.0 && self.beta >= 1.0
    }
}

/// Beliefs for every arm in one context, indexed by `MessageStyle::index`.
pub type BeliefRow = [BetaBelief; MessageStyle::COUNT];

const PRIOR_ROW: BeliefRow = [BetaBelief {
    alpha: 1.0,
    beta: 1.0,
}; MessageStyle::COUNT];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditSnapshot {
    pub distributions: BTreeMap<String, BTreeMap<String, BetaBelief>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_selections: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_successes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_updates: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm_counts: Option<BTreeMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl BanditSnapshot {
    pub fn from_json(value: JsonValue) -> Result<Self> {
        serde_json::from_value(value).context("Malformed style bandit snapshot")
    }

    pub fn to_json(&self) -> Result<JsonValue> {
        serde_json::to_value(self).context("Failed to serialize style bandit snapshot")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BanditStatistics {
    pub total_contexts: usize,
    pub total_selections: u64,
    pub total_successes: u64,
    pub total_updates: u64,
    pub success_rate: f64,
    pub arm_counts: BTreeMap<MessageStyle, u64>,
}

#[derive(Debug, Clone, Default)]
struct BeliefTable {
    rows: HashMap<ContextKey, BeliefRow>,
}

impl BeliefTable {
    fn row_mut(&mut self, key: ContextKey) -> &mut BeliefRow {
        self.rows.entry(key).or_insert(PRIOR_ROW)
    }

    fn decode(distributions: &BTreeMap<String, BTreeMap<String, BetaBelief>>) -> Result<Self> {
        let mut rows = HashMap::with_capacity(distributions.len());
        for (context_str, arm_beliefs) in distributions {
            let key: ContextKey = context_str.parse().with_context(|| {
                format!("Invalid context key '{}' in style bandit snapshot", context_str)
            })?;

            let mut row = PRIOR_ROW;
            let mut seen = [false; MessageStyle::COUNT];
            for (arm_name, belief) in arm_beliefs {
                let style: MessageStyle = arm_name.parse().with_context(|| {
                    format!("Invalid arm in style bandit snapshot context '{}'", context_str)
                })?;
                if !belief.is_valid() {
                    bail!(
                        "Belief ({}, {}) for ({}, {}) is not a valid Beta(>=1, >=1)",
                        belief.alpha,
                        belief.beta,
                        context_str,
                        arm_name
                    );
                }
                row[style.index()] = *belief;
                seen[style.index()] = true;
            }
            if let Some(missing) = MessageStyle::ALL.iter().find(|s| !seen[s.index()]) {
                bail!(
                    "Context '{}' in style bandit snapshot has no belief for arm '{}'",
                    context_str,
                    missing
                );
            }
            if rows.insert(key, row).is_some() {
                bail!(
                    "Context '{}' appears more than once in style bandit snapshot",
                    key
                );
            }
        }
        Ok(Self { rows })
    }

    fn encode(&self) -> BTreeMap<String, BTreeMap<String, BetaBelief>> {
        self.rows
            .iter()
            .map(|(key, row)| {
                let beliefs = MessageStyle::ALL
                    .iter()
                    .map(|s| (s.as_str().to_string(), row[s.index()]))
                    .collect();
                (key.to_string(), beliefs)
            })
            .collect()
    }
}

fn row_means(row: &BeliefRow) -> BTreeMap<MessageStyle, f64> {
    MessageStyle::ALL
        .iter()
        .map(|s| (*s, row[s.index()].mean()))
        .collect()
}

struct BanditInner {
    table: BeliefTable,
    total_selections: u64,
    total_successes: u64,
    total_updates: u64,
    arm_counts: [u64; MessageStyle::COUNT],
    rng: StdRng,
}

/// Thompson-sampling bandit choosing a message style per contact context.
pub struct StyleBandit {
    inner: Mutex<BanditInner>,
}

impl StyleBandit {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        info!(
            "StyleBandit initialized with arms {:?}",
            MessageStyle::ALL.map(|s| s.as_str())
        );
        Self {
            inner: Mutex::new(BanditInner {
                table: BeliefTable::default(),
                total_selections: 0,
                total_successes: 0,
                total_updates: 0,
                arm_counts: [0; MessageStyle::COUNT],
                rng,
            }),
        }
    }

    pub fn from_snapshot(snapshot: &BanditSnapshot, rng: StdRng) -> Result<Self> {
        let bandit = Self::with_rng(rng);
        bandit.load(snapshot)?;
        Ok(bandit)
    }

    fn lock(&self) -> MutexGuard<'_, BanditInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Draws one sample from every arm's Beta belief and returns the arm with
    /// the largest draw. Counts as one selection whether or not an outcome is
    /// ever reported back.
    pub fn select_arm(&self, context: &MessageContext) -> MessageStyle {
        let key = context.key();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let row = *inner.table.row_mut(key);

        let mut selected = MessageStyle::ALL[0];
        let mut best_sample = f64::NEG_INFINITY;
        for style in MessageStyle::ALL {
            let sample = row[style.index()].sample(&mut inner.rng);
            if sample > best_sample {
                best_sample = sample;
                selected = style;
            }
        }

        inner.total_selections += 1;
        inner.arm_counts[selected.index()] += 1;
        debug!(
            "StyleBandit: selected '{}' for context {} (sample {:.3}, selection #{})",
            selected, key, best_sample, inner.total_selections
        );
        selected
    }

    /// Records an observed outcome: a response adds one to `alpha`, silence
    /// adds one to `beta`.
    pub fn update(&self, context: &MessageContext, arm: MessageStyle, success: bool) {
        let key = context.key();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let belief = &mut inner.table.row_mut(key)[arm.index()];
        if success {
            belief.alpha += 1.0;
        } else {
            belief.beta += 1.0;
        }
        let updated = *belief;

        if success {
            inner.total_successes += 1;
        }
        inner.total_updates += 1;
        debug!(
            "StyleBandit: context {} arm '{}' success={} -> Beta({}, {})",
            key, arm, success, updated.alpha, updated.beta
        );
    }

    /// Posterior mean per arm. An unseen context reports the prior mean of 0.5
    /// for every arm and is not added to the table.
    pub fn mean_probabilities(&self, context: &MessageContext) -> BTreeMap<MessageStyle, f64> {
        let inner = self.lock();
        match inner.table.rows.get(&context.key()) {
            Some(row) => row_means(row),
            None => row_means(&PRIOR_ROW),
        }
    }

    /// Arm with the highest posterior mean; ties go to the earlier arm in
    /// `MessageStyle::ALL`.
    pub fn best_arm(&self, context: &MessageContext) -> (MessageStyle, f64) {
        let probabilities = self.mean_probabilities(context);
        let mut best = (MessageStyle::ALL[0], f64::NEG_INFINITY);
        for style in MessageStyle::ALL {
            let p = probabilities.get(&style).copied().unwrap_or(0.5);
            if p > best.1 {
                best = (style, p);
            }
        }
        best
    }

    pub fn beliefs(&self, context: &MessageContext) -> Option<BeliefRow> {
        self.lock().table.rows.get(&context.key()).copied()
    }

    pub fn statistics(&self) -> BanditStatistics {
        let inner = self.lock();
        BanditStatistics {
            total_contexts: inner.table.rows.len(),
            total_selections: inner.total_selections,
            total_successes: inner.total_successes,
            total_updates: inner.total_updates,
            success_rate: inner.total_successes as f64 / inner.total_selections.max(1) as f64,
            arm_counts: MessageStyle::ALL
                .iter()
                .map(|s| (*s, inner.arm_counts[s.index()]))
                .collect(),
        }
    }

    pub fn serialize(&self) -> BanditSnapshot {
        let inner = self.lock();
        BanditSnapshot {
            distributions: inner.table.encode(),
            arms: Some(
                MessageStyle::ALL
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
            ),
            total_selections: Some(inner.total_selections),
            total_successes: Some(inner.total_successes),
            total_updates: Some(inner.total_updates),
            arm_counts: Some(
                MessageStyle::ALL
                    .iter()
                    .map(|s| (s.as_str().to_string(), inner.arm_counts[s.index()]))
                    .collect(),
            ),
            last_updated: Some(Utc::now()),
        }
    }

    /// Replaces beliefs and counters with the snapshot's. Validation happens
    /// before anything is swapped in.
    pub fn load(&self, snapshot: &BanditSnapshot) -> Result<()> {
        if let Some(arms) = &snapshot.arms {
            let expected: Vec<&str> = MessageStyle::ALL.iter().map(|s| s.as_str()).collect();
            if arms.iter().map(String::as_str).ne(expected.iter().copied()) {
                bail!(
                    "Style bandit snapshot arm set {:?} does not match {:?}",
                    arms,
                    expected
                );
            }
        }
        let table = BeliefTable::decode(&snapshot.distributions)?;

        let mut arm_counts = [0u64; MessageStyle::COUNT];
        if let Some(counts) = &snapshot.arm_counts {
            for (arm_name, count) in counts {
                let style: MessageStyle = arm_name
                    .parse()
                    .context("Invalid arm in style bandit snapshot arm_counts")?;
                arm_counts[style.index()] = *count;
            }
        }

        let mut inner = self.lock();
        inner.table = table;
        inner.total_selections = snapshot.total_selections.unwrap_or(0);
        inner.total_successes = snapshot.total_successes.unwrap_or(0);
        inner.total_updates = snapshot.total_updates.unwrap_or(0);
        inner.arm_counts = arm_counts;
        info!(
            "StyleBandit: loaded distributions for {} contexts ({} selections, {} successes)",
            inner.table.rows.len(),
            inner.total_selections,
            inner.total_successes
        );
        Ok(())
    }

    pub fn get_stats_display(&self) -> String {
        let stats = self.statistics();
        let inner = self.lock();
        let mut output = String::from("Message Style Bandit (Thompson sampling) Statistics:\n");
        output.push_str(&format!(
            "  Contexts: {} | Selections: {} | Outcomes: {} | Successes: {} | Success rate: {:.1}%\n",
            stats.total_contexts,
            stats.total_selections,
            stats.total_updates,
            stats.total_successes,
            stats.success_rate * 100.0
        ));
        output.push_str("  Arm selection counts:\n");
        for (style, count) in &stats.arm_counts {
            output.push_str(&format!("    {:<20} {}\n", style.as_str(), count));
        }

        let mut contexts: Vec<(&ContextKey, &BeliefRow)> = inner.table.rows.iter().collect();
        contexts.sort_by_key(|(key, _)| **key);
        for (key, row) in contexts {
            output.push_str(&format!("\n  Context: {}\n", key));
            output.push_str("    Style              | Alpha | Beta  | Mean\n");
            output.push_str("    -------------------|-------|-------|------\n");
            for style in MessageStyle::ALL {
                let belief = row[style.index()];
                output.push_str(&format!(
                    "    {:<18} | {:>5} | {:>5} | {:.3}\n",
                    style.as_str(),
                    belief.alpha,
                    belief.beta,
                    belief.mean()
                ));
            }
        }
        output
    }
}

impl Default for StyleBandit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::encoding::CompanyCulture;

    fn seeded() -> StyleBandit {
        StyleBandit::with_rng(StdRng::seed_from_u64(11))
    }

    fn recruiter_casual() -> MessageContext {
        MessageContext::new("Recruiting Manager", CompanyCulture::Casual, true)
    }

    #[test]
    fn fresh_context_reports_prior_means_without_mutation() {
        let bandit = seeded();
        let probs = bandit.mean_probabilities(&recruiter_casual());
        assert_eq!(probs.len(), MessageStyle::COUNT);
        assert!(probs.values().all(|p| *p == 0.5));
        assert_eq!(bandit.statistics().total_contexts, 0);
        assert!(bandit.beliefs(&recruiter_casual()).is_none());
    }

    #[test]
    fn success_moves_only_the_updated_arm() {
        let bandit = seeded();
        let context = recruiter_casual();
        bandit.update(&context, MessageStyle::Casual, true);

        let probs = bandit.mean_probabilities(&context);
        assert!((probs[&MessageStyle::Casual] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(probs[&MessageStyle::Formal], 0.5);
        assert_eq!(probs[&MessageStyle::ConnectionFocused], 0.5);
        assert_eq!(
            bandit.best_arm(&context),
            (MessageStyle::Casual, probs[&MessageStyle::Casual])
        );
    }

    #[test]
    fn failure_increments_beta() {
        let bandit = seeded();
        let context = recruiter_casual();
        bandit.update(&context, MessageStyle::Formal, false);
        bandit.update(&context, MessageStyle::Formal, false);

        let row = bandit.beliefs(&context).unwrap();
        assert_eq!(
            row[MessageStyle::Formal.index()],
            BetaBelief {
                alpha: 1.0,
                beta: 3.0
            }
        );
        assert_eq!(row[MessageStyle::Casual.index()], BetaBelief::default());
        let stats = bandit.statistics();
        assert_eq!(stats.total_updates, 2);
        assert_eq!(stats.total_successes, 0);
    }

    #[test]
    fn titles_in_the_same_category_share_beliefs() {
        let bandit = seeded();
        bandit.update(
            &MessageContext::new("Talent Partner", CompanyCulture::Formal, false),
            MessageStyle::Formal,
            true,
        );
        let probs = bandit.mean_probabilities(&MessageContext::new(
            "VP of Talent Acquisition",
            CompanyCulture::Formal,
            false,
        ));
        assert!((probs[&MessageStyle::Formal] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn selection_is_counted_at_selection_time() {
        let bandit = seeded();
        let context = recruiter_casual();
        let arm = bandit.select_arm(&context);
        bandit.select_arm(&context);

        let stats = bandit.statistics();
        assert_eq!(stats.total_selections, 2);
        assert_eq!(stats.total_updates, 0);
        assert_eq!(stats.arm_counts.values().sum::<u64>(), 2);
        assert!(stats.arm_counts[&arm] >= 1);
        assert_eq!(stats.total_contexts, 1);
        assert_eq!(bandit.beliefs(&context), Some(PRIOR_ROW));
    }

    #[test]
    fn sampling_concentrates_on_a_dominant_arm() {
        let bandit = seeded();
        let context = MessageContext::new("VP of Data", CompanyCulture::Formal, false);
        for _ in 0..60 {
            bandit.update(&context, MessageStyle::Formal, true);
            bandit.update(&context, MessageStyle::Casual, false);
            bandit.update(&context, MessageStyle::ConnectionFocused, false);
        }
        let formal_picks = (0..200)
            .filter(|_| bandit.select_arm(&context) == MessageStyle::Formal)
            .count();
        assert!(formal_picks > 190, "formal picked {} times", formal_picks);
    }

    #[test]
    fn success_rate_guards_against_zero_selections() {
        let bandit = seeded();
        let stats = bandit.statistics();
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.total_selections, 0);

        // outcomes without selections still divide by max(selections, 1)
        bandit.update(&recruiter_casual(), MessageStyle::Casual, true);
        assert_eq!(bandit.statistics().success_rate, 1.0);
    }

    #[test]
    fn snapshot_round_trip_preserves_beliefs_and_counters() {
        let bandit = seeded();
        let contexts = [
            recruiter_casual(),
            MessageContext::new("Director of Analytics", CompanyCulture::Mixed, true),
        ];
        for context in &contexts {
            let arm = bandit.select_arm(context);
            bandit.update(context, arm, true);
            bandit.update(context, MessageStyle::Formal, false);
        }

        let json = bandit.serialize().to_json().unwrap();
        assert_eq!(json["arms"][2], "connection_focused");
        let restored =
            StyleBandit::from_snapshot(&BanditSnapshot::from_json(json).unwrap(), StdRng::seed_from_u64(1))
                .unwrap();

        for context in &contexts {
            assert_eq!(
                restored.mean_probabilities(context),
                bandit.mean_probabilities(context)
            );
            assert_eq!(restored.best_arm(context), bandit.best_arm(context));
        }
        assert_eq!(restored.statistics(), bandit.statistics());
    }

    #[test]
    fn snapshot_without_optional_counters_loads() {
        let snapshot = BanditSnapshot::from_json(serde_json::json!({
            "distributions": {
                "manager_mixed_False": {
                    "formal": { "alpha": 3.0, "beta": 1.0 },
                    "casual": { "alpha": 1.0, "beta": 1.0 },
                    "connection_focused": { "alpha": 1.0, "beta": 2.0 }
                }
            },
            "total_selections": 4
        }))
        .unwrap();
        let bandit = StyleBandit::from_snapshot(&snapshot, StdRng::seed_from_u64(3)).unwrap();
        let context = MessageContext::new("Hiring Manager", CompanyCulture::Mixed, false);
        assert_eq!(bandit.best_arm(&context), (MessageStyle::Formal, 0.75));
        let stats = bandit.statistics();
        assert_eq!(stats.total_selections, 4);
        assert_eq!(stats.total_successes, 0);
    }

    #[test]
    fn invalid_beliefs_are_rejected() {
        let bandit = seeded();
        bandit.update(&recruiter_casual(), MessageStyle::Casual, true);

        let below_prior = BanditSnapshot::from_json(serde_json::json!({
            "distributions": {
                "manager_mixed_False": {
                    "formal": { "alpha": 0.5, "beta": 1.0 },
                    "casual": { "alpha": 1.0, "beta": 1.0 },
                    "connection_focused": { "alpha": 1.0, "beta": 1.0 }
                }
            }
        }))
        .unwrap();
        assert!(bandit.load(&below_prior).is_err());

        let mut wrong_arms = bandit.serialize();
        wrong_arms.arms = Some(vec!["formal".to_string(), "casual".to_string()]);
        assert!(bandit.load(&wrong_arms).is_err());

        assert!(BanditSnapshot::from_json(serde_json::json!({ "arms": [] })).is_err());

        // the earlier update survived every rejected load
        let probs = bandit.mean_probabilities(&recruiter_casual());
        assert!((probs[&MessageStyle::Casual] - 2.0 / 3.0).abs() < 1e-12);
    }
}
