// src/rl/follow_up_scheduler.rs
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::encoding::{FollowUpAction, FollowUpState, StateKey};

/// One value-table row: a Q-value for every action, indexed by `FollowUpAction::index`.
/// A fixed-size array means a row can never be partially initialised.
pub type QRow = [f64; FollowUpAction::COUNT];

const EMPTY_ROW: QRow = [0.0; FollowUpAction::COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerParams {
    /// α, how far each update moves the old value towards the new target.
    pub learning_rate: f64,
    /// γ, weight of the next state's best value.
    pub discount_factor: f64,
    /// ε, probability of a random action when exploring.
    pub epsilon: f64,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.9,
            epsilon: 0.1,
        }
    }
}

impl SchedulerParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate < 1.0) {
            bail!(
                "Learning rate must be in (0, 1), got {}",
                self.learning_rate
            );
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            bail!(
                "Discount factor must be in [0, 1], got {}",
                self.discount_factor
            );
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            bail!("Epsilon must be in [0, 1], got {}", self.epsilon);
        }
        Ok(())
    }
}

/// Persisted form of the scheduler. `table` is required; every other field is
/// optional on load and overlays the running agent only when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub table: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_updates: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SchedulerSnapshot {
    pub fn from_json(value: JsonValue) -> Result<Self> {
        serde_json::from_value(value).context("Malformed scheduler snapshot")
    }

    pub fn to_json(&self) -> Result<JsonValue> {
        serde_json::to_value(self).context("Failed to serialize scheduler snapshot")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QTableSummary {
    pub total_states: usize,
    pub total_updates: u64,
    pub avg_q_value: f64,
    pub max_q_value: f64,
    pub min_q_value: f64,
}

// Lazily populated: a state gets an all-zero row the first time it is touched.
#[derive(Debug, Clone, Default)]
struct QTable {
    rows: HashMap<StateKey, QRow>,
}

impl QTable {
    fn row_mut(&mut self, key: StateKey) -> &mut QRow {
        self.rows.entry(key).or_insert(EMPTY_ROW)
    }

    fn max_value(&mut self, key: StateKey) -> f64 {
        row_max(self.row_mut(key))
    }

    fn decode(snapshot_table: &BTreeMap<String, BTreeMap<String, f64>>) -> Result<Self> {
        let mut rows = HashMap::with_capacity(snapshot_table.len());
        for (state_str, action_values) in snapshot_table {
            let key: StateKey = state_str
                .parse()
                .with_context(|| format!("Invalid state key '{}' in scheduler snapshot", state_str))?;

            let mut row = EMPTY_ROW;
            let mut seen = [false; FollowUpAction::COUNT];
            for (action_name, value) in action_values {
                let action: FollowUpAction = action_name.parse().with_context(|| {
                    format!("Invalid action in scheduler snapshot state '{}'", state_str)
                })?;
                if !value.is_finite() {
                    bail!(
                        "Non-finite Q-value {} for ({}, {}) in scheduler snapshot",
                        value,
                        state_str,
                        action_name
                    );
                }
                row[action.index()] = *value;
                seen[action.index()] = true;
            }
            if let Some(missing) = FollowUpAction::ALL.iter().find(|a| !seen[a.index()]) {
                bail!(
                    "State '{}' in scheduler snapshot has no value for action '{}'",
                    state_str,
                    missing
                );
            }
            if rows.insert(key, row).is_some() {
                bail!(
                    "State '{}' appears more than once in scheduler snapshot",
                    key
                );
            }
        }
        Ok(Self { rows })
    }

    fn encode(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        self.rows
            .iter()
            .map(|(key, row)| {
                let values = FollowUpAction::ALL
                    .iter()
                    .map(|a| (a.as_str().to_string(), row[a.index()]))
                    .collect();
                (key.to_string(), values)
            })
            .collect()
    }
}

fn row_max(row: &QRow) -> f64 {
    row.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

// Uniformly random choice among all actions holding the row maximum.
fn greedy_action(row: &QRow, rng: &mut StdRng) -> FollowUpAction {
    let max_q = row_max(row);
    let best: Vec<FollowUpAction> = FollowUpAction::ALL
        .into_iter()
        .filter(|a| row[a.index()] == max_q)
        .collect();
    if best.is_empty() {
        return FollowUpAction::ALL[0];
    }
    best[rng.gen_range(0..best.len())]
}

struct SchedulerInner {
    params: SchedulerParams,
    table: QTable,
    total_updates: u64,
    rng: StdRng,
}

/// Epsilon-greedy Q-learning agent recommending how long to wait before a follow-up.
///
/// All table access goes through one mutex, so a shared `Arc<FollowUpScheduler>`
/// can be used from concurrent request handlers without losing updates.
pub struct FollowUpScheduler {
    inner: Mutex<SchedulerInner>,
}

impl FollowUpScheduler {
    pub fn new(params: SchedulerParams) -> Result<Self> {
        Self::with_rng(params, StdRng::from_entropy())
    }

    /// Builds a scheduler around an explicit random source, e.g. a seeded one for tests.
    pub fn with_rng(params: SchedulerParams, rng: StdRng) -> Result<Self> {
        params.validate()?;
        info!(
            "FollowUpScheduler initialized: α={}, γ={}, ε={}, actions={:?}",
            params.learning_rate,
            params.discount_factor,
            params.epsilon,
            FollowUpAction::ALL.map(|a| a.as_str())
        );
        Ok(Self {
            inner: Mutex::new(SchedulerInner {
                params,
                table: QTable::default(),
                total_updates: 0,
                rng,
            }),
        })
    }

    pub fn from_snapshot(
        params: SchedulerParams,
        snapshot: &SchedulerSnapshot,
        rng: StdRng,
    ) -> Result<Self> {
        let scheduler = Self::with_rng(params, rng)?;
        scheduler.load(snapshot)?;
        Ok(scheduler)
    }

    // Every critical section finishes its mutation before releasing the guard,
    // so a poisoned lock still holds a consistent table.
    fn lock(&self) -> MutexGuard<'_, SchedulerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn params(&self) -> SchedulerParams {
        self.lock().params
    }

    pub fn total_updates(&self) -> u64 {
        self.lock().total_updates
    }

    /// Chooses a wait duration for `state`. With `explore`, a random action is
    /// returned with probability ε; otherwise a best-valued action, ties broken
    /// at random. Unseen states are initialised to all-zero values first.
    pub fn select_action(&self, state: &FollowUpState, explore: bool) -> FollowUpAction {
        let key = state.key();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let row = *inner.table.row_mut(key);

        if explore && inner.rng.gen::<f64>() < inner.params.epsilon {
            let action = FollowUpAction::ALL[inner.rng.gen_range(0..FollowUpAction::COUNT)];
            debug!("FollowUpScheduler: exploring state {} with {}", key, action);
            action
        } else {
            greedy_action(&row, &mut inner.rng)
        }
    }

    /// Pure exploitation: a best action for `state` and its value.
    pub fn best_action(&self, state: &FollowUpState) -> (FollowUpAction, f64) {
        let key = state.key();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let row = *inner.table.row_mut(key);
        let action = greedy_action(&row, &mut inner.rng);
        (action, row[action.index()])
    }

    /// Temporal-difference update:
    /// `Q(s,a) ← Q(s,a) + α·(r + γ·max Q(s',·) − Q(s,a))`, with the max term
    /// taken as 0 for a terminal transition (`next_state == None`).
    pub fn update(
        &self,
        state: &FollowUpState,
        action: FollowUpAction,
        reward: f64,
        next_state: Option<&FollowUpState>,
    ) {
        if !reward.is_finite() {
            warn!(
                "FollowUpScheduler: skipping update for {} with non-finite reward {}",
                action, reward
            );
            return;
        }

        let key = state.key();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let max_next_q = match next_state {
            Some(next) => inner.table.max_value(next.key()),
            None => 0.0,
        };
        let alpha = inner.params.learning_rate;
        let gamma = inner.params.discount_factor;

        let row = inner.table.row_mut(key);
        let current_q = row[action.index()];
        let new_q = current_q + alpha * (reward + gamma * max_next_q - current_q);
        row[action.index()] = new_q;
        inner.total_updates += 1;

        debug!(
            "FollowUpScheduler: Q({}, {}) {:.3} -> {:.3} (reward {:.1}, update #{})",
            key, action, current_q, new_q, reward, inner.total_updates
        );
    }

    /// Copy of the row for `state`, or `None` if the state was never touched.
    pub fn q_values(&self, state: &FollowUpState) -> Option<QRow> {
        self.lock().table.rows.get(&state.key()).copied()
    }

    pub fn summary(&self) -> QTableSummary {
        let inner = self.lock();
        let values: Vec<f64> = inner.table.rows.values().flatten().copied().collect();

        let (avg_q_value, max_q_value, min_q_value) = if values.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = values.iter().sum();
            (
                sum / values.len() as f64,
                values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                values.iter().copied().fold(f64::INFINITY, f64::min),
            )
        };

        QTableSummary {
            total_states: inner.table.rows.len(),
            total_updates: inner.total_updates,
            avg_q_value,
            max_q_value,
            min_q_value,
        }
    }

    /// Full snapshot of the table, hyperparameters and counter, taken under the lock.
    pub fn serialize(&self) -> SchedulerSnapshot {
        let inner = self.lock();
        SchedulerSnapshot {
            table: inner.table.encode(),
            alpha: Some(inner.params.learning_rate),
            gamma: Some(inner.params.discount_factor),
            epsilon: Some(inner.params.epsilon),
            actions: Some(
                FollowUpAction::ALL
                    .iter()
                    .map(|a| a.as_str().to_string())
                    .collect(),
            ),
            total_updates: Some(inner.total_updates),
            last_updated: Some(Utc::now()),
        }
    }

    /// Replaces the table with the snapshot's and overlays any hyperparameters
    /// it carries. The snapshot is fully validated first; on error the agent
    /// is left untouched.
    pub fn load(&self, snapshot: &SchedulerSnapshot) -> Result<()> {
        if let Some(actions) = &snapshot.actions {
            let expected: Vec<&str> = FollowUpAction::ALL.iter().map(|a| a.as_str()).collect();
            if actions.iter().map(String::as_str).ne(expected.iter().copied()) {
                bail!(
                    "Scheduler snapshot action set {:?} does not match {:?}",
                    actions,
                    expected
                );
            }
        }
        let table = QTable::decode(&snapshot.table)?;

        let mut inner = self.lock();
        let params = SchedulerParams {
            learning_rate: snapshot.alpha.unwrap_or(inner.params.learning_rate),
            discount_factor: snapshot.gamma.unwrap_or(inner.params.discount_factor),
            epsilon: snapshot.epsilon.unwrap_or(inner.params.epsilon),
        };
        params
            .validate()
            .context("Scheduler snapshot carries invalid hyperparameters")?;

        inner.params = params;
        inner.table = table;
        inner.total_updates = snapshot.total_updates.unwrap_or(0);
        info!(
            "FollowUpScheduler: loaded Q-table with {} states ({} updates)",
            inner.table.rows.len(),
            inner.total_updates
        );
        Ok(())
    }

    pub fn get_stats_display(&self) -> String {
        let summary = self.summary();
        let inner = self.lock();
        let mut output = format!(
            "Follow-Up Scheduler (Q-learning, α={}, γ={}, ε={}) Statistics:\n",
            inner.params.learning_rate, inner.params.discount_factor, inner.params.epsilon
        );
        output.push_str(&format!(
            "  States: {} | Updates: {} | Avg Q: {:.2} | Max Q: {:.2} | Min Q: {:.2}\n",
            summary.total_states,
            summary.total_updates,
            summary.avg_q_value,
            summary.max_q_value,
            summary.min_q_value
        ));
        output.push_str("\n  State                      | Best action | Q-value\n");
        output.push_str("  ---------------------------|-------------|--------\n");

        let mut states: Vec<(&StateKey, &QRow)> = inner.table.rows.iter().collect();
        states.sort_by_key(|(key, _)| **key);
        for (key, row) in states {
            let max_q = row_max(row);
            let best = FollowUpAction::ALL
                .into_iter()
                .find(|a| row[a.index()] == max_q)
                .unwrap_or(FollowUpAction::ALL[0]);
            output.push_str(&format!(
                "  {:<26} | {:<11} | {:>7.2}\n",
                key.to_string(),
                best.as_str(),
                max_q
            ));
        }
        output
    }
}
