//! Action-selection strategies and their exploration schedules.
//!
//! Two families live here:
//! - [`EpsilonGreedy`] for the value-based learners, acting greedily on a
//!   value row except for a uniform random move with probability epsilon.
//! - [`PolicyStore`] plus [`Temperature`] for the max-entropy learner, holding
//!   an explicit action distribution per state derived from the twin critics.

use log::warn;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::action::{ACTION_COUNT, Action};
use crate::config::Hyperparameters;
use crate::values::{ValueRow, greedy_action};

/// Floor applied to probabilities before taking logarithms.
pub const LOG_EPSILON: f64 = 1e-8;

/// Allowed deviation of a policy entry's total probability from one.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

const UNIFORM: [f64; ACTION_COUNT] = [1.0 / ACTION_COUNT as f64; ACTION_COUNT];

/// Epsilon-greedy selection with geometric per-episode decay.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpsilonGreedy {
    pub epsilon: f64,
    pub floor: f64,
    pub decay: f64,
}

impl EpsilonGreedy {
    pub fn from_hyperparameters(params: &Hyperparameters) -> Self {
        Self {
            epsilon: params.epsilon_start,
            floor: params.epsilon_end,
            decay: params.epsilon_decay,
        }
    }

    pub fn select<R: Rng>(&self, values: &ValueRow, rng: &mut R) -> Action {
        if rng.r#gen::<f64>() < self.epsilon {
            Action::ALL[rng.gen_range(0..ACTION_COUNT)]
        } else {
            greedy_action(values)
        }
    }

    /// `ε ← max(ε_min, ε·decay)`.
    pub fn decay(&mut self) {
        self.epsilon = (self.epsilon * self.decay).max(self.floor);
    }
}

/// Temperature of the soft policy, either decayed geometrically or tuned
/// towards a target entropy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub value: f64,
    pub floor: f64,
    pub decay: f64,
    pub learning_rate: f64,
    pub target_entropy: f64,
    pub auto: bool,
}

impl Temperature {
    pub const CEILING: f64 = 1.0;

    pub fn from_hyperparameters(params: &Hyperparameters) -> Self {
        Self {
            value: params.temperature_start,
            floor: params.temperature_min,
            decay: params.temperature_decay,
            learning_rate: params.temperature_lr,
            target_entropy: params.target_entropy,
            auto: params.auto_temperature,
        }
    }

    /// End-of-episode adjustment. `mean_entropy` is the average entropy of the
    /// policy entries refreshed during the episode, if any were.
    pub fn adjust(&mut self, mean_entropy: Option<f64>) {
        if self.auto {
            if let Some(entropy) = mean_entropy {
                let tuned = self.value + self.learning_rate * (self.target_entropy - entropy);
                self.value = tuned.clamp(self.floor, Self::CEILING);
            }
        } else {
            self.value = (self.value * self.decay).max(self.floor);
        }
    }
}

/// Current exploration schedule of the agent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Exploration {
    Epsilon(EpsilonGreedy),
    Temperature(Temperature),
}

impl Exploration {
    /// Epsilon or temperature, whichever is active.
    pub fn rate(&self) -> f64 {
        match self {
            Exploration::Epsilon(schedule) => schedule.epsilon,
            Exploration::Temperature(schedule) => schedule.value,
        }
    }

    pub fn floor(&self) -> f64 {
        match self {
            Exploration::Epsilon(schedule) => schedule.floor,
            Exploration::Temperature(schedule) => schedule.floor,
        }
    }
}

/// Action distribution of one state with its cached entropy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub probabilities: [f64; ACTION_COUNT],
    pub entropy: f64,
}

impl PolicyEntry {
    pub fn uniform() -> Self {
        Self::from_probabilities(UNIFORM)
    }

    pub fn from_probabilities(probabilities: [f64; ACTION_COUNT]) -> Self {
        Self {
            probabilities,
            entropy: entropy(&probabilities),
        }
    }

    pub fn probability(&self, action: Action) -> f64 {
        self.probabilities[action.index()]
    }

    /// Finite, non-negative and summing to one within `1e-6`.
    pub fn is_distribution(&self) -> bool {
        self.probabilities
            .iter()
            .all(|p| p.is_finite() && *p >= 0.0)
            && (self.probabilities.iter().sum::<f64>() - 1.0).abs() <= NORMALIZATION_TOLERANCE
    }

    /// Walks the cumulative distribution with one uniform draw. The last
    /// action absorbs any rounding slack.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Action {
        let draw = rng.r#gen::<f64>();
        let mut cumulative = 0.0;
        for action in Action::ALL {
            cumulative += self.probabilities[action.index()];
            if draw < cumulative {
                return action;
            }
        }
        Action::ALL[ACTION_COUNT - 1]
    }

    /// `Σ_a π(a)·(q(a) − α·ln π(a))` with the log floored.
    pub fn soft_value(&self, values: &ValueRow, temperature: f64) -> f64 {
        self.probabilities
            .iter()
            .zip(values)
            .map(|(p, q)| p * (q - temperature * p.max(LOG_EPSILON).ln()))
            .sum()
    }
}

/// `−Σ p·ln p` with the log floored.
pub fn entropy(probabilities: &[f64; ACTION_COUNT]) -> f64 {
    -probabilities
        .iter()
        .map(|p| p * p.max(LOG_EPSILON).ln())
        .sum::<f64>()
}

/// Boltzmann distribution `π(a) ∝ exp((q(a) − v) / α)`, computed with the
/// largest logit subtracted. Falls back to uniform on degenerate input.
pub fn boltzmann(values: &ValueRow, baseline: f64, temperature: f64) -> [f64; ACTION_COUNT] {
    let logits: [f64; ACTION_COUNT] = std::array::from_fn(|idx| (values[idx] - baseline) / temperature);
    let max_logit = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let weights: [f64; ACTION_COUNT] = std::array::from_fn(|idx| (logits[idx] - max_logit).exp());
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        warn!("soft policy normalizer degenerate ({total}); falling back to uniform");
        return UNIFORM;
    }
    std::array::from_fn(|idx| weights[idx] / total)
}

/// Per-state stochastic policy used by the max-entropy learner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyStore {
    entries: Vec<PolicyEntry>,
}

impl PolicyStore {
    pub fn uniform(cells: usize) -> Self {
        Self {
            entries: vec![PolicyEntry::uniform(); cells],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PolicyEntry] {
        &self.entries
    }

    #[inline]
    pub fn entry(&self, state: usize) -> &PolicyEntry {
        &self.entries[state]
    }

    /// Soft value of `state` under its current distribution.
    pub fn soft_value(&self, state: usize, values: &ValueRow, temperature: f64) -> f64 {
        self.entries[state].soft_value(values, temperature)
    }

    /// Re-derives the distribution of `state` from the critic minimum and
    /// returns the refreshed entry.
    pub fn refresh(&mut self, state: usize, values: &ValueRow, temperature: f64) -> PolicyEntry {
        let baseline = self.soft_value(state, values, temperature);
        let entry = PolicyEntry::from_probabilities(boltzmann(values, baseline, temperature));
        self.entries[state] = entry;
        entry
    }
}
