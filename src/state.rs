use serde::{Deserialize, Serialize};

use crate::action::{ACTION_COUNT, Action};
use crate::config::Algorithm;
use crate::grid::{GridSpec, Position};
use crate::policy::{Exploration, PolicyStore};
use crate::values::ValueStore;

/// The learning agent: where it stands and what it has earned this episode.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub position: Position,
    pub total_reward: f64,
}

impl Agent {
    pub fn at(start: Position) -> Self {
        Self {
            position: start,
            total_reward: 0.0,
        }
    }
}

/// How an episode ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EpisodeOutcome {
    GoalReached,
    StepLimitReached,
}

/// Lifecycle of the trainer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TrainerPhase {
    Idle,
    EpisodeRunning,
    EpisodeDone(EpisodeOutcome),
}

/// Per-episode result.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// One-based episode number within the session.
    pub episode: usize,
    pub steps: usize,
    pub total_reward: f64,
    pub reached_goal: bool,
    pub outcome: EpisodeOutcome,
    /// Largest absolute value change made by a real-time update.
    pub max_delta: f64,
    /// Epsilon or temperature in effect during the episode.
    pub exploration: f64,
}

/// Algorithm-specific details of a single step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Diagnostics {
    ValueBased {
        td_error: f64,
        /// Mean squared TD error over the real transition and any replayed ones.
        loss: f64,
        epsilon: f64,
        /// Number of replayed transitions applied this step.
        replayed: usize,
        target_synced: bool,
    },
    Stochastic {
        td_error: f64,
        entropy: f64,
        probabilities: [f64; ACTION_COUNT],
        temperature: f64,
    },
}

impl Diagnostics {
    pub fn td_error(&self) -> f64 {
        match self {
            Diagnostics::ValueBased { td_error, .. } | Diagnostics::Stochastic { td_error, .. } => {
                *td_error
            }
        }
    }

    /// Epsilon or temperature at the time of the step.
    pub fn exploration(&self) -> f64 {
        match self {
            Diagnostics::ValueBased { epsilon, .. } => *epsilon,
            Diagnostics::Stochastic { temperature, .. } => *temperature,
        }
    }
}

/// Everything a caller learns from one tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub episode: usize,
    /// One-based step number within the episode.
    pub step: usize,
    pub state: Position,
    pub action: Action,
    pub reward: f64,
    pub next_state: Position,
    pub done: bool,
    pub diagnostics: Diagnostics,
    /// Present on the step that closed the episode.
    pub summary: Option<EpisodeSummary>,
}

/// Serializable view of a training session for inspection and tests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub algorithm: Algorithm,
    pub grid: GridSpec,
    pub value_tables: ValueStore,
    pub policy_table: Option<PolicyStore>,
    pub exploration: Exploration,
    pub episode_count: usize,
    pub total_steps: u64,
    pub replay_len: usize,
    pub agent: Agent,
    pub phase: TrainerPhase,
}

impl Snapshot {
    /// Epsilon or temperature.
    pub fn epsilon_or_temperature(&self) -> f64 {
        self.exploration.rate()
    }
}
