//! Tabular grid-world reinforcement learning engine: Q-learning, SARSA and
//! tabular DQN/SAC variants behind one deterministic, seedable trainer.

pub mod action;
pub mod config;
pub mod error;
pub mod grid;
pub mod learner;
pub mod policy;
pub mod replay;
pub mod state;
pub mod trainer;
pub mod values;
pub mod visualize;

pub use crate::action::{ACTION_COUNT, Action};
pub use crate::config::{Algorithm, DEFAULT_MAX_STEPS, DEFAULT_SEED, EngineConfig, Hyperparameters};
pub use crate::error::{ConfigurationError, EngineError, InvalidStateError};
pub use crate::grid::{GridSpec, GridWorld, Position};
pub use crate::policy::{EpsilonGreedy, Exploration, PolicyEntry, PolicyStore, Temperature};
pub use crate::replay::{Experience, ReplayBuffer};
pub use crate::state::{
    Agent, Diagnostics, EpisodeOutcome, EpisodeSummary, Snapshot, StepResult, TrainerPhase,
};
pub use crate::trainer::{CancelFlag, Trainer, TrainerBuilder};
pub use crate::values::{ValueStore, ValueTable};
pub use crate::visualize::{
    VisualOptions, describe_step, describe_summary, render_grid, render_grid_with_options,
};
