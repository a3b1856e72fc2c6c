use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::action::ACTION_COUNT;
use crate::error::ConfigurationError;
use crate::grid::GridSpec;

pub const DEFAULT_SEED: u64 = 0x5EED_6121_D0A1_F00D;
pub const DEFAULT_MAX_STEPS: usize = 50;

/// Learning rule driving the value updates.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Off-policy TD bootstrapping on the greedy next value.
    QLearning,
    /// On-policy TD bootstrapping on the next action actually taken.
    Sarsa,
    /// Tabular DQN: replay buffer plus a periodically synced target table.
    DqnLite,
    /// Tabular SAC: twin critics with a stochastic max-entropy policy.
    SacLite,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::QLearning,
        Algorithm::Sarsa,
        Algorithm::DqnLite,
        Algorithm::SacLite,
    ];

    /// Whether the algorithm acts through a stochastic soft policy.
    pub fn is_stochastic(self) -> bool {
        matches!(self, Algorithm::SacLite)
    }

    pub fn uses_replay(self) -> bool {
        matches!(self, Algorithm::DqnLite)
    }

    pub fn label(self) -> &'static str {
        match self {
            Algorithm::QLearning => "q-learning",
            Algorithm::Sarsa => "sarsa",
            Algorithm::DqnLite => "dqn-lite",
            Algorithm::SacLite => "sac-lite",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "q-learning" | "qlearning" | "q" => Ok(Algorithm::QLearning),
            "sarsa" => Ok(Algorithm::Sarsa),
            "dqn-lite" | "dqn" => Ok(Algorithm::DqnLite),
            "sac-lite" | "sac" => Ok(Algorithm::SacLite),
            _ => Err(format!("unrecognized algorithm: {s}")),
        }
    }
}

/// Tunable learning parameters. Fields that do not apply to the selected
/// algorithm are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// TD learning rate.
    pub alpha: f64,
    /// Discount factor.
    pub gamma: f64,
    pub epsilon_start: f64,
    /// Floor for the exploration rate.
    pub epsilon_end: f64,
    /// Per-episode multiplicative decay of epsilon.
    pub epsilon_decay: f64,
    pub buffer_capacity: usize,
    /// Replay samples drawn per step; zero disables replay.
    pub batch_size: usize,
    /// Minimum buffer length before replay begins.
    pub replay_start: usize,
    /// Global steps between target-table syncs.
    pub target_sync_interval: usize,
    pub temperature_start: f64,
    pub temperature_min: f64,
    /// Per-episode decay applied when auto tuning is off.
    pub temperature_decay: f64,
    /// Step size of automatic temperature tuning.
    pub temperature_lr: f64,
    /// Entropy (nats) the auto tuner steers towards.
    pub target_entropy: f64,
    pub auto_temperature: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
            epsilon_start: 0.3,
            epsilon_end: 0.01,
            epsilon_decay: 0.99,
            buffer_capacity: 1000,
            batch_size: 8,
            replay_start: 1,
            target_sync_interval: 20,
            temperature_start: 0.2,
            temperature_min: 0.01,
            temperature_decay: 0.99,
            temperature_lr: 0.01,
            target_entropy: 1.0,
            auto_temperature: false,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self, algorithm: Algorithm) -> Result<(), ConfigurationError> {
        check("alpha", self.alpha, |v| v > 0.0 && v <= 1.0, "in (0, 1]")?;
        check("gamma", self.gamma, unit, "in [0, 1]")?;
        match algorithm {
            Algorithm::SacLite => {
                check(
                    "temperature_start",
                    self.temperature_start,
                    positive_unit,
                    "in (0, 1]",
                )?;
                check(
                    "temperature_min",
                    self.temperature_min,
                    |v| positive_unit(v) && v <= self.temperature_start,
                    "in (0, temperature_start]",
                )?;
                check(
                    "temperature_decay",
                    self.temperature_decay,
                    positive_unit,
                    "in (0, 1]",
                )?;
                check(
                    "temperature_lr",
                    self.temperature_lr,
                    |v| v >= 0.0,
                    "non-negative",
                )?;
                let max_entropy = (ACTION_COUNT as f64).ln();
                check(
                    "target_entropy",
                    self.target_entropy,
                    |v| (0.0..=max_entropy).contains(&v),
                    "in [0, ln 4]",
                )?;
            }
            _ => {
                check("epsilon_start", self.epsilon_start, unit, "in [0, 1]")?;
                check(
                    "epsilon_end",
                    self.epsilon_end,
                    |v| unit(v) && v <= self.epsilon_start,
                    "in [0, epsilon_start]",
                )?;
                check("epsilon_decay", self.epsilon_decay, positive_unit, "in (0, 1]")?;
            }
        }
        if algorithm.uses_replay() {
            if self.buffer_capacity == 0 {
                return Err(ConfigurationError::Hyperparameter {
                    name: "buffer_capacity",
                    value: 0.0,
                    expected: "positive",
                });
            }
            if self.target_sync_interval == 0 {
                return Err(ConfigurationError::Hyperparameter {
                    name: "target_sync_interval",
                    value: 0.0,
                    expected: "positive",
                });
            }
        }
        Ok(())
    }
}

fn unit(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn positive_unit(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

fn check(
    name: &'static str,
    value: f64,
    accept: impl Fn(f64) -> bool,
    expected: &'static str,
) -> Result<(), ConfigurationError> {
    if value.is_finite() && accept(value) {
        Ok(())
    } else {
        Err(ConfigurationError::Hyperparameter {
            name,
            value,
            expected,
        })
    }
}

/// Everything required to build a training session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub grid: GridSpec,
    pub algorithm: Algorithm,
    pub hyperparameters: Hyperparameters,
    /// Steps after which an episode is cut off.
    pub max_steps: usize,
    pub seed: u64,
}

impl EngineConfig {
    pub fn new(grid: GridSpec, algorithm: Algorithm) -> Self {
        Self {
            grid,
            algorithm,
            hyperparameters: Hyperparameters::default(),
            max_steps: DEFAULT_MAX_STEPS,
            seed: DEFAULT_SEED,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.grid.validate()?;
        if self.max_steps == 0 {
            return Err(ConfigurationError::ZeroStepLimit);
        }
        self.hyperparameters.validate(self.algorithm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_for_every_algorithm() {
        for algorithm in Algorithm::ALL {
            let config = EngineConfig::new(GridSpec::reference(), algorithm);
            assert_eq!(config.validate(), Ok(()), "{algorithm}");
        }
    }

    #[test]
    fn rejects_out_of_range_epsilon() {
        let mut config = EngineConfig::new(GridSpec::reference(), Algorithm::QLearning);
        config.hyperparameters.epsilon_start = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Hyperparameter {
                name: "epsilon_start",
                ..
            })
        ));
    }

    #[test]
    fn rejects_floor_above_start() {
        let mut config = EngineConfig::new(GridSpec::reference(), Algorithm::Sarsa);
        config.hyperparameters.epsilon_end = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nan_alpha() {
        let mut config = EngineConfig::new(GridSpec::reference(), Algorithm::SacLite);
        config.hyperparameters.alpha = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Hyperparameter { name: "alpha", .. })
        ));
    }

    #[test]
    fn replay_settings_only_checked_for_dqn() {
        let mut config = EngineConfig::new(GridSpec::reference(), Algorithm::QLearning);
        config.hyperparameters.buffer_capacity = 0;
        assert!(config.validate().is_ok());
        config.algorithm = Algorithm::DqnLite;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Hyperparameter {
                name: "buffer_capacity",
                ..
            })
        ));
    }

    #[test]
    fn temperature_bounds_checked_for_sac() {
        let mut config = EngineConfig::new(GridSpec::reference(), Algorithm::SacLite);
        config.hyperparameters.temperature_start = 0.0;
        assert!(config.validate().is_err());
        config.hyperparameters.temperature_start = 0.5;
        config.hyperparameters.target_entropy = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_step_limit_rejected() {
        let mut config = EngineConfig::new(GridSpec::reference(), Algorithm::QLearning);
        config.max_steps = 0;
        assert_eq!(config.validate(), Err(ConfigurationError::ZeroStepLimit));
    }

    #[test]
    fn algorithm_parses_labels() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.label().parse::<Algorithm>(), Ok(algorithm));
        }
        assert_eq!("DQN".parse::<Algorithm>(), Ok(Algorithm::DqnLite));
        assert!("ppo".parse::<Algorithm>().is_err());
    }
}
