use thiserror::Error;

use crate::grid::Position;

/// Errors that can occur while configuring or driving the training engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("invalid state: {0}")]
    InvalidState(#[from] InvalidStateError),
    #[error("store does not match the configured session: {0}")]
    ShapeMismatch(&'static str),
    #[error("policy entry for state {state} is not a probability distribution")]
    InvalidPolicy { state: usize },
}

/// Details of a rejected configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("grid dimensions must be positive, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },
    #[error("grid {width}x{height} exceeds the limit of {} cells", crate::grid::MAX_CELLS)]
    GridTooLarge { width: usize, height: usize },
    #[error("{role} cell {position} lies outside the grid")]
    OutOfBounds {
        role: &'static str,
        position: Position,
    },
    #[error("{role} cell {position} coincides with an obstacle")]
    BlockedCell {
        role: &'static str,
        position: Position,
    },
    #[error("start cell must differ from the goal cell")]
    StartIsGoal,
    #[error("hyperparameter {name} = {value} must be {expected}")]
    Hyperparameter {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("step limit must be positive")]
    ZeroStepLimit,
}

/// Raised when a computed position escapes the grid or lands on an obstacle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidStateError {
    #[error("position {0} is outside the grid")]
    OutOfBounds(Position),
    #[error("position {0} is an obstacle")]
    Obstacle(Position),
}
