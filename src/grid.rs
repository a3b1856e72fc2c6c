use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{ConfigurationError, InvalidStateError};

pub const GOAL_REWARD: f64 = 100.0;
pub const OBSTACLE_REWARD: f64 = -50.0;
pub const STEP_REWARD: f64 = -1.0;

/// Largest number of cells a grid may have.
pub const MAX_CELLS: usize = 1 << 20;

/// Cell coordinates; `x` is the column and `y` the row.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl From<(usize, usize)> for Position {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Static layout of a grid world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub obstacles: Vec<Position>,
    pub start: Position,
    pub goal: Position,
}

impl GridSpec {
    /// Reference 5x5 layout: a wall row with a gap on the right, two pillars
    /// near the bottom, start in the top-left corner and goal bottom-right.
    pub fn reference() -> Self {
        Self {
            width: 5,
            height: 5,
            obstacles: [(1, 1), (2, 1), (3, 1), (1, 3), (3, 3)]
                .into_iter()
                .map(Position::from)
                .collect(),
            start: Position::new(0, 0),
            goal: Position::new(4, 4),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigurationError::EmptyGrid {
                width: self.width,
                height: self.height,
            });
        }
        if !self
            .width
            .checked_mul(self.height)
            .is_some_and(|cells| cells <= MAX_CELLS)
        {
            return Err(ConfigurationError::GridTooLarge {
                width: self.width,
                height: self.height,
            });
        }
        let in_bounds = |p: &Position| p.x < self.width && p.y < self.height;
        for obstacle in &self.obstacles {
            if !in_bounds(obstacle) {
                return Err(ConfigurationError::OutOfBounds {
                    role: "obstacle",
                    position: *obstacle,
                });
            }
        }
        for (role, position) in [("start", self.start), ("goal", self.goal)] {
            if !in_bounds(&position) {
                return Err(ConfigurationError::OutOfBounds { role, position });
            }
            if self.obstacles.contains(&position) {
                return Err(ConfigurationError::BlockedCell { role, position });
            }
        }
        if self.start == self.goal {
            return Err(ConfigurationError::StartIsGoal);
        }
        Ok(())
    }
}

/// Deterministic grid world. All randomness lives in the policies.
#[derive(Clone, Debug)]
pub struct GridWorld {
    spec: GridSpec,
    blocked: Vec<bool>,
}

impl GridWorld {
    pub fn new(spec: GridSpec) -> Result<Self, ConfigurationError> {
        spec.validate()?;
        let mut blocked = vec![false; spec.width * spec.height];
        for obstacle in &spec.obstacles {
            blocked[obstacle.y * spec.width + obstacle.x] = true;
        }
        Ok(Self { spec, blocked })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn width(&self) -> usize {
        self.spec.width
    }

    pub fn height(&self) -> usize {
        self.spec.height
    }

    pub fn start(&self) -> Position {
        self.spec.start
    }

    pub fn goal(&self) -> Position {
        self.spec.goal
    }

    /// Number of cells, obstacles included.
    pub fn cell_count(&self) -> usize {
        self.blocked.len()
    }

    /// Row-major table index of an in-bounds position.
    #[inline]
    pub fn index(&self, position: Position) -> usize {
        debug_assert!(self.contains(position));
        position.y * self.spec.width + position.x
    }

    pub fn position(&self, index: usize) -> Position {
        Position::new(index % self.spec.width, index / self.spec.width)
    }

    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        position.x < self.spec.width && position.y < self.spec.height
    }

    pub fn is_obstacle(&self, position: Position) -> bool {
        self.contains(position) && self.blocked[self.index(position)]
    }

    /// True for in-bounds cells the agent may occupy.
    pub fn is_open(&self, position: Position) -> bool {
        self.contains(position) && !self.blocked[self.index(position)]
    }

    /// Every open cell in row-major order.
    pub fn open_positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.cell_count())
            .map(|idx| self.position(idx))
            .filter(|p| self.is_open(*p))
    }

    /// Moves one cell, clamped to the border. Entering an obstacle leaves the
    /// agent where it was.
    pub fn step(&self, state: Position, action: Action) -> Position {
        let (dx, dy) = action.delta();
        let x = clamp_axis(state.x, dx, self.spec.width);
        let y = clamp_axis(state.y, dy, self.spec.height);
        let next = Position::new(x, y);
        if self.is_obstacle(next) { state } else { next }
    }

    pub fn reward(&self, state: Position) -> f64 {
        if state == self.spec.goal {
            GOAL_REWARD
        } else if self.is_obstacle(state) {
            OBSTACLE_REWARD
        } else {
            STEP_REWARD
        }
    }

    pub fn is_terminal(&self, state: Position) -> bool {
        state == self.spec.goal
    }

    pub fn ensure_valid(&self, state: Position) -> Result<(), InvalidStateError> {
        if !self.contains(state) {
            Err(InvalidStateError::OutOfBounds(state))
        } else if self.is_obstacle(state) {
            Err(InvalidStateError::Obstacle(state))
        } else {
            Ok(())
        }
    }
}

fn clamp_axis(value: usize, delta: isize, len: usize) -> usize {
    value.saturating_add_signed(delta).min(len - 1)
}
