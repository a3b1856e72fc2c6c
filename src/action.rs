use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of moves available in every cell.
pub const ACTION_COUNT: usize = 4;

/// Move the agent can request. Column order of every value table follows
/// [`Action::ALL`], which is also the greedy tie-break order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Towards row 0.
    Up,
    /// Towards the last row.
    Down,
    /// Towards column 0.
    Left,
    /// Towards the last column.
    Right,
}

impl Action {
    pub const ALL: [Action; ACTION_COUNT] = [Action::Up, Action::Down, Action::Left, Action::Right];

    /// Column of this action inside a value row.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Action::Up => 0,
            Action::Down => 1,
            Action::Left => 2,
            Action::Right => 3,
        }
    }

    #[inline]
    pub fn from_index(index: usize) -> Option<Action> {
        Self::ALL.get(index).copied()
    }

    /// Coordinate offset `(dx, dy)` of a single move.
    #[inline]
    pub fn delta(self) -> (isize, isize) {
        match self {
            Action::Up => (0, -1),
            Action::Down => (0, 1),
            Action::Left => (-1, 0),
            Action::Right => (1, 0),
        }
    }

    /// Single-character glyph used by the text renderer.
    pub fn arrow(self) -> char {
        match self {
            Action::Up => '^',
            Action::Down => 'v',
            Action::Left => '<',
            Action::Right => '>',
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::Left => "left",
            Action::Right => "right",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_in_canonical_order() {
        for (idx, action) in Action::ALL.iter().enumerate() {
            assert_eq!(action.index(), idx);
            assert_eq!(Action::from_index(idx), Some(*action));
        }
        assert_eq!(Action::from_index(ACTION_COUNT), None);
    }

    #[test]
    fn opposite_moves_cancel() {
        let (ux, uy) = Action::Up.delta();
        let (dx, dy) = Action::Down.delta();
        assert_eq!((ux + dx, uy + dy), (0, 0));
        let (lx, ly) = Action::Left.delta();
        let (rx, ry) = Action::Right.delta();
        assert_eq!((lx + rx, ly + ry), (0, 0));
    }
}
