use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::action::{ACTION_COUNT, Action};
use crate::config::Algorithm;

/// Half-width of the uniform range used to initialize twin critics.
pub const CRITIC_INIT_SCALE: f64 = 0.1;

/// One row of action values for a single state.
pub type ValueRow = [f64; ACTION_COUNT];

/// Dense per-state-action scalar table indexed by row-major cell index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueTable {
    rows: Vec<ValueRow>,
}

impl ValueTable {
    pub fn zeros(cells: usize) -> Self {
        Self {
            rows: vec![[0.0; ACTION_COUNT]; cells],
        }
    }

    /// Uniform random values in `[-scale, scale)`.
    pub fn random<R: Rng>(cells: usize, scale: f64, rng: &mut R) -> Self {
        let rows = (0..cells)
            .map(|_| std::array::from_fn(|_| rng.gen_range(-scale..scale)))
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ValueRow] {
        &self.rows
    }

    #[inline]
    pub fn row(&self, state: usize) -> &ValueRow {
        &self.rows[state]
    }

    #[inline]
    pub fn get(&self, state: usize, action: Action) -> f64 {
        self.rows[state][action.index()]
    }

    pub fn set(&mut self, state: usize, action: Action, value: f64) {
        self.rows[state][action.index()] = value;
    }

    pub fn max_value(&self, state: usize) -> f64 {
        row_max(&self.rows[state])
    }

    /// `Q ← Q + lr·(target − Q)`. Returns the applied change.
    pub fn td_update(&mut self, state: usize, action: Action, target: f64, lr: f64) -> f64 {
        let entry = &mut self.rows[state][action.index()];
        let delta = lr * (target - *entry);
        *entry += delta;
        delta
    }

    pub fn copy_from(&mut self, other: &ValueTable) {
        self.rows.clone_from(&other.rows);
    }
}

pub fn row_max(row: &ValueRow) -> f64 {
    row.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// First action holding the maximal value, scanning in canonical order.
pub fn greedy_action(row: &ValueRow) -> Action {
    let mut best = 0;
    for idx in 1..ACTION_COUNT {
        if row[idx] > row[best] {
            best = idx;
        }
    }
    Action::ALL[best]
}

/// Value tables in the layout required by the active algorithm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValueStore {
    Single(ValueTable),
    Twin { q1: ValueTable, q2: ValueTable },
    TargetAugmented { live: ValueTable, target: ValueTable },
}

impl ValueStore {
    /// Builds the store for `algorithm`. Twin critics draw their initial
    /// values from `rng`; every other table starts at zero.
    pub fn for_algorithm<R: Rng>(algorithm: Algorithm, cells: usize, rng: &mut R) -> Self {
        match algorithm {
            Algorithm::QLearning | Algorithm::Sarsa => ValueStore::Single(ValueTable::zeros(cells)),
            Algorithm::DqnLite => ValueStore::TargetAugmented {
                live: ValueTable::zeros(cells),
                target: ValueTable::zeros(cells),
            },
            Algorithm::SacLite => {
                let q1 = ValueTable::random(cells, CRITIC_INIT_SCALE, rng);
                let q2 = ValueTable::random(cells, CRITIC_INIT_SCALE, rng);
                ValueStore::Twin { q1, q2 }
            }
        }
    }

    /// Whether this layout is the one `algorithm` expects.
    pub fn matches(&self, algorithm: Algorithm) -> bool {
        matches!(
            (self, algorithm),
            (ValueStore::Single(_), Algorithm::QLearning | Algorithm::Sarsa)
                | (ValueStore::TargetAugmented { .. }, Algorithm::DqnLite)
                | (ValueStore::Twin { .. }, Algorithm::SacLite)
        )
    }

    pub fn cells(&self) -> usize {
        self.primary().len()
    }

    /// Live table (or Q1 for twin critics).
    pub fn primary(&self) -> &ValueTable {
        match self {
            ValueStore::Single(table) => table,
            ValueStore::Twin { q1, .. } => q1,
            ValueStore::TargetAugmented { live, .. } => live,
        }
    }

    pub fn primary_mut(&mut self) -> &mut ValueTable {
        match self {
            ValueStore::Single(table) => table,
            ValueStore::Twin { q1, .. } => q1,
            ValueStore::TargetAugmented { live, .. } => live,
        }
    }

    /// Values consulted when choosing an action: the live row, or the
    /// element-wise minimum of both critics.
    pub fn decision_values(&self, state: usize) -> ValueRow {
        match self {
            ValueStore::Single(table) | ValueStore::TargetAugmented { live: table, .. } => {
                *table.row(state)
            }
            ValueStore::Twin { q1, q2 } => {
                let (a, b) = (q1.row(state), q2.row(state));
                std::array::from_fn(|idx| a[idx].min(b[idx]))
            }
        }
    }

    /// Copies the live table into the frozen target. No-op for other layouts.
    pub fn sync_target(&mut self) -> bool {
        match self {
            ValueStore::TargetAugmented { live, target } => {
                target.copy_from(live);
                true
            }
            _ => false,
        }
    }

    /// All tables, labelled, for inspection.
    pub fn labelled_tables(&self) -> Vec<(&'static str, &ValueTable)> {
        match self {
            ValueStore::Single(table) => vec![("q", table)],
            ValueStore::Twin { q1, q2 } => vec![("q1", q1), ("q2", q2)],
            ValueStore::TargetAugmented { live, target } => {
                vec![("live", live), ("target", target)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn td_update_moves_towards_target() {
        let mut table = ValueTable::zeros(4);
        let delta = table.td_update(2, Action::Left, 10.0, 0.1);
        assert!((delta - 1.0).abs() < 1e-12);
        assert!((table.get(2, Action::Left) - 1.0).abs() < 1e-12);
        let delta = table.td_update(2, Action::Left, 10.0, 0.5);
        assert!((delta - 4.5).abs() < 1e-12);
        assert_eq!(table.get(2, Action::Right), 0.0);
    }

    #[test]
    fn greedy_breaks_ties_in_canonical_order() {
        assert_eq!(greedy_action(&[0.0, 0.0, 0.0, 0.0]), Action::Up);
        assert_eq!(greedy_action(&[-1.0, 2.0, 2.0, 1.0]), Action::Down);
        assert_eq!(greedy_action(&[-1.0, -2.0, 0.5, 0.5]), Action::Left);
        assert_eq!(greedy_action(&[-1.0, -2.0, -3.0, 0.0]), Action::Right);
    }

    #[test]
    fn twin_decision_values_take_minimum() {
        let mut rng = StdRng::seed_from_u64(7);
        let store = ValueStore::for_algorithm(Algorithm::SacLite, 3, &mut rng);
        let ValueStore::Twin { q1, q2 } = &store else {
            panic!("expected twin critics");
        };
        assert_ne!(q1, q2);
        for state in 0..3 {
            let decision = store.decision_values(state);
            for idx in 0..ACTION_COUNT {
                assert_eq!(decision[idx], q1.row(state)[idx].min(q2.row(state)[idx]));
                assert!(q1.row(state)[idx].abs() <= CRITIC_INIT_SCALE);
            }
        }
    }

    #[test]
    fn sync_target_copies_live_table() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut store = ValueStore::for_algorithm(Algorithm::DqnLite, 2, &mut rng);
        store.primary_mut().set(1, Action::Down, 3.5);
        let ValueStore::TargetAugmented { target, .. } = &store else {
            panic!("expected target-augmented store");
        };
        assert_eq!(target.get(1, Action::Down), 0.0);
        assert!(store.sync_target());
        let ValueStore::TargetAugmented { target, .. } = &store else {
            unreachable!();
        };
        assert_eq!(target.get(1, Action::Down), 3.5);
    }

    #[test]
    fn store_layout_matches_algorithm() {
        let mut rng = StdRng::seed_from_u64(3);
        for algorithm in Algorithm::ALL {
            let store = ValueStore::for_algorithm(algorithm, 5, &mut rng);
            assert!(store.matches(algorithm));
            assert_eq!(store.cells(), 5);
        }
        let mut single = ValueStore::Single(ValueTable::zeros(1));
        assert!(!single.matches(Algorithm::DqnLite));
        assert!(!single.sync_target());
    }

    #[test]
    fn labelled_tables_follow_layout() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut labels = |algorithm| {
            ValueStore::for_algorithm(algorithm, 3, &mut rng)
                .labelled_tables()
                .iter()
                .map(|(label, table)| {
                    assert_eq!(table.len(), 3);
                    *label
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(labels(Algorithm::Sarsa), vec!["q"]);
        assert_eq!(labels(Algorithm::DqnLite), vec!["live", "target"]);
        assert_eq!(labels(Algorithm::SacLite), vec!["q1", "q2"]);
    }
}
