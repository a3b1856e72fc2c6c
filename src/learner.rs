//! Bootstrap targets and TD updates for each learning rule.
//!
//! Every rule shares `Q(s,a) ← Q(s,a) + α·(target − Q(s,a))`; they differ only
//! in where the bootstrap value of the next state comes from. Terminal
//! transitions never bootstrap.

use crate::action::Action;
use crate::policy::PolicyStore;
use crate::values::{ValueRow, ValueTable};

/// Table-index form of a transition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub state: usize,
    pub action: Action,
    pub reward: f64,
    pub next_state: usize,
    pub done: bool,
}

/// Result of a single TD update.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TdUpdate {
    /// `target − Q(s,a)` before the update.
    pub td_error: f64,
    /// Largest absolute change written to any table.
    pub delta: f64,
}

#[inline]
pub fn bootstrap(reward: f64, done: bool, gamma: f64, next_value: f64) -> f64 {
    if done { reward } else { reward + gamma * next_value }
}

/// Off-policy: bootstrap on `max_a' Q(s', a')` of the live table.
pub fn q_learning(table: &mut ValueTable, t: &Transition, alpha: f64, gamma: f64) -> TdUpdate {
    let target = bootstrap(t.reward, t.done, gamma, table.max_value(t.next_state));
    apply(table, t, target, alpha)
}

/// On-policy: bootstrap on the action the policy actually picked for `s'`.
pub fn sarsa(
    table: &mut ValueTable,
    t: &Transition,
    next_action: Action,
    alpha: f64,
    gamma: f64,
) -> TdUpdate {
    let target = bootstrap(t.reward, t.done, gamma, table.get(t.next_state, next_action));
    apply(table, t, target, alpha)
}

/// Bootstrap on the frozen target table, update the live one.
pub fn dqn(
    live: &mut ValueTable,
    target_table: &ValueTable,
    t: &Transition,
    alpha: f64,
    gamma: f64,
) -> TdUpdate {
    let target = bootstrap(t.reward, t.done, gamma, target_table.max_value(t.next_state));
    apply(live, t, target, alpha)
}

/// Both critics move towards `r + γ·V_soft(s')`, where the soft value uses the
/// current policy of `s'` and the critic minimum.
pub fn soft(
    q1: &mut ValueTable,
    q2: &mut ValueTable,
    policy: &PolicyStore,
    t: &Transition,
    temperature: f64,
    alpha: f64,
    gamma: f64,
) -> TdUpdate {
    let next_min = min_row(q1, q2, t.next_state);
    let next_value = policy.soft_value(t.next_state, &next_min, temperature);
    let target = bootstrap(t.reward, t.done, gamma, next_value);
    let before = q1.get(t.state, t.action).min(q2.get(t.state, t.action));
    let d1 = q1.td_update(t.state, t.action, target, alpha);
    let d2 = q2.td_update(t.state, t.action, target, alpha);
    TdUpdate {
        td_error: target - before,
        delta: d1.abs().max(d2.abs()),
    }
}

fn min_row(q1: &ValueTable, q2: &ValueTable, state: usize) -> ValueRow {
    let (a, b) = (q1.row(state), q2.row(state));
    std::array::from_fn(|idx| a[idx].min(b[idx]))
}

fn apply(table: &mut ValueTable, t: &Transition, target: f64, alpha: f64) -> TdUpdate {
    let td_error = target - table.get(t.state, t.action);
    let delta = table.td_update(t.state, t.action, target, alpha);
    TdUpdate {
        td_error,
        delta: delta.abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyEntry;

    fn transition(reward: f64, done: bool) -> Transition {
        Transition {
            state: 0,
            action: Action::Right,
            reward,
            next_state: 1,
            done,
        }
    }

    #[test]
    fn q_learning_bootstraps_on_max() {
        let mut table = ValueTable::zeros(2);
        table.set(1, Action::Up, 2.0);
        table.set(1, Action::Left, 10.0);
        let update = q_learning(&mut table, &transition(-1.0, false), 0.5, 0.9);
        // target = -1 + 0.9 * 10 = 8
        assert!((update.td_error - 8.0).abs() < 1e-12);
        assert!((table.get(0, Action::Right) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn sarsa_bootstraps_on_chosen_action() {
        let mut table = ValueTable::zeros(2);
        table.set(1, Action::Up, 2.0);
        table.set(1, Action::Left, 10.0);
        sarsa(&mut table, &transition(-1.0, false), Action::Up, 0.5, 0.9);
        // target = -1 + 0.9 * 2 = 0.8
        assert!((table.get(0, Action::Right) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn terminal_transitions_do_not_bootstrap() {
        let mut table = ValueTable::zeros(2);
        table.set(1, Action::Down, 50.0);
        let update = q_learning(&mut table, &transition(100.0, true), 0.1, 0.9);
        assert!((update.td_error - 100.0).abs() < 1e-12);
        assert!((table.get(0, Action::Right) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn dqn_reads_frozen_table() {
        let mut live = ValueTable::zeros(2);
        let mut frozen = ValueTable::zeros(2);
        live.set(1, Action::Up, 100.0);
        frozen.set(1, Action::Up, 1.0);
        dqn(&mut live, &frozen, &transition(0.0, false), 1.0, 1.0);
        assert!((live.get(0, Action::Right) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn soft_update_moves_both_critics_to_same_target() {
        let mut q1 = ValueTable::zeros(2);
        let mut q2 = ValueTable::zeros(2);
        q1.set(0, Action::Right, 1.0);
        q2.set(0, Action::Right, -1.0);
        let policy = PolicyStore::uniform(2);
        let temperature = 0.5;
        let update = soft(
            &mut q1,
            &mut q2,
            &policy,
            &transition(-1.0, false),
            temperature,
            1.0,
            0.9,
        );
        let soft_next = PolicyEntry::uniform().soft_value(&[0.0; 4], temperature);
        let target = -1.0 + 0.9 * soft_next;
        assert!((q1.get(0, Action::Right) - target).abs() < 1e-12);
        assert!((q2.get(0, Action::Right) - target).abs() < 1e-12);
        assert!((update.td_error - (target + 1.0)).abs() < 1e-12);
    }
}
