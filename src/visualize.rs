use std::fmt::Write;

use crate::grid::Position;
use crate::state::{Diagnostics, EpisodeSummary, Snapshot, StepResult, TrainerPhase};
use crate::values::greedy_action;

/// Customize grid rendering for CLI visualization.
#[derive(Clone, Copy, Debug)]
pub struct VisualOptions {
    /// Draw the greedy action of every open cell instead of a dot.
    pub show_policy_arrows: bool,
    pub show_header: bool,
}

impl Default for VisualOptions {
    fn default() -> Self {
        Self {
            show_policy_arrows: true,
            show_header: true,
        }
    }
}

pub fn render_grid(snapshot: &Snapshot) -> String {
    render_grid_with_options(snapshot, VisualOptions::default())
}

/// `A` agent, `G` goal, `#` obstacle, arrows for the greedy action.
pub fn render_grid_with_options(snapshot: &Snapshot, options: VisualOptions) -> String {
    let mut out = String::new();
    let grid = &snapshot.grid;
    if options.show_header {
        let phase = match snapshot.phase {
            TrainerPhase::Idle => String::from("idle"),
            TrainerPhase::EpisodeRunning => String::from("running"),
            TrainerPhase::EpisodeDone(outcome) => format!("done ({outcome:?})"),
        };
        let _ = writeln!(
            out,
            "{} | episodes: {} | steps: {} | exploration: {:.4} | {phase}",
            snapshot.algorithm,
            snapshot.episode_count,
            snapshot.total_steps,
            snapshot.epsilon_or_temperature()
        );
        let _ = writeln!(
            out,
            "Agent at {} | episode reward: {:.1}",
            snapshot.agent.position, snapshot.agent.total_reward
        );
    }
    for y in 0..grid.height {
        let mut row = String::with_capacity(grid.width * 2);
        for x in 0..grid.width {
            let position = Position::new(x, y);
            let glyph = if position == snapshot.agent.position {
                'A'
            } else if position == grid.goal {
                'G'
            } else if grid.obstacles.contains(&position) {
                '#'
            } else if options.show_policy_arrows {
                let index = y * grid.width + x;
                greedy_action(&snapshot.value_tables.decision_values(index)).arrow()
            } else {
                '.'
            };
            row.push(glyph);
            row.push(' ');
        }
        let _ = writeln!(out, "{}", row.trim_end());
    }
    out
}

pub fn describe_step(step: &StepResult) -> String {
    let mut out = format!(
        "ep {:>3} step {:>2}: {} --{}--> {} reward {:>6.1}",
        step.episode, step.step, step.state, step.action, step.next_state, step.reward
    );
    match step.diagnostics {
        Diagnostics::ValueBased {
            td_error,
            loss,
            epsilon,
            replayed,
            target_synced,
        } => {
            let _ = write!(out, " | td {td_error:>8.3} loss {loss:>8.3} eps {epsilon:.3}");
            if replayed > 0 {
                let _ = write!(out, " replayed {replayed}");
            }
            if target_synced {
                out.push_str(" [target synced]");
            }
        }
        Diagnostics::Stochastic {
            td_error,
            entropy,
            probabilities,
            temperature,
        } => {
            let probs = probabilities
                .iter()
                .map(|p| format!("{p:.2}"))
                .collect::<Vec<_>>()
                .join("/");
            let _ = write!(
                out,
                " | td {td_error:>8.3} H {entropy:.3} pi [{probs}] temp {temperature:.3}"
            );
        }
    }
    if let Some(summary) = &step.summary {
        let _ = write!(out, "\n{}", describe_summary(summary));
    }
    out
}

pub fn describe_summary(summary: &EpisodeSummary) -> String {
    format!(
        "episode {:>4}: {:>2} steps, reward {:>7.1}, {} (max delta {:.4}, exploration {:.4})",
        summary.episode,
        summary.steps,
        summary.total_reward,
        if summary.reached_goal {
            "goal reached"
        } else {
            "step limit reached"
        },
        summary.max_delta,
        summary.exploration
    )
}
