use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use plotters::prelude::*;

use gridlearn::{
    Action, Algorithm, DEFAULT_MAX_STEPS, DEFAULT_SEED, EngineConfig, EpisodeSummary, GridSpec,
    Hyperparameters, Position, Snapshot, Trainer, TrainerBuilder, describe_summary, render_grid,
};

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train a tabular agent on a grid world and report per-episode results",
    version
)]
struct TrainArgs {
    /// Learning rule to train with.
    #[arg(long, value_enum, default_value_t = AlgorithmArg::QLearning)]
    algorithm: AlgorithmArg,
    /// Number of episodes to run.
    #[arg(short = 'n', long, default_value_t = 200)]
    episodes: usize,
    /// Master seed controlling reproducibility.
    #[arg(short = 's', long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// Grid size as WIDTHxHEIGHT. Defaults to the 5x5 reference layout.
    #[arg(long, value_parser = parse_size)]
    grid: Option<(usize, usize)>,
    /// Obstacle cell as x,y (repeatable). Replaces the reference obstacles.
    #[arg(long = "obstacle", value_parser = parse_position)]
    obstacles: Vec<Position>,
    /// Start cell as x,y.
    #[arg(long, value_parser = parse_position)]
    start: Option<Position>,
    /// Goal cell as x,y.
    #[arg(long, value_parser = parse_position)]
    goal: Option<Position>,
    /// Steps after which an episode is cut off.
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    max_steps: usize,
    /// TD learning rate.
    #[arg(long)]
    alpha: Option<f64>,
    /// Discount factor.
    #[arg(long)]
    gamma: Option<f64>,
    #[arg(long)]
    epsilon_start: Option<f64>,
    #[arg(long)]
    epsilon_end: Option<f64>,
    #[arg(long)]
    epsilon_decay: Option<f64>,
    /// Replay buffer capacity (dqn-lite).
    #[arg(long)]
    buffer_capacity: Option<usize>,
    /// Replay samples per step (dqn-lite).
    #[arg(long)]
    batch_size: Option<usize>,
    /// Global steps between target syncs (dqn-lite).
    #[arg(long)]
    target_sync: Option<usize>,
    /// Initial policy temperature (sac-lite).
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    temperature_min: Option<f64>,
    /// Entropy the automatic temperature tuner aims for (sac-lite).
    #[arg(long)]
    target_entropy: Option<f64>,
    /// Tune the temperature towards the target entropy instead of decaying it.
    #[arg(long)]
    auto_temperature: bool,
    /// Print a summary line every N episodes.
    #[arg(long, default_value_t = 10)]
    log_every: usize,
    /// Write a PNG chart of reward and steps per episode.
    #[arg(long)]
    chart: Option<PathBuf>,
    /// Write a bincode snapshot of the final tables.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AlgorithmArg {
    QLearning,
    Sarsa,
    DqnLite,
    SacLite,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::QLearning => Algorithm::QLearning,
            AlgorithmArg::Sarsa => Algorithm::Sarsa,
            AlgorithmArg::DqnLite => Algorithm::DqnLite,
            AlgorithmArg::SacLite => Algorithm::SacLite,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = TrainArgs::parse();
    let algorithm = Algorithm::from(args.algorithm);
    let mut trainer = TrainerBuilder::from_config(EngineConfig::new(grid_from_args(&args), algorithm))
        .with_hyperparameters(hyperparameters_from_args(&args))
        .with_max_steps(args.max_steps)
        .with_seed(args.seed)
        .build()?;

    println!(
        "Training {algorithm} for {} episodes (seed {:#x})\n",
        args.episodes, args.seed
    );
    println!("{}", render_grid(&trainer.snapshot()));

    let summaries = trainer.train(args.episodes)?;
    let log_every = args.log_every.max(1);
    for summary in &summaries {
        if summary.episode % log_every == 0 || summary.episode == 1 {
            println!("  {}", describe_summary(summary));
        }
    }

    let reached = summaries.iter().filter(|s| s.reached_goal).count();
    println!("\nGoal reached in {reached}/{} episodes.", summaries.len());
    if let Some(best) = summaries
        .iter()
        .filter(|s| s.reached_goal)
        .min_by_key(|s| s.steps)
    {
        println!(
            "Shortest successful episode: #{} with {} steps.",
            best.episode, best.steps
        );
    }

    let path = trainer.greedy_rollout(args.max_steps);
    let arrived = path.last().is_some_and(|p| trainer.world().is_terminal(*p));
    let rendered_path = path
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" -> ");
    println!(
        "Greedy rollout ({} moves, {}): {rendered_path}",
        path.len().saturating_sub(1),
        if arrived { "reaches goal" } else { "does not reach goal" }
    );
    let snapshot = trainer.snapshot();
    println!("\n{}", render_grid(&snapshot));
    print_start_cell(&trainer, &snapshot);

    if let Some(out) = &args.chart {
        render_progress_chart(out, algorithm, &summaries)?;
        println!("Chart written to {}", display_path(out));
    }
    if let Some(out) = &args.snapshot {
        let bytes =
            bincode::serde::encode_to_vec(trainer.snapshot(), bincode::config::standard())?;
        fs::write(out, bytes)?;
        println!("Snapshot written to {}", display_path(out));
    }
    Ok(())
}

fn print_start_cell(trainer: &Trainer, snapshot: &Snapshot) {
    let start = trainer.world().index(trainer.world().start());
    println!("Values at the start cell:");
    for (label, table) in snapshot.value_tables.labelled_tables() {
        let row = Action::ALL
            .iter()
            .map(|action| format!("{action} {:>8.3}", table.get(start, *action)))
            .collect::<Vec<_>>()
            .join("  ");
        println!("  {label:<6} {row}");
    }
    if let Some(policy) = &snapshot.policy_table {
        let entry = policy.entry(start);
        let row = Action::ALL
            .iter()
            .map(|action| format!("{action} {:.3}", entry.probability(*action)))
            .collect::<Vec<_>>()
            .join("  ");
        println!("  policy {row} (entropy {:.3})", entry.entropy);
    }
}

fn grid_from_args(args: &TrainArgs) -> GridSpec {
    let mut grid = GridSpec::reference();
    if let Some((width, height)) = args.grid {
        grid.width = width;
        grid.height = height;
        grid.obstacles.clear();
        grid.goal = Position::new(width.saturating_sub(1), height.saturating_sub(1));
    }
    if !args.obstacles.is_empty() {
        grid.obstacles = args.obstacles.clone();
    }
    if let Some(start) = args.start {
        grid.start = start;
    }
    if let Some(goal) = args.goal {
        grid.goal = goal;
    }
    grid
}

fn hyperparameters_from_args(args: &TrainArgs) -> Hyperparameters {
    let mut params = Hyperparameters::default();
    let overrides = [
        (&mut params.alpha, args.alpha),
        (&mut params.gamma, args.gamma),
        (&mut params.epsilon_start, args.epsilon_start),
        (&mut params.epsilon_end, args.epsilon_end),
        (&mut params.epsilon_decay, args.epsilon_decay),
        (&mut params.temperature_start, args.temperature),
        (&mut params.temperature_min, args.temperature_min),
        (&mut params.target_entropy, args.target_entropy),
    ];
    for (slot, value) in overrides {
        if let Some(value) = value {
            *slot = value;
        }
    }
    if let Some(capacity) = args.buffer_capacity {
        params.buffer_capacity = capacity;
    }
    if let Some(batch) = args.batch_size {
        params.batch_size = batch;
    }
    if let Some(interval) = args.target_sync {
        params.target_sync_interval = interval;
    }
    params.auto_temperature = args.auto_temperature;
    params
}

fn parse_position(raw: &str) -> Result<Position, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got {raw}"))?;
    let x = x
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid x coordinate: {x}"))?;
    let y = y
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid y coordinate: {y}"))?;
    Ok(Position::new(x, y))
}

fn parse_size(raw: &str) -> Result<(usize, usize), String> {
    let (w, h) = raw
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT but got {raw}"))?;
    let width = w.parse::<usize>().map_err(|_| format!("invalid width: {w}"))?;
    let height = h.parse::<usize>().map_err(|_| format!("invalid height: {h}"))?;
    Ok((width, height))
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn render_progress_chart(
    out: &Path,
    algorithm: Algorithm,
    summaries: &[EpisodeSummary],
) -> Result<(), Box<dyn Error>> {
    if summaries.is_empty() {
        return Err("no episodes to chart".into());
    }
    let rewards: Vec<(usize, f64)> = summaries
        .iter()
        .map(|s| (s.episode, s.total_reward))
        .collect();
    let steps: Vec<(usize, f64)> = summaries
        .iter()
        .map(|s| (s.episode, s.steps as f64))
        .collect();
    let last_episode = summaries.iter().map(|s| s.episode).max().unwrap_or(1);
    let (low, high) = rewards
        .iter()
        .chain(steps.iter())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| {
            (lo.min(*v), hi.max(*v))
        });

    let root = BitMapBackend::new(out, (1000, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| format!("{e}"))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{algorithm}: reward and steps per episode"),
            ("sans-serif", 28).into_font(),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(1..last_episode.max(2), (low - 5.0)..(high + 5.0))
        .map_err(|e| format!("{e}"))?;

    chart
        .configure_mesh()
        .x_desc("Episode")
        .y_desc("Value")
        .light_line_style(&WHITE.mix(0.0))
        .draw()
        .map_err(|e| format!("{e}"))?;

    chart
        .draw_series(LineSeries::new(rewards, &BLUE))
        .map_err(|e| format!("{e}"))?
        .label("total reward")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .draw_series(LineSeries::new(steps, &RED))
        .map_err(|e| format!("{e}"))?
        .label("steps")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(|e| format!("{e}"))?;

    root.present().map_err(|e| format!("{e}"))?;
    Ok(())
}
