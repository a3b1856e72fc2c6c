use std::env;
use std::error::Error;
use std::process;
use std::thread;
use std::time::Duration;

use gridlearn::{
    Algorithm, DEFAULT_SEED, EngineConfig, GridSpec, Trainer, describe_step, render_grid,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    let mut visualize = false;
    let mut seed = DEFAULT_SEED;
    let mut episodes = 1usize;
    let mut warmup = 0usize;
    let mut delay: Option<Duration> = None;
    let mut algorithm = Algorithm::QLearning;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--visualize" => visualize = true,
            "--seed" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--seed requires a value".to_string())?;
                seed = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid seed value: {value}"))?;
            }
            "--episodes" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--episodes requires a value".to_string())?;
                episodes = value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid episodes value: {value}"))?;
            }
            "--warmup" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--warmup requires a value".to_string())?;
                warmup = value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid warmup value: {value}"))?;
            }
            "--delay-ms" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--delay-ms requires a value".to_string())?;
                let millis = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid delay value: {value}"))?;
                delay = Some(Duration::from_millis(millis));
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            other => algorithm = other.parse::<Algorithm>()?,
        }
    }

    let mut config = EngineConfig::new(GridSpec::reference(), algorithm);
    config.seed = seed;
    let mut trainer = Trainer::new(config)?;
    if warmup > 0 {
        let summaries = trainer.train(warmup)?;
        let reached = summaries.iter().filter(|s| s.reached_goal).count();
        println!("Warm-up: {warmup} episodes, goal reached in {reached}.\n");
    }

    println!("Watching {algorithm} for {episodes} episode(s).\n");
    let mut finished = 0usize;
    while finished < episodes {
        let step = trainer.step_once()?;
        if visualize {
            println!("{}", render_grid(&trainer.snapshot()));
        }
        println!("{}", describe_step(&step));
        if step.summary.is_some() {
            finished += 1;
            println!();
        }
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
    }
    Ok(())
}

fn print_usage() {
    println!("Usage: simulate [OPTIONS] [ALGORITHM]");
    println!("  --visualize           Show the grid with greedy arrows after every step");
    println!("  --seed <u64>          Seed for exploration (default: {DEFAULT_SEED:#x})");
    println!("  --episodes <usize>    Episodes to watch step by step (default: 1)");
    println!("  --warmup <usize>      Episodes to train silently before watching");
    println!("  --delay-ms <u64>      Pause between steps for readable output");
    println!("  --help                Show this help message");
    println!("Algorithms: q-learning (default), sarsa, dqn-lite, sac-lite");
}
