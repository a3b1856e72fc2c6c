use serde::Serialize;

use gridlearn::{
    Action, Algorithm, ConfigurationError, EngineConfig, EngineError, Experience, GridSpec,
    PolicyEntry, PolicyStore, Position, ReplayBuffer, Trainer, TrainerBuilder, TrainerPhase,
    ValueStore, ValueTable,
};

/// Same wire layout as `ReplayBuffer`, without its capacity guarantee.
#[derive(Serialize)]
struct RawReplay {
    capacity: usize,
    entries: Vec<Experience>,
}

/// Same wire layout as `PolicyStore`, without its normalization guarantee.
#[derive(Serialize)]
struct RawPolicy {
    entries: Vec<PolicyEntry>,
}

fn decode<T: serde::de::DeserializeOwned>(
    raw: impl Serialize,
) -> Result<T, Box<dyn std::error::Error>> {
    let bytes = bincode::serde::encode_to_vec(raw, bincode::config::standard())?;
    let (decoded, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    Ok(decoded)
}

fn zero_tables(algorithm: Algorithm) -> ValueStore {
    match algorithm {
        Algorithm::DqnLite => ValueStore::TargetAugmented {
            live: ValueTable::zeros(25),
            target: ValueTable::zeros(25),
        },
        Algorithm::SacLite => ValueStore::Twin {
            q1: ValueTable::zeros(25),
            q2: ValueTable::zeros(25),
        },
        _ => ValueStore::Single(ValueTable::zeros(25)),
    }
}

#[test]
fn goal_on_obstacle_is_rejected() {
    let result = Trainer::builder(5, 5)
        .with_obstacles([Position::new(4, 4)])
        .with_goal(Position::new(4, 4))
        .build();
    assert!(matches!(
        result,
        Err(EngineError::Configuration(
            ConfigurationError::BlockedCell { .. }
        ))
    ));
}

#[test]
fn empty_grid_is_rejected() {
    let result = Trainer::builder(0, 5).build();
    assert!(matches!(
        result,
        Err(EngineError::Configuration(ConfigurationError::EmptyGrid {
            width: 0,
            height: 5
        }))
    ));
}

#[test]
fn out_of_range_epsilon_is_rejected() {
    let mut config = EngineConfig::new(GridSpec::reference(), Algorithm::Sarsa);
    config.hyperparameters.epsilon_start = 1.5;
    let Err(EngineError::Configuration(ConfigurationError::Hyperparameter { name, .. })) =
        Trainer::new(config)
    else {
        panic!("epsilon above one should not configure");
    };
    assert_eq!(name, "epsilon_start");
}

#[test]
fn start_outside_grid_is_rejected() {
    let result = Trainer::builder(3, 3).with_start(Position::new(3, 0)).build();
    assert!(matches!(
        result,
        Err(EngineError::Configuration(
            ConfigurationError::OutOfBounds { .. }
        ))
    ));
}

#[test]
fn dqn_requires_replay_capacity() {
    let mut config = EngineConfig::new(GridSpec::reference(), Algorithm::DqnLite);
    config.hyperparameters.buffer_capacity = 0;
    assert!(Trainer::new(config.clone()).is_err());
    config.algorithm = Algorithm::QLearning;
    assert!(Trainer::new(config).is_ok());
}

#[test]
fn builder_defaults_to_open_corner_to_corner_grid() -> Result<(), EngineError> {
    let builder = TrainerBuilder::new(4, 3);
    assert_eq!(builder.config().grid.start, Position::new(0, 0));
    assert_eq!(builder.config().grid.goal, Position::new(3, 2));
    let mut trainer = builder.with_algorithm(Algorithm::Sarsa).build()?;
    assert_eq!(trainer.algorithm(), Algorithm::Sarsa);
    assert_eq!(trainer.world().cell_count(), 12);
    let summary = trainer.run_episode()?;
    assert!(summary.steps >= 5);
    Ok(())
}

#[test]
fn configure_swaps_algorithm_and_clears_progress() -> Result<(), EngineError> {
    let mut trainer = Trainer::new(EngineConfig::new(GridSpec::reference(), Algorithm::QLearning))?;
    trainer.train(3)?;
    let flag = trainer.cancel_flag();

    let config = EngineConfig::new(GridSpec::reference(), Algorithm::SacLite);
    trainer.configure(config)?;
    assert_eq!(trainer.algorithm(), Algorithm::SacLite);
    assert_eq!(trainer.episode_count(), 0);
    assert_eq!(trainer.phase(), TrainerPhase::Idle);
    assert!(trainer.policy().is_some());

    flag.cancel();
    assert!(trainer.cancel_flag().is_cancelled());
    Ok(())
}

#[test]
fn snapshot_encodes_with_bincode() -> Result<(), Box<dyn std::error::Error>> {
    let mut trainer = Trainer::new(EngineConfig::new(GridSpec::reference(), Algorithm::DqnLite))?;
    trainer.train(2)?;
    let snapshot = trainer.snapshot();
    let bytes = bincode::serde::encode_to_vec(&snapshot, bincode::config::standard())?;
    let (decoded, _): (gridlearn::Snapshot, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    assert_eq!(decoded, snapshot);
    Ok(())
}

#[test]
fn oversized_grid_is_rejected() {
    let result = Trainer::builder(usize::MAX / 2 + 1, 2).build();
    assert!(matches!(
        result,
        Err(EngineError::Configuration(
            ConfigurationError::GridTooLarge { .. }
        ))
    ));
}

#[test]
fn overfull_replay_buffer_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let entries = (1..=10)
        .map(|sequence| Experience {
            state: Position::new(0, 0),
            action: Action::Right,
            reward: -1.0,
            next_state: Position::new(1, 0),
            done: false,
            sequence,
        })
        .collect();
    let replay: ReplayBuffer = decode(RawReplay {
        capacity: 3,
        entries,
    })?;
    assert_eq!((replay.capacity(), replay.len()), (3, 10));

    let mut config = EngineConfig::new(GridSpec::reference(), Algorithm::DqnLite);
    config.hyperparameters.buffer_capacity = 3;
    let result = Trainer::from_parts(config.clone(), zero_tables(Algorithm::DqnLite), None, replay);
    assert!(matches!(result, Err(EngineError::ShapeMismatch(_))));

    let mut trainer = Trainer::from_parts(
        config,
        zero_tables(Algorithm::DqnLite),
        None,
        ReplayBuffer::new(3),
    )?;
    for _ in 0..20 {
        trainer.step_once()?;
        assert!(trainer.replay().len() <= trainer.replay().capacity());
    }
    assert_eq!(trainer.replay().len(), 3);
    Ok(())
}

#[test]
fn unnormalized_policy_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut entries = vec![PolicyEntry::uniform(); 25];
    entries[3] = PolicyEntry::from_probabilities([0.5, 0.5, 0.5, 0.0]);
    let policy: PolicyStore = decode(RawPolicy { entries })?;

    let config = EngineConfig::new(GridSpec::reference(), Algorithm::SacLite);
    let result = Trainer::from_parts(
        config.clone(),
        zero_tables(Algorithm::SacLite),
        Some(policy),
        ReplayBuffer::new(0),
    );
    assert!(matches!(result, Err(EngineError::InvalidPolicy { state: 3 })));

    let trainer = Trainer::from_parts(
        config,
        zero_tables(Algorithm::SacLite),
        Some(PolicyStore::uniform(25)),
        ReplayBuffer::new(0),
    )?;
    assert!(trainer.policy().is_some());
    Ok(())
}
