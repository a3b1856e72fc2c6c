use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::action::Action;
use crate::config::{Algorithm, EngineConfig, Hyperparameters};
use crate::error::EngineError;
use crate::grid::{GridSpec, GridWorld, Position};
use crate::learner::{self, TdUpdate, Transition};
use crate::policy::{EpsilonGreedy, Exploration, PolicyStore, Temperature};
use crate::replay::{Experience, ReplayBuffer};
use crate::state::{
    Agent, Diagnostics, EpisodeOutcome, EpisodeSummary, Snapshot, StepResult, TrainerPhase,
};
use crate::values::{ValueRow, ValueStore, greedy_action};

/// Externally settable stop request, honoured between episodes.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builder over [`EngineConfig`] with the usual defaults: start in the
/// top-left corner, goal in the bottom-right, no obstacles, Q-learning.
pub struct TrainerBuilder {
    config: EngineConfig,
}

impl TrainerBuilder {
    pub fn new(width: usize, height: usize) -> Self {
        let grid = GridSpec {
            width,
            height,
            obstacles: Vec::new(),
            start: Position::new(0, 0),
            goal: Position::new(width.saturating_sub(1), height.saturating_sub(1)),
        };
        Self {
            config: EngineConfig::new(grid, Algorithm::QLearning),
        }
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn with_obstacles<I, P>(mut self, obstacles: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Position>,
    {
        self.config.grid.obstacles = obstacles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_start(mut self, start: impl Into<Position>) -> Self {
        self.config.grid.start = start.into();
        self
    }

    pub fn with_goal(mut self, goal: impl Into<Position>) -> Self {
        self.config.grid.goal = goal.into();
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.config.algorithm = algorithm;
        self
    }

    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.config.hyperparameters = hyperparameters;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.config.max_steps = max_steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build(self) -> Result<Trainer, EngineError> {
        Trainer::new(self.config)
    }
}

/// Stores and schedules making up one training session.
struct Session {
    world: GridWorld,
    values: ValueStore,
    policy: Option<PolicyStore>,
    replay: ReplayBuffer,
    exploration: Exploration,
    rng: StdRng,
}

impl Session {
    fn build(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let world = GridWorld::new(config.grid.clone())?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let cells = world.cell_count();
        let values = ValueStore::for_algorithm(config.algorithm, cells, &mut rng);
        let policy = config
            .algorithm
            .is_stochastic()
            .then(|| PolicyStore::uniform(cells));
        let replay = ReplayBuffer::new(if config.algorithm.uses_replay() {
            config.hyperparameters.buffer_capacity
        } else {
            0
        });
        Ok(Self {
            world,
            values,
            policy,
            replay,
            exploration: initial_exploration(config),
            rng,
        })
    }
}

fn initial_exploration(config: &EngineConfig) -> Exploration {
    if config.algorithm.is_stochastic() {
        Exploration::Temperature(Temperature::from_hyperparameters(&config.hyperparameters))
    } else {
        Exploration::Epsilon(EpsilonGreedy::from_hyperparameters(&config.hyperparameters))
    }
}

/// Single-threaded training engine shared by all four learning rules.
pub struct Trainer {
    config: EngineConfig,
    world: GridWorld,
    values: ValueStore,
    policy: Option<PolicyStore>,
    replay: ReplayBuffer,
    exploration: Exploration,
    agent: Agent,
    phase: TrainerPhase,
    episode_count: usize,
    step_count: usize,
    total_steps: u64,
    /// Next action already committed to by the on-policy rule.
    pending_action: Option<Action>,
    episode_max_delta: f64,
    entropy_sum: f64,
    entropy_samples: usize,
    cancel: CancelFlag,
    rng: StdRng,
}

impl Trainer {
    pub fn builder(width: usize, height: usize) -> TrainerBuilder {
        TrainerBuilder::new(width, height)
    }

    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let session = Session::build(&config)?;
        Ok(Self::assemble(config, session, CancelFlag::new()))
    }

    /// Wraps externally owned stores. Their layout must match the grid and
    /// algorithm of `config`, every policy entry must be a distribution and
    /// the replay buffer must fit `buffer_capacity`.
    pub fn from_parts(
        config: EngineConfig,
        values: ValueStore,
        policy: Option<PolicyStore>,
        replay: ReplayBuffer,
    ) -> Result<Self, EngineError> {
        let mut session = Session::build(&config)?;
        let cells = session.world.cell_count();
        if !values.matches(config.algorithm) {
            return Err(EngineError::ShapeMismatch(
                "value store layout does not fit the algorithm",
            ));
        }
        if values.cells() != cells {
            return Err(EngineError::ShapeMismatch(
                "value store size does not fit the grid",
            ));
        }
        match (&policy, config.algorithm.is_stochastic()) {
            (Some(store), true) if store.len() == cells => {
                if let Some(state) = store.entries().iter().position(|e| !e.is_distribution()) {
                    return Err(EngineError::InvalidPolicy { state });
                }
            }
            (None, false) => {}
            _ => {
                return Err(EngineError::ShapeMismatch(
                    "policy store does not fit the algorithm or grid",
                ));
            }
        }
        if replay.len() > replay.capacity() {
            return Err(EngineError::ShapeMismatch(
                "replay buffer holds more entries than its capacity",
            ));
        }
        if config.algorithm.uses_replay()
            && replay.capacity() != config.hyperparameters.buffer_capacity
        {
            return Err(EngineError::ShapeMismatch(
                "replay buffer capacity differs from buffer_capacity",
            ));
        }
        session.values = values;
        session.policy = policy;
        session.replay = replay;
        Ok(Self::assemble(config, session, CancelFlag::new()))
    }

    fn assemble(config: EngineConfig, session: Session, cancel: CancelFlag) -> Self {
        let Session {
            world,
            values,
            policy,
            replay,
            exploration,
            rng,
        } = session;
        let agent = Agent::at(world.start());
        Self {
            config,
            world,
            values,
            policy,
            replay,
            exploration,
            agent,
            phase: TrainerPhase::Idle,
            episode_count: 0,
            step_count: 0,
            total_steps: 0,
            pending_action: None,
            episode_max_delta: 0.0,
            entropy_sum: 0.0,
            entropy_samples: 0,
            cancel,
            rng,
        }
    }

    /// Hands the stores back to the caller.
    pub fn into_parts(self) -> (ValueStore, Option<PolicyStore>, ReplayBuffer) {
        (self.values, self.policy, self.replay)
    }

    /// Replaces the whole session. On error the current session is left as is.
    pub fn configure(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        let session = Session::build(&config)?;
        let cancel = self.cancel.clone();
        *self = Self::assemble(config, session, cancel);
        Ok(())
    }

    /// Rebuilds tables, buffer, schedules and rng from the current config.
    pub fn reset_session(&mut self) -> Result<(), EngineError> {
        self.configure(self.config.clone())
    }

    /// Returns the agent to the start cell and the trainer to idle. Learned
    /// values, the replay buffer and the episode counter are kept.
    pub fn reset(&mut self) {
        self.agent = Agent::at(self.world.start());
        self.phase = TrainerPhase::Idle;
        self.step_count = 0;
        self.pending_action = None;
        self.episode_max_delta = 0.0;
        self.entropy_sum = 0.0;
        self.entropy_samples = 0;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn algorithm(&self) -> Algorithm {
        self.config.algorithm
    }

    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    pub fn policy(&self) -> Option<&PolicyStore> {
        self.policy.as_ref()
    }

    pub fn replay(&self) -> &ReplayBuffer {
        &self.replay
    }

    pub fn exploration(&self) -> Exploration {
        self.exploration
    }

    pub fn agent(&self) -> Agent {
        self.agent
    }

    pub fn phase(&self) -> TrainerPhase {
        self.phase
    }

    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Advances the agent by one move and applies the learning rule. Starts a
    /// new episode when none is running and closes it on the terminal step.
    pub fn step_once(&mut self) -> Result<StepResult, EngineError> {
        if self.phase != TrainerPhase::EpisodeRunning {
            self.begin_episode();
        }
        let episode = self.episode_count + 1;
        let state = self.agent.position;
        let state_index = self.world.index(state);
        let action = match self.pending_action.take() {
            Some(action) => action,
            None => self.select_action(state_index),
        };

        let next_state = self.world.step(state, action);
        self.world.ensure_valid(next_state)?;
        let reward = self.world.reward(next_state);
        let done = self.world.is_terminal(next_state);
        self.step_count += 1;
        self.total_steps += 1;

        let transition = Transition {
            state: state_index,
            action,
            reward,
            next_state: self.world.index(next_state),
            done,
        };
        let diagnostics = self.learn(&transition, state, next_state)?;

        self.agent.position = next_state;
        self.agent.total_reward += reward;
        trace!(
            "episode {episode} step {}: {state} {action} -> {next_state} (reward {reward}, td {:.4})",
            self.step_count,
            diagnostics.td_error()
        );

        let summary = if done || self.step_count >= self.config.max_steps {
            Some(self.finish_episode(done))
        } else {
            None
        };
        Ok(StepResult {
            episode,
            step: self.step_count,
            state,
            action,
            reward,
            next_state,
            done,
            diagnostics,
            summary,
        })
    }

    /// Runs a fresh episode from the start cell to the goal or the step cap.
    pub fn run_episode(&mut self) -> Result<EpisodeSummary, EngineError> {
        self.begin_episode();
        loop {
            if let Some(summary) = self.step_once()?.summary {
                return Ok(summary);
            }
        }
    }

    /// Runs up to `episodes` episodes, stopping early if the cancel flag is
    /// raised. The flag is only checked between episodes.
    pub fn train(&mut self, episodes: usize) -> Result<Vec<EpisodeSummary>, EngineError> {
        let mut summaries = Vec::with_capacity(episodes);
        for _ in 0..episodes {
            if self.cancel.is_cancelled() {
                debug!(
                    "training cancelled after {} of {episodes} episodes",
                    summaries.len()
                );
                break;
            }
            summaries.push(self.run_episode()?);
        }
        Ok(summaries)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            algorithm: self.config.algorithm,
            grid: self.world.spec().clone(),
            value_tables: self.values.clone(),
            policy_table: self.policy.clone(),
            exploration: self.exploration,
            episode_count: self.episode_count,
            total_steps: self.total_steps,
            replay_len: self.replay.len(),
            agent: self.agent,
            phase: self.phase,
        }
    }

    /// Path obtained by always taking the greedy action from the start cell,
    /// stopping at the goal or after `max_steps` moves. Does not learn.
    pub fn greedy_rollout(&self, max_steps: usize) -> Vec<Position> {
        let mut position = self.world.start();
        let mut path = vec![position];
        for _ in 0..max_steps {
            if self.world.is_terminal(position) {
                break;
            }
            let values = self.values.decision_values(self.world.index(position));
            position = self.world.step(position, greedy_action(&values));
            path.push(position);
        }
        path
    }

    fn begin_episode(&mut self) {
        self.reset();
        self.phase = TrainerPhase::EpisodeRunning;
    }

    fn select_action(&mut self, state: usize) -> Action {
        match (&self.exploration, &self.policy) {
            (Exploration::Temperature(_), Some(policy)) => policy.entry(state).sample(&mut self.rng),
            (Exploration::Epsilon(schedule), _) => {
                schedule.select(&self.values.decision_values(state), &mut self.rng)
            }
            (Exploration::Temperature(_), None) => {
                greedy_action(&self.values.decision_values(state))
            }
        }
    }

    fn learn(
        &mut self,
        t: &Transition,
        state: Position,
        next_state: Position,
    ) -> Result<Diagnostics, EngineError> {
        let Hyperparameters { alpha, gamma, .. } = self.config.hyperparameters;
        match self.config.algorithm {
            Algorithm::QLearning => {
                let ValueStore::Single(table) = &mut self.values else {
                    return Err(EngineError::ShapeMismatch("q-learning needs a single table"));
                };
                let update = learner::q_learning(table, t, alpha, gamma);
                Ok(self.value_diagnostics(update, update.td_error.powi(2), 0, false))
            }
            Algorithm::Sarsa => {
                let next_action = if t.done {
                    None
                } else {
                    Some(self.select_action(t.next_state))
                };
                let ValueStore::Single(table) = &mut self.values else {
                    return Err(EngineError::ShapeMismatch("sarsa needs a single table"));
                };
                let update = learner::sarsa(
                    table,
                    t,
                    next_action.unwrap_or(Action::ALL[0]),
                    alpha,
                    gamma,
                );
                self.pending_action = next_action;
                Ok(self.value_diagnostics(update, update.td_error.powi(2), 0, false))
            }
            Algorithm::DqnLite => self.learn_replay(t, state, next_state, alpha, gamma),
            Algorithm::SacLite => {
                let temperature = self.exploration.rate();
                let (ValueStore::Twin { q1, q2 }, Some(policy)) =
                    (&mut self.values, self.policy.as_mut())
                else {
                    return Err(EngineError::ShapeMismatch(
                        "sac-lite needs twin critics and a policy store",
                    ));
                };
                let update = learner::soft(q1, q2, policy, t, temperature, alpha, gamma);
                let (r1, r2) = (q1.row(t.state), q2.row(t.state));
                let critic_min: ValueRow = std::array::from_fn(|idx| r1[idx].min(r2[idx]));
                let entry = policy.refresh(t.state, &critic_min, temperature);
                self.entropy_sum += entry.entropy;
                self.entropy_samples += 1;
                self.episode_max_delta = self.episode_max_delta.max(update.delta);
                Ok(Diagnostics::Stochastic {
                    td_error: update.td_error,
                    entropy: entry.entropy,
                    probabilities: entry.probabilities,
                    temperature,
                })
            }
        }
    }

    fn learn_replay(
        &mut self,
        t: &Transition,
        state: Position,
        next_state: Position,
        alpha: f64,
        gamma: f64,
    ) -> Result<Diagnostics, EngineError> {
        let params = self.config.hyperparameters;
        let ValueStore::TargetAugmented { live, target } = &mut self.values else {
            return Err(EngineError::ShapeMismatch(
                "dqn-lite needs a live and a target table",
            ));
        };
        let update = learner::dqn(live, target, t, alpha, gamma);
        self.replay.push(Experience {
            state,
            action: t.action,
            reward: t.reward,
            next_state,
            done: t.done,
            sequence: self.total_steps,
        });

        let mut squared_error = update.td_error.powi(2);
        let mut replayed = 0;
        if params.batch_size > 0 && self.replay.len() >= params.replay_start.max(1) {
            for experience in self.replay.sample(params.batch_size, &mut self.rng) {
                let sampled = Transition {
                    state: self.world.index(experience.state),
                    action: experience.action,
                    reward: experience.reward,
                    next_state: self.world.index(experience.next_state),
                    done: experience.done,
                };
                let replay_update = learner::dqn(live, target, &sampled, alpha, gamma);
                squared_error += replay_update.td_error.powi(2);
                replayed += 1;
            }
        }

        let synced = self.total_steps % params.target_sync_interval as u64 == 0;
        if synced {
            self.values.sync_target();
            debug!("target table synced at global step {}", self.total_steps);
        }
        let loss = squared_error / (replayed + 1) as f64;
        Ok(self.value_diagnostics(update, loss, replayed, synced))
    }

    fn value_diagnostics(
        &mut self,
        update: TdUpdate,
        loss: f64,
        replayed: usize,
        target_synced: bool,
    ) -> Diagnostics {
        self.episode_max_delta = self.episode_max_delta.max(update.delta);
        Diagnostics::ValueBased {
            td_error: update.td_error,
            loss,
            epsilon: self.exploration.rate(),
            replayed,
            target_synced,
        }
    }

    fn finish_episode(&mut self, reached_goal: bool) -> EpisodeSummary {
        let outcome = if reached_goal {
            EpisodeOutcome::GoalReached
        } else {
            EpisodeOutcome::StepLimitReached
        };
        self.phase = TrainerPhase::EpisodeDone(outcome);
        self.pending_action = None;
        self.episode_count += 1;
        let summary = EpisodeSummary {
            episode: self.episode_count,
            steps: self.step_count,
            total_reward: self.agent.total_reward,
            reached_goal,
            outcome,
            max_delta: self.episode_max_delta,
            exploration: self.exploration.rate(),
        };
        match &mut self.exploration {
            Exploration::Epsilon(schedule) => schedule.decay(),
            Exploration::Temperature(schedule) => {
                let mean_entropy = (self.entropy_samples > 0)
                    .then(|| self.entropy_sum / self.entropy_samples as f64);
                schedule.adjust(mean_entropy);
            }
        }
        debug!(
            "{} episode {} finished: {:?} after {} steps, reward {:.1}, next exploration {:.4}",
            self.config.algorithm,
            summary.episode,
            outcome,
            summary.steps,
            summary.total_reward,
            self.exploration.rate()
        );
        summary
    }
}
