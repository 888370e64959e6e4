//! Random-walk simulation of readers moving through the story graph.
//!
//! A run is driven as a step generator: [`PathSimulator::advance`] performs a
//! bounded amount of work and returns, so a host event loop can interleave
//! its own work, pause, resume or reset between calls. All state needed to
//! continue (completed paths, the path under construction, the RNG stream)
//! lives in the simulator, which makes pausing free and keeps results
//! identical to an uninterrupted run with the same seed.
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::analytics::{AnalyticsBuilder, StoryAnalytics};
use crate::config::{ConfigurationError, SimulationConfig};
use crate::graph::{ChoiceEdge, StoryGraph};
use crate::policy::ChoicePolicy;
use crate::rng::{CountingRng, PATH_STREAM_TAG, derive_stream_seed};

/// Walk steps performed per `advance` call by [`PathSimulator::run_to_completion`].
pub const DEFAULT_STEP_BUDGET: usize = 1024;

/// Why a simulated path stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The card offered no valid choice: a natural ending.
    DeadEnd,
    /// The step limit was hit.
    MaxStepsReached,
    /// The walk re-entered a card already on the path (only with
    /// `stop_on_cycle`).
    CycleDetected,
}

impl TerminationReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeadEnd => "dead_end",
            Self::MaxStepsReached => "max_steps_reached",
            Self::CycleDetected => "cycle_detected",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A visited card and the choice taken to leave it (`None` on the last step).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub card_id: String,
    pub choice_id_taken: Option<String>,
}

/// One synthetic playthrough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedPath {
    pub steps: Vec<PathStep>,
    pub termination: TerminationReason,
}

impl SimulatedPath {
    /// Number of cards on the path, start card included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn card_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.card_id.as_str())
    }

    #[must_use]
    pub fn last_card_id(&self) -> Option<&str> {
        self.steps.last().map(|step| step.card_id.as_str())
    }
}

/// A path under construction.
#[derive(Debug, Clone)]
pub struct PathWalker {
    steps: Vec<PathStep>,
    steps_taken: u32,
    visited: HashSet<String>,
}

impl PathWalker {
    #[must_use]
    pub fn new(start_card_id: &str) -> Self {
        Self {
            steps: vec![PathStep {
                card_id: start_card_id.to_string(),
                choice_id_taken: None,
            }],
            steps_taken: 0,
            visited: HashSet::from([start_card_id.to_string()]),
        }
    }

    #[must_use]
    pub fn current_card_id(&self) -> &str {
        self.steps.last().map_or("", |step| step.card_id.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Advance the walk by at most one card.
    ///
    /// Returns `Some(reason)` once the path has terminated; the walker must
    /// then be turned into a path with [`PathWalker::finish`].
    pub fn step(
        &mut self,
        graph: &StoryGraph,
        config: &SimulationConfig,
        policy: &mut dyn ChoicePolicy,
        rng: &mut dyn RngCore,
    ) -> Option<TerminationReason> {
        let current = self.current_card_id();
        let options: SmallVec<[&ChoiceEdge; 4]> = graph.valid_edges(current).collect();
        if options.is_empty() {
            return Some(TerminationReason::DeadEnd);
        }
        if self.steps_taken >= config.max_steps {
            return Some(TerminationReason::MaxStepsReached);
        }

        let decision = policy.pick_choice(current, &options, rng);
        let chosen = options[clamp_option_index(decision.option_index, options.len())];
        log::trace!(
            "{} picked {} at {} (p={:.3})",
            policy.name(),
            chosen.choice_id,
            current,
            decision.probability
        );

        if let Some(last) = self.steps.last_mut() {
            last.choice_id_taken = Some(chosen.choice_id.clone());
        }
        self.steps.push(PathStep {
            card_id: chosen.target_card_id.clone(),
            choice_id_taken: None,
        });
        self.steps_taken += 1;

        let first_visit = self.visited.insert(chosen.target_card_id.clone());
        if config.stop_on_cycle && !first_visit {
            return Some(TerminationReason::CycleDetected);
        }
        None
    }

    #[must_use]
    pub fn finish(self, termination: TerminationReason) -> SimulatedPath {
        SimulatedPath {
            steps: self.steps,
            termination,
        }
    }
}

fn clamp_option_index(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

/// Walk one complete path. `config` is assumed to be validated.
pub fn simulate_path(
    graph: &StoryGraph,
    start_card_id: &str,
    config: &SimulationConfig,
    policy: &mut dyn ChoicePolicy,
    rng: &mut dyn RngCore,
) -> SimulatedPath {
    let mut walker = PathWalker::new(start_card_id);
    loop {
        if let Some(reason) = walker.step(graph, config, policy, rng) {
            return walker.finish(reason);
        }
    }
}

/// Run a full simulation with the seeded default RNG and return its paths.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if the configuration cannot be run
/// against `graph`.
pub fn run_simulation(
    graph: &StoryGraph,
    config: &SimulationConfig,
) -> Result<Vec<SimulatedPath>, ConfigurationError> {
    let start_card_id = config.validate(graph)?;
    let mut rng = ChaCha20Rng::seed_from_u64(derive_stream_seed(config.seed, PATH_STREAM_TAG));
    let mut policy = config.decision_policy.create_policy();
    Ok((0..config.path_count)
        .map(|_| simulate_path(graph, start_card_id, config, policy.as_mut(), &mut rng))
        .collect())
}

/// Lifecycle of a [`PathSimulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Errors raised by the simulator's control surface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("cannot {command} a simulation that is {status}")]
    InvalidTransition {
        command: &'static str,
        status: SimulationStatus,
    },
}

/// Snapshot of run progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationProgress {
    pub status: SimulationStatus,
    pub completed_paths: u32,
    pub total_paths: u32,
    pub steps_taken: u64,
    /// Cards on the path currently under construction.
    pub in_flight_length: usize,
    pub rng_draws: u64,
}

impl SimulationProgress {
    /// Completed share of the run, in `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        crate::numbers::ratio(
            u64::from(self.completed_paths),
            u64::from(self.total_paths),
        )
    }
}

struct ActiveRun<R> {
    graph: StoryGraph,
    config: SimulationConfig,
    start_card_id: String,
    policy: Box<dyn ChoicePolicy + Send>,
    rng: CountingRng<R>,
    walker: Option<PathWalker>,
    /// Empty unless the simulator retains paths.
    paths: Vec<SimulatedPath>,
    retain_paths: bool,
    analytics: AnalyticsBuilder,
    steps_taken: u64,
}

impl<R: RngCore> ActiveRun<R> {
    fn completed_paths(&self) -> u32 {
        u32::try_from(self.analytics.total_paths()).unwrap_or(u32::MAX)
    }

    fn is_finished(&self) -> bool {
        self.walker.is_none() && self.completed_paths() >= self.config.path_count
    }
}

/// Pausable, resettable random-walk simulator.
///
/// `R` is the random source; tests may inject any [`RngCore`].
pub struct PathSimulator<R = ChaCha20Rng> {
    status: SimulationStatus,
    retain_paths: bool,
    run: Option<ActiveRun<R>>,
}

impl<R> Default for PathSimulator<R> {
    fn default() -> Self {
        Self {
            status: SimulationStatus::Idle,
            retain_paths: true,
            run: None,
        }
    }
}

impl<R: RngCore> fmt::Debug for PathSimulator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathSimulator")
            .field("status", &self.status)
            .field("progress", &self.progress())
            .finish()
    }
}

impl<R: RngCore + SeedableRng> PathSimulator<R> {
    /// Start a run seeded from `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Configuration`] before any work is done if
    /// the configuration is invalid; the simulator is left untouched.
    pub fn start_simulation(
        &mut self,
        graph: &StoryGraph,
        config: SimulationConfig,
    ) -> Result<(), SimulationError> {
        let rng = R::seed_from_u64(derive_stream_seed(config.seed, PATH_STREAM_TAG));
        self.start_with_rng(graph, config, rng)
    }
}

impl<R: RngCore> PathSimulator<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether completed paths are kept for [`PathSimulator::paths`].
    /// Analytics are aggregated either way; callers that only need them can
    /// turn retention off to keep memory flat for large path counts.
    #[must_use]
    pub fn retain_paths(mut self, retain: bool) -> Self {
        self.retain_paths = retain;
        self
    }

    /// Start a run with an injected random source and the configured policy.
    ///
    /// # Errors
    ///
    /// See [`PathSimulator::start_simulation`].
    pub fn start_with_rng(
        &mut self,
        graph: &StoryGraph,
        config: SimulationConfig,
        rng: R,
    ) -> Result<(), SimulationError> {
        let policy = config.decision_policy.create_policy();
        self.start_with_policy(graph, config, policy, rng)
    }

    /// Start a run with a custom policy and random source.
    ///
    /// The graph is cloned: later edits by the caller do not reach the run.
    /// Any previous run is discarded.
    ///
    /// # Errors
    ///
    /// See [`PathSimulator::start_simulation`].
    pub fn start_with_policy(
        &mut self,
        graph: &StoryGraph,
        config: SimulationConfig,
        policy: Box<dyn ChoicePolicy + Send>,
        rng: R,
    ) -> Result<(), SimulationError> {
        let start_card_id = config.validate(graph)?.to_string();
        log::info!(
            "starting simulation: {} paths from {} (max {} steps, {})",
            config.path_count,
            start_card_id,
            config.max_steps,
            policy.name()
        );
        self.run = Some(ActiveRun {
            graph: graph.clone(),
            paths: Vec::new(),
            retain_paths: self.retain_paths,
            config,
            start_card_id,
            policy,
            rng: CountingRng::new(rng),
            walker: None,
            analytics: AnalyticsBuilder::default(),
            steps_taken: 0,
        });
        self.status = SimulationStatus::Running;
        Ok(())
    }

    /// Perform at most `step_budget` walk steps. Does nothing unless running.
    pub fn advance(&mut self, step_budget: usize) -> SimulationProgress {
        if self.status != SimulationStatus::Running {
            return self.progress();
        }
        let Some(run) = self.run.as_mut() else {
            self.status = SimulationStatus::Idle;
            return self.progress();
        };

        let mut budget = step_budget;
        while budget > 0 && !run.is_finished() {
            let walker = run
                .walker
                .get_or_insert_with(|| PathWalker::new(&run.start_card_id));
            budget -= 1;
            run.steps_taken += 1;
            if let Some(reason) =
                walker.step(&run.graph, &run.config, run.policy.as_mut(), &mut run.rng)
                && let Some(walker) = run.walker.take()
            {
                let path = walker.finish(reason);
                run.analytics.ingest(&path);
                if run.retain_paths {
                    run.paths.push(path);
                }
            }
        }

        if run.is_finished() {
            log::info!(
                "simulation completed: {} paths, {} steps",
                run.completed_paths(),
                run.steps_taken
            );
            self.status = SimulationStatus::Completed;
        } else {
            log::debug!(
                "simulation progress: {}/{} paths",
                run.completed_paths(),
                run.config.path_count
            );
        }
        self.progress()
    }

    /// Drive the run until it completes. A paused or idle simulator is
    /// returned as is.
    pub fn run_to_completion(&mut self) -> SimulationProgress {
        while self.status == SimulationStatus::Running {
            self.advance(DEFAULT_STEP_BUDGET);
        }
        self.progress()
    }

    /// Suspend a running simulation, keeping all in-flight state.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::InvalidTransition`] unless running.
    pub fn pause_simulation(&mut self) -> Result<(), SimulationError> {
        self.transition("pause", SimulationStatus::Running, SimulationStatus::Paused)
    }

    /// Continue a paused simulation from where it stopped.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::InvalidTransition`] unless paused.
    pub fn resume_simulation(&mut self) -> Result<(), SimulationError> {
        self.transition("resume", SimulationStatus::Paused, SimulationStatus::Running)
    }

    /// Abort any run and discard partial results.
    pub fn reset_simulation(&mut self) {
        if self.run.take().is_some() {
            log::debug!("simulation reset from {}", self.status);
        }
        self.status = SimulationStatus::Idle;
    }

    fn transition(
        &mut self,
        command: &'static str,
        from: SimulationStatus,
        to: SimulationStatus,
    ) -> Result<(), SimulationError> {
        if self.status != from {
            return Err(SimulationError::InvalidTransition {
                command,
                status: self.status,
            });
        }
        self.status = to;
        Ok(())
    }

    #[must_use]
    pub const fn status(&self) -> SimulationStatus {
        self.status
    }

    #[must_use]
    pub fn progress(&self) -> SimulationProgress {
        self.run.as_ref().map_or(
            SimulationProgress {
                status: self.status,
                completed_paths: 0,
                total_paths: 0,
                steps_taken: 0,
                in_flight_length: 0,
                rng_draws: 0,
            },
            |run| SimulationProgress {
                status: self.status,
                completed_paths: run.completed_paths(),
                total_paths: run.config.path_count,
                steps_taken: run.steps_taken,
                in_flight_length: run.walker.as_ref().map_or(0, PathWalker::len),
                rng_draws: run.rng.draws(),
            },
        )
    }

    /// Paths completed so far; empty when retention is off.
    #[must_use]
    pub fn paths(&self) -> &[SimulatedPath] {
        self.run
            .as_ref()
            .map(|run| run.paths.as_slice())
            .unwrap_or_default()
    }

    /// Analytics over the paths completed so far.
    #[must_use]
    pub fn analytics(&self) -> StoryAnalytics {
        self.run
            .as_ref()
            .map(|run| run.analytics.clone().finish())
            .unwrap_or_default()
    }

    /// The graph snapshot the current run walks.
    #[must_use]
    pub fn snapshot(&self) -> Option<&StoryGraph> {
        self.run.as_ref().map(|run| &run.graph)
    }
}
