//! Run scheduler: dispatches a generation's runs to workers and drives the evolver.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use canopy_core::{
    EvolverError, GenerationOutcome, GenerationSummary, Population, Run, RunId,
    ScenarioEvolver, SimulationConfig, SimulationError,
};
use crossfire::{RecvTimeoutError, Rx};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::protocol::{
    ControlCommand, RunRequest, SchedulerInput, WorkerCommand, WorkerEvent, WorkerId,
};

/// Failures delivering a command to a worker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("worker {0} does not exist")]
    UnknownWorker(WorkerId),
    #[error("worker {0} is disconnected")]
    Disconnected(WorkerId),
}

/// Errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("generation {generation} stalled with unfinished runs {runs:?}")]
    Stalled { generation: u32, runs: Vec<RunId> },
    #[error(transparent)]
    Evolver(#[from] EvolverError),
    #[error("invalid simulation settings: {0}")]
    Simulation(#[from] SimulationError),
    #[error("scheduler inbox disconnected")]
    InboxClosed,
}

/// Delivery seam between the scheduler and its execution units.
pub trait WorkerTransport {
    fn worker_count(&self) -> usize;

    fn send(&self, worker: WorkerId, command: WorkerCommand) -> Result<(), TransportError>;

    /// Whether the worker can still make progress.
    fn is_alive(&self, _worker: WorkerId) -> bool {
        true
    }
}

/// Typed notifications for an external presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    WorkersReady,
    RunUpdated { run_id: RunId, year: usize },
    RunCompleted { run_id: RunId, fitness: f64 },
    RunFailed { run_id: RunId, reason: String },
    GenerationCompleted(GenerationSummary),
    SimulationFinished {
        best: Option<Run>,
        elapsed: Duration,
    },
    Stalled { generation: u32, runs: Vec<RunId> },
}

pub trait SchedulerObserver {
    fn on_event(&mut self, event: &SchedulerEvent);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SchedulerObserver for NullObserver {
    fn on_event(&mut self, _event: &SchedulerEvent) {}
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker count when live updates are off.
    pub workers: usize,
    pub years_per_run: u32,
    /// Stream tree sets with every update; forces a single worker.
    pub live_updates: bool,
    /// A running worker silent for this long is considered stalled.
    pub stall_timeout_ms: u64,
    /// Times a stalled or failed run is handed to another worker before the generation stalls.
    pub max_redispatch: u32,
    pub simulation: SimulationConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            years_per_run: 100,
            live_updates: false,
            stall_timeout_ms: 30_000,
            max_redispatch: 1,
            simulation: SimulationConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.workers == 0 {
            return Err(SchedulerError::InvalidConfig("workers must be non-zero"));
        }
        if self.years_per_run == 0 {
            return Err(SchedulerError::InvalidConfig(
                "years_per_run must be non-zero",
            ));
        }
        if self.stall_timeout_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "stall_timeout_ms must be non-zero",
            ));
        }
        self.simulation.validate()?;
        Ok(())
    }

    /// Worker count actually used.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.live_updates { 1 } else { self.workers }
    }

    #[must_use]
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    /// Per-run seed so each run is reproducible independently of dispatch order.
    fn run_seed(&self, run_id: RunId) -> Option<u64> {
        self.simulation
            .rng_seed
            .map(|seed| seed ^ run_id.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerStatus {
    Idle,
    Running,
    Paused,
    Complete,
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Idle,
    Running { run_id: RunId, last_heard: Instant },
}

#[derive(Debug, Clone, Copy)]
struct WorkerState {
    slot: Slot,
    ready: bool,
    alive: bool,
}

/// Work postponed while paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferredAction {
    DispatchNext(WorkerId),
}

/// Single-threaded owner of the active population and worker bookkeeping.
///
/// All mutation happens through [`RunScheduler::handle`], so events arriving from
/// many workers are folded one at a time.
pub struct RunScheduler<T: WorkerTransport, O: SchedulerObserver = NullObserver> {
    config: SchedulerConfig,
    evolver: ScenarioEvolver,
    transport: T,
    observer: O,
    workers: Vec<WorkerState>,
    population: Population,
    status: SchedulerStatus,
    deferred: VecDeque<DeferredAction>,
    redispatches: HashMap<RunId, u32>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl<T: WorkerTransport> RunScheduler<T> {
    pub fn new(
        config: SchedulerConfig,
        evolver: ScenarioEvolver,
        transport: T,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let count = config.effective_workers().min(transport.worker_count());
        if count == 0 {
            return Err(SchedulerError::InvalidConfig("transport has no workers"));
        }
        let idle = WorkerState {
            slot: Slot::Idle,
            ready: false,
            alive: true,
        };
        Ok(Self {
            config,
            evolver,
            transport,
            observer: NullObserver,
            workers: vec![idle; count],
            population: Population::default(),
            status: SchedulerStatus::Idle,
            deferred: VecDeque::new(),
            redispatches: HashMap::new(),
            started_at: None,
            finished_at: None,
        })
    }
}

impl<T: WorkerTransport, O: SchedulerObserver> RunScheduler<T, O> {
    /// Replace the event observer.
    pub fn with_observer<P: SchedulerObserver>(self, observer: P) -> RunScheduler<T, P> {
        RunScheduler {
            config: self.config,
            evolver: self.evolver,
            transport: self.transport,
            observer,
            workers: self.workers,
            population: self.population,
            status: self.status,
            deferred: self.deferred,
            redispatches: self.redispatches,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        self.status
    }

    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    #[must_use]
    pub fn evolver(&self) -> &ScenarioEvolver {
        &self.evolver
    }

    #[must_use]
    pub fn observer(&self) -> &O {
        &self.observer
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub fn generation(&self) -> u32 {
        self.population.generation
    }

    /// Number of deferred actions waiting for resume.
    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    fn notify(&mut self, event: SchedulerEvent) {
        self.observer.on_event(&event);
    }

    /// Ping every worker; replies arrive as `Ready` events.
    pub fn ping_workers(&mut self) -> Result<(), SchedulerError> {
        for worker in 0..self.workers.len() {
            self.transport.send(worker, WorkerCommand::Ping)?;
        }
        Ok(())
    }

    /// Begin generation 1 and fill every idle worker.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if matches!(
            self.status,
            SchedulerStatus::Running | SchedulerStatus::Paused
        ) {
            warn!(status = ?self.status, "start ignored; optimization already active");
            return Ok(());
        }
        self.clear_state();
        self.population = self.evolver.start();
        self.status = SchedulerStatus::Running;
        self.started_at = Some(Instant::now());
        info!(
            generation = self.population.generation,
            runs = self.population.len(),
            workers = self.workers.len(),
            "optimization started"
        );
        self.fill_idle_workers()
    }

    /// Stop dispatching new runs and ask workers to halt at the next year boundary.
    pub fn pause(&mut self) -> Result<(), SchedulerError> {
        if self.status != SchedulerStatus::Running {
            debug!(status = ?self.status, "pause ignored");
            return Ok(());
        }
        self.status = SchedulerStatus::Paused;
        self.broadcast(WorkerCommand::Pause)?;
        info!(generation = self.generation(), "optimization paused");
        Ok(())
    }

    /// Resume workers and replay deferred actions in the order they were queued.
    pub fn resume(&mut self) -> Result<(), SchedulerError> {
        if self.status != SchedulerStatus::Paused {
            debug!(status = ?self.status, "resume ignored");
            return Ok(());
        }
        self.status = SchedulerStatus::Running;
        self.broadcast(WorkerCommand::Resume)?;
        let now = Instant::now();
        for worker in &mut self.workers {
            if let Slot::Running { last_heard, .. } = &mut worker.slot {
                *last_heard = now;
            }
        }
        info!(deferred = self.deferred.len(), "optimization resumed");
        if self.population.is_complete() {
            self.deferred.clear();
            return self.advance_generation();
        }
        while let Some(action) = self.deferred.pop_front() {
            self.execute(action)?;
        }
        Ok(())
    }

    /// Discard all run state in the scheduler and every worker. `start` is needed to go again.
    pub fn reset(&mut self) -> Result<(), SchedulerError> {
        self.broadcast(WorkerCommand::Reset)?;
        self.clear_state();
        self.evolver.reset();
        self.population = Population::default();
        self.status = SchedulerStatus::Idle;
        self.started_at = None;
        info!("optimization reset");
        Ok(())
    }

    fn clear_state(&mut self) {
        self.deferred.clear();
        self.redispatches.clear();
        self.finished_at = None;
        for worker in &mut self.workers {
            worker.slot = Slot::Idle;
        }
    }

    fn broadcast(&mut self, command: WorkerCommand) -> Result<(), SchedulerError> {
        for worker in 0..self.workers.len() {
            if !self.workers[worker].alive {
                continue;
            }
            if let Err(err) = self.transport.send(worker, command.clone()) {
                warn!(worker, error = %err, "worker unreachable");
                self.workers[worker].alive = false;
            }
        }
        Ok(())
    }

    /// Fold one inbound message into the scheduler state.
    pub fn handle(&mut self, input: SchedulerInput) -> Result<(), SchedulerError> {
        match input {
            SchedulerInput::Control(ControlCommand::Start) => self.start(),
            SchedulerInput::Control(ControlCommand::Pause) => self.pause(),
            SchedulerInput::Control(ControlCommand::Resume) => self.resume(),
            SchedulerInput::Control(ControlCommand::Reset) => self.reset(),
            SchedulerInput::Worker { worker, event } => self.handle_worker_event(worker, event),
        }
    }

    fn handle_worker_event(
        &mut self,
        worker: WorkerId,
        event: WorkerEvent,
    ) -> Result<(), SchedulerError> {
        if worker >= self.workers.len() {
            warn!(worker, "event from unknown worker ignored");
            return Ok(());
        }
        match event {
            WorkerEvent::Ready => {
                self.workers[worker].ready = true;
                if self.all_workers_ready() {
                    self.notify(SchedulerEvent::WorkersReady);
                }
                Ok(())
            }
            WorkerEvent::UpdatedRun(run) => {
                self.on_progress(worker, *run);
                Ok(())
            }
            WorkerEvent::RunData(run) => self.on_run_data(worker, *run),
            WorkerEvent::Success => {
                debug!(worker, "worker reported success");
                Ok(())
            }
            WorkerEvent::Failed { run_id, reason } => self.on_failure(worker, run_id, reason),
        }
    }

    fn assigned_run(&self, worker: WorkerId) -> Option<RunId> {
        match self.workers[worker].slot {
            Slot::Running { run_id, .. } => Some(run_id),
            Slot::Idle => None,
        }
    }

    fn on_progress(&mut self, worker: WorkerId, mut run: Run) {
        if self.assigned_run(worker) != Some(run.id) {
            warn!(worker, run_id = run.id, "progress for unassigned run ignored");
            return;
        }
        let Some(slot) = self.population.get_mut(run.id) else {
            warn!(worker, run_id = run.id, "progress for unknown run ignored");
            return;
        };
        if slot.is_complete {
            return;
        }
        run.is_allocated = true;
        run.is_complete = false;
        let year = run.yearly_data.years();
        let run_id = run.id;
        *slot = run;
        if let Slot::Running { last_heard, .. } = &mut self.workers[worker].slot {
            *last_heard = Instant::now();
        }
        self.notify(SchedulerEvent::RunUpdated { run_id, year });
    }

    fn on_run_data(&mut self, worker: WorkerId, run: Run) -> Result<(), SchedulerError> {
        let freed = self.assigned_run(worker) == Some(run.id);
        if freed {
            self.workers[worker].slot = Slot::Idle;
        }
        let accepted = matches!(self.population.get(run.id), Some(existing) if !existing.is_complete);
        if accepted {
            let (run_id, fitness) = (run.id, run.fitness);
            let mut run = run;
            run.is_allocated = true;
            run.is_complete = true;
            self.population.record(run)?;
            self.redispatches.remove(&run_id);
            info!(
                worker,
                run_id,
                fitness,
                completed = self.population.completed(),
                total = self.population.len(),
                "run completed"
            );
            self.notify(SchedulerEvent::RunCompleted { run_id, fitness });
        } else {
            warn!(worker, run_id = run.id, "stale run data ignored");
        }
        if accepted || freed {
            self.after_completion(worker)?;
        }
        Ok(())
    }

    fn on_failure(
        &mut self,
        worker: WorkerId,
        run_id: RunId,
        reason: String,
    ) -> Result<(), SchedulerError> {
        if self.assigned_run(worker) != Some(run_id) {
            warn!(worker, run_id, %reason, "failure for unassigned run ignored");
            return Ok(());
        }
        self.workers[worker].slot = Slot::Idle;
        warn!(worker, run_id, %reason, "run failed");
        self.notify(SchedulerEvent::RunFailed { run_id, reason });
        if self.requeue(run_id) {
            self.after_completion(worker)
        } else {
            self.stall()
        }
    }

    /// Return a run to the unallocated pool if it has retries left.
    fn requeue(&mut self, run_id: RunId) -> bool {
        let attempts = self.redispatches.entry(run_id).or_insert(0);
        if *attempts >= self.config.max_redispatch {
            return false;
        }
        *attempts += 1;
        if let Some(run) = self.population.get_mut(run_id) {
            run.is_allocated = false;
        }
        true
    }

    fn stall(&mut self) -> Result<(), SchedulerError> {
        let generation = self.population.generation;
        let runs: Vec<RunId> = self
            .population
            .runs
            .iter()
            .filter(|run| !run.is_complete)
            .map(|run| run.id)
            .collect();
        self.status = SchedulerStatus::Stalled;
        warn!(generation, ?runs, "generation stalled");
        self.notify(SchedulerEvent::Stalled {
            generation,
            runs: runs.clone(),
        });
        Err(SchedulerError::Stalled { generation, runs })
    }

    fn after_completion(&mut self, worker: WorkerId) -> Result<(), SchedulerError> {
        match self.status {
            SchedulerStatus::Paused => {
                self.deferred.push_back(DeferredAction::DispatchNext(worker));
                Ok(())
            }
            SchedulerStatus::Running => self.execute(DeferredAction::DispatchNext(worker)),
            _ => Ok(()),
        }
    }

    fn execute(&mut self, action: DeferredAction) -> Result<(), SchedulerError> {
        match action {
            DeferredAction::DispatchNext(worker) => {
                if self.population.unallocated() > 0 {
                    if self.workers[worker].alive && self.workers[worker].slot == Slot::Idle {
                        self.dispatch(worker)?;
                    }
                    self.fill_idle_workers()
                } else if self.population.is_complete() && !self.population.is_empty() {
                    self.advance_generation()
                } else {
                    Ok(())
                }
            }
        }
    }

    fn dispatch(&mut self, worker: WorkerId) -> Result<bool, SchedulerError> {
        let Some(run) = self.population.allocate_next() else {
            return Ok(false);
        };
        let run_id = run.id;
        let mut config = self.config.simulation.clone();
        config.rng_seed = self.config.run_seed(run_id);
        let request = RunRequest {
            run_id,
            scenario: run.scenario.clone(),
            species_catalog: self.evolver.catalog().clone(),
            years_per_run: self.config.years_per_run,
            live_updates: self.config.live_updates,
            selective_harvesting: self.config.simulation.selective_harvesting,
            config,
        };
        if let Err(err) = self
            .transport
            .send(worker, WorkerCommand::RunScenario(Box::new(request)))
        {
            if let Some(run) = self.population.get_mut(run_id) {
                run.is_allocated = false;
            }
            self.workers[worker].alive = false;
            warn!(worker, run_id, error = %err, "dispatch failed; worker marked dead");
            return Ok(false);
        }
        self.workers[worker].slot = Slot::Running {
            run_id,
            last_heard: Instant::now(),
        };
        debug!(worker, run_id, "dispatched run");
        Ok(true)
    }

    fn fill_idle_workers(&mut self) -> Result<(), SchedulerError> {
        for worker in 0..self.workers.len() {
            if self.population.unallocated() == 0 {
                break;
            }
            let state = self.workers[worker];
            if state.alive && state.slot == Slot::Idle {
                self.dispatch(worker)?;
            }
        }
        if self.population.unallocated() > 0 && !self.workers.iter().any(|worker| worker.alive) {
            return self.stall();
        }
        Ok(())
    }

    fn advance_generation(&mut self) -> Result<(), SchedulerError> {
        loop {
            let outcome = self.evolver.advance(&self.population)?;
            if let Some(summary) = self.evolver.archive().last().cloned() {
                info!(
                    generation = summary.generation,
                    best_fitness = summary.best_fitness,
                    "generation complete"
                );
                self.notify(SchedulerEvent::GenerationCompleted(summary));
            }
            match outcome {
                GenerationOutcome::Finished => {
                    self.status = SchedulerStatus::Complete;
                    self.finished_at = Some(Instant::now());
                    let best = self.evolver.best_run().cloned();
                    info!(
                        best_fitness = best.as_ref().map_or(0.0, |run| run.fitness),
                        "optimization finished"
                    );
                    let elapsed = self.elapsed().unwrap_or_default();
                    self.notify(SchedulerEvent::SimulationFinished { best, elapsed });
                    return Ok(());
                }
                GenerationOutcome::Continue(next) => {
                    self.population = next;
                    self.redispatches.clear();
                    if self.population.is_complete() {
                        continue;
                    }
                    return self.fill_idle_workers();
                }
            }
        }
    }

    /// Detect dead or silent workers and re-dispatch or stall their runs.
    pub fn check_stalls(&mut self, now: Instant) -> Result<(), SchedulerError> {
        if self.status != SchedulerStatus::Running {
            return Ok(());
        }
        let timeout = self.config.stall_timeout();
        for worker in 0..self.workers.len() {
            let Slot::Running { run_id, last_heard } = self.workers[worker].slot else {
                continue;
            };
            let alive = self.transport.is_alive(worker);
            if alive && now.saturating_duration_since(last_heard) < timeout {
                continue;
            }
            warn!(worker, run_id, alive, "worker stalled");
            self.workers[worker].slot = Slot::Idle;
            if !alive {
                self.workers[worker].alive = false;
            }
            if !self.requeue(run_id) {
                return self.stall();
            }
            self.fill_idle_workers()?;
        }
        Ok(())
    }

    /// Drive the optimization from `inbox` until it finishes, stalls or is reset.
    ///
    /// Returns the best run found, or `None` after a reset.
    pub fn run_to_completion(
        &mut self,
        inbox: &Rx<SchedulerInput>,
    ) -> Result<Option<Run>, SchedulerError> {
        if self.status == SchedulerStatus::Idle {
            self.start()?;
        }
        let poll = (self.config.stall_timeout() / 4).clamp(
            Duration::from_millis(10),
            Duration::from_millis(500),
        );
        loop {
            match self.status {
                SchedulerStatus::Complete => return Ok(self.best_run().cloned()),
                SchedulerStatus::Idle => return Ok(None),
                SchedulerStatus::Stalled => {
                    return Err(SchedulerError::Stalled {
                        generation: self.generation(),
                        runs: self
                            .population
                            .runs
                            .iter()
                            .filter(|run| !run.is_complete)
                            .map(|run| run.id)
                            .collect(),
                    });
                }
                SchedulerStatus::Running | SchedulerStatus::Paused => {}
            }
            match inbox.recv_timeout(poll) {
                Ok(input) => self.handle(input)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(SchedulerError::InboxClosed),
            }
            self.check_stalls(Instant::now())?;
        }
    }

    // Queries

    /// Best run across all concluded generations, else the best completed run so far.
    #[must_use]
    pub fn best_run(&self) -> Option<&Run> {
        self.evolver.best_run().or_else(|| {
            self.population
                .runs
                .iter()
                .filter(|run| run.is_complete)
                .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
        })
    }

    /// Highest fitness among completed runs in the current generation.
    #[must_use]
    pub fn current_fitness(&self) -> f64 {
        self.population
            .runs
            .iter()
            .filter(|run| run.is_complete)
            .map(|run| run.fitness)
            .fold(0.0, f64::max)
    }

    #[must_use]
    pub fn best_fitness_by_generation(&self) -> Vec<f64> {
        self.evolver.best_fitness_by_generation()
    }

    #[must_use]
    pub fn fitness_improvement(&self) -> f64 {
        self.evolver.fitness_improvement(Some(&self.population))
    }

    /// Percentage of the whole generation budget evaluated.
    #[must_use]
    pub fn progress_overall(&self) -> f64 {
        let max = f64::from(self.evolver.config().max_generations.max(1));
        let size = self.evolver.config().population_size.max(1) as f64;
        let archived = self.evolver.archive().len() as f64;
        let current = if self.status == SchedulerStatus::Complete {
            0.0
        } else {
            self.population.completed() as f64 / size
        };
        ((archived + current) / max * 100.0).min(100.0)
    }

    #[must_use]
    pub fn progress_this_generation(&self) -> f64 {
        let size = self.evolver.config().population_size.max(1) as f64;
        self.population.completed() as f64 / size * 100.0
    }

    fn run_with_highest(&self, metric: impl Fn(&Run) -> f64) -> Option<RunId> {
        self.population
            .runs
            .iter()
            .filter(|run| metric(run) > 0.0)
            .max_by(|a, b| metric(a).total_cmp(&metric(b)))
            .map(|run| run.id)
    }

    #[must_use]
    pub fn run_with_highest_carbon(&self) -> Option<RunId> {
        self.run_with_highest(Run::final_carbon)
    }

    #[must_use]
    pub fn run_with_highest_biodiversity(&self) -> Option<RunId> {
        self.run_with_highest(|run| run.average_biodiversity)
    }

    #[must_use]
    pub fn run_with_highest_fitness(&self) -> Option<RunId> {
        self.run_with_highest(|run| run.fitness)
    }

    #[must_use]
    pub fn carbon_per_year(&self, run_id: RunId) -> Option<f64> {
        self.population.get(run_id).map(Run::carbon_per_year)
    }

    /// Mean final carbon over the current generation's runs.
    #[must_use]
    pub fn average_carbon_across_runs(&self) -> f64 {
        let total: f64 = self.population.runs.iter().map(Run::final_carbon).sum();
        total / self.population.len().max(1) as f64
    }

    #[must_use]
    pub fn all_workers_ready(&self) -> bool {
        self.workers.iter().all(|worker| worker.ready)
    }

    /// Wall time since `start`, frozen once the optimization finishes.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(
            self.finished_at
                .unwrap_or_else(Instant::now)
                .saturating_duration_since(started),
        )
    }
}
