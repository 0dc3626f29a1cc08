//! Messages exchanged between the scheduler and its workers.

use canopy_core::{Run, RunId, Scenario, SimulationConfig, SpeciesCatalog};
use serde::{Deserialize, Serialize};

/// Index of a worker within its pool.
pub type WorkerId = usize;

/// Everything a worker needs to simulate one run from scratch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub run_id: RunId,
    pub scenario: Scenario,
    pub species_catalog: SpeciesCatalog,
    pub years_per_run: u32,
    /// Attach the living tree set to every yearly update.
    pub live_updates: bool,
    pub selective_harvesting: bool,
    /// Plot and model parameters, including the per-run seed.
    pub config: SimulationConfig,
}

/// Inbound worker commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum WorkerCommand {
    /// Liveness check, answered with [`WorkerEvent::Ready`].
    Ping,
    /// Start a fresh run, discarding any run in progress.
    RunScenario(Box<RunRequest>),
    Pause,
    Resume,
    /// Drop all per-run state.
    Reset,
    /// Exit the worker loop.
    Shutdown,
}

/// Outbound worker events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum WorkerEvent {
    Ready,
    /// Partial run after each simulated year.
    UpdatedRun(Box<Run>),
    /// Completed run, sent exactly once per run.
    RunData(Box<Run>),
    /// Simulation finished; follows `RunData`.
    Success,
    /// The run could not be simulated.
    Failed {
        #[serde(rename = "runId")]
        run_id: RunId,
        reason: String,
    },
}

/// Operator requests fed into the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    Start,
    Pause,
    Resume,
    Reset,
}

/// Single inbox multiplexing worker events and operator control.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerInput {
    Worker { worker: WorkerId, event: WorkerEvent },
    Control(ControlCommand),
}
