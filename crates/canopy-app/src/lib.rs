//! Concurrent orchestration of scenario runs across simulation workers.

pub mod config;
pub mod pool;
pub mod protocol;
pub mod scheduler;
pub mod worker;

pub use config::AppConfig;
pub use pool::WorkerPool;
pub use protocol::{
    ControlCommand, RunRequest, SchedulerInput, WorkerCommand, WorkerEvent, WorkerId,
};
pub use scheduler::{
    NullObserver, RunScheduler, SchedulerConfig, SchedulerError, SchedulerEvent,
    SchedulerObserver, SchedulerStatus, TransportError, WorkerTransport,
};
pub use worker::SimulationWorker;
