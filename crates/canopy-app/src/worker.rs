//! Simulation worker: owns one run at a time and advances it year by year.

use std::ops::ControlFlow;
use std::panic::{AssertUnwindSafe, catch_unwind};

use canopy_core::{Forest, RunId};
use crossfire::{MTx, Rx, TryRecvError, mpsc};
use tracing::{debug, error, info, warn};

use crate::protocol::{RunRequest, SchedulerInput, WorkerCommand, WorkerEvent, WorkerId};

pub type CommandSender = MTx<WorkerCommand>;
pub type CommandReceiver = Rx<WorkerCommand>;
pub type EventSender = MTx<SchedulerInput>;

/// Unbounded so control messages never block the sender.
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_blocking()
}

struct ActiveRun {
    run_id: RunId,
    years: u32,
    live_updates: bool,
    forest: Forest,
}

/// One execution unit. All run state lives in this struct; nothing is shared.
pub struct SimulationWorker {
    id: WorkerId,
    commands: CommandReceiver,
    events: EventSender,
    paused: bool,
    active: Option<ActiveRun>,
}

impl SimulationWorker {
    #[must_use]
    pub fn new(id: WorkerId, commands: CommandReceiver, events: EventSender) -> Self {
        Self {
            id,
            commands,
            events,
            paused: false,
            active: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Serve commands until shutdown or until either channel disconnects.
    ///
    /// Pending commands are always handled before the next year is simulated, so a
    /// pause takes effect at the next year boundary.
    pub fn run(mut self) {
        debug!(worker = self.id, "worker started");
        loop {
            let busy = self.active.is_some() && !self.paused;
            let command = if busy {
                match self.commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match self.commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };
            let flow = match command {
                Some(command) => self.handle(command),
                None => self.advance_year(),
            };
            if flow.is_break() {
                break;
            }
        }
        debug!(worker = self.id, "worker stopped");
    }

    fn emit(&self, event: WorkerEvent) -> ControlFlow<()> {
        let input = SchedulerInput::Worker {
            worker: self.id,
            event,
        };
        match self.events.send(input) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => {
                warn!(worker = self.id, "scheduler inbox closed; stopping worker");
                ControlFlow::Break(())
            }
        }
    }

    fn handle(&mut self, command: WorkerCommand) -> ControlFlow<()> {
        match command {
            WorkerCommand::Ping => self.emit(WorkerEvent::Ready),
            WorkerCommand::RunScenario(request) => self.start(*request),
            WorkerCommand::Pause => {
                self.paused = true;
                ControlFlow::Continue(())
            }
            WorkerCommand::Resume => {
                self.paused = false;
                ControlFlow::Continue(())
            }
            WorkerCommand::Reset => {
                if let Some(active) = self.active.take() {
                    debug!(worker = self.id, run_id = active.run_id, "discarding run on reset");
                }
                self.paused = false;
                ControlFlow::Continue(())
            }
            WorkerCommand::Shutdown => ControlFlow::Break(()),
        }
    }

    fn start(&mut self, request: RunRequest) -> ControlFlow<()> {
        let RunRequest {
            run_id,
            scenario,
            species_catalog,
            years_per_run,
            live_updates,
            selective_harvesting,
            mut config,
        } = request;
        config.selective_harvesting = selective_harvesting;
        self.active = None;
        match Forest::new(config, species_catalog, scenario) {
            Ok(forest) => {
                debug!(
                    worker = self.id,
                    run_id,
                    trees = forest.trees().len(),
                    years = years_per_run,
                    "starting run"
                );
                self.active = Some(ActiveRun {
                    run_id,
                    years: years_per_run,
                    live_updates,
                    forest,
                });
                ControlFlow::Continue(())
            }
            Err(err) => {
                warn!(worker = self.id, run_id, error = %err, "rejected run");
                self.emit(WorkerEvent::Failed {
                    run_id,
                    reason: err.to_string(),
                })
            }
        }
    }

    fn advance_year(&mut self) -> ControlFlow<()> {
        let Some(active) = self.active.as_mut() else {
            return ControlFlow::Continue(());
        };
        if active.forest.year() < active.years {
            let stepped = catch_unwind(AssertUnwindSafe(|| active.forest.step()));
            let failure = match stepped {
                Ok(Ok(_)) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(_) => Some("simulation step panicked".to_owned()),
            };
            if let Some(reason) = failure {
                let run_id = active.run_id;
                self.active = None;
                error!(worker = self.id, run_id, %reason, "run failed");
                return self.emit(WorkerEvent::Failed { run_id, reason });
            }
            let progress = active.forest.progress(active.run_id, active.live_updates);
            self.emit(WorkerEvent::UpdatedRun(Box::new(progress)))?;
        }
        let finished = self
            .active
            .as_ref()
            .is_some_and(|active| active.forest.year() >= active.years);
        if finished && let Some(active) = self.active.take() {
            let run = active.forest.into_run(active.run_id);
            info!(
                worker = self.id,
                run_id = run.id,
                fitness = run.fitness,
                trees = run.trees.len(),
                "run complete"
            );
            self.emit(WorkerEvent::RunData(Box::new(run)))?;
            return self.emit(WorkerEvent::Success);
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{Scenario, ScenarioRanges, SimulationConfig, SpeciesCatalog};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::thread;

    fn request(run_id: RunId, years: u32) -> RunRequest {
        let catalog = SpeciesCatalog::default();
        let mut scenario = Scenario::random(
            &catalog,
            &ScenarioRanges::default(),
            &mut SmallRng::seed_from_u64(run_id),
        );
        scenario.num_trees = 20;
        RunRequest {
            run_id,
            scenario,
            species_catalog: catalog,
            years_per_run: years,
            live_updates: false,
            selective_harvesting: true,
            config: SimulationConfig {
                rng_seed: Some(run_id),
                ..SimulationConfig::default()
            },
        }
    }

    fn next_event(inbox: &Rx<SchedulerInput>) -> WorkerEvent {
        match inbox.recv().expect("event") {
            SchedulerInput::Worker { worker, event } => {
                assert_eq!(worker, 0);
                event
            }
            other => panic!("unexpected input {other:?}"),
        }
    }

    #[test]
    fn worker_answers_ping_and_completes_a_run() {
        let (cmd_tx, cmd_rx) = command_channel();
        let (event_tx, inbox) = mpsc::unbounded_blocking();
        let handle = thread::spawn(move || SimulationWorker::new(0, cmd_rx, event_tx).run());

        cmd_tx.send(WorkerCommand::Ping).expect("send");
        assert_eq!(next_event(&inbox), WorkerEvent::Ready);

        cmd_tx
            .send(WorkerCommand::RunScenario(Box::new(request(5, 3))))
            .expect("send");
        let mut updates = Vec::new();
        let run = loop {
            match next_event(&inbox) {
                WorkerEvent::UpdatedRun(run) => updates.push(run),
                WorkerEvent::RunData(run) => break run,
                other => panic!("unexpected event {other:?}"),
            }
        };
        assert_eq!(next_event(&inbox), WorkerEvent::Success);
        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|update| update.trees.is_empty() && !update.is_complete));
        assert_eq!(updates[2].yearly_data.carbon.len(), 4);
        assert!(run.is_complete);
        assert_eq!(run.id, 5);
        assert_eq!(run.yearly_data.carbon.len(), 4);

        cmd_tx.send(WorkerCommand::Shutdown).expect("send");
        handle.join().expect("join");
    }

    #[test]
    fn invalid_scenario_is_reported_as_failure() {
        let (cmd_tx, cmd_rx) = command_channel();
        let (event_tx, inbox) = mpsc::unbounded_blocking();
        let handle = thread::spawn(move || SimulationWorker::new(0, cmd_rx, event_tx).run());

        let mut bad = request(9, 3);
        bad.scenario.coppice_chance = 4.0;
        cmd_tx
            .send(WorkerCommand::RunScenario(Box::new(bad)))
            .expect("send");
        assert!(matches!(
            next_event(&inbox),
            WorkerEvent::Failed { run_id: 9, .. }
        ));

        drop(cmd_tx);
        handle.join().expect("join");
    }

    #[test]
    fn paused_worker_holds_its_run_until_resumed() {
        let (cmd_tx, cmd_rx) = command_channel();
        let (event_tx, inbox) = mpsc::unbounded_blocking();
        let mut worker = SimulationWorker::new(0, cmd_rx, event_tx);

        assert!(worker.handle(WorkerCommand::Pause).is_continue());
        assert!(
            worker
                .handle(WorkerCommand::RunScenario(Box::new(request(2, 1))))
                .is_continue()
        );
        assert!(worker.paused && worker.active.is_some());
        assert!(inbox.try_recv().is_err());

        cmd_tx.send(WorkerCommand::Resume).expect("send");
        cmd_tx.send(WorkerCommand::Shutdown).expect("send");
        worker.run();
        let events: Vec<WorkerEvent> = std::iter::from_fn(|| inbox.try_recv().ok())
            .map(|input| match input {
                SchedulerInput::Worker { event, .. } => event,
                other => panic!("unexpected input {other:?}"),
            })
            .collect();
        assert!(events.is_empty(), "shutdown is handled before the next year");
    }
}
