//! Thread-backed worker pool.

use std::thread::{self, JoinHandle};

use crossfire::{Rx, detect_backoff_cfg, mpsc};
use tracing::{debug, warn};

use crate::protocol::{SchedulerInput, WorkerCommand, WorkerId};
use crate::scheduler::{TransportError, WorkerTransport};
use crate::worker::{CommandSender, EventSender, SimulationWorker, command_channel};

/// Create the inbox every worker reports into.
pub fn scheduler_inbox() -> (EventSender, Rx<SchedulerInput>) {
    detect_backoff_cfg();
    mpsc::unbounded_blocking()
}

struct WorkerHandle {
    commands: CommandSender,
    thread: Option<JoinHandle<()>>,
}

/// Fixed set of worker threads, each running one [`SimulationWorker`].
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Spawn `count` workers reporting into `events`.
    pub fn spawn(count: usize, events: &EventSender) -> std::io::Result<Self> {
        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            let (commands, receiver) = command_channel();
            let events = events.clone();
            let thread = thread::Builder::new()
                .name(format!("canopy-worker-{id}"))
                .spawn(move || SimulationWorker::new(id, receiver, events).run())?;
            workers.push(WorkerHandle {
                commands,
                thread: Some(thread),
            });
        }
        debug!(workers = count, "spawned worker pool");
        Ok(Self { workers })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Ask every worker to exit and wait for the threads.
    pub fn shutdown(&mut self) {
        for worker in &self.workers {
            let _ = worker.commands.send(WorkerCommand::Shutdown);
        }
        for (id, worker) in self.workers.iter_mut().enumerate() {
            if let Some(thread) = worker.thread.take()
                && thread.join().is_err()
            {
                warn!(worker = id, "worker thread panicked");
            }
        }
    }
}

impl WorkerTransport for WorkerPool {
    fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn send(&self, worker: WorkerId, command: WorkerCommand) -> Result<(), TransportError> {
        let handle = self
            .workers
            .get(worker)
            .ok_or(TransportError::UnknownWorker(worker))?;
        handle
            .commands
            .send(command)
            .map_err(|_| TransportError::Disconnected(worker))
    }

    fn is_alive(&self, worker: WorkerId) -> bool {
        self.workers
            .get(worker)
            .and_then(|handle| handle.thread.as_ref())
            .is_some_and(|thread| !thread.is_finished())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WorkerEvent;

    #[test]
    fn every_worker_answers_ping() {
        let (events, inbox) = scheduler_inbox();
        let mut pool = WorkerPool::spawn(3, &events).expect("pool");
        for id in 0..pool.len() {
            pool.send(id, WorkerCommand::Ping).expect("send");
        }
        let mut ready: Vec<WorkerId> = (0..3)
            .map(|_| match inbox.recv().expect("event") {
                SchedulerInput::Worker {
                    worker,
                    event: WorkerEvent::Ready,
                } => worker,
                other => panic!("unexpected input {other:?}"),
            })
            .collect();
        ready.sort_unstable();
        assert_eq!(ready, vec![0, 1, 2]);
        assert!(pool.is_alive(1));
        assert_eq!(
            pool.send(7, WorkerCommand::Ping),
            Err(TransportError::UnknownWorker(7))
        );

        pool.shutdown();
        assert!(!pool.is_alive(1));
        assert_eq!(
            pool.send(0, WorkerCommand::Ping),
            Err(TransportError::Disconnected(0))
        );
    }
}
